use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::spectral::PhaseRecovery;
use crate::spectral::db::DEFAULT_TOP_DB;
use crate::spectral::rank_filter::DEFAULT_THRESHOLD_RATIO;

/// What to do when an input file fails to decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// Stop the whole run.
    #[default]
    Abort,
    /// Log the failure and continue with the next file.
    Skip,
}

/// Settings for one batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub dataset_dir: PathBuf,
    pub output_dir: PathBuf,
    pub n_fft: usize,
    pub hop_length: usize,
    /// Singular values at or below `threshold_ratio * max` are discarded.
    pub threshold_ratio: f64,
    pub max_files: usize,
    pub top_db: f32,
    pub phase: PhaseRecovery,
    pub on_decode_error: DecodePolicy,
    pub write_manifest: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from("src/dataset"),
            output_dir: PathBuf::from("output"),
            n_fft: 1024,
            hop_length: 512,
            threshold_ratio: DEFAULT_THRESHOLD_RATIO,
            max_files: 400,
            top_db: DEFAULT_TOP_DB,
            phase: PhaseRecovery::Zero,
            on_decode_error: DecodePolicy::Abort,
            write_manifest: true,
        }
    }
}

impl PipelineConfig {
    /// Read a TOML file; missing keys fall back to defaults.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let config: Self = toml::from_str(&text).map_err(|e| PipelineError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate_at(path)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_at(Path::new("<config>"))
    }

    fn validate_at(&self, origin: &Path) -> Result<()> {
        let fail = |reason: String| {
            Err(PipelineError::Config {
                path: origin.to_path_buf(),
                reason,
            })
        };
        if self.n_fft < 2 || self.n_fft % 2 != 0 {
            return fail(format!("n_fft must be even and >= 2, got {}", self.n_fft));
        }
        if self.hop_length == 0 || self.hop_length > self.n_fft {
            return fail(format!(
                "hop_length must be in 1..={}, got {}",
                self.n_fft, self.hop_length
            ));
        }
        if !(0.0..1.0).contains(&self.threshold_ratio) {
            return fail(format!(
                "threshold_ratio must be in [0, 1), got {}",
                self.threshold_ratio
            ));
        }
        if self.max_files == 0 {
            return fail("max_files must be at least 1".into());
        }
        if !(self.top_db > 0.0) {
            return fail(format!("top_db must be positive, got {}", self.top_db));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_batch_settings() {
        let config = PipelineConfig::default();
        assert_eq!(config.n_fft, 1024);
        assert_eq!(config.hop_length, 512);
        assert_eq!(config.max_files, 400);
        assert!((config.threshold_ratio - 0.1).abs() < f64::EPSILON);
        assert_eq!(config.phase, PhaseRecovery::Zero);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(
            &path,
            r#"
dataset_dir = "clips"
max_files = 12
on_decode_error = "skip"

[phase.griffin_lim]
iterations = 8
momentum = 0.9
"#,
        )
        .unwrap();

        let config = PipelineConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.dataset_dir, PathBuf::from("clips"));
        assert_eq!(config.max_files, 12);
        assert_eq!(config.on_decode_error, DecodePolicy::Skip);
        assert_eq!(config.n_fft, 1024);
        assert_eq!(
            config.phase,
            PhaseRecovery::GriffinLim {
                iterations: 8,
                momentum: 0.9
            }
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = PipelineConfig::default();
        config.hop_length = 0;
        assert!(matches!(config.validate(), Err(PipelineError::Config { .. })));

        let mut config = PipelineConfig::default();
        config.threshold_ratio = 1.5;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.n_fft = 1023;
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "n_fft = \"big\"").unwrap();
        assert!(matches!(
            PipelineConfig::from_toml_file(&path),
            Err(PipelineError::Config { .. })
        ));
    }
}
