//! Batch driver: discover files, run each through the spectral chain, and
//! fold the results into a corpus average.
//!
//! Files are processed strictly one after another. The reference shape and
//! running aggregate live in an explicit [`RunState`] handed to every
//! per-file step.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::audio::{SAMPLE_RATE, Waveform, decoder, writer};
use crate::config::{DecodePolicy, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::manifest::{ManifestLine, ManifestWriter};
use crate::render::{PlotAxes, render_spectrogram};
use crate::spectral::db::amplitude_to_db;
use crate::spectral::normalize::truncated_frames;
use crate::spectral::{
    CorpusAggregator, RankFilter, ReferenceShape, Spectrogram, SpectrogramTransform, normalize_to,
};

pub const ORIGINAL_SUFFIX: &str = "_Original_Spectrogram.png";
pub const FILTERED_SUFFIX: &str = "_Filtered_Spectrogram.png";
pub const RECONSTRUCTED_SUFFIX: &str = "_Reconstructed_Audio.wav";
pub const AVERAGE_FILE_NAME: &str = "Average_Spectrogram.png";

const AUDIO_SUFFIXES: [&str; 2] = [".mp3", ".wav"];

/// Mutable state carried across the files of one run.
///
/// The aggregate is created from the first spectrogram admitted; its shape is
/// the run's reference shape from then on.
#[derive(Debug, Default)]
pub struct RunState {
    aggregate: Option<CorpusAggregator>,
}

impl RunState {
    pub fn reference_shape(&self) -> Option<ReferenceShape> {
        self.aggregate.as_ref().map(CorpusAggregator::shape)
    }

    pub fn files_aggregated(&self) -> usize {
        self.aggregate.as_ref().map_or(0, CorpusAggregator::count)
    }

    fn aggregator_for(&mut self, spec: &Spectrogram) -> &mut CorpusAggregator {
        self.aggregate
            .get_or_insert_with(|| CorpusAggregator::new(ReferenceShape::of(spec)))
    }

    /// Mean of every normalized spectrogram folded in so far.
    pub fn average(&self) -> Result<Spectrogram> {
        match &self.aggregate {
            Some(aggregate) => aggregate.finalize(),
            None => Err(PipelineError::EmptyCorpus),
        }
    }
}

/// Paths written for one input file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileArtifacts {
    pub original_image: PathBuf,
    pub filtered_image: PathBuf,
    pub reconstructed_audio: PathBuf,
}

impl FileArtifacts {
    pub fn for_source(output_dir: &Path, source_name: &str) -> Self {
        Self {
            original_image: output_dir.join(format!("{source_name}{ORIGINAL_SUFFIX}")),
            filtered_image: output_dir.join(format!("{source_name}{FILTERED_SUFFIX}")),
            reconstructed_audio: output_dir.join(format!("{source_name}{RECONSTRUCTED_SUFFIX}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub artifacts: FileArtifacts,
    pub manifest: ManifestLine,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub files_found: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    /// `None` when nothing was processed.
    pub average_image: Option<PathBuf>,
    pub manifest: Option<PathBuf>,
}

pub struct Pipeline {
    config: PipelineConfig,
    transform: SpectrogramTransform,
    filter: RankFilter,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let transform = SpectrogramTransform::new(config.n_fft, config.hop_length)?;
        let filter = RankFilter::new(config.threshold_ratio);
        Ok(Self {
            config,
            transform,
            filter,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self) -> Result<RunSummary> {
        let dataset = &self.config.dataset_dir;
        if !dataset.is_dir() {
            return Err(PipelineError::InvalidDatasetPath {
                path: dataset.clone(),
            });
        }
        info!("Dataset path is valid: {}", dataset.display());

        let output = &self.config.output_dir;
        std::fs::create_dir_all(output).map_err(|e| PipelineError::io(output, e))?;

        let files = discover_audio_files(dataset, self.config.max_files)?;
        let total = files.len();
        info!(
            n_fft = self.transform.n_fft(),
            hop_length = self.transform.hop_length(),
            threshold_ratio = self.filter.ratio(),
            "Found {} audio files",
            total
        );
        let mut manifest = if self.config.write_manifest {
            Some(ManifestWriter::create(output)?)
        } else {
            None
        };

        let mut state = RunState::default();
        let mut summary = RunSummary {
            files_found: total,
            ..RunSummary::default()
        };

        for (idx, path) in files.iter().enumerate() {
            let name = source_name(path);
            info!("Processing file {}/{}: {}", idx + 1, total, name);

            let wave = match decoder::load_waveform(path) {
                Ok(wave) => wave,
                Err(err @ PipelineError::Decode { .. })
                    if self.config.on_decode_error == DecodePolicy::Skip =>
                {
                    warn!("Skipping {}: {}", name, err);
                    summary.files_skipped += 1;
                    continue;
                }
                Err(err) => return Err(err),
            };

            let report = self.process_waveform(&name, &wave, &mut state)?;
            if let Some(manifest) = manifest.as_mut() {
                manifest.append(&report.manifest)?;
            }
            summary.files_processed += 1;
            info!("Saved results for {}", name);
        }

        summary.average_image = self.write_average(&state)?;
        if let Some(manifest) = manifest {
            let (path, lines) = manifest.finish()?;
            debug!("Manifest with {} entries at {}", lines, path.display());
            summary.manifest = Some(path);
        }

        info!(
            processed = summary.files_processed,
            skipped = summary.files_skipped,
            "Processing complete. Results saved to: {}",
            output.display()
        );
        Ok(summary)
    }

    /// Run one decoded waveform through transform, filter and reconstruction,
    /// write its artifacts, and fold its normalized spectrogram into `state`.
    pub fn process_waveform(
        &self,
        name: &str,
        wave: &Waveform,
        state: &mut RunState,
    ) -> Result<FileReport> {
        let artifacts = FileArtifacts::for_source(&self.config.output_dir, name);
        let axes = PlotAxes {
            sample_rate: wave.sample_rate,
            hop_length: self.transform.hop_length(),
        };

        debug!("{}: {:.2}s of audio", name, wave.duration_secs());
        let spec = self.transform.forward(wave)?;
        let aggregate = state.aggregator_for(&spec);
        let shape = aggregate.shape();

        let dropped = truncated_frames(&spec, shape);
        if dropped > 0 {
            warn!(
                "{}: {} frames beyond the reference length of {} are dropped",
                name, dropped, shape.cols
            );
        }
        let normalized = normalize_to(&spec, shape);
        render_spectrogram(
            &amplitude_to_db(&normalized, self.config.top_db),
            axes,
            &format!("Original Spectrogram: {name}"),
            &artifacts.original_image,
        )?;

        let outcome = self.filter.apply(&normalized)?;
        debug!(
            retained = outcome.stats.retained_rank,
            total = outcome.stats.total_rank,
            threshold = outcome.stats.threshold,
            "{}: singular value threshold applied",
            name
        );
        render_spectrogram(
            &amplitude_to_db(&outcome.filtered, self.config.top_db),
            axes,
            &format!("Filtered Spectrogram (After SVD): {name}"),
            &artifacts.filtered_image,
        )?;

        let reconstructed =
            self.transform
                .inverse(&outcome.filtered, self.config.phase, SAMPLE_RATE)?;
        writer::write_wav(&artifacts.reconstructed_audio, &reconstructed)?;

        aggregate.add(&normalized)?;

        let manifest = ManifestLine {
            file: name.to_string(),
            source_shape: [spec.nrows(), spec.ncols()],
            normalized_shape: [shape.rows, shape.cols],
            truncated_frames: dropped,
            total_rank: outcome.stats.total_rank,
            retained_rank: outcome.stats.retained_rank,
            max_singular_value: outcome.stats.max_singular_value,
            threshold: outcome.stats.threshold,
            reconstructed_samples: reconstructed.len(),
        };
        Ok(FileReport {
            artifacts,
            manifest,
        })
    }

    fn write_average(&self, state: &RunState) -> Result<Option<PathBuf>> {
        let average = match state.average() {
            Ok(average) => average,
            Err(PipelineError::EmptyCorpus) => {
                warn!("No files processed; average spectrogram not written");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        let path = self.config.output_dir.join(AVERAGE_FILE_NAME);
        let axes = PlotAxes {
            sample_rate: SAMPLE_RATE,
            hop_length: self.transform.hop_length(),
        };
        render_spectrogram(
            &amplitude_to_db(&average, self.config.top_db),
            axes,
            "Average Spectrogram of Dataset",
            &path,
        )?;
        info!("Average spectrogram saved to: {}", path.display());
        Ok(Some(path))
    }
}

/// List `.mp3` / `.wav` files in `dir`, sorted by name, capped at `max_files`.
pub fn discover_audio_files(dir: &Path, max_files: usize) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| PipelineError::io(dir, e))?.path();
        if !path.is_file() {
            continue;
        }
        let name = source_name(&path);
        if AUDIO_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
            files.push(path);
        }
    }
    files.sort();
    files.truncate(max_files);
    Ok(files)
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
