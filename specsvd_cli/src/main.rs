mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use specsvd_core::spectral::PhaseRecovery;
use specsvd_core::{DecodePolicy, Pipeline, PipelineConfig, PipelineError, RunSummary};

#[derive(Parser, Debug)]
#[command(
    name = "specsvd",
    version,
    about = "Denoise a directory of recordings by low-rank spectrogram filtering"
)]
struct Args {
    /// TOML file with pipeline settings; flags below override it.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory of .mp3 / .wav recordings.
    #[arg(short, long)]
    dataset: Option<PathBuf>,
    /// Directory receiving plots, reconstructed audio and the manifest.
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(long)]
    max_files: Option<usize>,
    /// Relative singular value cut-off.
    #[arg(short, long)]
    threshold: Option<f64>,
    /// Recover phase with this many Griffin-Lim iterations instead of zero phase.
    #[arg(long, value_name = "ITERATIONS")]
    griffin_lim: Option<usize>,
    #[arg(long, default_value_t = 0.99)]
    griffin_lim_momentum: f32,
    /// Continue past files that fail to decode.
    #[arg(long)]
    skip_bad_files: bool,
    #[arg(long)]
    no_manifest: bool,
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_toml_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => PipelineConfig::default(),
        };
        if let Some(dataset) = self.dataset {
            config.dataset_dir = dataset;
        }
        if let Some(output) = self.output {
            config.output_dir = output;
        }
        if let Some(max_files) = self.max_files {
            config.max_files = max_files;
        }
        if let Some(threshold) = self.threshold {
            config.threshold_ratio = threshold;
        }
        if let Some(iterations) = self.griffin_lim {
            config.phase = PhaseRecovery::GriffinLim {
                iterations,
                momentum: self.griffin_lim_momentum,
            };
        }
        if self.skip_bad_files {
            config.on_decode_error = DecodePolicy::Skip;
        }
        if self.no_manifest {
            config.write_manifest = false;
        }
        config.validate()?;
        Ok(config)
    }
}

fn run(args: Args) -> Result<RunSummary> {
    let config = args.into_config()?;
    let pipeline = Pipeline::new(config)?;
    Ok(pipeline.run()?)
}

/// Log the outcome of a run and pick the process exit status.
fn report(result: Result<RunSummary>) -> u8 {
    match result {
        Ok(summary) => {
            tracing::info!(
                "{} of {} files processed ({} skipped)",
                summary.files_processed,
                summary.files_found,
                summary.files_skipped
            );
            0
        }
        Err(err) => {
            if let Some(PipelineError::InvalidDatasetPath { path }) =
                err.downcast_ref::<PipelineError>()
            {
                tracing::error!("Dataset path is invalid: {}", path.display());
            } else {
                tracing::error!("{err:#}");
            }
            1
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = logging::init(args.verbose) {
        eprintln!("logging disabled: {err}");
    }
    ExitCode::from(report(run(args)))
}
