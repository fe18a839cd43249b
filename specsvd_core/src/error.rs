use std::path::PathBuf;

/// Errors raised while running the spectrogram pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The dataset directory does not exist or is not a directory.
    #[error("dataset path is invalid: {}", path.display())]
    InvalidDatasetPath { path: PathBuf },
    /// An input file could not be opened or decoded.
    #[error("failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },
    /// A transform received a matrix or waveform it cannot work with.
    #[error("malformed transform input: {0}")]
    Shape(String),
    /// No spectrogram was folded into the aggregate.
    #[error("no files processed; cannot compute an average spectrogram")]
    EmptyCorpus,
    #[error("i/o error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to render {}: {reason}", path.display())]
    Render { path: PathBuf, reason: String },
    #[error("failed to write audio {}: {source}", path.display())]
    AudioWrite {
        path: PathBuf,
        source: hound::Error,
    },
    #[error("invalid configuration ({}): {reason}", path.display())]
    Config { path: PathBuf, reason: String },
    #[error("failed to write manifest {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
