//! Batch spectrogram denoising: decode audio to 16 kHz mono, take the STFT
//! magnitude, keep only its dominant singular components, resynthesize, and
//! average the corpus.

pub mod audio;
pub mod config;
pub mod error;
pub mod manifest;
pub mod pipeline;
pub mod render;
pub mod spectral;

pub use config::{DecodePolicy, PipelineConfig};
pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, RunState, RunSummary};
