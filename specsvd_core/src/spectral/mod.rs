pub mod aggregate;
pub mod db;
pub mod normalize;
pub mod rank_filter;
pub mod stft;

use ndarray::Array2;

/// Non-negative magnitudes indexed by `(frequency_bin, frame)`.
pub type Spectrogram = Array2<f32>;

pub use aggregate::CorpusAggregator;
pub use normalize::{ReferenceShape, normalize_to};
pub use rank_filter::{RankFilter, RankFilterOutcome};
pub use stft::{PhaseRecovery, SpectrogramTransform};
