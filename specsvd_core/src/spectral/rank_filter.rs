//! Low-rank spectrogram approximation by singular value thresholding.

use nalgebra::DMatrix;
use serde::Serialize;

use super::Spectrogram;
use crate::error::{PipelineError, Result};

/// Relative cut-off used when none is configured.
pub const DEFAULT_THRESHOLD_RATIO: f64 = 0.1;

/// Keeps singular values strictly above `ratio * max(sigma)`.
///
/// The threshold is recomputed for every matrix, so the same ratio can be
/// more or less aggressive depending on each input's dominant component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankFilter {
    ratio: f64,
}

/// Statistics of one filtering pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankStats {
    pub total_rank: usize,
    pub retained_rank: usize,
    pub max_singular_value: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone)]
pub struct RankFilterOutcome {
    pub filtered: Spectrogram,
    pub stats: RankStats,
}

impl Default for RankFilter {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_RATIO)
    }
}

impl RankFilter {
    pub fn new(ratio: f64) -> Self {
        Self { ratio }
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Filter `spec`, returning a matrix of the same shape.
    ///
    /// Entries of the result may be slightly negative; callers converting to
    /// decibels must floor them.
    pub fn apply(&self, spec: &Spectrogram) -> Result<RankFilterOutcome> {
        let (rows, cols) = spec.dim();
        if rows == 0 || cols == 0 {
            return Err(PipelineError::Shape(format!(
                "cannot decompose a {rows}x{cols} matrix"
            )));
        }

        let matrix = DMatrix::<f64>::from_fn(rows, cols, |r, c| spec[[r, c]] as f64);
        let mut svd = matrix.svd(true, true);

        let max_singular_value = svd.singular_values.iter().copied().fold(0.0, f64::max);
        let threshold = self.ratio * max_singular_value;

        let mut retained_rank = 0;
        for sigma in svd.singular_values.iter_mut() {
            if *sigma > threshold {
                retained_rank += 1;
            } else {
                *sigma = 0.0;
            }
        }
        let total_rank = svd.singular_values.len();

        let rebuilt = svd
            .recompose()
            .map_err(|msg| PipelineError::Shape(msg.to_string()))?;
        let filtered = Spectrogram::from_shape_fn((rows, cols), |(r, c)| rebuilt[(r, c)] as f32);

        Ok(RankFilterOutcome {
            filtered,
            stats: RankStats {
                total_rank,
                retained_rank,
                max_singular_value,
                threshold,
            },
        })
    }
}
