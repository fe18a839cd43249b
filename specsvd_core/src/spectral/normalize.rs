use ndarray::s;
use serde::Serialize;

use super::Spectrogram;

/// Spectrogram shape captured from the first file of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReferenceShape {
    pub rows: usize,
    pub cols: usize,
}

impl ReferenceShape {
    pub fn of(spec: &Spectrogram) -> Self {
        let (rows, cols) = spec.dim();
        Self { rows, cols }
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

/// Pad with zeros or truncate `spec` so it has exactly `shape`.
///
/// The overlapping top-left region is copied; anything past the reference
/// extent is dropped, not resampled.
pub fn normalize_to(spec: &Spectrogram, shape: ReferenceShape) -> Spectrogram {
    let rows = spec.nrows().min(shape.rows);
    let cols = spec.ncols().min(shape.cols);
    let mut out = Spectrogram::zeros(shape.dim());
    out.slice_mut(s![..rows, ..cols])
        .assign(&spec.slice(s![..rows, ..cols]));
    out
}

/// Number of frames `normalize_to` discards for `spec`.
pub fn truncated_frames(spec: &Spectrogram, shape: ReferenceShape) -> usize {
    spec.ncols().saturating_sub(shape.cols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn ramp(rows: usize, cols: usize) -> Spectrogram {
        Array2::from_shape_fn((rows, cols), |(r, c)| (r * 100 + c) as f32 + 1.0)
    }

    #[test]
    fn smaller_source_is_zero_padded() {
        let src = ramp(3, 4);
        let out = normalize_to(&src, ReferenceShape { rows: 5, cols: 6 });
        assert_eq!(out.dim(), (5, 6));
        assert_eq!(out.slice(s![..3, ..4]), src);
        assert!(out.slice(s![3.., ..]).iter().all(|&v| v == 0.0));
        assert!(out.slice(s![.., 4..]).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn equal_shape_is_identity() {
        let src = ramp(4, 7);
        let out = normalize_to(&src, ReferenceShape::of(&src));
        assert_eq!(out, src);
    }

    #[test]
    fn larger_source_is_truncated_at_reference_bounds() {
        let src = ramp(6, 10);
        let shape = ReferenceShape { rows: 4, cols: 5 };
        let out = normalize_to(&src, shape);
        assert_eq!(out.dim(), (4, 5));
        assert_eq!(out, src.slice(s![..4, ..5]));
        assert_eq!(out[[3, 4]], src[[3, 4]]);
        assert_eq!(truncated_frames(&src, shape), 5);
    }

    #[test]
    fn mixed_dimensions_use_min_of_each_axis() {
        let src = ramp(2, 9);
        let out = normalize_to(&src, ReferenceShape { rows: 3, cols: 4 });
        assert_eq!(out.slice(s![..2, ..]), src.slice(s![.., ..4]));
        assert!(out.row(2).iter().all(|&v| v == 0.0));
    }
}
