use ndarray::Array2;

use super::{ReferenceShape, Spectrogram};
use crate::error::{PipelineError, Result};

/// Running element-wise sum of normalized spectrograms.
///
/// Sums are kept in `f64` so long corpora do not drift.
#[derive(Debug, Clone)]
pub struct CorpusAggregator {
    shape: ReferenceShape,
    sum: Array2<f64>,
    count: usize,
}

impl CorpusAggregator {
    pub fn new(shape: ReferenceShape) -> Self {
        Self {
            shape,
            sum: Array2::zeros(shape.dim()),
            count: 0,
        }
    }

    pub fn shape(&self) -> ReferenceShape {
        self.shape
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Fold one normalized spectrogram into the sum.
    pub fn add(&mut self, spec: &Spectrogram) -> Result<()> {
        if spec.dim() != self.shape.dim() {
            return Err(PipelineError::Shape(format!(
                "aggregate expects {:?}, got {:?}",
                self.shape.dim(),
                spec.dim()
            )));
        }
        self.sum
            .zip_mut_with(spec, |acc, &value| *acc += value as f64);
        self.count += 1;
        Ok(())
    }

    /// Combine a partial aggregate built over the same reference shape.
    pub fn merge(&mut self, other: CorpusAggregator) -> Result<()> {
        if other.shape != self.shape {
            return Err(PipelineError::Shape(format!(
                "cannot merge aggregates of {:?} and {:?}",
                self.shape.dim(),
                other.shape.dim()
            )));
        }
        self.sum += &other.sum;
        self.count += other.count;
        Ok(())
    }

    /// Element-wise mean of everything added so far.
    pub fn finalize(&self) -> Result<Spectrogram> {
        if self.count == 0 {
            return Err(PipelineError::EmptyCorpus);
        }
        let n = self.count as f64;
        Ok(self.sum.mapv(|v| (v / n) as f32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> ReferenceShape {
        ReferenceShape { rows: 3, cols: 4 }
    }

    #[test]
    fn average_of_identical_matrices_is_the_matrix() {
        let m = Array2::from_shape_fn((3, 4), |(r, c)| 0.1 * (r * 4 + c) as f32);
        let mut agg = CorpusAggregator::new(shape());
        for _ in 0..5 {
            agg.add(&m).unwrap();
        }
        let avg = agg.finalize().unwrap();
        assert_eq!(agg.count(), 5);
        assert!((&avg - &m).iter().all(|d| d.abs() < 1e-6));
    }

    #[test]
    fn average_is_element_wise_mean() {
        let mut agg = CorpusAggregator::new(shape());
        agg.add(&Array2::from_elem((3, 4), 1.0)).unwrap();
        agg.add(&Array2::from_elem((3, 4), 4.0)).unwrap();
        let avg = agg.finalize().unwrap();
        assert!(avg.iter().all(|&v| (v - 2.5).abs() < 1e-6));
    }

    #[test]
    fn finalize_without_input_is_empty_corpus() {
        let agg = CorpusAggregator::new(shape());
        assert!(matches!(agg.finalize(), Err(PipelineError::EmptyCorpus)));
    }

    #[test]
    fn wrong_shape_is_rejected_and_not_counted() {
        let mut agg = CorpusAggregator::new(shape());
        assert!(agg.add(&Array2::zeros((3, 5))).is_err());
        assert_eq!(agg.count(), 0);
    }

    #[test]
    fn merge_matches_sequential_accumulation() {
        let a = Array2::from_elem((3, 4), 2.0);
        let b = Array2::from_elem((3, 4), 6.0);

        let mut left = CorpusAggregator::new(shape());
        left.add(&a).unwrap();
        let mut right = CorpusAggregator::new(shape());
        right.add(&b).unwrap();
        right.add(&b).unwrap();
        left.merge(right).unwrap();

        assert_eq!(left.count(), 3);
        let avg = left.finalize().unwrap();
        assert!(avg.iter().all(|&v| (v - 14.0 / 3.0).abs() < 1e-5));
    }

    #[test]
    fn merge_rejects_other_shapes() {
        let mut agg = CorpusAggregator::new(shape());
        let other = CorpusAggregator::new(ReferenceShape { rows: 2, cols: 2 });
        assert!(agg.merge(other).is_err());
    }
}
