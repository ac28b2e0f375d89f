//! Core data types flowing through the pipeline

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single input vector or target vector
pub type Sample = Vec<f32>;

/// One event pulled from a stream source
///
/// Inputs and labels are tracked independently: a source may emit an input
/// now and the label for it in a later event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub x: Option<Sample>,
    pub y: Option<Sample>,
}

impl Instance {
    pub fn new(x: Sample, y: Sample) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
        }
    }

    pub fn unlabeled(x: Sample) -> Self {
        Self { x: Some(x), y: None }
    }

    pub fn label(y: Sample) -> Self {
        Self { x: None, y: Some(y) }
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none()
    }
}

/// Row-major `(rows, cols)` matrix used for fitted targets
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    /// Flatten `samples` and view them as `(n, cols)`
    ///
    /// Fails when the flattened length is not a multiple of `cols`.
    pub fn from_rows(samples: &[Sample], cols: usize) -> Result<Self, PipelineError> {
        let data: Vec<f32> = samples.iter().flatten().copied().collect();
        if cols == 0 || data.len() % cols != 0 {
            return Err(PipelineError::ShapeMismatch {
                expected: cols,
                actual: data.len(),
            });
        }
        Ok(Self {
            rows: data.len() / cols,
            cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks(self.cols)
    }
}

/// Opaque serialized model parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Weights(Arc<[u8]>);

impl Weights {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Weights {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }
}

impl From<&[u8]> for Weights {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_from_rows() {
        let m = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]], 2).unwrap();
        assert_eq!(m.rows(), 3);
        assert_eq!(m.cols(), 2);
        let rows: Vec<Vec<f32>> = m.iter_rows().map(<[f32]>::to_vec).collect();
        assert_eq!(rows, vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]);
    }

    #[test]
    fn test_matrix_rejects_ragged_targets() {
        let result = Matrix::from_rows(&[vec![1.0, 2.0], vec![3.0]], 2);
        assert!(matches!(
            result,
            Err(PipelineError::ShapeMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_matrix_reshapes_without_checking_rows() {
        // Targets are flattened before viewing, so row boundaries are not preserved
        let m = Matrix::from_rows(&[vec![1.0], vec![2.0, 3.0, 4.0]], 2).unwrap();
        assert_eq!(m.rows(), 2);
        assert_eq!(m.iter_rows().next(), Some(&[1.0, 2.0][..]));
    }

    #[test]
    fn test_instance_constructors() {
        assert!(Instance::default().is_empty());
        assert!(Instance::unlabeled(vec![1.0]).y.is_none());
        assert!(Instance::label(vec![1.0]).x.is_none());
        assert!(!Instance::new(vec![1.0], vec![2.0]).is_empty());
    }

    #[test]
    fn test_weights_clone_is_shared() {
        let w = Weights::from(vec![1u8, 2, 3]);
        let c = w.clone();
        assert_eq!(w, c);
        assert_eq!(c.as_bytes(), &[1, 2, 3]);
        assert_eq!(c.len(), 3);
    }
}
