//! Embedding vectors and similarity computation.
//!
//! Embeddings are fixed-length `f32` vectors produced by an external
//! extraction collaborator. Matching compares a content embedding against a
//! fingerprint embedding with cosine similarity, clamped into `[0, 1]`.
//!
//! # Degenerate input
//!
//! A zero-norm vector makes cosine similarity undefined. Rather than fault,
//! similarity involving a zero-norm side is forced to `0.0`, so matching is
//! total over its input domain and degenerate extractions simply never match.

use crate::error::{Result, SentraError};
use serde::{Deserialize, Serialize};

/// Fixed-length embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Wrap a raw vector. Validation against an expected dimension happens
    /// at queue admission, not here.
    pub fn new(components: Vec<f32>) -> Self {
        Self(components)
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Euclidean norm of the vector.
    pub fn norm(&self) -> f32 {
        self.0.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Whether the vector is degenerate (empty or effectively zero-norm).
    pub fn is_zero_norm(&self) -> bool {
        self.0.is_empty() || self.norm() < f32::EPSILON
    }

    /// Validate this embedding as pipeline input: expected dimension and
    /// all-finite components. Zero-norm is deliberately allowed here; it is
    /// handled as a forced non-match at similarity time.
    pub fn validate(&self, expected_dim: usize) -> Result<()> {
        if self.0.is_empty() {
            return Err(SentraError::InvalidContent("embedding is empty".into()));
        }
        if self.0.len() != expected_dim {
            return Err(SentraError::DimensionMismatch {
                expected: expected_dim,
                actual: self.0.len(),
            });
        }
        if self.0.iter().any(|x| !x.is_finite()) {
            return Err(SentraError::InvalidContent(
                "embedding contains non-finite components".into(),
            ));
        }
        Ok(())
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(components: Vec<f32>) -> Self {
        Self::new(components)
    }
}

/// Cosine similarity between two embeddings, clamped into `[0.0, 1.0]`.
///
/// Raw cosine lives in `[-1, 1]`; anti-correlated directions carry no more
/// match signal than orthogonal ones, so negative cosine clamps to 0.0.
/// Returns 0.0 when either side is zero-norm or when dimensions disagree
/// (dimension errors are rejected at admission, so a mismatch here is
/// treated as a non-match rather than a fault).
pub fn cosine_similarity(a: &Embedding, b: &Embedding) -> f32 {
    if a.dim() != b.dim() || a.is_zero_norm() || b.is_zero_norm() {
        return 0.0;
    }

    let dot: f32 = a
        .as_slice()
        .iter()
        .zip(b.as_slice().iter())
        .map(|(x, y)| x * y)
        .sum();

    let cosine = dot / (a.norm() * b.norm());

    cosine.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors_score_one() {
        let a = Embedding::new(vec![1.0, 0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert_eq!(cosine_similarity(&a, &b), 1.0);
    }

    #[test]
    fn test_scaled_vectors_score_one() {
        let a = Embedding::new(vec![1.0, 2.0, 3.0]);
        let b = Embedding::new(vec![2.0, 4.0, 6.0]);
        let score = cosine_similarity(&a, &b);
        assert!((score - 1.0).abs() < 1e-6, "got {score}");
    }

    #[test]
    fn test_orthogonal_vectors_score_zero() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![0.0, 1.0]);
        let score = cosine_similarity(&a, &b);
        assert!(score.abs() < 1e-6, "got {score}");
    }

    #[test]
    fn test_opposite_vectors_clamp_to_zero() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![-1.0, 0.0]);
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_zero_norm_forces_zero() {
        let a = Embedding::new(vec![0.0, 0.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert_eq!(cosine_similarity(&a, &b), 0.0);
        assert_eq!(cosine_similarity(&b, &a), 0.0);
        assert_eq!(cosine_similarity(&a, &a), 0.0);
    }

    #[test]
    fn test_dimension_mismatch_is_nonmatch() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        let e = Embedding::new(vec![0.1, 0.2, 0.3]);
        assert!(e.validate(3).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty() {
        let e = Embedding::new(vec![]);
        assert!(matches!(
            e.validate(3),
            Err(SentraError::InvalidContent(_))
        ));
    }

    #[test]
    fn test_validate_rejects_wrong_dimension() {
        let e = Embedding::new(vec![1.0, 2.0]);
        assert!(matches!(
            e.validate(3),
            Err(SentraError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_validate_rejects_nan() {
        let e = Embedding::new(vec![1.0, f32::NAN, 0.0]);
        assert!(e.validate(3).is_err());
    }

    #[test]
    fn test_validate_allows_zero_norm() {
        // Degenerate extraction enters the pipeline and is forced to a
        // non-match at similarity time, not rejected at admission.
        let e = Embedding::new(vec![0.0, 0.0, 0.0]);
        assert!(e.validate(3).is_ok());
        assert!(e.is_zero_norm());
    }
}
