//! Vector arithmetic shared by the store and recall-ranking code.
//!
//! All functions operate on equal-length `&[f32]` slices and return a
//! `DimensionMismatch` error rather than panicking or silently truncating
//! when lengths disagree.

use thiserror::Error;

/// Dimension disagreement between two vectors passed to the same operation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("dimension mismatch: expected {expected}, got {got}")]
pub struct DimensionMismatch {
    /// length of the first operand
    pub expected: usize,
    /// length of the second operand
    pub got: usize,
}

fn check_len(a: &[f32], b: &[f32]) -> Result<(), DimensionMismatch> {
    if a.len() != b.len() {
        return Err(DimensionMismatch {
            expected: a.len(),
            got: b.len(),
        });
    }
    Ok(())
}

/// Cosine similarity in `[-1.0, 1.0]`. Returns `0.0` if either vector has
/// zero magnitude (no direction to compare).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32, DimensionMismatch> {
    check_len(a, b)?;
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a * norm_b))
}

/// Euclidean (L2) distance. `0.0` for identical vectors, unbounded above.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Result<f32, DimensionMismatch> {
    check_len(a, b)?;
    Ok(a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt())
}

/// Manhattan (L1) distance.
pub fn manhattan_distance(a: &[f32], b: &[f32]) -> Result<f32, DimensionMismatch> {
    check_len(a, b)?;
    Ok(a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum())
}

/// Raw dot product, no normalization.
pub fn dot_product(a: &[f32], b: &[f32]) -> Result<f32, DimensionMismatch> {
    check_len(a, b)?;
    Ok(a.iter().zip(b.iter()).map(|(x, y)| x * y).sum())
}

/// L2-normalize `v` in place. No-op on a zero vector.
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
}

/// Elementwise sum of two vectors.
pub fn add(a: &[f32], b: &[f32]) -> Result<Vec<f32>, DimensionMismatch> {
    check_len(a, b)?;
    Ok(a.iter().zip(b.iter()).map(|(x, y)| x + y).collect())
}

/// Elementwise difference `a - b`.
pub fn sub(a: &[f32], b: &[f32]) -> Result<Vec<f32>, DimensionMismatch> {
    check_len(a, b)?;
    Ok(a.iter().zip(b.iter()).map(|(x, y)| x - y).collect())
}

/// Scalar multiplication.
pub fn mul(a: &[f32], scalar: f32) -> Vec<f32> {
    a.iter().map(|x| x * scalar).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors_is_one() {
        let a = [1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors_is_zero() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert!(cosine_similarity(&a, &b).unwrap().abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite_vectors_is_negative_one() {
        let a = [1.0, 0.0];
        let b = [-1.0, 0.0];
        assert!((cosine_similarity(&a, &b).unwrap() + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_zero_vector_is_zero() {
        let a = [0.0, 0.0];
        let b = [1.0, 1.0];
        assert_eq!(cosine_similarity(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn mismatched_lengths_error() {
        let a = [1.0, 2.0];
        let b = [1.0, 2.0, 3.0];
        let err = cosine_similarity(&a, &b).unwrap_err();
        assert_eq!(err.expected, 2);
        assert_eq!(err.got, 3);
    }

    #[test]
    fn euclidean_identical_is_zero() {
        let a = [1.0, 2.0, 3.0];
        assert_eq!(euclidean_distance(&a, &a).unwrap(), 0.0);
    }

    #[test]
    fn manhattan_basic() {
        let a = [0.0, 0.0];
        let b = [3.0, 4.0];
        assert_eq!(manhattan_distance(&a, &b).unwrap(), 7.0);
    }

    #[test]
    fn normalize_unit_length() {
        let mut v = [3.0, 4.0];
        normalize(&mut v);
        let norm = (v[0] * v[0] + v[1] * v[1]).sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_zero_vector_noop() {
        let mut v = [0.0, 0.0];
        normalize(&mut v);
        assert_eq!(v, [0.0, 0.0]);
    }

    #[test]
    fn add_sub_roundtrip() {
        let a = [1.0, 2.0, 3.0];
        let b = [0.5, 0.5, 0.5];
        let summed = add(&a, &b).unwrap();
        let back = sub(&summed, &b).unwrap();
        for (x, y) in back.iter().zip(a.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn mul_scales() {
        let a = [1.0, 2.0];
        assert_eq!(mul(&a, 2.0), vec![2.0, 4.0]);
    }
}
