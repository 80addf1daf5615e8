//! The fixed-length biometric encoding and its normalizer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of feature slots in every encoding. Stored templates depend on
/// this value; it must never change.
pub const ENCODING_LEN: usize = 128;

/// Divisor guard added to the standard deviation during normalization.
const NORM_EPSILON: f64 = 1e-10;

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("encoding has {actual} elements, expected {ENCODING_LEN}")]
    WrongLength { actual: usize },
    #[error("encoding element {index} is not finite")]
    NonFinite { index: usize },
}

/// A z-score normalized feature vector of exactly [`ENCODING_LEN`] finite
/// values. Construction validates; every `Encoding` in the system is
/// well-formed by the time it exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Encoding(Vec<f64>);

impl Encoding {
    pub fn from_vec(values: Vec<f64>) -> Result<Self, EncodingError> {
        if values.len() != ENCODING_LEN {
            return Err(EncodingError::WrongLength { actual: values.len() });
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(EncodingError::NonFinite { index });
        }
        Ok(Self(values))
    }

    /// Z-score normalize a raw feature vector and wrap it.
    pub fn normalized(raw: &[f64]) -> Result<Self, EncodingError> {
        Self::from_vec(zscore(raw))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<f64>> for Encoding {
    type Error = EncodingError;

    fn try_from(values: Vec<f64>) -> Result<Self, Self::Error> {
        Self::from_vec(values)
    }
}

impl From<Encoding> for Vec<f64> {
    fn from(e: Encoding) -> Self {
        e.0
    }
}

/// Z-score normalization: `(v - mean) / (std + epsilon)`.
///
/// The epsilon keeps a degenerate constant vector finite (it maps to all
/// zeros) rather than dividing by zero.
pub fn zscore(values: &[f64]) -> Vec<f64> {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let std = var.sqrt();
    values.iter().map(|v| (v - mean) / (std + NORM_EPSILON)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zscore_mean_zero_unit_std() {
        let raw: Vec<f64> = (0..ENCODING_LEN).map(|i| i as f64 * 0.5 - 7.0).collect();
        let z = zscore(&raw);
        let mean: f64 = z.iter().sum::<f64>() / z.len() as f64;
        let var: f64 = z.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / z.len() as f64;
        assert!(mean.abs() < 1e-9);
        assert!((var - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_zscore_constant_vector_is_zeros() {
        let z = zscore(&[3.0; ENCODING_LEN]);
        assert!(z.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_from_vec_length_check() {
        assert!(matches!(
            Encoding::from_vec(vec![0.0; 12]),
            Err(EncodingError::WrongLength { actual: 12 })
        ));
        assert!(Encoding::from_vec(vec![0.0; ENCODING_LEN]).is_ok());
    }

    #[test]
    fn test_from_vec_rejects_non_finite() {
        let mut v = vec![0.0; ENCODING_LEN];
        v[5] = f64::NAN;
        assert!(matches!(
            Encoding::from_vec(v),
            Err(EncodingError::NonFinite { index: 5 })
        ));
        let mut v = vec![0.0; ENCODING_LEN];
        v[100] = f64::INFINITY;
        assert!(matches!(
            Encoding::from_vec(v),
            Err(EncodingError::NonFinite { index: 100 })
        ));
    }

    #[test]
    fn test_serde_round_trip_validates() {
        let e = Encoding::normalized(&(0..ENCODING_LEN).map(|i| i as f64).collect::<Vec<_>>())
            .unwrap();
        let json = serde_json::to_string(&e).unwrap();
        let back: Encoding = serde_json::from_str(&json).unwrap();
        assert_eq!(e, back);

        // A short vector must fail to deserialize, not produce a bad value.
        let bad: Result<Encoding, _> = serde_json::from_str("[1.0, 2.0]");
        assert!(bad.is_err());
    }
}
