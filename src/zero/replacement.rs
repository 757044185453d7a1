//! Multiplicative replacement of zeros in compositional data.

use crate::data::CountMatrix;
use crate::error::{DivError, Result};
use nalgebra::DMatrix;

/// Default replacement value: `(1 / n_features)²`.
pub fn replacement_delta(n_features: usize) -> f64 {
    let inv = 1.0 / n_features as f64;
    inv * inv
}

/// Replace zeros with a small value while preserving each sample's closure.
///
/// Every column (sample) is first closed to proportions. Zero entries become
/// `delta` and non-zero entries are scaled by `1 - n_zeros * delta`, so each
/// column still sums to one. `delta` defaults to [`replacement_delta`].
///
/// # Errors
/// Negative values, an all-zero sample, or a `delta` large enough to produce
/// negative proportions return `Numerical`.
pub fn multiplicative_replacement(data: &DMatrix<f64>, delta: Option<f64>) -> Result<DMatrix<f64>> {
    let n_features = data.nrows();
    if n_features == 0 {
        return Err(DivError::EmptyData(
            "Cannot replace zeros in a table without features".to_string(),
        ));
    }
    if data.iter().any(|&v| v < 0.0 || !v.is_finite()) {
        return Err(DivError::Numerical(
            "Multiplicative replacement requires finite non-negative values".to_string(),
        ));
    }

    let delta = delta.unwrap_or_else(|| replacement_delta(n_features));
    if delta <= 0.0 {
        return Err(DivError::InvalidParameter(
            "Replacement delta must be positive".to_string(),
        ));
    }

    let mut result = data.clone();
    for (j, mut column) in result.column_iter_mut().enumerate() {
        let total: f64 = column.sum();
        if total <= 0.0 {
            return Err(DivError::Numerical(format!(
                "Sample {} has no observations; cannot close to proportions",
                j
            )));
        }

        let n_zeros = column.iter().filter(|&&v| v == 0.0).count();
        let scale = 1.0 - n_zeros as f64 * delta;
        if scale < 0.0 {
            return Err(DivError::Numerical(format!(
                "Replacement delta {} yields negative proportions in sample {}",
                delta, j
            )));
        }

        for value in column.iter_mut() {
            *value = if *value == 0.0 {
                delta
            } else {
                *value / total * scale
            };
        }
    }

    Ok(result)
}

/// Apply multiplicative replacement directly to a count matrix.
pub fn replace_zeros(counts: &CountMatrix) -> Result<DMatrix<f64>> {
    multiplicative_replacement(&counts.to_dense(), None)
}
