//! Centered log-ratio (CLR) transform.

use crate::data::CountMatrix;
use crate::error::{DivError, Result};
use crate::zero::multiplicative_replacement;
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// A features × samples matrix after a transform, with its labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformedMatrix {
    #[serde(skip, default = "empty_matrix")]
    pub data: DMatrix<f64>,
    pub feature_ids: Vec<String>,
    pub sample_ids: Vec<String>,
    /// Name of the transform applied.
    pub transformation: String,
    /// Per-sample mean of log values subtracted by the transform.
    pub log_means: Vec<f64>,
}

impl TransformedMatrix {
    pub fn get(&self, feature: usize, sample: usize) -> f64 {
        self.data[(feature, sample)]
    }

    pub fn n_features(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    /// Values of one sample.
    pub fn col(&self, sample: usize) -> Vec<f64> {
        self.data.column(sample).iter().copied().collect()
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Geometric mean of each sample before the transform.
    pub fn geometric_means(&self) -> Vec<f64> {
        self.log_means.iter().map(|m| m.exp()).collect()
    }
}

/// Apply the centered log-ratio transform column by column.
///
/// `clr(x_ij) = ln(x_ij) - mean_i(ln(x_ij))`, so every sample sums to zero
/// afterwards.
///
/// # Errors
/// Input must be strictly positive; replace zeros first.
pub fn norm_clr(
    data: &DMatrix<f64>,
    feature_ids: Vec<String>,
    sample_ids: Vec<String>,
) -> Result<TransformedMatrix> {
    let (n_features, n_samples) = data.shape();
    if n_features == 0 || n_samples == 0 {
        return Err(DivError::EmptyData(
            "Cannot apply CLR to empty matrix".to_string(),
        ));
    }
    if feature_ids.len() != n_features {
        return Err(DivError::DimensionMismatch {
            expected: n_features,
            actual: feature_ids.len(),
        });
    }
    if sample_ids.len() != n_samples {
        return Err(DivError::DimensionMismatch {
            expected: n_samples,
            actual: sample_ids.len(),
        });
    }

    if let Some(((i, j), val)) = data
        .iter()
        .enumerate()
        .map(|(k, &v)| ((k % n_features, k / n_features), v))
        .find(|&(_, v)| v <= 0.0 || !v.is_finite())
    {
        return Err(DivError::Numerical(format!(
            "CLR requires positive values; found {} at ({}, {})",
            val, i, j
        )));
    }

    let log_data = data.map(f64::ln);
    let log_means: Vec<f64> = (0..n_samples)
        .into_par_iter()
        .map(|j| log_data.column(j).mean())
        .collect();

    let mut clr_data = log_data;
    for (mut column, &mean) in clr_data.column_iter_mut().zip(&log_means) {
        column.add_scalar_mut(-mean);
    }

    Ok(TransformedMatrix {
        data: clr_data,
        feature_ids,
        sample_ids,
        transformation: "CLR".to_string(),
        log_means,
    })
}

/// Multiplicative zero replacement followed by CLR.
pub fn norm_clr_replaced(counts: &CountMatrix) -> Result<TransformedMatrix> {
    let replaced = multiplicative_replacement(&counts.to_dense(), None)?;
    norm_clr(
        &replaced,
        counts.feature_ids().to_vec(),
        counts.sample_ids().to_vec(),
    )
}


fn empty_matrix() -> DMatrix<f64> {
    DMatrix::zeros(0, 0)
}
