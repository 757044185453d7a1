//! Depth and prevalence quality filter for abundance tables.

use crate::data::CountMatrix;
use crate::error::{DivError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Thresholds a feature must meet to survive quality filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Minimum total count across all samples.
    pub min_total: u64,
    /// Minimum number of samples with a non-zero count.
    pub min_samples: usize,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_total: 20,
            min_samples: 2,
        }
    }
}

impl QualityThresholds {
    /// Whether a feature with this total and prevalence is retained.
    #[inline]
    pub fn passes(&self, total: u64, present_in: usize) -> bool {
        total >= self.min_total && present_in >= self.min_samples
    }
}

/// Filter features by total count and prevalence.
///
/// Keeps rows whose total count is at least `min_total` and which are non-zero
/// in at least `min_samples` samples. Row order is preserved.
///
/// # Errors
/// Returns `EmptyData` if no feature passes both thresholds.
pub fn filter_quality(counts: &CountMatrix, thresholds: &QualityThresholds) -> Result<CountMatrix> {
    let row_sums = counts.row_sums();
    let prevalence = counts.row_prevalence();

    let keep_indices: Vec<usize> = (0..counts.n_features())
        .into_par_iter()
        .filter(|&row| thresholds.passes(row_sums[row], prevalence[row]))
        .collect();

    if keep_indices.is_empty() {
        return Err(DivError::EmptyData(format!(
            "No features have total count >= {} and presence in >= {} samples",
            thresholds.min_total, thresholds.min_samples
        )));
    }

    counts.subset_features(&keep_indices)
}

/// Result of quality filtering with statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityFilterResult {
    /// Number of features before filtering.
    pub n_before: usize,
    /// Number of features after filtering.
    pub n_after: usize,
    /// Number of features removed.
    pub n_removed: usize,
    /// Proportion of features retained.
    pub retention_rate: f64,
    /// Proportion of total reads retained.
    pub reads_retained: f64,
}

impl std::fmt::Display for QualityFilterResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Quality Filter Result")?;
        writeln!(f, "  Features before:  {}", self.n_before)?;
        writeln!(f, "  Features after:   {}", self.n_after)?;
        writeln!(f, "  Features removed: {}", self.n_removed)?;
        writeln!(f, "  Feature retention: {:.1}%", self.retention_rate * 100.0)?;
        writeln!(f, "  Reads retained:    {:.1}%", self.reads_retained * 100.0)?;
        Ok(())
    }
}

/// Filter with statistics about what was filtered.
pub fn filter_quality_with_stats(
    counts: &CountMatrix,
    thresholds: &QualityThresholds,
) -> Result<(CountMatrix, QualityFilterResult)> {
    let n_before = counts.n_features();
    let total_reads_before: u64 = counts.row_sums().iter().sum();

    let filtered = filter_quality(counts, thresholds)?;

    let n_after = filtered.n_features();
    let total_reads_after: u64 = filtered.row_sums().iter().sum();

    let result = QualityFilterResult {
        n_before,
        n_after,
        n_removed: n_before - n_after,
        retention_rate: n_after as f64 / n_before as f64,
        reads_retained: if total_reads_before > 0 {
            total_reads_after as f64 / total_reads_before as f64
        } else {
            0.0
        },
    };

    Ok((filtered, result))
}
