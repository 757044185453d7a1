//! Analysis configuration shared by the pipelines and the CLI.

use crate::diversity::BetaMetric;
use crate::error::{DivError, Result};
use crate::filter::QualityThresholds;
use crate::rarefy::DEFAULT_SEED;
use crate::report::REPORT_SUFFIX;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for the alpha, beta and aggregate pipelines.
///
/// Every field has a default, so a YAML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Metadata column holding group labels.
    pub group_column: String,
    /// Feature quality filter applied before rarefaction.
    pub quality: QualityThresholds,
    /// Seed for rarefaction.
    pub seed: u64,
    /// Annotate alpha diversity with group comparison p-values.
    pub show_pvalues: bool,
    /// Beta diversity metrics, one ordination each.
    pub metrics: Vec<BetaMetric>,
    /// CLR transform per metric, parallel to `metrics`.
    pub clr: Vec<bool>,
    /// Maximum number of PCoA axes to report; all positive axes if unset.
    pub n_axes: Option<usize>,
    /// Normalise weighted UniFrac to `[0, 1]`.
    pub weighted_normalized: bool,
    /// Newick tree for UniFrac metrics.
    pub tree: Option<PathBuf>,
    /// Species kept in the composition table before the `Other` row.
    pub top_n: usize,
    /// File name suffix of classifier reports.
    pub report_suffix: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let metrics = vec![
            BetaMetric::BrayCurtis,
            BetaMetric::Jaccard,
            BetaMetric::Euclidean,
        ];
        Self {
            group_column: "Group".to_string(),
            quality: QualityThresholds::default(),
            seed: DEFAULT_SEED,
            show_pvalues: false,
            clr: vec![false; metrics.len()],
            metrics,
            n_axes: None,
            weighted_normalized: false,
            tree: None,
            top_n: 10,
            report_suffix: REPORT_SUFFIX.to_string(),
        }
    }
}

impl AnalysisConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(DivError::from)
    }

    /// Load from a YAML file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::debug!("Loaded configuration from {}", path.as_ref().display());
        Self::from_yaml(&text)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.metrics.len() != self.clr.len() {
            return Err(DivError::DimensionMismatch {
                expected: self.metrics.len(),
                actual: self.clr.len(),
            });
        }
        if self.metrics.is_empty() {
            return Err(DivError::Configuration(
                "At least one beta diversity metric is required".to_string(),
            ));
        }
        if self.group_column.is_empty() {
            return Err(DivError::Configuration(
                "Group column name must not be empty".to_string(),
            ));
        }
        if self.report_suffix.is_empty() {
            return Err(DivError::Configuration(
                "Report suffix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Replace the metric list, resetting CLR flags to all off.
    pub fn set_metrics(&mut self, metrics: Vec<BetaMetric>) {
        self.clr = vec![false; metrics.len()];
        self.metrics = metrics;
    }

    /// `(metric, clr)` pairs in run order.
    pub fn beta_analyses(&self) -> Result<Vec<(BetaMetric, bool)>> {
        self.validate()?;
        Ok(self.metrics.iter().copied().zip(self.clr.iter().copied()).collect())
    }
}

/// Parse a comma-separated metric list such as `braycurtis,jaccard`.
pub fn parse_metric_list(list: &str) -> Result<Vec<BetaMetric>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<BetaMetric>())
        .collect()
}

/// Parse a comma-separated flag list. `1`, `true` and `yes` (any case) are
/// true; anything else is false.
pub fn parse_flag_list(list: &str) -> Vec<bool> {
    list.split(',')
        .map(|flag| matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .collect()
}
