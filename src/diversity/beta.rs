//! Between-sample (beta) distances.

use super::unifrac::UnifracContext;
use crate::error::{DivError, Result};
use crate::phylo::PhyloTree;
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

/// Pairwise distance metric between samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BetaMetric {
    BrayCurtis,
    Jaccard,
    Euclidean,
    UnweightedUnifrac,
    WeightedUnifrac,
}

impl BetaMetric {
    /// Canonical name, used in output file names.
    pub fn name(&self) -> &'static str {
        match self {
            BetaMetric::BrayCurtis => "braycurtis",
            BetaMetric::Jaccard => "jaccard",
            BetaMetric::Euclidean => "euclidean",
            BetaMetric::UnweightedUnifrac => "unweighted_unifrac",
            BetaMetric::WeightedUnifrac => "weighted_unifrac",
        }
    }

    /// Whether the metric needs a phylogenetic tree.
    pub fn is_phylogenetic(&self) -> bool {
        matches!(
            self,
            BetaMetric::UnweightedUnifrac | BetaMetric::WeightedUnifrac
        )
    }
}

impl fmt::Display for BetaMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BetaMetric {
    type Err = DivError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "braycurtis" | "bray_curtis" | "bray-curtis" => Ok(BetaMetric::BrayCurtis),
            "jaccard" => Ok(BetaMetric::Jaccard),
            "euclidean" => Ok(BetaMetric::Euclidean),
            "unweighted_unifrac" => Ok(BetaMetric::UnweightedUnifrac),
            "weighted_unifrac" => Ok(BetaMetric::WeightedUnifrac),
            other => Err(DivError::InvalidParameter(format!(
                "Unknown beta diversity metric '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for BetaMetric {
    type Error = DivError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<BetaMetric> for String {
    fn from(metric: BetaMetric) -> Self {
        metric.name().to_string()
    }
}

/// Bray-Curtis dissimilarity, `Σ|a-b| / Σ|a+b|`.
///
/// The absolute value in the denominator keeps the distance finite and
/// non-negative for signed input such as CLR values, where `Σ(a+b)` is near
/// zero. On counts it equals `Σ(a+b)` and the distance lies in `[0, 1]`.
///
/// # Errors
/// `Numerical` when the denominator is zero.
pub fn bray_curtis(a: &[f64], b: &[f64]) -> Result<f64> {
    let (diff, total) = a
        .iter()
        .zip(b)
        .fold((0.0, 0.0), |(d, t), (x, y)| (d + (x - y).abs(), t + (x + y).abs()));
    if total == 0.0 {
        return Err(DivError::Numerical(
            "Bray-Curtis is undefined for two empty samples".to_string(),
        ));
    }
    Ok(diff / total)
}

/// Jaccard distance over non-zero positions.
///
/// Of the features non-zero in either sample, the fraction whose values
/// differ: `#{i : (a_i≠0 ∨ b_i≠0) ∧ a_i≠b_i} / #{i : a_i≠0 ∨ b_i≠0}`.
/// Shared features with different counts therefore add to the distance.
/// Two empty samples are at distance 0.
pub fn jaccard(a: &[f64], b: &[f64]) -> f64 {
    let (unequal, nonzero) = a.iter().zip(b).fold((0usize, 0usize), |(d, u), (x, y)| {
        let present = *x != 0.0 || *y != 0.0;
        (d + (present && x != y) as usize, u + present as usize)
    });
    if nonzero == 0 {
        0.0
    } else {
        unequal as f64 / nonzero as f64
    }
}

/// Euclidean distance.
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Symmetric sample-by-sample distance matrix.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    ids: Vec<String>,
    data: DMatrix<f64>,
}

impl DistanceMatrix {
    /// Wrap a square, symmetric matrix with a zero diagonal and finite,
    /// non-negative entries.
    pub fn new(ids: Vec<String>, data: DMatrix<f64>) -> Result<Self> {
        if data.nrows() != data.ncols() {
            return Err(DivError::DimensionMismatch {
                expected: data.nrows(),
                actual: data.ncols(),
            });
        }
        if ids.len() != data.nrows() {
            return Err(DivError::DimensionMismatch {
                expected: data.nrows(),
                actual: ids.len(),
            });
        }
        let n = ids.len();
        for i in 0..n {
            if data[(i, i)].abs() > 1e-12 {
                return Err(DivError::Numerical(format!(
                    "Distance matrix diagonal is non-zero for '{}'",
                    ids[i]
                )));
            }
            for j in (i + 1)..n {
                let d = data[(i, j)];
                if !d.is_finite() || d < 0.0 {
                    return Err(DivError::Numerical(format!(
                        "Invalid distance {} between '{}' and '{}'",
                        d, ids[i], ids[j]
                    )));
                }
                if (d - data[(j, i)]).abs() > 1e-9 {
                    return Err(DivError::Numerical(format!(
                        "Distance matrix is not symmetric at ({}, {})",
                        ids[i], ids[j]
                    )));
                }
            }
        }
        Ok(Self { ids, data })
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[(i, j)]
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        for id in &self.ids {
            write!(writer, "\t{}", id)?;
        }
        writeln!(writer)?;
        for (i, id) in self.ids.iter().enumerate() {
            write!(writer, "{}", id)?;
            for j in 0..self.len() {
                write!(writer, "\t{:.6}", self.data[(i, j)])?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Knobs for distance computation that only some metrics read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BetaOptions {
    /// Divide weighted UniFrac by its maximum attainable value.
    pub weighted_normalized: bool,
}

/// All-pairs distances between the samples (columns) of `data`.
///
/// `data` is features × samples. UniFrac metrics need `tree`, with every
/// feature present as a tip.
///
/// # Errors
/// `Configuration` for a UniFrac metric without a tree or with features
/// missing from it. `Numerical` for undefined distances.
pub fn beta_diversity(
    data: &DMatrix<f64>,
    sample_ids: &[String],
    feature_ids: &[String],
    metric: BetaMetric,
    tree: Option<&PhyloTree>,
) -> Result<DistanceMatrix> {
    beta_diversity_with_options(
        data,
        sample_ids,
        feature_ids,
        metric,
        tree,
        &BetaOptions::default(),
    )
}

/// [`beta_diversity`] with explicit [`BetaOptions`].
pub fn beta_diversity_with_options(
    data: &DMatrix<f64>,
    sample_ids: &[String],
    feature_ids: &[String],
    metric: BetaMetric,
    tree: Option<&PhyloTree>,
    options: &BetaOptions,
) -> Result<DistanceMatrix> {
    let (n_features, n_samples) = data.shape();
    if sample_ids.len() != n_samples {
        return Err(DivError::DimensionMismatch {
            expected: n_samples,
            actual: sample_ids.len(),
        });
    }
    if feature_ids.len() != n_features {
        return Err(DivError::DimensionMismatch {
            expected: n_features,
            actual: feature_ids.len(),
        });
    }
    if n_samples < 2 {
        return Err(DivError::EmptyData(format!(
            "Beta diversity needs at least 2 samples, got {}",
            n_samples
        )));
    }

    let unifrac = if metric.is_phylogenetic() {
        let tree = tree.ok_or_else(|| {
            DivError::Configuration(format!(
                "{} requires a phylogenetic tree, but none was provided",
                metric
            ))
        })?;
        if data.iter().any(|&v| v < 0.0) {
            return Err(DivError::Numerical(format!(
                "{} requires non-negative abundances",
                metric
            )));
        }
        Some(UnifracContext::new(tree, feature_ids)?)
    } else {
        None
    };

    let columns: Vec<Vec<f64>> = data
        .column_iter()
        .map(|c| c.iter().copied().collect())
        .collect();

    let pairs: Vec<(usize, usize)> = (0..n_samples)
        .flat_map(|i| ((i + 1)..n_samples).map(move |j| (i, j)))
        .collect();

    let distances: Vec<f64> = pairs
        .par_iter()
        .map(|&(i, j)| {
            let (a, b) = (&columns[i], &columns[j]);
            match (metric, &unifrac) {
                (BetaMetric::BrayCurtis, _) => bray_curtis(a, b).map_err(|e| {
                    DivError::Numerical(format!("{} ({} vs {})", e, sample_ids[i], sample_ids[j]))
                }),
                (BetaMetric::Jaccard, _) => Ok(jaccard(a, b)),
                (BetaMetric::Euclidean, _) => Ok(euclidean(a, b)),
                (BetaMetric::UnweightedUnifrac, Some(ctx)) => Ok(ctx.unweighted(a, b)),
                (BetaMetric::WeightedUnifrac, Some(ctx)) => {
                    Ok(ctx.weighted(a, b, options.weighted_normalized))
                }
                (_, None) => Err(DivError::Configuration(format!(
                    "{} requires a phylogenetic tree",
                    metric
                ))),
            }
        })
        .collect::<Result<_>>()?;

    let mut matrix = DMatrix::zeros(n_samples, n_samples);
    for (&(i, j), &d) in pairs.iter().zip(&distances) {
        matrix[(i, j)] = d;
        matrix[(j, i)] = d;
    }

    log::debug!("Computed {} distances for {} samples", metric, n_samples);
    DistanceMatrix::new(sample_ids.to_vec(), matrix)
}
