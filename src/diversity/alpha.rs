//! Within-sample (alpha) diversity indices.

use crate::data::GroupJoin;
use crate::error::{DivError, Result};
use crate::rarefy::RarefiedMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

/// Alpha diversity index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlphaMetric {
    Shannon,
    Simpson,
    Observed,
    Chao1,
}

impl AlphaMetric {
    /// All indices in output column order.
    pub const ALL: [AlphaMetric; 4] = [
        AlphaMetric::Shannon,
        AlphaMetric::Simpson,
        AlphaMetric::Observed,
        AlphaMetric::Chao1,
    ];

    /// Column header used in output tables.
    pub fn name(&self) -> &'static str {
        match self {
            AlphaMetric::Shannon => "Shannon",
            AlphaMetric::Simpson => "Simpson",
            AlphaMetric::Observed => "Observed",
            AlphaMetric::Chao1 => "Chao1",
        }
    }

    /// Evaluate this index on one sample's counts.
    pub fn compute(&self, counts: &[u64]) -> f64 {
        match self {
            AlphaMetric::Shannon => shannon(counts),
            AlphaMetric::Simpson => simpson(counts),
            AlphaMetric::Observed => observed(counts) as f64,
            AlphaMetric::Chao1 => chao1(counts),
        }
    }
}

impl fmt::Display for AlphaMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AlphaMetric {
    type Err = DivError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "shannon" => Ok(AlphaMetric::Shannon),
            "simpson" | "gini_simpson" => Ok(AlphaMetric::Simpson),
            "observed" | "observed_otus" | "observed_features" => Ok(AlphaMetric::Observed),
            "chao1" => Ok(AlphaMetric::Chao1),
            other => Err(DivError::InvalidParameter(format!(
                "Unknown alpha diversity metric '{}'",
                other
            ))),
        }
    }
}

/// Shannon entropy with natural logarithm, `-Σ p ln p`.
///
/// NaN for an empty sample.
pub fn shannon(counts: &[u64]) -> f64 {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return f64::NAN;
    }
    let total = total as f64;
    -counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            p * p.ln()
        })
        .sum::<f64>()
}

/// Gini-Simpson index, `1 - Σ p²`.
///
/// NaN for an empty sample.
pub fn simpson(counts: &[u64]) -> f64 {
    let total: u64 = counts.iter().sum();
    if total == 0 {
        return f64::NAN;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total;
            p * p
        })
        .sum::<f64>()
}

/// Number of features with a non-zero count.
pub fn observed(counts: &[u64]) -> usize {
    counts.iter().filter(|&&c| c > 0).count()
}

/// Bias-corrected Chao1 richness, `S_obs + f1(f1-1) / (2(f2+1))`.
///
/// `f1` and `f2` are the numbers of singletons and doubletons.
pub fn chao1(counts: &[u64]) -> f64 {
    let s_obs = observed(counts) as f64;
    let f1 = counts.iter().filter(|&&c| c == 1).count() as f64;
    let f2 = counts.iter().filter(|&&c| c == 2).count() as f64;
    s_obs + f1 * (f1 - 1.0) / (2.0 * (f2 + 1.0))
}

/// Alpha diversity of one sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaRow {
    pub sample_id: String,
    pub shannon: f64,
    pub simpson: f64,
    pub observed: usize,
    pub chao1: f64,
    /// False when the sample fell below the rarefaction depth and was scored
    /// as an empty sample.
    pub rarefied: bool,
}

impl AlphaRow {
    /// Score one sample's counts.
    pub fn from_counts(sample_id: impl Into<String>, counts: &[u64], rarefied: bool) -> Self {
        Self {
            sample_id: sample_id.into(),
            shannon: shannon(counts),
            simpson: simpson(counts),
            observed: observed(counts),
            chao1: chao1(counts),
            rarefied,
        }
    }

    pub fn value(&self, metric: AlphaMetric) -> f64 {
        match metric {
            AlphaMetric::Shannon => self.shannon,
            AlphaMetric::Simpson => self.simpson,
            AlphaMetric::Observed => self.observed as f64,
            AlphaMetric::Chao1 => self.chao1,
        }
    }
}

/// Alpha diversity for every sample of a rarefied table, in sample order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaTable {
    pub rows: Vec<AlphaRow>,
}

impl AlphaTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn sample_ids(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.sample_id.clone()).collect()
    }

    /// Row for a sample, if present.
    pub fn get(&self, sample_id: &str) -> Option<&AlphaRow> {
        self.rows.iter().find(|r| r.sample_id == sample_id)
    }

    /// One index across all samples, in sample order.
    pub fn values(&self, metric: AlphaMetric) -> Vec<f64> {
        self.rows.iter().map(|r| r.value(metric)).collect()
    }

    /// Whether the sample at `index` was rarefied.
    pub fn is_rarefied(&self, index: usize) -> bool {
        self.rows.get(index).map_or(false, |r| r.rarefied)
    }

    /// Write every row as TSV.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        write_header(&mut writer, None)?;
        for row in &self.rows {
            write_row(&mut writer, row, None)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the rows of samples matched by `join`, with their group label.
    ///
    /// Samples the join dropped are left out of the file.
    pub fn to_tsv_grouped<P: AsRef<Path>>(&self, path: P, join: &GroupJoin) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        write_header(&mut writer, Some(&join.group_column))?;
        for (index, label) in &join.matched {
            if let Some(row) = self.rows.get(*index) {
                write_row(&mut writer, row, Some(label))?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}

fn write_header<W: Write>(writer: &mut W, group_column: Option<&str>) -> Result<()> {
    write!(writer, "sample_id")?;
    for metric in AlphaMetric::ALL {
        write!(writer, "\t{}", metric)?;
    }
    write!(writer, "\trarefied")?;
    if let Some(column) = group_column {
        write!(writer, "\t{}", column)?;
    }
    writeln!(writer)?;
    Ok(())
}

fn write_row<W: Write>(writer: &mut W, row: &AlphaRow, group: Option<&str>) -> Result<()> {
    write!(
        writer,
        "{}\t{:.6}\t{:.6}\t{}\t{:.6}\t{}",
        row.sample_id, row.shannon, row.simpson, row.observed, row.chao1, row.rarefied
    )?;
    if let Some(label) = group {
        write!(writer, "\t{}", label)?;
    }
    writeln!(writer)?;
    Ok(())
}

/// Compute all alpha indices for a rarefied table.
///
/// Samples marked missing by rarefaction are scored as all-zero columns and
/// flagged with `rarefied = false`.
pub fn alpha_diversity_table(rarefied: &RarefiedMatrix) -> AlphaTable {
    let empty = vec![0u64; rarefied.n_features()];
    let rows = (0..rarefied.n_samples())
        .into_par_iter()
        .map(|j| {
            let sample_id = rarefied.sample_ids()[j].as_str();
            match rarefied.column(j) {
                Some(counts) => AlphaRow::from_counts(sample_id, counts, true),
                None => AlphaRow::from_counts(sample_id, &empty, false),
            }
        })
        .collect();
    AlphaTable { rows }
}
