//! Rarefaction by subsampling without replacement.

use crate::data::CountMatrix;
use crate::error::{DivError, Result};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Seed used when none is configured.
pub const DEFAULT_SEED: u64 = 1;

/// A count matrix whose columns were subsampled to a common depth.
///
/// Each sample column is either `Some(counts)` summing exactly to `depth`, or
/// `None` when the original column held fewer than `depth` observations.
/// Missing columns never carry partial counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RarefiedMatrix {
    feature_ids: Vec<String>,
    sample_ids: Vec<String>,
    depth: u64,
    seed: u64,
    columns: Vec<Option<Vec<u64>>>,
}

impl RarefiedMatrix {
    /// Target depth every valid column sums to.
    pub fn depth(&self) -> u64 {
        self.depth
    }

    /// Seed the per-column generators were created from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn n_features(&self) -> usize {
        self.feature_ids.len()
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Counts of one sample, or `None` if it could not be rarefied.
    pub fn column(&self, sample: usize) -> Option<&[u64]> {
        self.columns.get(sample).and_then(|c| c.as_deref())
    }

    /// Value at (feature, sample); `None` for a missing column.
    pub fn get(&self, feature: usize, sample: usize) -> Option<u64> {
        self.column(sample).and_then(|c| c.get(feature).copied())
    }

    /// Whether the sample was rarefied.
    pub fn is_valid(&self, sample: usize) -> bool {
        self.column(sample).is_some()
    }

    /// Number of samples marked missing.
    pub fn n_invalid(&self) -> usize {
        self.columns.iter().filter(|c| c.is_none()).count()
    }

    /// IDs of samples marked missing.
    pub fn invalid_samples(&self) -> Vec<&str> {
        self.columns
            .iter()
            .zip(&self.sample_ids)
            .filter(|(c, _)| c.is_none())
            .map(|(_, id)| id.as_str())
            .collect()
    }

    /// Column totals; `None` for missing columns.
    pub fn col_sums(&self) -> Vec<Option<u64>> {
        self.columns
            .iter()
            .map(|c| c.as_ref().map(|v| v.iter().sum()))
            .collect()
    }

    /// Dense columns with missing samples coerced to all-zero counts.
    pub fn filled_columns(&self) -> Vec<Vec<u64>> {
        let n_features = self.n_features();
        self.columns
            .iter()
            .map(|c| c.clone().unwrap_or_else(|| vec![0; n_features]))
            .collect()
    }

    /// Convert to a [`CountMatrix`], coercing missing samples to zero.
    pub fn filled(&self) -> Result<CountMatrix> {
        CountMatrix::from_columns(
            self.feature_ids.clone(),
            self.sample_ids.clone(),
            &self.filled_columns(),
        )
    }

    /// Write the rarefied table as TSV; missing samples are written as `NA`.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "feature_id")?;
        for sample_id in &self.sample_ids {
            write!(writer, "\t{}", sample_id)?;
        }
        writeln!(writer)?;

        for (row, feature_id) in self.feature_ids.iter().enumerate() {
            write!(writer, "{}", feature_id)?;
            for col in 0..self.n_samples() {
                match self.get(row, col) {
                    Some(v) => write!(writer, "\t{}", v)?,
                    None => write!(writer, "\tNA")?,
                }
            }
            writeln!(writer)?;
        }

        writer.flush()?;
        Ok(())
    }
}

/// Rarefaction depth: the smallest sample total in the table.
///
/// # Errors
/// Returns `EmptyData` for a table without samples or features.
pub fn rarefaction_depth(counts: &CountMatrix) -> Result<u64> {
    if counts.n_features() == 0 {
        return Err(DivError::EmptyData(
            "Cannot rarefy a table without features".to_string(),
        ));
    }
    counts
        .col_sums()
        .into_iter()
        .min()
        .ok_or_else(|| DivError::EmptyData("Cannot rarefy a table without samples".to_string()))
}

/// Subsample one column to `depth` observations without replacement.
///
/// The column is read as a multiset in which feature `i` occurs `counts[i]`
/// times. A generator freshly seeded with `seed` picks `depth` distinct
/// members, which are tallied back into per-feature counts. Returns `None`
/// when the column holds fewer than `depth` observations.
pub fn rarefy_column(counts: &[u64], depth: u64, seed: u64) -> Result<Option<Vec<u64>>> {
    let total: u64 = counts.iter().sum();
    if total < depth {
        return Ok(None);
    }

    let to_usize = |v: u64| {
        usize::try_from(v).map_err(|_| {
            DivError::InvalidParameter(format!("Column total {} exceeds addressable size", v))
        })
    };
    let total = to_usize(total)?;
    let depth = to_usize(depth)?;

    // cumulative[i] = number of observations belonging to features 0..=i
    let cumulative: Vec<usize> = counts
        .iter()
        .scan(0usize, |acc, &c| {
            *acc += c as usize;
            Some(*acc)
        })
        .collect();

    let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
    let drawn = rand::seq::index::sample(&mut rng, total, depth);

    let mut tallies = vec![0u64; counts.len()];
    for position in drawn.iter() {
        let feature = cumulative.partition_point(|&c| c <= position);
        tallies[feature] += 1;
    }
    Ok(Some(tallies))
}

/// Rarefy every sample of `counts` to `depth`.
///
/// Every column is drawn from a generator reseeded with the same `seed`, so
/// the result is reproducible and independent of processing order.
pub fn rarefy(counts: &CountMatrix, depth: u64, seed: u64) -> Result<RarefiedMatrix> {
    let columns: Vec<Option<Vec<u64>>> = counts
        .columns_dense()
        .par_iter()
        .map(|col| rarefy_column(col, depth, seed))
        .collect::<Result<_>>()?;

    let rarefied = RarefiedMatrix {
        feature_ids: counts.feature_ids().to_vec(),
        sample_ids: counts.sample_ids().to_vec(),
        depth,
        seed,
        columns,
    };

    log::info!(
        "Rarefied {} samples to depth {} (seed {})",
        rarefied.n_samples() - rarefied.n_invalid(),
        depth,
        seed
    );
    if rarefied.n_invalid() > 0 {
        log::warn!(
            "{} samples below depth {} marked missing: {:?}",
            rarefied.n_invalid(),
            depth,
            rarefied.invalid_samples()
        );
    }

    Ok(rarefied)
}

/// Rarefy to the smallest sample total in the table.
pub fn rarefy_to_minimum(counts: &CountMatrix, seed: u64) -> Result<RarefiedMatrix> {
    let depth = rarefaction_depth(counts)?;
    rarefy(counts, depth, seed)
}
