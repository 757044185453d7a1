//! Top-N species composition summary.

use crate::error::{DivError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Label of the row collecting all species outside the top N.
pub const OTHER_LABEL: &str = "Other";

/// Relative abundance of the most abundant species per sample, with the
/// remainder summed into an [`OTHER_LABEL`] row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionTable {
    pub samples: Vec<String>,
    /// `(species, per-sample abundance)`, top species first, `Other` last.
    pub rows: Vec<(String, Vec<f64>)>,
}

impl CompositionTable {
    /// Species labels in row order, `Other` included.
    pub fn labels(&self) -> Vec<&str> {
        self.rows.iter().map(|(label, _)| label.as_str()).collect()
    }

    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "species")?;
        for sample in &self.samples {
            write!(writer, "\t{}", sample)?;
        }
        writeln!(writer)?;

        for (label, values) in &self.rows {
            write!(writer, "{}", label)?;
            for value in values {
                write!(writer, "\t{}", value)?;
            }
            writeln!(writer)?;
        }

        writer.flush()?;
        Ok(())
    }
}

/// Rank species by total abundance over all samples and keep the top `top_n`.
///
/// Ties keep their input order. `abundance[i]` holds species `i` across
/// `samples`.
pub fn composition_table(
    species: &[String],
    samples: &[String],
    abundance: &[Vec<f64>],
    top_n: usize,
) -> Result<CompositionTable> {
    if species.len() != abundance.len() {
        return Err(DivError::DimensionMismatch {
            expected: species.len(),
            actual: abundance.len(),
        });
    }
    if let Some(row) = abundance.iter().find(|r| r.len() != samples.len()) {
        return Err(DivError::DimensionMismatch {
            expected: samples.len(),
            actual: row.len(),
        });
    }

    let totals: Vec<f64> = abundance.iter().map(|r| r.iter().sum()).collect();
    let mut order: Vec<usize> = (0..species.len()).collect();
    order.sort_by(|&a, &b| totals[b].total_cmp(&totals[a]));

    let (top, rest) = order.split_at(top_n.min(order.len()));
    let mut rows: Vec<(String, Vec<f64>)> = top
        .iter()
        .map(|&i| (species[i].clone(), abundance[i].clone()))
        .collect();

    let other = (0..samples.len())
        .map(|j| rest.iter().map(|&i| abundance[i][j]).sum())
        .collect();
    rows.push((OTHER_LABEL.to_string(), other));

    Ok(CompositionTable {
        samples: samples.to_vec(),
        rows,
    })
}
