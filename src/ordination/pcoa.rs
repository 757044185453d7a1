//! Principal coordinates analysis (classical multidimensional scaling).

use crate::data::GroupJoin;
use crate::diversity::DistanceMatrix;
use crate::error::{DivError, Result};
use nalgebra::{DMatrix, SymmetricEigen};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Eigenvalues at or below this fraction of the largest are treated as zero.
const EIGEN_TOLERANCE: f64 = 1e-10;

/// Sample coordinates on the principal axes of a distance matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ordination {
    pub sample_ids: Vec<String>,
    /// `PC1`, `PC2`, ...
    pub axis_names: Vec<String>,
    /// Samples × axes.
    #[serde(skip, default = "empty_matrix")]
    pub coordinates: DMatrix<f64>,
    /// Eigenvalues of the reported axes, descending; zero on padded axes.
    pub eigenvalues: Vec<f64>,
    /// Share of the total positive eigenvalue mass per kept axis.
    pub proportion_explained: Vec<f64>,
    /// Eigenvalues below zero, discarded with their axes.
    pub negative_eigenvalues: usize,
}

impl Ordination {
    pub fn n_axes(&self) -> usize {
        self.axis_names.len()
    }

    pub fn coordinate(&self, sample: usize, axis: usize) -> f64 {
        self.coordinates[(sample, axis)]
    }

    /// Proportion explained as a percentage.
    pub fn percent_explained(&self) -> Vec<f64> {
        self.proportion_explained.iter().map(|p| p * 100.0).collect()
    }

    /// Write coordinates for every sample.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let rows: Vec<(usize, Option<&str>)> = (0..self.sample_ids.len()).map(|i| (i, None)).collect();
        self.write_rows(path, None, &rows)
    }

    /// Write coordinates for the samples matched by `join`, with their group.
    pub fn to_tsv_grouped<P: AsRef<Path>>(&self, path: P, join: &GroupJoin) -> Result<()> {
        let rows: Vec<(usize, Option<&str>)> = join
            .matched
            .iter()
            .map(|(i, label)| (*i, Some(label.as_str())))
            .collect();
        self.write_rows(path, Some(&join.group_column), &rows)
    }

    fn write_rows<P: AsRef<Path>>(
        &self,
        path: P,
        group_column: Option<&str>,
        rows: &[(usize, Option<&str>)],
    ) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "sample_id")?;
        for axis in &self.axis_names {
            write!(writer, "\t{}", axis)?;
        }
        if let Some(column) = group_column {
            write!(writer, "\t{}", column)?;
        }
        writeln!(writer)?;

        for &(sample, label) in rows {
            write!(writer, "{}", self.sample_ids[sample])?;
            for axis in 0..self.n_axes() {
                write!(writer, "\t{:.6}", self.coordinates[(sample, axis)])?;
            }
            if let Some(label) = label {
                write!(writer, "\t{}", label)?;
            }
            writeln!(writer)?;
        }

        writer.flush()?;
        Ok(())
    }
}

/// Principal coordinates of a distance matrix.
///
/// Double-centres `-½D²`, takes its eigendecomposition and sorts the axes by
/// eigenvalue in descending order. Coordinates are eigenvectors scaled by
/// `sqrt(λ)`. One axis per sample (`PC1..PCn`) is reported, or `n_axes` if
/// smaller. Axes beyond the positive eigenvalues are zero-filled with a zero
/// eigenvalue, so degenerate data still yields `PC2`. Proportions are always
/// relative to all positive eigenvalues.
///
/// # Errors
/// `EmptyData` for fewer than 2 samples, `Numerical` if no eigenvalue is
/// positive (all samples identical).
pub fn pcoa(distances: &DistanceMatrix, n_axes: Option<usize>) -> Result<Ordination> {
    let n = distances.len();
    if n < 2 {
        return Err(DivError::EmptyData(format!(
            "PCoA needs at least 2 samples, got {}",
            n
        )));
    }

    let a = distances.matrix().map(|d| -0.5 * d * d);
    let row_means: Vec<f64> = a.row_iter().map(|r| r.mean()).collect();
    let col_means: Vec<f64> = a.column_iter().map(|c| c.mean()).collect();
    let grand_mean = a.mean();
    let centered = DMatrix::from_fn(n, n, |i, j| {
        a[(i, j)] - row_means[i] - col_means[j] + grand_mean
    });

    let eigen = SymmetricEigen::new(centered);
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&x, &y| eigen.eigenvalues[y].total_cmp(&eigen.eigenvalues[x]));

    let largest = eigen.eigenvalues[order[0]];
    let positive: Vec<usize> = order
        .into_iter()
        .filter(|&k| eigen.eigenvalues[k] > EIGEN_TOLERANCE * largest.max(0.0))
        .collect();
    if positive.is_empty() || largest <= 0.0 {
        return Err(DivError::Numerical(
            "Distance matrix has no positive eigenvalues".to_string(),
        ));
    }

    let negative_eigenvalues = eigen
        .eigenvalues
        .iter()
        .filter(|&&l| l < -EIGEN_TOLERANCE * largest)
        .count();
    if negative_eigenvalues > 0 {
        log::debug!(
            "Discarded {} negative eigenvalues (non-Euclidean distances)",
            negative_eigenvalues
        );
    }

    let total: f64 = positive.iter().map(|&k| eigen.eigenvalues[k]).sum();
    let n_total = n_axes.map_or(n, |m| m.min(n));
    let kept = n_total.min(positive.len());
    log::debug!(
        "{} positive axes; writing {} axes ({} zero-padded)",
        positive.len(),
        n_total,
        n_total - kept
    );

    let mut coordinates = DMatrix::zeros(n, n_total);
    let mut eigenvalues = vec![0.0; n_total];
    for (axis, &k) in positive.iter().take(kept).enumerate() {
        let lambda = eigen.eigenvalues[k];
        let scale = lambda.sqrt();
        for sample in 0..n {
            coordinates[(sample, axis)] = eigen.eigenvectors[(sample, k)] * scale;
        }
        eigenvalues[axis] = lambda;
    }

    Ok(Ordination {
        sample_ids: distances.ids().to_vec(),
        axis_names: (1..=n_total).map(|i| format!("PC{}", i)).collect(),
        coordinates,
        proportion_explained: eigenvalues.iter().map(|l| l / total).collect(),
        eigenvalues,
        negative_eigenvalues,
    })
}


fn empty_matrix() -> DMatrix<f64> {
    DMatrix::zeros(0, 0)
}
