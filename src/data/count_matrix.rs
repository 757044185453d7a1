//! Count matrix with sparse storage for microbiome abundance data.

use crate::error::{DivError, Result};
use rayon::prelude::*;
use sprs::{CsMat, TriMat};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// A sparse count matrix storing feature abundances across samples.
///
/// Rows represent features (taxa), columns represent samples.
/// Uses CSR (Compressed Sparse Row) format for efficient row-wise operations.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    /// Sparse matrix in CSR format (features × samples)
    data: CsMat<u64>,
    /// Feature identifiers (row names)
    feature_ids: Vec<String>,
    /// Sample identifiers (column names)
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a new CountMatrix from a sparse matrix and identifiers.
    pub fn new(
        data: CsMat<u64>,
        feature_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        if nrows != feature_ids.len() {
            return Err(DivError::DimensionMismatch {
                expected: nrows,
                actual: feature_ids.len(),
            });
        }
        if ncols != sample_ids.len() {
            return Err(DivError::DimensionMismatch {
                expected: ncols,
                actual: sample_ids.len(),
            });
        }
        Ok(Self {
            data,
            feature_ids,
            sample_ids,
        })
    }

    /// Build a matrix from dense per-sample columns.
    ///
    /// `columns[j]` holds the counts of sample `j`, one entry per feature.
    pub fn from_columns(
        feature_ids: Vec<String>,
        sample_ids: Vec<String>,
        columns: &[Vec<u64>],
    ) -> Result<Self> {
        if columns.len() != sample_ids.len() {
            return Err(DivError::DimensionMismatch {
                expected: sample_ids.len(),
                actual: columns.len(),
            });
        }
        let mut tri_mat = TriMat::new((feature_ids.len(), sample_ids.len()));
        for (col, values) in columns.iter().enumerate() {
            if values.len() != feature_ids.len() {
                return Err(DivError::DimensionMismatch {
                    expected: feature_ids.len(),
                    actual: values.len(),
                });
            }
            for (row, &val) in values.iter().enumerate() {
                if val > 0 {
                    tri_mat.add_triplet(row, col, val);
                }
            }
        }
        Self::new(tri_mat.to_csr(), feature_ids, sample_ids)
    }

    /// Load a plain count matrix from a TSV file.
    ///
    /// Expected format:
    /// - First row: header with sample IDs (first column is feature ID header)
    /// - Subsequent rows: feature ID followed by counts
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::read_tsv(path, false)
    }

    /// Load a species abundance table, dropping its last column.
    ///
    /// The abundance tables this crate consumes always end with a non-numeric
    /// annotation column (taxonomy/lineage). That column is discarded
    /// unconditionally, so the header must carry the feature ID column, at
    /// least one sample column, and the trailing annotation column.
    ///
    /// Empty or `NA` cells count as zero; fractional counts are truncated.
    pub fn from_abundance_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::read_tsv(path, true)
    }

    fn read_tsv<P: AsRef<Path>>(path: P, drop_trailing: bool) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        // Parse header
        let header_line = lines
            .next()
            .ok_or_else(|| DivError::EmptyData("Empty TSV file".to_string()))??;
        let header: Vec<&str> = header_line.trim_end_matches('\r').split('\t').collect();
        let min_columns = if drop_trailing { 3 } else { 2 };
        if header.len() < min_columns {
            return Err(DivError::EmptyData(if drop_trailing {
                "Abundance table needs a feature column, at least one sample and a trailing annotation column".to_string()
            } else {
                "TSV must have at least one sample".to_string()
            }));
        }
        let last_sample = if drop_trailing {
            header.len() - 1
        } else {
            header.len()
        };
        let sample_ids: Vec<String> = header[1..last_sample]
            .iter()
            .map(|s| s.trim().to_string())
            .collect();
        let n_samples = sample_ids.len();

        let mut triplets: Vec<(usize, usize, u64)> = Vec::new();
        let mut feature_ids: Vec<String> = Vec::new();

        for line_result in lines {
            let line = line_result?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let row_idx = feature_ids.len();
            feature_ids.push(fields[0].to_string());

            for (col_idx, value_str) in fields[1..].iter().take(n_samples).enumerate() {
                let value = parse_count(value_str, row_idx, col_idx)?;
                if value > 0 {
                    triplets.push((row_idx, col_idx, value));
                }
            }
        }

        let n_features = feature_ids.len();
        if n_features == 0 {
            return Err(DivError::EmptyData("No features in TSV".to_string()));
        }

        let mut tri_mat = TriMat::new((n_features, n_samples));
        for (row, col, val) in triplets {
            tri_mat.add_triplet(row, col, val);
        }

        Self::new(tri_mat.to_csr(), feature_ids, sample_ids)
    }

    /// Write the count matrix to a TSV file with a `feature_id` index header.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.to_tsv_labeled(path, "feature_id")
    }

    /// Write the count matrix to a TSV file using `index_label` as the first header cell.
    pub fn to_tsv_labeled<P: AsRef<Path>>(&self, path: P, index_label: &str) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "{}", index_label)?;
        for sample_id in &self.sample_ids {
            write!(writer, "\t{}", sample_id)?;
        }
        writeln!(writer)?;

        for (row_idx, feature_id) in self.feature_ids.iter().enumerate() {
            write!(writer, "{}", feature_id)?;
            for value in self.row_dense(row_idx) {
                write!(writer, "\t{}", value)?;
            }
            writeln!(writer)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Get the value at (row, col), returning 0 for missing entries.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u64 {
        self.data.get(row, col).copied().unwrap_or(0)
    }

    /// Number of features (rows).
    #[inline]
    pub fn n_features(&self) -> usize {
        self.data.rows()
    }

    /// Number of samples (columns).
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.cols()
    }

    /// Feature identifiers.
    #[inline]
    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    /// Sample identifiers.
    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Get the underlying sparse matrix.
    #[inline]
    pub fn data(&self) -> &CsMat<u64> {
        &self.data
    }

    /// Get a dense vector for a specific row (feature).
    pub fn row_dense(&self, row: usize) -> Vec<u64> {
        let mut dense = vec![0u64; self.n_samples()];
        if let Some(row_vec) = self.data.outer_view(row) {
            for (col, &val) in row_vec.iter() {
                dense[col] = val;
            }
        }
        dense
    }

    /// Get a dense vector for a specific column (sample).
    pub fn col_dense(&self, col: usize) -> Vec<u64> {
        (0..self.n_features())
            .map(|row| self.get(row, col))
            .collect()
    }

    /// Dense per-sample columns, in sample order.
    pub fn columns_dense(&self) -> Vec<Vec<u64>> {
        let mut columns = vec![vec![0u64; self.n_features()]; self.n_samples()];
        for (row, row_vec) in self.data.outer_iterator().enumerate() {
            for (col, &val) in row_vec.iter() {
                columns[col][row] = val;
            }
        }
        columns
    }

    /// Compute row sums (total counts per feature).
    pub fn row_sums(&self) -> Vec<u64> {
        (0..self.n_features())
            .into_par_iter()
            .map(|row| {
                self.data
                    .outer_view(row)
                    .map(|v| v.iter().map(|(_, &val)| val).sum())
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Number of samples in which each feature has a non-zero count.
    pub fn row_prevalence(&self) -> Vec<usize> {
        (0..self.n_features())
            .into_par_iter()
            .map(|row| {
                self.data
                    .outer_view(row)
                    .map(|v| v.iter().filter(|(_, &val)| val > 0).count())
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Compute column sums (library sizes per sample).
    pub fn col_sums(&self) -> Vec<u64> {
        let mut sums = vec![0u64; self.n_samples()];
        for row_vec in self.data.outer_iterator() {
            for (col, &val) in row_vec.iter() {
                sums[col] += val;
            }
        }
        sums
    }

    /// Subset the matrix to include only specified features (by index).
    pub fn subset_features(&self, indices: &[usize]) -> Result<Self> {
        let n_features = indices.len();
        let n_samples = self.n_samples();

        let mut tri_mat = TriMat::new((n_features, n_samples));
        let mut new_feature_ids = Vec::with_capacity(n_features);

        for (new_row, &old_row) in indices.iter().enumerate() {
            if old_row >= self.n_features() {
                return Err(DivError::InvalidParameter(format!(
                    "Feature index {} out of bounds",
                    old_row
                )));
            }
            new_feature_ids.push(self.feature_ids[old_row].clone());

            if let Some(row_vec) = self.data.outer_view(old_row) {
                for (col, &val) in row_vec.iter() {
                    tri_mat.add_triplet(new_row, col, val);
                }
            }
        }

        Self::new(tri_mat.to_csr(), new_feature_ids, self.sample_ids.clone())
    }

    /// Convert to a dense matrix (f64), features × samples.
    pub fn to_dense(&self) -> nalgebra::DMatrix<f64> {
        let mut dense = nalgebra::DMatrix::zeros(self.n_features(), self.n_samples());
        for (row, row_vec) in self.data.outer_iterator().enumerate() {
            for (col, &val) in row_vec.iter() {
                dense[(row, col)] = val as f64;
            }
        }
        dense
    }
}

/// Parse one abundance cell.
///
/// Missing cells are zero, fractional values are truncated toward zero,
/// negative or non-finite values are rejected.
fn parse_count(raw: &str, row: usize, col: usize) -> Result<u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("na") || trimmed.eq_ignore_ascii_case("nan") {
        return Ok(0);
    }
    if let Ok(v) = trimmed.parse::<u64>() {
        return Ok(v);
    }
    let invalid = || DivError::InvalidCount {
        value: raw.to_string(),
        row,
        col,
    };
    let value: f64 = trimmed.parse().map_err(|_| invalid())?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid());
    }
    Ok(value.trunc() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_matrix() -> CountMatrix {
        // 3 features × 4 samples
        let mut tri_mat = TriMat::new((3, 4));
        tri_mat.add_triplet(0, 0, 10);
        tri_mat.add_triplet(0, 1, 20);
        tri_mat.add_triplet(0, 3, 5);
        tri_mat.add_triplet(1, 0, 100);
        tri_mat.add_triplet(1, 1, 200);
        tri_mat.add_triplet(1, 2, 150);
        tri_mat.add_triplet(1, 3, 175);
        tri_mat.add_triplet(2, 0, 1);

        let feature_ids = vec!["feat_A".to_string(), "feat_B".to_string(), "feat_C".to_string()];
        let sample_ids = vec![
            "sample1".to_string(),
            "sample2".to_string(),
            "sample3".to_string(),
            "sample4".to_string(),
        ];

        CountMatrix::new(tri_mat.to_csr(), feature_ids, sample_ids).unwrap()
    }

    #[test]
    fn test_dimensions() {
        let mat = create_test_matrix();
        assert_eq!(mat.n_features(), 3);
        assert_eq!(mat.n_samples(), 4);
    }

    #[test]
    fn test_get_values() {
        let mat = create_test_matrix();
        assert_eq!(mat.get(0, 0), 10);
        assert_eq!(mat.get(0, 2), 0);
        assert_eq!(mat.get(2, 0), 1);
        assert_eq!(mat.get(2, 1), 0);
    }

    #[test]
    fn test_sums_and_prevalence() {
        let mat = create_test_matrix();
        assert_eq!(mat.col_sums(), vec![111, 220, 150, 180]);
        assert_eq!(mat.row_sums(), vec![35, 625, 1]);
        assert_eq!(mat.row_prevalence(), vec![3, 4, 1]);
    }

    #[test]
    fn test_columns_dense() {
        let mat = create_test_matrix();
        let cols = mat.columns_dense();
        assert_eq!(cols.len(), 4);
        assert_eq!(cols[0], vec![10, 100, 1]);
        assert_eq!(cols[2], mat.col_dense(2));
    }

    #[test]
    fn test_from_columns_rejects_ragged() {
        let result = CountMatrix::from_columns(
            vec!["a".into(), "b".into()],
            vec!["S1".into()],
            &[vec![1, 2, 3]],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_tsv_roundtrip() {
        let mat = create_test_matrix();

        let temp_file = NamedTempFile::new().unwrap();
        mat.to_tsv(temp_file.path()).unwrap();

        let loaded = CountMatrix::from_tsv(temp_file.path()).unwrap();
        assert_eq!(loaded.feature_ids(), mat.feature_ids());
        assert_eq!(loaded.sample_ids(), mat.sample_ids());
        for row in 0..mat.n_features() {
            assert_eq!(loaded.row_dense(row), mat.row_dense(row));
        }
    }

    #[test]
    fn test_abundance_drops_trailing_column() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "feature_id\tS1\tS2\tlineage").unwrap();
        writeln!(file, "Bacteroides\t12\t3.7\tk__Bacteria;p__Bacteroidota").unwrap();
        writeln!(file, "Prevotella\t\t8\tk__Bacteria;p__Bacteroidota").unwrap();
        file.flush().unwrap();

        let mat = CountMatrix::from_abundance_tsv(file.path()).unwrap();
        assert_eq!(mat.sample_ids(), &["S1", "S2"]);
        assert_eq!(mat.feature_ids(), &["Bacteroides", "Prevotella"]);
        assert_eq!(mat.row_dense(0), vec![12, 3]);
        assert_eq!(mat.row_dense(1), vec![0, 8]);
    }

    #[test]
    fn test_abundance_requires_annotation_column() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "feature_id\tlineage").unwrap();
        writeln!(file, "Bacteroides\tk__Bacteria").unwrap();
        file.flush().unwrap();

        assert!(matches!(
            CountMatrix::from_abundance_tsv(file.path()),
            Err(DivError::EmptyData(_))
        ));
    }

    #[test]
    fn test_negative_count_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "feature_id\tS1\tS2").unwrap();
        writeln!(file, "A\t-4\t2").unwrap();
        file.flush().unwrap();

        let err = CountMatrix::from_tsv(file.path()).unwrap_err();
        assert!(matches!(err, DivError::InvalidCount { row: 0, col: 0, .. }));
    }

    #[test]
    fn test_subset_features() {
        let mat = create_test_matrix();
        let subset = mat.subset_features(&[0, 2]).unwrap();

        assert_eq!(subset.n_features(), 2);
        assert_eq!(subset.feature_ids(), &["feat_A", "feat_C"]);
        assert_eq!(subset.get(0, 0), 10);
        assert_eq!(subset.get(1, 0), 1);
        assert!(mat.subset_features(&[7]).is_err());
    }
}
