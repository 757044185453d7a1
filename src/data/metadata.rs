//! Sample metadata handling.

use crate::error::{DivError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A metadata value that can be categorical or continuous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variable {
    /// Categorical variable with string levels.
    Categorical(String),
    /// Continuous numeric variable.
    Continuous(f64),
    /// Missing value.
    Missing,
}

impl Variable {
    /// Check if this is a missing value.
    pub fn is_missing(&self) -> bool {
        matches!(self, Variable::Missing)
    }

    /// Try to get as categorical string.
    pub fn as_categorical(&self) -> Option<&str> {
        match self {
            Variable::Categorical(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as continuous f64.
    pub fn as_continuous(&self) -> Option<f64> {
        match self {
            Variable::Continuous(v) => Some(*v),
            _ => None,
        }
    }

    /// Render the value as a grouping label.
    ///
    /// Whole-number continuous values print without a decimal point, so a
    /// numeric `Group` column of `1`/`2` yields labels `"1"`/`"2"`.
    pub fn label(&self) -> Option<String> {
        match self {
            Variable::Categorical(s) => Some(s.clone()),
            Variable::Continuous(v) if v.fract() == 0.0 && v.abs() < 1e15 => {
                Some(format!("{}", *v as i64))
            }
            Variable::Continuous(v) => Some(v.to_string()),
            Variable::Missing => None,
        }
    }
}

/// Type hint inferred for each metadata column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableType {
    Categorical,
    Continuous,
}

/// Sample metadata keyed by sample ID.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    /// Sample IDs in file order.
    sample_ids: Vec<String>,
    /// Column names (excluding the sample ID column).
    column_names: Vec<String>,
    /// sample_id -> column_name -> Variable.
    data: HashMap<String, HashMap<String, Variable>>,
    /// Inferred type of each column.
    column_types: HashMap<String, VariableType>,
}

fn is_missing_token(raw: &str) -> bool {
    raw.is_empty() || raw == "NA" || raw == "na" || raw == "NaN"
}

impl Metadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load metadata from a TSV file.
    ///
    /// The first column holds sample IDs, the remaining header cells name the
    /// variables. A column is continuous when every non-missing value parses
    /// as a number, categorical otherwise.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| DivError::EmptyData("Empty metadata file".to_string()))??;
        let header: Vec<&str> = header_line.trim_end_matches('\r').split('\t').collect();
        if header.len() < 2 {
            return Err(DivError::EmptyData(
                "Metadata must have at least one variable column".to_string(),
            ));
        }
        let column_names: Vec<String> = header[1..].iter().map(|s| s.trim().to_string()).collect();

        let mut raw_data: Vec<(String, Vec<String>)> = Vec::new();
        for line_result in lines {
            let line = line_result?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let values = fields[1..].iter().map(|s| s.trim().to_string()).collect();
            raw_data.push((fields[0].trim().to_string(), values));
        }

        if raw_data.is_empty() {
            return Err(DivError::EmptyData("No samples in metadata".to_string()));
        }

        let mut column_types = HashMap::new();
        for (col_idx, col_name) in column_names.iter().enumerate() {
            let all_numeric = raw_data.iter().all(|(_, values)| {
                values
                    .get(col_idx)
                    .map_or(true, |v| is_missing_token(v) || v.parse::<f64>().is_ok())
            });
            let var_type = if all_numeric {
                VariableType::Continuous
            } else {
                VariableType::Categorical
            };
            column_types.insert(col_name.clone(), var_type);
        }

        let mut sample_ids = Vec::with_capacity(raw_data.len());
        let mut data = HashMap::with_capacity(raw_data.len());

        for (sample_id, values) in raw_data {
            let mut sample_data = HashMap::new();
            for (col_idx, col_name) in column_names.iter().enumerate() {
                let var = match values.get(col_idx) {
                    None => Variable::Missing,
                    Some(raw) if is_missing_token(raw) => Variable::Missing,
                    Some(raw) => match column_types.get(col_name) {
                        Some(VariableType::Continuous) => raw
                            .parse::<f64>()
                            .map(Variable::Continuous)
                            .unwrap_or(Variable::Missing),
                        _ => Variable::Categorical(raw.clone()),
                    },
                };
                sample_data.insert(col_name.clone(), var);
            }
            if data.insert(sample_id.clone(), sample_data).is_some() {
                return Err(DivError::SampleMismatch(format!(
                    "Sample '{}' appears more than once in metadata",
                    sample_id
                )));
            }
            sample_ids.push(sample_id);
        }

        Ok(Self {
            sample_ids,
            column_names,
            data,
            column_types,
        })
    }

    /// Sample IDs in order.
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Column names.
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Number of samples.
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Get a variable value for a specific sample and column.
    pub fn get(&self, sample_id: &str, column: &str) -> Option<&Variable> {
        self.data.get(sample_id).and_then(|m| m.get(column))
    }

    /// Group label of a sample in `column`, if the sample exists and the value is present.
    pub fn group_label(&self, sample_id: &str, column: &str) -> Option<String> {
        self.get(sample_id, column).and_then(Variable::label)
    }

    /// Get the inferred type of a column.
    pub fn column_type(&self, column: &str) -> Option<VariableType> {
        self.column_types.get(column).copied()
    }

    /// Distinct labels of a column in order of first appearance.
    pub fn levels(&self, column: &str) -> Result<Vec<String>> {
        if !self.has_column(column) {
            return Err(DivError::MissingColumn(column.to_string()));
        }
        let mut levels: Vec<String> = Vec::new();
        for sid in &self.sample_ids {
            if let Some(label) = self.group_label(sid, column) {
                if !levels.contains(&label) {
                    levels.push(label);
                }
            }
        }
        Ok(levels)
    }

    /// Check if a sample exists.
    pub fn has_sample(&self, sample_id: &str) -> bool {
        self.data.contains_key(sample_id)
    }

    /// Check if a column exists.
    pub fn has_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_tsv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample_id\tGroup\tage\tcohort").unwrap();
        writeln!(file, "S1\tcontrol\t25\t1").unwrap();
        writeln!(file, "S2\ttreatment\t30\t2").unwrap();
        writeln!(file, "S3\tcontrol\t35\t1").unwrap();
        writeln!(file, "S4\ttreatment\tNA\t2").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_metadata() {
        let file = create_test_tsv();
        let meta = Metadata::from_tsv(file.path()).unwrap();

        assert_eq!(meta.n_samples(), 4);
        assert_eq!(meta.sample_ids(), &["S1", "S2", "S3", "S4"]);
        assert_eq!(meta.column_names(), &["Group", "age", "cohort"]);
        assert_eq!(meta.column_type("Group"), Some(VariableType::Categorical));
        assert_eq!(meta.column_type("age"), Some(VariableType::Continuous));
        assert!(meta.get("S4", "age").unwrap().is_missing());
        assert_eq!(meta.get("S2", "age").unwrap().as_continuous(), Some(30.0));
    }

    #[test]
    fn test_numeric_group_labels() {
        let file = create_test_tsv();
        let meta = Metadata::from_tsv(file.path()).unwrap();

        assert_eq!(meta.group_label("S1", "cohort").as_deref(), Some("1"));
        assert_eq!(meta.group_label("S1", "Group").as_deref(), Some("control"));
        assert_eq!(meta.group_label("S9", "Group"), None);
    }

    #[test]
    fn test_levels_first_appearance() {
        let file = create_test_tsv();
        let meta = Metadata::from_tsv(file.path()).unwrap();

        assert_eq!(meta.levels("Group").unwrap(), vec!["control", "treatment"]);
        assert!(matches!(meta.levels("Site"), Err(DivError::MissingColumn(_))));
    }

    #[test]
    fn test_duplicate_sample_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample_id\tGroup").unwrap();
        writeln!(file, "S1\tA").unwrap();
        writeln!(file, "S1\tB").unwrap();
        file.flush().unwrap();

        assert!(Metadata::from_tsv(file.path()).is_err());
    }
}
