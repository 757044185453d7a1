//! Reading and merging per-sample Bracken species reports.

use crate::data::CountMatrix;
use crate::error::{DivError, Result};
use csv::{ReaderBuilder, Trim};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::{Path, PathBuf};

/// File name suffix of Bracken reports.
pub const REPORT_SUFFIX: &str = ".kraken2_bracken.report";

/// Taxonomy level code for species rows.
const SPECIES_LEVEL: &str = "S";

#[derive(Debug, Deserialize)]
struct BrackenRecord {
    name: String,
    taxonomy_lvl: String,
    fraction_total_reads: f64,
    new_est_reads: f64,
}

/// Species-level abundances of one report, summed per species name.
#[derive(Debug, Clone, Default)]
pub struct SpeciesProfile {
    /// Relative abundance (`fraction_total_reads`).
    pub fractions: BTreeMap<String, f64>,
    /// Estimated reads (`new_est_reads`).
    pub reads: BTreeMap<String, f64>,
}

/// Read the species rows of one Bracken report.
///
/// The file is tab-separated with a header row; lines starting with `#` are
/// comments and columns other than `name`, `taxonomy_lvl`,
/// `fraction_total_reads` and `new_est_reads` are ignored.
pub fn read_bracken_report<P: AsRef<Path>>(path: P) -> Result<SpeciesProfile> {
    let file = File::open(path.as_ref())?;
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .trim(Trim::All)
        .from_reader(file);

    let mut profile = SpeciesProfile::default();
    for record in reader.deserialize() {
        let record: BrackenRecord = record?;
        if record.taxonomy_lvl != SPECIES_LEVEL {
            continue;
        }
        *profile.fractions.entry(record.name.clone()).or_insert(0.0) +=
            record.fraction_total_reads;
        *profile.reads.entry(record.name).or_insert(0.0) += record.new_est_reads;
    }

    log::debug!(
        "{}: {} species",
        path.as_ref().display(),
        profile.reads.len()
    );
    Ok(profile)
}

/// Reports in `dir` whose name ends with `suffix`, as `(sample, path)` sorted
/// by file name. The sample name is the file name without the suffix.
///
/// # Errors
/// `EmptyData` when no file matches.
pub fn discover_reports<P: AsRef<Path>>(dir: P, suffix: &str) -> Result<Vec<(String, PathBuf)>> {
    let dir = dir.as_ref();
    let mut reports: Vec<(String, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if let Some(sample) = file_name.strip_suffix(suffix) {
            if entry.file_type()?.is_file() {
                reports.push((sample.to_string(), entry.path()));
            }
        }
    }

    if reports.is_empty() {
        return Err(DivError::EmptyData(format!(
            "No files ending with {} found in {}",
            suffix,
            dir.display()
        )));
    }

    reports.sort_by(|a, b| a.1.file_name().cmp(&b.1.file_name()));
    Ok(reports)
}

/// Species × samples tables merged from several reports.
///
/// Species are the sorted union over all reports; a species absent from a
/// report counts as zero there.
#[derive(Debug, Clone)]
pub struct BrackenTable {
    pub species: Vec<String>,
    pub samples: Vec<String>,
    /// `fractions[species][sample]`
    pub fractions: Vec<Vec<f64>>,
    /// `reads[species][sample]`
    pub reads: Vec<Vec<f64>>,
}

impl BrackenTable {
    /// Merge per-sample profiles given in output column order.
    pub fn from_profiles(profiles: Vec<(String, SpeciesProfile)>) -> Self {
        let species: Vec<String> = profiles
            .iter()
            .flat_map(|(_, p)| p.fractions.keys().chain(p.reads.keys()))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let column = |map: &BTreeMap<String, f64>, name: &str| map.get(name).copied().unwrap_or(0.0);
        let fractions = species
            .iter()
            .map(|s| profiles.iter().map(|(_, p)| column(&p.fractions, s)).collect())
            .collect();
        let reads = species
            .iter()
            .map(|s| profiles.iter().map(|(_, p)| column(&p.reads, s)).collect())
            .collect();

        Self {
            samples: profiles.into_iter().map(|(sample, _)| sample).collect(),
            species,
            fractions,
            reads,
        }
    }

    pub fn n_species(&self) -> usize {
        self.species.len()
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    /// Estimated reads truncated to integer counts.
    ///
    /// # Errors
    /// `InvalidCount` for negative or non-finite read estimates.
    pub fn raw_counts(&self) -> Result<CountMatrix> {
        let mut columns = vec![Vec::with_capacity(self.n_species()); self.n_samples()];
        for (row, values) in self.reads.iter().enumerate() {
            for (col, &value) in values.iter().enumerate() {
                if value < 0.0 || !value.is_finite() {
                    return Err(DivError::InvalidCount {
                        value: value.to_string(),
                        row,
                        col,
                    });
                }
                columns[col].push(value.trunc() as u64);
            }
        }
        CountMatrix::from_columns(self.species.clone(), self.samples.clone(), &columns)
    }
}

/// Read and merge every report in `dir` ending with `suffix`.
pub fn aggregate_reports<P: AsRef<Path>>(dir: P, suffix: &str) -> Result<BrackenTable> {
    let reports = discover_reports(dir.as_ref(), suffix)?;
    let profiles = reports
        .into_iter()
        .map(|(sample, path)| Ok((sample, read_bracken_report(&path)?)))
        .collect::<Result<Vec<_>>>()?;

    let table = BrackenTable::from_profiles(profiles);
    log::info!(
        "Aggregated {} reports from {} ({} species)",
        table.n_samples(),
        dir.as_ref().display(),
        table.n_species()
    );
    Ok(table)
}
