//! Aggregation of Bracken reports into count and composition tables.

use super::config::AnalysisConfig;
use crate::data::CountMatrix;
use crate::error::{DivError, Result};
use crate::report::{aggregate_reports, composition_table, BrackenTable, CompositionTable, REPORT_SUFFIX};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Builder for the report aggregation pipeline.
#[derive(Debug, Clone)]
pub struct AggregatePipeline {
    name: String,
    suffix: String,
    top_n: usize,
}

impl Default for AggregatePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregatePipeline {
    pub fn new() -> Self {
        Self {
            name: "aggregate".to_string(),
            suffix: REPORT_SUFFIX.to_string(),
            top_n: 10,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new().suffix(&config.report_suffix).top_n(config.top_n)
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// File name suffix identifying reports; the rest of the name is the sample ID.
    pub fn suffix(mut self, suffix: &str) -> Self {
        self.suffix = suffix.to_string();
        self
    }

    /// Number of species kept by name in the composition table.
    pub fn top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn run<P: AsRef<Path>>(&self, input_dir: P) -> Result<AggregateOutput> {
        log::info!(
            "Running pipeline '{}' on {} (suffix {}, top {})",
            self.name,
            input_dir.as_ref().display(),
            self.suffix,
            self.top_n
        );

        let table = aggregate_reports(input_dir, &self.suffix)
            .map_err(|e| DivError::Pipeline(format!("Step 1 (read reports) failed: {}", e)))?;
        let counts = table
            .raw_counts()
            .map_err(|e| DivError::Pipeline(format!("Step 2 (raw counts) failed: {}", e)))?;
        let composition = composition_table(&table.species, &table.samples, &table.fractions, self.top_n)
            .map_err(|e| DivError::Pipeline(format!("Step 3 (composition) failed: {}", e)))?;

        Ok(AggregateOutput {
            name: self.name.clone(),
            table,
            counts,
            composition,
        })
    }
}

/// Merged reports with their derived tables.
#[derive(Debug, Clone)]
pub struct AggregateOutput {
    pub name: String,
    pub table: BrackenTable,
    /// Species × samples integer read counts.
    pub counts: CountMatrix,
    pub composition: CompositionTable,
}

#[derive(Serialize)]
struct AggregateSummary<'a> {
    pipeline: &'a str,
    samples: &'a [String],
    n_species: usize,
    top_species: Vec<&'a str>,
    outputs: &'a [PathBuf],
}

impl AggregateOutput {
    /// Write `raw_counts_for_deseq2.txt`, `composition_table.tsv` and
    /// `summary.json` into `dir`, creating it if needed.
    pub fn write<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let counts_path = dir.join("raw_counts_for_deseq2.txt");
        self.counts.to_tsv_labeled(&counts_path, "name")?;

        let composition_path = dir.join("composition_table.tsv");
        self.composition.to_tsv(&composition_path)?;

        let outputs = vec![counts_path, composition_path];
        let labels = self.composition.labels();
        let summary = AggregateSummary {
            pipeline: &self.name,
            samples: &self.table.samples,
            n_species: self.table.n_species(),
            top_species: labels[..labels.len().saturating_sub(1)].to_vec(),
            outputs: &outputs,
        };
        let file = File::create(dir.join("summary.json"))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &summary)?;

        log::info!("Wrote aggregated tables to {}", dir.display());
        Ok(outputs)
    }
}
