//! Alpha diversity pipeline: quality filter, rarefaction, indices, grouping.

use super::config::AnalysisConfig;
use crate::data::{join_groups, CountMatrix, GroupJoin, Metadata};
use crate::diversity::{alpha_diversity_table, AlphaMetric, AlphaTable};
use crate::error::{DivError, Result};
use crate::filter::{filter_quality_with_stats, QualityFilterResult, QualityThresholds};
use crate::rarefy::{rarefaction_depth, rarefy, RarefiedMatrix};
use crate::test::{compare_groups, SignificanceResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// A step of the alpha diversity pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AlphaStep {
    /// Drop features below the depth and prevalence thresholds.
    FilterQuality { thresholds: QualityThresholds },
    /// Rarefy to the smallest sample total.
    Rarefy { seed: u64 },
    /// Compute every alpha index on the rarefied table.
    Diversity,
    /// Attach group labels from a metadata column.
    JoinMetadata { group_column: String },
    /// Test each index for differences between groups.
    CompareGroups,
}

/// Builder for the alpha diversity pipeline.
#[derive(Debug, Clone)]
pub struct AlphaPipeline {
    steps: Vec<AlphaStep>,
    name: String,
}

impl Default for AlphaPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl AlphaPipeline {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            name: "alpha".to_string(),
        }
    }

    /// The standard step sequence for `config`.
    pub fn from_config(config: &AnalysisConfig) -> Self {
        let pipeline = Self::new()
            .filter_quality(config.quality)
            .rarefy(config.seed)
            .diversity()
            .join_metadata(&config.group_column);
        if config.show_pvalues {
            pipeline.compare_groups()
        } else {
            pipeline
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn filter_quality(mut self, thresholds: QualityThresholds) -> Self {
        self.steps.push(AlphaStep::FilterQuality { thresholds });
        self
    }

    pub fn rarefy(mut self, seed: u64) -> Self {
        self.steps.push(AlphaStep::Rarefy { seed });
        self
    }

    pub fn diversity(mut self) -> Self {
        self.steps.push(AlphaStep::Diversity);
        self
    }

    pub fn join_metadata(mut self, group_column: &str) -> Self {
        self.steps.push(AlphaStep::JoinMetadata {
            group_column: group_column.to_string(),
        });
        self
    }

    pub fn compare_groups(mut self) -> Self {
        self.steps.push(AlphaStep::CompareGroups);
        self
    }

    pub fn steps(&self) -> &[AlphaStep] {
        &self.steps
    }

    /// Run the pipeline on data.
    pub fn run(&self, counts: &CountMatrix, metadata: &Metadata) -> Result<AlphaOutput> {
        log::info!(
            "Running pipeline '{}' on {} features × {} samples",
            self.name,
            counts.n_features(),
            counts.n_samples()
        );
        let mut state = AlphaState::new(counts.clone());

        for (i, step) in self.steps.iter().enumerate() {
            state = state.apply(step, metadata).map_err(|e| {
                DivError::Pipeline(format!("Step {} ({:?}) failed: {}", i + 1, step, e))
            })?;
        }

        state.finalize(&self.name)
    }
}

/// Significance of one alpha index across groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSignificance {
    pub metric: AlphaMetric,
    /// `None` when the comparison was skipped or undefined.
    pub result: Option<SignificanceResult>,
}

struct AlphaState {
    counts: CountMatrix,
    filter: Option<QualityFilterResult>,
    rarefied: Option<RarefiedMatrix>,
    table: Option<AlphaTable>,
    join: Option<GroupJoin>,
    significance: Option<Vec<MetricSignificance>>,
}

impl AlphaState {
    fn new(counts: CountMatrix) -> Self {
        Self {
            counts,
            filter: None,
            rarefied: None,
            table: None,
            join: None,
            significance: None,
        }
    }

    fn apply(mut self, step: &AlphaStep, metadata: &Metadata) -> Result<Self> {
        match step {
            AlphaStep::FilterQuality { thresholds } => {
                let (filtered, stats) = filter_quality_with_stats(&self.counts, thresholds)?;
                log::info!(
                    "Quality filter kept {} of {} features ({:.1}% of reads)",
                    stats.n_after,
                    stats.n_before,
                    stats.reads_retained * 100.0
                );
                self.counts = filtered;
                self.filter = Some(stats);
            }
            AlphaStep::Rarefy { seed } => {
                let depth = rarefaction_depth(&self.counts)?;
                self.rarefied = Some(rarefy(&self.counts, depth, *seed)?);
            }
            AlphaStep::Diversity => {
                let rarefied = self.rarefied.as_ref().ok_or_else(|| {
                    DivError::Pipeline("Must rarefy before computing diversity".to_string())
                })?;
                self.table = Some(alpha_diversity_table(rarefied));
            }
            AlphaStep::JoinMetadata { group_column } => {
                self.join = Some(join_groups(self.counts.sample_ids(), metadata, group_column)?);
            }
            AlphaStep::CompareGroups => {
                let table = self.table.as_ref().ok_or_else(|| {
                    DivError::Pipeline("Must compute diversity before comparing groups".to_string())
                })?;
                let join = self.join.as_ref().ok_or_else(|| {
                    DivError::Pipeline("Must join metadata before comparing groups".to_string())
                })?;
                self.significance = Some(annotate(table, join)?);
            }
        }
        Ok(self)
    }

    fn finalize(self, name: &str) -> Result<AlphaOutput> {
        let rarefied = self.rarefied.ok_or_else(|| {
            DivError::Pipeline("Pipeline must include a rarefaction step".to_string())
        })?;
        let table = self.table.ok_or_else(|| {
            DivError::Pipeline("Pipeline must include a diversity step".to_string())
        })?;

        Ok(AlphaOutput {
            name: name.to_string(),
            filter: self.filter,
            rarefied,
            table,
            join: self.join,
            significance: self.significance,
        })
    }
}

/// Compare each index across groups, skipping unrarefied samples.
fn annotate(table: &AlphaTable, join: &GroupJoin) -> Result<Vec<MetricSignificance>> {
    AlphaMetric::ALL
        .iter()
        .map(|&metric| {
            let groups = join.partition(&table.values(metric), |i| table.is_rarefied(i));
            let result = match compare_groups(&groups) {
                Ok(result) => result,
                Err(DivError::Numerical(msg)) => {
                    log::warn!("No p-value for {}: {}", metric, msg);
                    None
                }
                Err(e) => return Err(e),
            };
            if let Some(r) = &result {
                log::info!("{}: {} p = {:.3e}", metric, r.method, r.p_value);
            }
            Ok(MetricSignificance { metric, result })
        })
        .collect()
}

/// Everything the alpha pipeline produced.
#[derive(Debug, Clone)]
pub struct AlphaOutput {
    pub name: String,
    pub filter: Option<QualityFilterResult>,
    pub rarefied: RarefiedMatrix,
    pub table: AlphaTable,
    pub join: Option<GroupJoin>,
    pub significance: Option<Vec<MetricSignificance>>,
}

#[derive(Serialize)]
struct AlphaSummary<'a> {
    pipeline: &'a str,
    quality_filter: &'a Option<QualityFilterResult>,
    rarefaction_depth: u64,
    seed: u64,
    n_samples: usize,
    unrarefied_samples: Vec<&'a str>,
    group_join: &'a Option<GroupJoin>,
    significance: &'a Option<Vec<MetricSignificance>>,
    outputs: &'a [PathBuf],
}

impl AlphaOutput {
    /// Write the result tables and `summary.json` into `dir`, creating it if
    /// needed. Returns the paths of the tables written.
    pub fn write<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let mut outputs = Vec::new();

        let alpha_path = dir.join("alpha_diversity.tsv");
        match &self.join {
            Some(join) => self.table.to_tsv_grouped(&alpha_path, join)?,
            None => self.table.to_tsv(&alpha_path)?,
        }
        outputs.push(alpha_path);

        let rarefied_path = dir.join("rarefied_counts.tsv");
        self.rarefied.to_tsv(&rarefied_path)?;
        outputs.push(rarefied_path);

        if let Some(significance) = &self.significance {
            let pvalue_path = dir.join("alpha_diversity_pvalues.tsv");
            write_significance(&pvalue_path, significance)?;
            outputs.push(pvalue_path);
        }

        let summary = AlphaSummary {
            pipeline: &self.name,
            quality_filter: &self.filter,
            rarefaction_depth: self.rarefied.depth(),
            seed: self.rarefied.seed(),
            n_samples: self.rarefied.n_samples(),
            unrarefied_samples: self.rarefied.invalid_samples(),
            group_join: &self.join,
            significance: &self.significance,
            outputs: &outputs,
        };
        let file = File::create(dir.join("summary.json"))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &summary)?;

        Ok(outputs)
    }
}

fn write_significance(path: &Path, significance: &[MetricSignificance]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "metric\ttest\tstatistic\tp_value\tgroups")?;
    for entry in significance {
        match &entry.result {
            Some(r) => writeln!(
                writer,
                "{}\t{}\t{:.4}\t{:.3e}\t{}",
                entry.metric,
                r.method,
                r.statistic,
                r.p_value,
                r.groups.join(",")
            )?,
            None => writeln!(writer, "{}\tNA\tNA\tNA\t", entry.metric)?,
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::{NamedTempFile, TempDir};

    fn create_counts() -> CountMatrix {
        // 4 features × 4 samples; feature 3 fails the quality filter
        let columns = vec![
            vec![30, 10, 5, 1],
            vec![20, 20, 10, 0],
            vec![5, 30, 20, 0],
            vec![10, 10, 30, 0],
        ];
        CountMatrix::from_columns(
            (0..4).map(|i| format!("taxon_{}", i)).collect(),
            (1..=4).map(|i| format!("S{}", i)).collect(),
            &columns,
        )
        .unwrap()
    }

    fn create_metadata(rows: &[(&str, &str)]) -> Metadata {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample_id\tGroup").unwrap();
        for (sample, group) in rows {
            writeln!(file, "{}\t{}", sample, group).unwrap();
        }
        file.flush().unwrap();
        Metadata::from_tsv(file.path()).unwrap()
    }

    #[test]
    fn test_default_sequence() {
        let config = AnalysisConfig {
            show_pvalues: true,
            ..Default::default()
        };
        let pipeline = AlphaPipeline::from_config(&config);
        assert_eq!(pipeline.steps().len(), 5);
        assert!(matches!(pipeline.steps()[4], AlphaStep::CompareGroups));

        let pipeline = AlphaPipeline::from_config(&AnalysisConfig::default());
        assert_eq!(pipeline.steps().len(), 4);
    }

    #[test]
    fn test_run_filters_and_rarefies() {
        let counts = create_counts();
        let metadata = create_metadata(&[("S1", "A"), ("S2", "A"), ("S3", "B"), ("S4", "B")]);
        let output = AlphaPipeline::from_config(&AnalysisConfig::default())
            .run(&counts, &metadata)
            .unwrap();

        assert_eq!(output.rarefied.n_features(), 3);
        assert_eq!(output.rarefied.depth(), 45);
        assert_eq!(output.rarefied.n_invalid(), 0);
        assert_eq!(output.table.len(), 4);
        assert!(output.significance.is_none());
        assert_eq!(output.join.as_ref().unwrap().n_dropped(), 0);
    }

    #[test]
    fn test_two_groups_annotated() {
        let counts = create_counts();
        let metadata = create_metadata(&[("S1", "A"), ("S2", "A"), ("S3", "B"), ("S4", "B")]);
        let output = AlphaPipeline::new()
            .filter_quality(QualityThresholds::default())
            .rarefy(1)
            .diversity()
            .join_metadata("Group")
            .compare_groups()
            .run(&counts, &metadata)
            .unwrap();

        let significance = output.significance.unwrap();
        assert_eq!(significance.len(), 4);
        for entry in &significance {
            if let Some(result) = &entry.result {
                assert_eq!(result.method, crate::test::TestMethod::MannWhitneyU);
                assert!(result.p_value > 0.0 && result.p_value <= 1.0);
            }
        }
    }

    #[test]
    fn test_missing_group_column_names_step() {
        let counts = create_counts();
        let metadata = create_metadata(&[("S1", "A")]);
        let result = AlphaPipeline::new()
            .filter_quality(QualityThresholds::default())
            .rarefy(1)
            .diversity()
            .join_metadata("Treatment")
            .run(&counts, &metadata);

        match result {
            Err(DivError::Pipeline(msg)) => {
                assert!(msg.starts_with("Step 4"));
                assert!(msg.contains("Treatment"));
            }
            other => panic!("expected pipeline error, got {:?}", other.map(|o| o.name)),
        }
    }

    #[test]
    fn test_diversity_requires_rarefaction() {
        let counts = create_counts();
        let metadata = Metadata::default();
        assert!(AlphaPipeline::new().diversity().run(&counts, &metadata).is_err());
    }

    #[test]
    fn test_write_outputs() {
        let counts = create_counts();
        let metadata = create_metadata(&[("S1", "A"), ("S2", "A"), ("S3", "B")]);
        let config = AnalysisConfig {
            show_pvalues: true,
            ..Default::default()
        };
        let output = AlphaPipeline::from_config(&config).run(&counts, &metadata).unwrap();

        let dir = TempDir::new().unwrap();
        let written = output.write(dir.path().join("out")).unwrap();
        assert_eq!(written.len(), 3);

        let alpha = std::fs::read_to_string(dir.path().join("out/alpha_diversity.tsv")).unwrap();
        // S4 has no metadata row and is left out
        assert_eq!(alpha.lines().count(), 4);
        assert!(!alpha.contains("S4"));

        let summary: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("out/summary.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(summary["rarefaction_depth"], 45);
        assert_eq!(summary["group_join"]["missing_metadata"][0], "S4");
    }
}
