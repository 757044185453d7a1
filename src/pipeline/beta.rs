//! Beta diversity pipeline: distances, PCoA and grouping per metric.

use super::config::AnalysisConfig;
use crate::data::{join_groups, CountMatrix, GroupJoin, Metadata};
use crate::diversity::{beta_diversity_with_options, BetaMetric, BetaOptions, DistanceMatrix};
use crate::error::{DivError, Result};
use crate::normalize::norm_clr_replaced;
use crate::ordination::{pcoa, Ordination};
use crate::phylo::PhyloTree;
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Builder for the beta diversity pipeline.
///
/// Each `(metric, clr)` pair yields one distance matrix and one ordination,
/// computed on the unfiltered, unrarefied table.
#[derive(Debug, Clone)]
pub struct BetaPipeline {
    name: String,
    analyses: Vec<(BetaMetric, bool)>,
    tree: Option<PhyloTree>,
    n_axes: Option<usize>,
    options: BetaOptions,
    group_column: String,
}

impl Default for BetaPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl BetaPipeline {
    pub fn new() -> Self {
        Self {
            name: "beta".to_string(),
            analyses: Vec::new(),
            tree: None,
            n_axes: None,
            options: BetaOptions::default(),
            group_column: "Group".to_string(),
        }
    }

    /// Pipeline for the metrics, flags and grouping of `config`.
    ///
    /// # Errors
    /// `DimensionMismatch` when metrics and CLR flags differ in length.
    pub fn from_config(config: &AnalysisConfig, tree: Option<PhyloTree>) -> Result<Self> {
        let mut pipeline = Self::new()
            .group_column(&config.group_column)
            .weighted_normalized(config.weighted_normalized);
        for (metric, clr) in config.beta_analyses()? {
            pipeline = pipeline.metric(metric, clr);
        }
        if let Some(n) = config.n_axes {
            pipeline = pipeline.n_axes(n);
        }
        if let Some(tree) = tree {
            pipeline = pipeline.tree(tree);
        }
        Ok(pipeline)
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Add an ordination for `metric`, optionally on CLR-transformed data.
    pub fn metric(mut self, metric: BetaMetric, clr: bool) -> Self {
        self.analyses.push((metric, clr));
        self
    }

    pub fn tree(mut self, tree: PhyloTree) -> Self {
        self.tree = Some(tree);
        self
    }

    pub fn n_axes(mut self, n_axes: usize) -> Self {
        self.n_axes = Some(n_axes);
        self
    }

    pub fn weighted_normalized(mut self, normalized: bool) -> Self {
        self.options.weighted_normalized = normalized;
        self
    }

    pub fn group_column(mut self, column: &str) -> Self {
        self.group_column = column.to_string();
        self
    }

    pub fn analyses(&self) -> &[(BetaMetric, bool)] {
        &self.analyses
    }

    /// Run every analysis on data.
    pub fn run(&self, counts: &CountMatrix, metadata: &Metadata) -> Result<BetaOutput> {
        if self.analyses.is_empty() {
            return Err(DivError::Pipeline(
                "Pipeline must include at least one metric".to_string(),
            ));
        }
        log::info!(
            "Running pipeline '{}' with {} metric(s) on {} samples",
            self.name,
            self.analyses.len(),
            counts.n_samples()
        );

        let results = self
            .analyses
            .iter()
            .enumerate()
            .map(|(i, &(metric, clr))| {
                self.ordinate(counts, metric, clr).map_err(|e| {
                    DivError::Pipeline(format!(
                        "Step {} ({}, clr={}) failed: {}",
                        i + 1,
                        metric,
                        clr,
                        e
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let join = join_groups(counts.sample_ids(), metadata, &self.group_column)?;

        Ok(BetaOutput {
            name: self.name.clone(),
            results,
            join,
        })
    }

    fn ordinate(&self, counts: &CountMatrix, metric: BetaMetric, clr: bool) -> Result<BetaResult> {
        let data = if clr {
            norm_clr_replaced(counts)?.data
        } else {
            counts.to_dense()
        };

        let distances = beta_diversity_with_options(
            &data,
            counts.sample_ids(),
            counts.feature_ids(),
            metric,
            self.tree.as_ref(),
            &self.options,
        )?;
        let ordination = pcoa(&distances, self.n_axes)?;

        if let Some(first) = ordination.percent_explained().first() {
            log::info!("{}{}: PC1 explains {:.2}%", metric, if clr { " (CLR)" } else { "" }, first);
        }

        Ok(BetaResult {
            metric,
            clr,
            distances,
            ordination,
        })
    }
}

/// Distance matrix and ordination for one metric.
#[derive(Debug, Clone)]
pub struct BetaResult {
    pub metric: BetaMetric,
    pub clr: bool,
    pub distances: DistanceMatrix,
    pub ordination: Ordination,
}

impl BetaResult {
    /// `metric`, or `metric_clr` for CLR-transformed input.
    pub fn label(&self) -> String {
        if self.clr {
            format!("{}_clr", self.metric)
        } else {
            self.metric.to_string()
        }
    }
}

/// Everything the beta pipeline produced.
#[derive(Debug, Clone)]
pub struct BetaOutput {
    pub name: String,
    pub results: Vec<BetaResult>,
    pub join: GroupJoin,
}

#[derive(Serialize)]
struct BetaSummary<'a> {
    pipeline: &'a str,
    n_samples: usize,
    analyses: Vec<AnalysisSummary<'a>>,
    group_join: &'a GroupJoin,
    outputs: &'a [PathBuf],
}

#[derive(Serialize)]
struct AnalysisSummary<'a> {
    metric: String,
    clr: bool,
    axes: &'a [String],
    percent_explained: Vec<f64>,
    negative_eigenvalues: usize,
}

impl BetaOutput {
    pub fn get(&self, label: &str) -> Option<&BetaResult> {
        self.results.iter().find(|r| r.label() == label)
    }

    /// Write coordinates, distances, variance and `summary.json` into `dir`,
    /// creating it if needed. Returns the paths of the tables written.
    pub fn write<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let mut outputs = Vec::new();

        for result in &self.results {
            let coords_path = dir.join(format!("beta_diversity_{}.tsv", result.label()));
            result.ordination.to_tsv_grouped(&coords_path, &self.join)?;
            outputs.push(coords_path);

            let distance_path = dir.join(format!("beta_distances_{}.tsv", result.label()));
            result.distances.to_tsv(&distance_path)?;
            outputs.push(distance_path);
        }

        let variance_path = dir.join("beta_diversity_variance.tsv");
        self.write_variance(&variance_path)?;
        outputs.push(variance_path);

        let summary = BetaSummary {
            pipeline: &self.name,
            n_samples: self.join.matched.len() + self.join.n_dropped(),
            analyses: self
                .results
                .iter()
                .map(|r| AnalysisSummary {
                    metric: r.metric.to_string(),
                    clr: r.clr,
                    axes: &r.ordination.axis_names,
                    percent_explained: r.ordination.percent_explained(),
                    negative_eigenvalues: r.ordination.negative_eigenvalues,
                })
                .collect(),
            group_join: &self.join,
            outputs: &outputs,
        };
        let file = File::create(dir.join("summary.json"))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &summary)?;

        Ok(outputs)
    }

    /// Percent variance explained per metric and axis, in long format.
    fn write_variance(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "metric\taxis\teigenvalue\tpercent_explained")?;
        for result in &self.results {
            let ord = &result.ordination;
            for (axis, (eigenvalue, percent)) in ord
                .axis_names
                .iter()
                .zip(ord.eigenvalues.iter().zip(ord.percent_explained()))
            {
                writeln!(
                    writer,
                    "{}\t{}\t{:.6}\t{:.4}",
                    result.label(),
                    axis,
                    eigenvalue,
                    percent
                )?;
            }
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::{NamedTempFile, TempDir};

    fn create_counts() -> CountMatrix {
        let columns = vec![
            vec![40, 10, 0, 5],
            vec![35, 15, 2, 3],
            vec![5, 10, 40, 20],
            vec![0, 12, 35, 25],
        ];
        CountMatrix::from_columns(
            vec!["A".into(), "B".into(), "C".into(), "D".into()],
            (1..=4).map(|i| format!("S{}", i)).collect(),
            &columns,
        )
        .unwrap()
    }

    fn create_metadata() -> Metadata {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample_id\tGroup").unwrap();
        writeln!(file, "S1\tgut").unwrap();
        writeln!(file, "S2\tgut").unwrap();
        writeln!(file, "S3\tsoil").unwrap();
        file.flush().unwrap();
        Metadata::from_tsv(file.path()).unwrap()
    }

    #[test]
    fn test_default_metrics() {
        let pipeline = BetaPipeline::from_config(&AnalysisConfig::default(), None).unwrap();
        assert_eq!(
            pipeline.analyses(),
            &[
                (BetaMetric::BrayCurtis, false),
                (BetaMetric::Jaccard, false),
                (BetaMetric::Euclidean, false)
            ]
        );
    }

    #[test]
    fn test_mismatched_flags() {
        let config = AnalysisConfig {
            clr: vec![true],
            ..Default::default()
        };
        assert!(matches!(
            BetaPipeline::from_config(&config, None),
            Err(DivError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_run_separates_environments() {
        let output = BetaPipeline::new()
            .metric(BetaMetric::BrayCurtis, false)
            .metric(BetaMetric::Euclidean, true)
            .run(&create_counts(), &create_metadata())
            .unwrap();

        assert_eq!(output.results.len(), 2);
        assert_eq!(output.join.n_dropped(), 1);

        let bray = output.get("braycurtis").unwrap();
        let ord = &bray.ordination;
        // gut samples share the sign of PC1, soil samples the other
        assert!(ord.coordinate(0, 0) * ord.coordinate(1, 0) > 0.0);
        assert!(ord.coordinate(0, 0) * ord.coordinate(2, 0) < 0.0);
        assert!(output.get("euclidean_clr").is_some());
    }

    #[test]
    fn test_clr_bray_curtis_is_a_distance() {
        let output = BetaPipeline::new()
            .metric(BetaMetric::BrayCurtis, true)
            .metric(BetaMetric::Jaccard, true)
            .run(&create_counts(), &create_metadata())
            .unwrap();

        let bray = &output.get("braycurtis_clr").unwrap().distances;
        for i in 0..bray.len() {
            for j in 0..bray.len() {
                let d = bray.get(i, j);
                assert!(d.is_finite() && d >= 0.0);
            }
        }
        // gut pair and soil pair are close, across environments is far
        assert!(bray.get(0, 1) < 0.2);
        assert!(bray.get(2, 3) < 0.2);
        assert!(bray.get(0, 2) > 1.0);
        assert!(output.get("braycurtis_clr").unwrap().ordination.eigenvalues[0] > 0.0);
    }

    #[test]
    fn test_unifrac_without_tree_fails() {
        let result = BetaPipeline::new()
            .metric(BetaMetric::UnweightedUnifrac, false)
            .run(&create_counts(), &create_metadata());
        match result {
            Err(DivError::Pipeline(msg)) => {
                assert!(msg.contains("unweighted_unifrac"));
                assert!(msg.contains("tree"));
            }
            other => panic!("expected pipeline error, got {:?}", other.map(|o| o.name)),
        }
    }

    #[test]
    fn test_unifrac_with_tree() {
        let tree = PhyloTree::from_newick("((A:1,B:1):0.5,(C:1,D:1):0.5);").unwrap();
        let output = BetaPipeline::new()
            .metric(BetaMetric::WeightedUnifrac, false)
            .tree(tree)
            .run(&create_counts(), &create_metadata())
            .unwrap();
        assert_eq!(output.results[0].distances.len(), 4);
    }

    #[test]
    fn test_write_outputs() {
        let output = BetaPipeline::from_config(&AnalysisConfig::default(), None)
            .unwrap()
            .run(&create_counts(), &create_metadata())
            .unwrap();
        let dir = TempDir::new().unwrap();
        output.write(dir.path()).unwrap();

        for metric in ["braycurtis", "jaccard", "euclidean"] {
            let path = dir.path().join(format!("beta_diversity_{}.tsv", metric));
            let text = std::fs::read_to_string(path).unwrap();
            assert!(text.starts_with("sample_id\tPC1"));
            assert!(text.lines().next().unwrap().ends_with("\tGroup"));
            // S4 has no metadata row
            assert_eq!(text.lines().count(), 4);
        }

        let variance = std::fs::read_to_string(dir.path().join("beta_diversity_variance.tsv")).unwrap();
        assert!(variance.lines().any(|l| l.starts_with("braycurtis\tPC1\t")));
        assert!(dir.path().join("summary.json").exists());
    }
}
