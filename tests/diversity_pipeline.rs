//! Integration tests for the alpha, beta and aggregate pipelines.

use approx::assert_relative_eq;
use composable_diversity::prelude::*;
use composable_diversity::test::TestMethod;
use sprs::TriMat;
use std::io::Write;
use tempfile::{tempdir, NamedTempFile};

/// Create synthetic count data with two contrasting communities.
fn create_synthetic_counts() -> CountMatrix {
    // 12 features × 12 samples
    // - Samples 0-5: dominated by features 0-2 (low evenness)
    // - Samples 6-11: even spread over features 0-9
    // - Feature 10: rare (single sample), removed by the quality filter
    // - Feature 11: absent everywhere
    let n_features = 12;
    let n_samples = 12;
    let mut tri_mat = TriMat::new((n_features, n_samples));

    let mut rng_seed = 42u64;
    let simple_rand = |seed: &mut u64| -> f64 {
        *seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
        ((*seed >> 16) & 0x7FFF) as f64 / 32768.0
    };

    for sample in 0..n_samples {
        let uneven = sample < 6;
        for feat in 0..10 {
            let base = match (uneven, feat) {
                (true, 0..=2) => 300.0,
                (true, _) => 5.0,
                (false, _) => 100.0,
            };
            let noise = 0.9 + 0.2 * simple_rand(&mut rng_seed);
            tri_mat.add_triplet(feat, sample, (base * noise).round() as u64);
        }
    }
    tri_mat.add_triplet(10, 3, 7);

    let feature_ids: Vec<String> = (0..n_features).map(|i| format!("taxon_{}", i)).collect();
    let sample_ids: Vec<String> = (0..n_samples).map(|i| format!("sample_{}", i)).collect();
    CountMatrix::new(tri_mat.to_csr(), feature_ids, sample_ids).unwrap()
}

/// Metadata with a two-level `Group` and a three-level `site` column.
/// `sample_11` has no metadata row.
fn create_synthetic_metadata() -> Metadata {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "sample_id\tGroup\tsite").unwrap();
    for i in 0..11 {
        let group = if i < 6 { "uneven" } else { "even" };
        let site = ["north", "south", "east"][i % 3];
        writeln!(file, "sample_{}\t{}\t{}", i, group, site).unwrap();
    }
    file.flush().unwrap();
    Metadata::from_tsv(file.path()).unwrap()
}

#[test]
fn test_abundance_table_drops_annotation_column() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "species\tS1\tS2\tlineage").unwrap();
    writeln!(file, "A\t10\t0\tk__Bacteria;p__Bacteroidota").unwrap();
    writeln!(file, "B\t5\tNA\tk__Bacteria;p__Firmicutes").unwrap();
    file.flush().unwrap();

    let counts = CountMatrix::from_abundance_tsv(file.path()).unwrap();
    assert_eq!(counts.sample_ids(), &["S1", "S2"]);
    assert_eq!(counts.col_sums(), vec![15, 0]);
}

#[test]
fn test_alpha_pipeline_two_groups() {
    let counts = create_synthetic_counts();
    let metadata = create_synthetic_metadata();
    let config = AnalysisConfig {
        show_pvalues: true,
        ..Default::default()
    };

    let output = AlphaPipeline::from_config(&config)
        .run(&counts, &metadata)
        .unwrap();

    // Quality filter removes the rare and absent features
    assert_eq!(output.rarefied.n_features(), 10);
    assert_eq!(output.rarefied.n_invalid(), 0);
    for sum in output.rarefied.col_sums() {
        assert_eq!(sum, Some(output.rarefied.depth()));
    }

    let join = output.join.as_ref().unwrap();
    assert_eq!(join.missing_metadata, vec!["sample_11".to_string()]);

    let significance = output.significance.as_ref().unwrap();
    let shannon = significance
        .iter()
        .find(|s| s.metric == AlphaMetric::Shannon)
        .and_then(|s| s.result.as_ref())
        .unwrap();
    assert_eq!(shannon.method, TestMethod::MannWhitneyU);
    // Every even sample has higher Shannon diversity than every uneven one
    assert!(shannon.p_value < 0.05);

    let even: Vec<f64> = (6..11).map(|i| output.table.rows[i].shannon).collect();
    for row in &output.table.rows[..6] {
        assert!(even.iter().all(|&e| e > row.shannon));
    }
}

#[test]
fn test_alpha_pipeline_three_groups() {
    let config = AnalysisConfig {
        group_column: "site".to_string(),
        show_pvalues: true,
        ..Default::default()
    };

    let output = AlphaPipeline::from_config(&config)
        .run(&create_synthetic_counts(), &create_synthetic_metadata())
        .unwrap();

    // Observed and Chao1 may tie across every sample, which leaves no
    // variance to rank; the continuous indices always have it.
    for entry in output
        .significance
        .as_ref()
        .unwrap()
        .iter()
        .filter(|s| matches!(s.metric, AlphaMetric::Shannon | AlphaMetric::Simpson))
    {
        let result = entry.result.as_ref().unwrap();
        assert_eq!(result.method, TestMethod::KruskalWallis);
        assert_eq!(result.groups.len(), 3);
        assert!((0.0..=1.0).contains(&result.p_value));
    }
}

#[test]
fn test_alpha_outputs_on_disk() {
    let dir = tempdir().unwrap();
    let config = AnalysisConfig {
        show_pvalues: true,
        ..Default::default()
    };
    AlphaPipeline::from_config(&config)
        .run(&create_synthetic_counts(), &create_synthetic_metadata())
        .unwrap()
        .write(dir.path())
        .unwrap();

    let alpha = std::fs::read_to_string(dir.path().join("alpha_diversity.tsv")).unwrap();
    let mut lines = alpha.lines();
    assert_eq!(
        lines.next().unwrap(),
        "sample_id\tShannon\tSimpson\tObserved\tChao1\trarefied\tGroup"
    );
    // sample_11 has no metadata and is left out
    assert_eq!(lines.count(), 11);

    let pvalues = std::fs::read_to_string(dir.path().join("alpha_diversity_pvalues.tsv")).unwrap();
    assert_eq!(pvalues.lines().count(), 5);
    assert!(dir.path().join("rarefied_counts.tsv").exists());
}

#[test]
fn test_beta_pipeline_defaults() {
    let dir = tempdir().unwrap();
    let output = BetaPipeline::from_config(&AnalysisConfig::default(), None)
        .unwrap()
        .run(&create_synthetic_counts(), &create_synthetic_metadata())
        .unwrap();

    assert_eq!(output.results.len(), 3);
    for result in &output.results {
        assert_eq!(result.distances.len(), 12);
        let total: f64 = result.ordination.proportion_explained.iter().sum();
        assert!(total <= 1.0 + 1e-9);
        assert!(result.ordination.eigenvalues.windows(2).all(|w| w[0] >= w[1]));
    }

    let paths = output.write(dir.path()).unwrap();
    for metric in ["braycurtis", "jaccard", "euclidean"] {
        assert!(paths
            .iter()
            .any(|p| p.ends_with(format!("beta_diversity_{}.tsv", metric))));
    }
    assert!(dir.path().join("beta_diversity_variance.tsv").exists());
}

#[test]
fn test_beta_clr_and_unifrac() {
    let counts = create_synthetic_counts();
    let metadata = create_synthetic_metadata();

    let missing_tree = BetaPipeline::new()
        .metric(BetaMetric::WeightedUnifrac, false)
        .run(&counts, &metadata);
    assert!(matches!(missing_tree, Err(DivError::Pipeline(_))));

    let leaves: Vec<String> = (0..12).map(|i| format!("taxon_{}:1", i)).collect();
    let newick = format!("(({}):0.5,({}):0.5);", leaves[..6].join(","), leaves[6..].join(","));
    let tree = PhyloTree::from_newick(&newick).unwrap();

    let output = BetaPipeline::new()
        .metric(BetaMetric::UnweightedUnifrac, false)
        .metric(BetaMetric::Euclidean, true)
        .tree(tree)
        .run(&counts, &metadata)
        .unwrap();

    let unifrac = &output.results[0].distances;
    for i in 0..unifrac.len() {
        assert_relative_eq!(unifrac.get(i, i), 0.0);
        for j in 0..unifrac.len() {
            assert!((0.0..=1.0).contains(&unifrac.get(i, j)));
        }
    }
    assert!(output.results[1].clr);
}

#[test]
fn test_aggregate_reports() {
    let input = tempdir().unwrap();
    let header = "name\ttaxonomy_id\ttaxonomy_lvl\tkraken_assigned_reads\tadded_reads\tnew_est_reads\tfraction_total_reads";
    for (sample, reads, fraction) in [("s1", 100.0, 0.5), ("s2", 50.0, 0.25)] {
        let path = input.path().join(format!("{}.kraken2_bracken.report", sample));
        let mut file = std::fs::File::create(path).unwrap();
        writeln!(file, "{}", header).unwrap();
        writeln!(file, "Bacteroides\t816\tS\t0\t0\t{}\t{}", reads, fraction).unwrap();
        writeln!(file, "Other taxa\t2\tS\t0\t0\t{}\t{}", reads, 1.0 - fraction).unwrap();
    }

    let output = AggregatePipeline::new().top_n(1).run(input.path()).unwrap();
    let row = output
        .counts
        .feature_ids()
        .iter()
        .position(|s| s == "Bacteroides")
        .unwrap();
    assert_eq!(output.counts.row_dense(row), vec![100, 50]);

    let composition = &output.composition;
    assert_eq!(composition.labels(), vec!["Other taxa", "Other"]);
    assert_relative_eq!(composition.rows[1].1[0], 0.5);

    let out = tempdir().unwrap();
    output.write(out.path()).unwrap();
    assert!(out.path().join("raw_counts_for_deseq2.txt").exists());
    assert!(out.path().join("composition_table.tsv").exists());
}

#[test]
fn test_config_round_trip() {
    let mut config = AnalysisConfig::default();
    config.set_metrics(vec![BetaMetric::BrayCurtis, BetaMetric::WeightedUnifrac]);
    config.clr = vec![true, false];
    config.top_n = 5;

    let yaml = config.to_yaml().unwrap();
    let parsed = AnalysisConfig::from_yaml(&yaml).unwrap();
    assert_eq!(parsed, config);

    config.clr.push(true);
    assert!(matches!(
        config.validate(),
        Err(DivError::DimensionMismatch { expected: 2, actual: 3 })
    ));
}
