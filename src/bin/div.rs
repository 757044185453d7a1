//! div - Diversity Analysis CLI
//!
//! Command-line interface for alpha/beta diversity and Bracken aggregation.

use clap::{Parser, Subcommand};
use composable_diversity::data::{CountMatrix, Metadata};
use composable_diversity::error::{DivError, Result};
use composable_diversity::phylo::PhyloTree;
use composable_diversity::pipeline::{
    parse_flag_list, parse_metric_list, AggregatePipeline, AlphaPipeline, AnalysisConfig,
    BetaPipeline,
};
use std::path::{Path, PathBuf};

/// Composable Diversity Analysis
#[derive(Parser)]
#[command(name = "div")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rarefied alpha diversity per sample, optionally with group tests
    Alpha {
        /// Species abundance TSV (last column is dropped)
        abundance: PathBuf,

        /// Sample metadata TSV
        metadata: PathBuf,

        /// Output directory (created if missing)
        output_dir: PathBuf,

        /// Metadata column holding the sample groups
        group_col: Option<String>,

        /// Non-zero to test for group differences
        show_pvalues: Option<i64>,

        /// Analysis configuration YAML
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Beta diversity distances and PCoA per metric
    Beta {
        /// Species abundance TSV (last column is dropped)
        abundance: PathBuf,

        /// Sample metadata TSV
        metadata: PathBuf,

        /// Output directory (created if missing)
        output_dir: PathBuf,

        /// Metadata column holding the sample groups
        group_col: Option<String>,

        /// Comma-separated metrics, e.g. "braycurtis,jaccard"
        metrics: Option<String>,

        /// Comma-separated CLR flags, one per metric, e.g. "0,1"
        clr: Option<String>,

        /// Newick tree for UniFrac metrics
        #[arg(long)]
        tree: Option<PathBuf>,

        /// Analysis configuration YAML
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Merge Bracken reports into count and composition tables
    Aggregate {
        /// Directory holding the reports
        input_dir: PathBuf,

        /// Output directory (created if missing)
        output_dir: PathBuf,

        /// Species kept by name in the composition table
        top_n: Option<usize>,

        /// Analysis configuration YAML
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Write the default analysis configuration
    Example {
        /// Output path for the YAML file
        #[arg(short, long, default_value = "analysis.yaml")]
        output: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Alpha {
            abundance,
            metadata,
            output_dir,
            group_col,
            show_pvalues,
            config,
        } => cmd_alpha(
            &abundance,
            &metadata,
            &output_dir,
            group_col,
            show_pvalues,
            config.as_deref(),
        ),

        Commands::Beta {
            abundance,
            metadata,
            output_dir,
            group_col,
            metrics,
            clr,
            tree,
            config,
        } => cmd_beta(
            &abundance,
            &metadata,
            &output_dir,
            group_col,
            metrics.as_deref(),
            clr.as_deref(),
            tree,
            config.as_deref(),
        ),

        Commands::Aggregate {
            input_dir,
            output_dir,
            top_n,
            config,
        } => cmd_aggregate(&input_dir, &output_dir, top_n, config.as_deref()),

        Commands::Example { output } => cmd_example(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => AnalysisConfig::from_path(path),
        None => Ok(AnalysisConfig::default()),
    }
}

fn load_inputs(abundance_path: &Path, metadata_path: &Path) -> Result<(CountMatrix, Metadata)> {
    let counts = CountMatrix::from_abundance_tsv(abundance_path)?;
    let metadata = Metadata::from_tsv(metadata_path)?;
    log::info!(
        "Loaded {} features x {} samples",
        counts.n_features(),
        counts.n_samples()
    );
    Ok((counts, metadata))
}

fn report_outputs(outputs: &[PathBuf]) {
    for path in outputs {
        log::info!("Wrote {}", path.display());
    }
}

/// Run the alpha diversity pipeline
fn cmd_alpha(
    abundance_path: &Path,
    metadata_path: &Path,
    output_dir: &Path,
    group_col: Option<String>,
    show_pvalues: Option<i64>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(group_col) = group_col {
        config.group_column = group_col;
    }
    if let Some(flag) = show_pvalues {
        config.show_pvalues = flag != 0;
    }
    config.validate()?;

    let (counts, metadata) = load_inputs(abundance_path, metadata_path)?;
    let output = AlphaPipeline::from_config(&config).run(&counts, &metadata)?;
    report_outputs(&output.write(output_dir)?);
    Ok(())
}

/// Run the beta diversity pipeline
#[allow(clippy::too_many_arguments)]
fn cmd_beta(
    abundance_path: &Path,
    metadata_path: &Path,
    output_dir: &Path,
    group_col: Option<String>,
    metrics: Option<&str>,
    clr: Option<&str>,
    tree_path: Option<PathBuf>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(group_col) = group_col {
        config.group_column = group_col;
    }
    if let Some(metrics) = metrics {
        config.set_metrics(parse_metric_list(metrics)?);
    }
    if let Some(clr) = clr {
        config.clr = parse_flag_list(clr);
    }
    if tree_path.is_some() {
        config.tree = tree_path;
    }
    config.validate()?;

    let tree = config
        .tree
        .as_ref()
        .map(PhyloTree::from_newick_file)
        .transpose()?;

    let (counts, metadata) = load_inputs(abundance_path, metadata_path)?;
    let output = BetaPipeline::from_config(&config, tree)?.run(&counts, &metadata)?;
    report_outputs(&output.write(output_dir)?);
    Ok(())
}

/// Aggregate Bracken reports
fn cmd_aggregate(
    input_dir: &Path,
    output_dir: &Path,
    top_n: Option<usize>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(top_n) = top_n {
        config.top_n = top_n;
    }
    config.validate()?;

    if !input_dir.is_dir() {
        return Err(DivError::InvalidParameter(format!(
            "Input directory {} does not exist",
            input_dir.display()
        )));
    }

    let output = AggregatePipeline::from_config(&config).run(input_dir)?;
    report_outputs(&output.write(output_dir)?);
    Ok(())
}

/// Write the default configuration
fn cmd_example(output_path: &Path) -> Result<()> {
    let yaml = AnalysisConfig::default().to_yaml()?;

    std::fs::write(output_path, &yaml)?;
    eprintln!("Wrote example configuration to {:?}", output_path);
    eprintln!();
    eprintln!("Contents:");
    println!("{}", yaml);

    Ok(())
}
