//! Composable Diversity Analysis Library
//!
//! This library provides modular primitives for alpha and beta diversity
//! analysis of microbiome count data, plus aggregation of per-sample
//! Bracken species reports.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Core data structures (CountMatrix, Metadata, GroupJoin)
//! - **filter**: Depth and prevalence quality filter
//! - **rarefy**: Seeded subsampling to a common depth
//! - **zero**: Multiplicative zero replacement
//! - **normalize**: Centered log-ratio transform
//! - **phylo**: Newick parsing and rooted trees
//! - **diversity**: Alpha indices, beta distances and UniFrac
//! - **ordination**: Principal coordinates analysis
//! - **test**: Mann-Whitney U and Kruskal-Wallis tests
//! - **report**: Bracken report aggregation and composition tables
//! - **pipeline**: Pipeline composition and execution
//!
//! # Example
//!
//! ```no_run
//! use composable_diversity::prelude::*;
//!
//! // Load data
//! let counts = CountMatrix::from_abundance_tsv("abundance.tsv").unwrap();
//! let metadata = Metadata::from_tsv("metadata.tsv").unwrap();
//!
//! // Alpha diversity with group comparisons
//! let alpha = AlphaPipeline::new()
//!     .filter_quality(QualityThresholds::default())
//!     .rarefy(DEFAULT_SEED)
//!     .diversity()
//!     .join_metadata("Group")
//!     .compare_groups()
//!     .run(&counts, &metadata)
//!     .unwrap();
//! alpha.write("alpha_out").unwrap();
//!
//! // Bray-Curtis ordination on raw counts
//! let beta = BetaPipeline::new()
//!     .metric(BetaMetric::BrayCurtis, false)
//!     .run(&counts, &metadata)
//!     .unwrap();
//! beta.write("beta_out").unwrap();
//! ```

pub mod data;
pub mod diversity;
pub mod error;
pub mod filter;
pub mod normalize;
pub mod ordination;
pub mod phylo;
pub mod pipeline;
pub mod rarefy;
pub mod report;
pub mod test;
pub mod zero;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::data::{join_groups, CountMatrix, GroupJoin, Metadata, Variable};
    pub use crate::diversity::{
        alpha_diversity_table, beta_diversity, beta_diversity_with_options, AlphaMetric,
        AlphaTable, BetaMetric, BetaOptions, DistanceMatrix,
    };
    pub use crate::error::{DivError, Result};
    pub use crate::filter::{filter_quality, filter_quality_with_stats, QualityThresholds};
    pub use crate::normalize::{norm_clr, norm_clr_replaced, TransformedMatrix};
    pub use crate::ordination::{pcoa, Ordination};
    pub use crate::phylo::PhyloTree;
    pub use crate::pipeline::{
        AggregateOutput, AggregatePipeline, AlphaOutput, AlphaPipeline, AnalysisConfig,
        BetaOutput, BetaPipeline,
    };
    pub use crate::rarefy::{rarefy, rarefy_to_minimum, RarefiedMatrix, DEFAULT_SEED};
    pub use crate::report::{aggregate_reports, composition_table, BrackenTable, CompositionTable};
    pub use crate::test::{compare_groups, kruskal_wallis, mann_whitney_u, SignificanceResult};
    pub use crate::zero::{multiplicative_replacement, replace_zeros};
}
