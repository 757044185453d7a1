//! Alpha and beta diversity.

pub mod alpha;
pub mod beta;
pub mod unifrac;

pub use alpha::{alpha_diversity_table, AlphaMetric, AlphaRow, AlphaTable};
pub use beta::{
    beta_diversity, beta_diversity_with_options, BetaMetric, BetaOptions, DistanceMatrix,
};
pub use unifrac::UnifracContext;
