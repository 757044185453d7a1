//! Rarefaction: subsampling each sample to a common sequencing depth.

pub mod subsample;

pub use subsample::{
    rarefaction_depth, rarefy, rarefy_column, rarefy_to_minimum, RarefiedMatrix, DEFAULT_SEED,
};
