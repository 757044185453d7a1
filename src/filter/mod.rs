//! Filtering primitives for count matrices.

pub mod quality;

pub use quality::{filter_quality, filter_quality_with_stats, QualityFilterResult, QualityThresholds};
