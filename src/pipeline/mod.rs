//! Pipeline composition and execution for diversity analysis.

mod aggregate;
mod alpha;
mod beta;
mod config;

pub use aggregate::{AggregateOutput, AggregatePipeline};
pub use alpha::{AlphaOutput, AlphaPipeline, AlphaStep, MetricSignificance};
pub use beta::{BetaOutput, BetaPipeline, BetaResult};
pub use config::{parse_flag_list, parse_metric_list, AnalysisConfig};
