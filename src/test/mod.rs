//! Non-parametric group comparisons for diversity indices.

pub mod kruskal;
pub mod rank;

pub use group::{compare_groups, SignificanceResult, TestMethod};
pub use kruskal::{kruskal_wallis, KruskalResult};
pub use mann_whitney::{mann_whitney_u, MannWhitneyResult};
