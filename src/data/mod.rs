//! Core data structures: count matrices, sample metadata and metadata joins.

mod count_matrix;
pub mod join;
mod metadata;

pub use count_matrix::CountMatrix;
pub use join::{join_groups, GroupJoin};
pub use metadata::{Metadata, Variable, VariableType};
