//! Phylogenetic trees for UniFrac distances.

pub mod newick;
pub mod tree;

pub use tree::{Node, NodeId, PhyloTree};
