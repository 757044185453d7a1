//! Rooted phylogenetic tree stored as a node arena.

use crate::error::{DivError, Result};
use std::path::Path;

/// Index into the tree's node arena.
pub type NodeId = usize;

/// A single node of a [`PhyloTree`].
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Length of the branch leading to this node from its parent.
    pub branch_length: Option<f64>,
    pub name: Option<String>,
}

impl Node {
    pub fn is_tip(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Branch length, with a missing length read as zero.
    pub fn length(&self) -> f64 {
        self.branch_length.unwrap_or(0.0)
    }
}

/// A rooted tree whose tips name features of an abundance table.
#[derive(Debug, Clone)]
pub struct PhyloTree {
    nodes: Vec<Node>,
    root: NodeId,
}

impl PhyloTree {
    /// Build a tree from an arena and the index of its root.
    pub fn from_nodes(nodes: Vec<Node>, root: NodeId) -> Result<Self> {
        if nodes.is_empty() {
            return Err(DivError::Newick("tree has no nodes".to_string()));
        }
        if root >= nodes.len() {
            return Err(DivError::Newick(format!(
                "root index {} out of range ({} nodes)",
                root,
                nodes.len()
            )));
        }
        if nodes
            .iter()
            .filter_map(|n| n.branch_length)
            .any(|l| l < 0.0 || !l.is_finite())
        {
            return Err(DivError::Newick(
                "branch lengths must be finite and non-negative".to_string(),
            ));
        }
        Ok(Self { nodes, root })
    }

    /// Parse a Newick string.
    pub fn from_newick(input: &str) -> Result<Self> {
        super::newick::parse(input)
    }

    /// Read and parse a Newick file.
    pub fn from_newick_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let tree = Self::from_newick(&text)?;
        log::info!(
            "Loaded tree from {} ({} tips)",
            path.as_ref().display(),
            tree.tip_count()
        );
        Ok(tree)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn tip_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_tip()).count()
    }

    /// Names of the tips in arena order.
    pub fn tip_names(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.is_tip())
            .filter_map(|n| n.name.as_deref())
            .collect()
    }

    /// Find the tip carrying `name`.
    ///
    /// An exact match wins; otherwise underscores in tip names are read as
    /// spaces, the usual Newick encoding of blanks in unquoted labels.
    pub fn find_tip(&self, name: &str) -> Option<NodeId> {
        let tips = || self.nodes.iter().filter(|n| n.is_tip());
        tips()
            .find(|n| n.name.as_deref() == Some(name))
            .or_else(|| {
                tips().find(|n| {
                    n.name
                        .as_deref()
                        .map_or(false, |t| t.replace('_', " ") == name)
                })
            })
            .map(|n| n.id)
    }

    /// Node ids with every child listed before its parent.
    pub fn postorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().copied());
        }
        order.reverse();
        order
    }

    /// Summed branch length from the root to each node.
    pub fn root_distances(&self) -> Vec<f64> {
        let mut dist = vec![0.0; self.nodes.len()];
        for id in self.postorder().into_iter().rev() {
            if let Some(parent) = self.nodes[id].parent {
                dist[id] = dist[parent] + self.nodes[id].length();
            }
        }
        dist
    }

    /// Total branch length of the tree, excluding the root's own branch.
    pub fn total_length(&self) -> f64 {
        self.nodes
            .iter()
            .filter(|n| n.id != self.root)
            .map(Node::length)
            .sum()
    }
}
