//! UniFrac distances over a table whose features are tree tips.

use crate::error::{DivError, Result};
use crate::phylo::{NodeId, PhyloTree};

/// A tree bound to the feature order of an abundance table.
///
/// Binding resolves every feature to its tip once, so pairwise distances only
/// propagate abundances up the tree.
#[derive(Debug, Clone)]
pub struct UnifracContext<'a> {
    tree: &'a PhyloTree,
    postorder: Vec<NodeId>,
    tips: Vec<NodeId>,
    root_distances: Vec<f64>,
}

impl<'a> UnifracContext<'a> {
    /// Bind `tree` to `feature_ids`.
    ///
    /// # Errors
    /// `Configuration` if a feature is not a tip of the tree.
    pub fn new(tree: &'a PhyloTree, feature_ids: &[String]) -> Result<Self> {
        let tips = feature_ids
            .iter()
            .map(|id| {
                tree.find_tip(id).ok_or_else(|| {
                    DivError::Configuration(format!(
                        "Feature '{}' is not a tip of the phylogenetic tree",
                        id
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            tree,
            postorder: tree.postorder(),
            tips,
            root_distances: tree.root_distances(),
        })
    }

    /// Sum of `values` below each node, indexed by node id.
    fn propagate(&self, values: &[f64]) -> Vec<f64> {
        let mut below = vec![0.0; self.tree.node_count()];
        for (&tip, &value) in self.tips.iter().zip(values) {
            below[tip] += value;
        }
        for &id in &self.postorder {
            if let Some(parent) = self.tree.nodes()[id].parent {
                below[parent] += below[id];
            }
        }
        below
    }

    /// Branches other than the root's own, with their lengths.
    fn branches(&self) -> impl Iterator<Item = (NodeId, f64)> + '_ {
        let root = self.tree.root();
        self.tree
            .nodes()
            .iter()
            .filter(move |n| n.id != root)
            .map(|n| (n.id, n.length()))
    }

    /// Unweighted UniFrac: unique branch length over observed branch length.
    ///
    /// Two empty samples are at distance 0.
    pub fn unweighted(&self, a: &[f64], b: &[f64]) -> f64 {
        let below_a = self.propagate(a);
        let below_b = self.propagate(b);

        let mut unique = 0.0;
        let mut observed = 0.0;
        for (id, length) in self.branches() {
            let in_a = below_a[id] > 0.0;
            let in_b = below_b[id] > 0.0;
            if in_a || in_b {
                observed += length;
                if in_a != in_b {
                    unique += length;
                }
            }
        }

        if observed == 0.0 {
            0.0
        } else {
            unique / observed
        }
    }

    /// Weighted UniFrac, `Σ b |pA - pB|` over branches.
    ///
    /// With `normalized`, the sum is divided by
    /// `Σ_tips d_root(tip) (pA + pB)`, bounding the distance to `[0, 1]`.
    pub fn weighted(&self, a: &[f64], b: &[f64], normalized: bool) -> f64 {
        let pa = proportions(a);
        let pb = proportions(b);
        let below_a = self.propagate(&pa);
        let below_b = self.propagate(&pb);

        let distance: f64 = self
            .branches()
            .map(|(id, length)| length * (below_a[id] - below_b[id]).abs())
            .sum();

        if !normalized {
            return distance;
        }

        let scale: f64 = self
            .tips
            .iter()
            .zip(pa.iter().zip(&pb))
            .map(|(&tip, (x, y))| self.root_distances[tip] * (x + y))
            .sum();
        if scale == 0.0 {
            0.0
        } else {
            distance / scale
        }
    }
}

fn proportions(values: &[f64]) -> Vec<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        values.iter().map(|v| v / total).collect()
    } else {
        vec![0.0; values.len()]
    }
}
