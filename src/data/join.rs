//! Joining per-sample results to a metadata grouping column.
//!
//! Samples without a metadata row, or whose group value is missing, cannot be
//! placed in a group. They are dropped from grouped output, but the join keeps
//! their IDs so callers can report the loss instead of hiding it.

use crate::data::Metadata;
use crate::error::{DivError, Result};
use serde::{Deserialize, Serialize};

/// Outcome of joining a list of sample IDs to one metadata column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupJoin {
    /// Name of the grouping column.
    pub group_column: String,
    /// `(index into the joined sample list, group label)` for matched samples.
    pub matched: Vec<(usize, String)>,
    /// Samples with no metadata row.
    pub missing_metadata: Vec<String>,
    /// Samples with a metadata row but no value in the group column.
    pub missing_group: Vec<String>,
}

impl GroupJoin {
    /// Number of samples dropped by the join.
    pub fn n_dropped(&self) -> usize {
        self.missing_metadata.len() + self.missing_group.len()
    }

    /// Group label for the sample at `index`, if it was matched.
    pub fn label_of(&self, index: usize) -> Option<&str> {
        self.matched
            .iter()
            .find(|(i, _)| *i == index)
            .map(|(_, label)| label.as_str())
    }

    /// Distinct group labels in order of first appearance.
    pub fn groups(&self) -> Vec<String> {
        let mut groups: Vec<String> = Vec::new();
        for (_, label) in &self.matched {
            if !groups.contains(label) {
                groups.push(label.clone());
            }
        }
        groups
    }

    /// Partition per-sample values by group.
    ///
    /// `values[i]` belongs to the `i`-th joined sample. Samples for which
    /// `include(i)` is false are left out.
    pub fn partition<F>(&self, values: &[f64], include: F) -> Vec<(String, Vec<f64>)>
    where
        F: Fn(usize) -> bool,
    {
        self.groups()
            .into_iter()
            .map(|group| {
                let members = self
                    .matched
                    .iter()
                    .filter(|(i, label)| *label == group && include(*i))
                    .filter_map(|(i, _)| values.get(*i).copied())
                    .collect();
                (group, members)
            })
            .collect()
    }
}

/// Join sample IDs to the `group_column` of `metadata`.
///
/// Fails only when the column itself does not exist; unmatched samples are
/// recorded in the returned [`GroupJoin`].
pub fn join_groups(
    sample_ids: &[String],
    metadata: &Metadata,
    group_column: &str,
) -> Result<GroupJoin> {
    if !metadata.has_column(group_column) {
        return Err(DivError::MissingColumn(group_column.to_string()));
    }

    let mut join = GroupJoin {
        group_column: group_column.to_string(),
        matched: Vec::with_capacity(sample_ids.len()),
        missing_metadata: Vec::new(),
        missing_group: Vec::new(),
    };

    for (idx, sample_id) in sample_ids.iter().enumerate() {
        if !metadata.has_sample(sample_id) {
            join.missing_metadata.push(sample_id.clone());
            continue;
        }
        match metadata.group_label(sample_id, group_column) {
            Some(label) => join.matched.push((idx, label)),
            None => join.missing_group.push(sample_id.clone()),
        }
    }

    if join.n_dropped() > 0 {
        log::warn!(
            "{} of {} samples dropped when joining to metadata column '{}' (no metadata row: {:?}, no group value: {:?})",
            join.n_dropped(),
            sample_ids.len(),
            group_column,
            join.missing_metadata,
            join.missing_group
        );
    }

    Ok(join)
}
