//! Ordination of distance matrices.

pub mod pcoa;

pub use pcoa::{pcoa, Ordination};
