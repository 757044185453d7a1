//! Zero handling ahead of log-ratio transforms.

pub mod replacement;

pub use replacement::{multiplicative_replacement, replace_zeros, replacement_delta};
