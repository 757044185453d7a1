//! Log-ratio transforms for compositional data.

pub mod clr;

pub use clr::{norm_clr, norm_clr_replaced, TransformedMatrix};
