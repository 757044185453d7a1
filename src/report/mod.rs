//! Aggregation of per-sample classifier reports.

pub mod bracken;
pub mod composition;

pub use bracken::{
    aggregate_reports, discover_reports, read_bracken_report, BrackenTable, SpeciesProfile,
    REPORT_SUFFIX,
};
pub use composition::{composition_table, CompositionTable, OTHER_LABEL};
