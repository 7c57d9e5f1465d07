//! Self-contained HTML report

mod html;

pub use html::{enrichment_table, parameter_rows, results_table, sample_table, Report};
