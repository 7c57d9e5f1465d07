//! Transformations of count data for visualization (PCA, heatmaps)

mod rlog;

pub use rlog::{rlog, RlogResult};
