//! Data structures for count and expression data

mod count_matrix;
mod dataset;
mod expression;
mod metadata;

pub use count_matrix::CountMatrix;
pub use dataset::CountDataSet;
pub use expression::ExpressionMatrix;
pub use metadata::{SampleSheet, SampleSpec};
