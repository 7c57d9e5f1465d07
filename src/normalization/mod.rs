//! Normalization for RNA-seq count data

mod size_factors;

pub use size_factors::{estimate_size_factors, size_factors_for, SizeFactorMethod};
