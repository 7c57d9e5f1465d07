//! Statistical testing for differential expression

mod fdr;
mod pvalue;
mod wald;

pub use fdr::benjamini_hochberg;
pub use pvalue::{normal_pvalue, t_pvalue};
pub use wald::wald_test;
