//! Linear models for log-scale expression with moderated statistics
//!
//! Gene-wise least squares fits share one design; residual variances are
//! then moderated by empirical Bayes before computing t statistics.

mod ebayes;
mod lmfit;
mod toptable;

pub use ebayes::{ebayes, fit_f_dist, EbayesFit, EbayesParams};
pub use lmfit::{contrasts_fit, lm_fit, LinearModelFit};
pub use toptable::top_table;

use ndarray::Array2;

use crate::data::ExpressionMatrix;
use crate::error::{DexError, Result};
use crate::glm::DesignInfo;
use crate::io::{Contrast, DeTable};

/// Fit, contrast `numerator - denominator`, moderate and tabulate
pub fn moderated_test(
    expr: &ExpressionMatrix,
    design: &DesignInfo,
    numerator: &str,
    denominator: &str,
    params: &EbayesParams,
) -> Result<DeTable> {
    let fit = lm_fit(expr, design)?;
    let weights = design.contrast_vector(numerator, denominator)?;
    let contrasts = Array2::from_shape_vec((weights.len(), 1), weights).map_err(|e| DexError::InvalidContrast {
        reason: e.to_string(),
    })?;
    let name = format!("{}-{}", numerator, denominator);
    let fit = contrasts_fit(&fit, contrasts.view(), vec![name])?;
    let eb = ebayes(fit, params)?;
    top_table(&eb, 0, Contrast::new(&design.factor, numerator, denominator))
}
