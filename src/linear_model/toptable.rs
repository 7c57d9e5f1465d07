//! Moderated results table for one coefficient or contrast

use super::ebayes::EbayesFit;
use crate::error::{DexError, Result};
use crate::io::{Contrast, DeTable, TableKind};
use crate::testing::benjamini_hochberg;

/// Table for column `coef` of a moderated fit, in the fit's feature order.
/// Use [`DeTable::ranked`] or [`DeTable::top`] for p-value order.
pub fn top_table(eb: &EbayesFit, coef: usize, contrast: Contrast) -> Result<DeTable> {
    let fit = &eb.fit;
    if coef >= fit.n_coefs() {
        return Err(DexError::InvalidContrast {
            reason: format!("coefficient {} out of range ({} coefficients)", coef, fit.n_coefs()),
        });
    }
    let mut table = DeTable::new(fit.feature_ids.clone(), contrast, TableKind::LinearModel);
    let n = fit.n_features();
    let mut lods = Vec::with_capacity(n);
    for i in 0..n {
        table.base_means[i] = fit.amean[i];
        table.log2_fold_changes[i] = fit.coefficients[[i, coef]];
        table.lfc_se[i] = fit.stdev_unscaled[[i, coef]] * eb.s2_post[i].sqrt();
        table.stat[i] = eb.t[[i, coef]];
        table.pvalues[i] = eb.p_value[[i, coef]];
        lods.push(eb.lods[[i, coef]]);
    }
    table.padj = benjamini_hochberg(&table.pvalues);
    table.b_stat = Some(lods);
    Ok(table)
}
