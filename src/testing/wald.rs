//! Wald test for differential expression

use super::fdr::benjamini_hochberg;
use super::pvalue::normal_pvalue;
use crate::data::CountDataSet;
use crate::error::{DexError, Result};
use crate::io::{Contrast, DeTable, TableKind};
use crate::linalg::quadratic_form;

/// Wald test of `numerator` vs `denominator` levels of the design factor.
///
/// The log2 fold change is `c'b / ln 2` for the contrast vector `c`, its
/// standard error `sqrt(c' S c) / ln 2`. Genes with all-zero counts or a
/// failed fit get NaN statistics and are excluded from the BH adjustment.
pub fn wald_test(dds: &CountDataSet, numerator: &str, denominator: &str) -> Result<DeTable> {
    let coefficients = dds.coefficients().ok_or_else(|| DexError::InvalidContrast {
        reason: "GLM must be fitted before testing".to_string(),
    })?;
    let covariances = dds.covariances().ok_or_else(|| DexError::InvalidContrast {
        reason: "Coefficient covariances not available".to_string(),
    })?;
    let base_means = dds.base_means().ok_or_else(|| DexError::InvalidContrast {
        reason: "Size factors must be estimated before testing".to_string(),
    })?;

    let design = dds.design();
    let c = design.contrast_vector(numerator, denominator)?;
    let ln2 = std::f64::consts::LN_2;

    let mut table = DeTable::new(
        dds.counts().gene_ids().to_vec(),
        Contrast::new(&design.factor, numerator, denominator),
        TableKind::NegativeBinomial,
    );
    table.base_means = base_means;

    for i in 0..dds.n_genes() {
        let beta = coefficients.row(i);
        if beta.iter().any(|b| !b.is_finite()) {
            continue;
        }
        let cov = covariances.index_axis(ndarray::Axis(0), i);
        let var = quadratic_form(cov, &c);
        if !(var > 0.0) {
            continue;
        }
        let lfc = beta.iter().zip(&c).map(|(b, w)| b * w).sum::<f64>() / ln2;
        let se = var.sqrt() / ln2;
        let stat = lfc / se;
        table.log2_fold_changes[i] = lfc;
        table.lfc_se[i] = se;
        table.stat[i] = stat;
        table.pvalues[i] = normal_pvalue(stat);
    }
    table.padj = benjamini_hochberg(&table.pvalues);

    log::info!(
        "Wald test {}: {} of {} genes tested",
        table.contrast.label(),
        table.pvalues.iter().filter(|p| p.is_finite()).count(),
        table.n_rows()
    );
    Ok(table)
}
