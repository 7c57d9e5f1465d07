//! Maximum a posteriori dispersion shrinkage toward the fitted trend

use ndarray::Array1;
use rayon::prelude::*;

use super::gene_wise::{cox_reid_log_likelihood, group_mean_mu, maximize_log_alpha};
use super::DispersionParams;
use crate::data::CountDataSet;
use crate::error::{DexError, Result};
use crate::stats::{mad, trigamma};

/// Prior variance of log dispersions around the trend, and the observed
/// variance of the log residuals used for outlier detection.
pub fn estimate_prior_variance(
    gene_disp: &[f64],
    trended: &[f64],
    n_samples: usize,
    n_coefs: usize,
    params: &DispersionParams,
) -> (f64, f64) {
    let residuals: Vec<f64> = gene_disp
        .iter()
        .zip(trended)
        .filter(|(&g, &t)| g.is_finite() && g >= 100.0 * params.min_disp && t > 0.0)
        .map(|(&g, &t)| g.ln() - t.ln())
        .collect();
    let var_log_disp = if residuals.is_empty() {
        f64::NAN
    } else {
        mad(&residuals).powi(2)
    };
    let dof = (n_samples - n_coefs) as f64;
    let expected = trigamma(dof / 2.0);
    let prior_var = if var_log_disp.is_finite() {
        (var_log_disp - expected).max(params.min_prior_var)
    } else {
        params.min_prior_var
    };
    (prior_var, var_log_disp)
}

/// Shrink gene-wise dispersions toward the trend and store the final values
pub fn estimate_map_dispersions(dds: &mut CountDataSet, params: &DispersionParams) -> Result<()> {
    let gene_disp = dds
        .gene_dispersions()
        .ok_or_else(|| DexError::InvalidInput {
            reason: "Gene-wise dispersions required for MAP shrinkage".to_string(),
        })?
        .to_vec();
    let trended = dds
        .trended_dispersions()
        .ok_or_else(|| DexError::InvalidInput {
            reason: "Trended dispersions required for MAP shrinkage".to_string(),
        })?
        .to_vec();
    let size_factors = dds
        .size_factors()
        .ok_or_else(|| DexError::InvalidInput {
            reason: "Size factors required for MAP shrinkage".to_string(),
        })?
        .clone();

    let design = dds.design();
    let (prior_var, var_log_disp) =
        estimate_prior_variance(&gene_disp, &trended, dds.n_samples(), design.n_coefs(), params);
    log::info!("dispersion prior variance {:.4} (log residual variance {:.4})", prior_var, var_log_disp);

    let counts = dds.counts().counts();
    let max_disp = (dds.n_samples() as f64).max(10.0);
    let lo = params.min_disp.ln();
    let hi = max_disp.ln();

    let map: Vec<f64> = (0..dds.n_genes())
        .into_par_iter()
        .map(|i| {
            if !gene_disp[i].is_finite() || !(trended[i] > 0.0) {
                return f64::NAN;
            }
            let y = counts.row(i);
            let mu = group_mean_mu(y, size_factors.view(), &design.groups, design.n_groups());
            let log_trend = trended[i].ln();
            let log_post = |la: f64| {
                cox_reid_log_likelihood(la, y, &mu, design.matrix.view())
                    - (la - log_trend).powi(2) / (2.0 * prior_var)
            };
            maximize_log_alpha(log_post, lo, hi).exp().clamp(params.min_disp, max_disp)
        })
        .collect();

    // genes far above the trend keep their own estimate
    let outlier_cut = params.outlier_sd * var_log_disp.max(0.0).sqrt();
    let outliers: Vec<bool> = gene_disp
        .iter()
        .zip(&trended)
        .map(|(&g, &t)| g.is_finite() && t > 0.0 && var_log_disp.is_finite() && g.ln() > t.ln() + outlier_cut)
        .collect();
    let final_disp: Array1<f64> = map
        .iter()
        .zip(&gene_disp)
        .zip(&outliers)
        .map(|((&m, &g), &out)| if out { g } else { m })
        .collect();

    log::info!(
        "{} genes flagged as dispersion outliers",
        outliers.iter().filter(|o| **o).count()
    );
    dds.set_dispersions(final_disp, outliers, prior_var)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prior_variance_floor() {
        let params = DispersionParams::default();
        // identical residuals give zero observed variance, so the floor applies
        let gene = vec![0.1, 0.2, 0.4];
        let trend = vec![0.1, 0.2, 0.4];
        let (prior, observed) = estimate_prior_variance(&gene, &trend, 6, 2, &params);
        assert_eq!(observed, 0.0);
        assert_eq!(prior, 0.25);
    }

    #[test]
    fn test_prior_variance_subtracts_sampling_variance() {
        let params = DispersionParams::default();
        let trend = vec![0.1; 7];
        let gene: Vec<f64> = [-3.0, -2.0, -1.0, 0.0, 1.0, 2.0, 3.0]
            .iter()
            .map(|r: &f64| 0.1 * r.exp())
            .collect();
        let (prior, observed) = estimate_prior_variance(&gene, &trend, 12, 2, &params);
        let expected = observed - trigamma(5.0);
        assert!((prior - expected).abs() < 1e-10);
        assert!(prior > 0.25);
    }
}
