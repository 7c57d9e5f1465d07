//! Regularized log transformation
//!
//! Each gene is fitted with a negative binomial GLM holding one coefficient
//! per sample, shrunk toward the gene's mean by a ridge penalty. The penalty
//! comes from the spread of per-sample log fold changes across all genes.

use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;

use crate::data::{CountDataSet, ExpressionMatrix};
use crate::dispersion::{estimate_dispersions, DispersionParams};
use crate::error::{DexError, Result};
use crate::glm::{nb_log_likelihood, nb_mean, nb_weight, MAX_BETA, MIN_MU};
use crate::linalg::{solve_spd, weighted_crossprod};
use crate::stats::match_weighted_upper_quantile_for_variance;

const RLOG_MAX_ITER: usize = 100;
const RLOG_TOL: f64 = 1e-8;
/// Penalty on the intercept, effectively unpenalized
const INTERCEPT_LAMBDA: f64 = 1e-6;

/// Output of the rlog transformation
#[derive(Debug, Clone)]
pub struct RlogResult {
    /// log2-scale values, genes x samples
    pub matrix: ExpressionMatrix,
    /// Fitted intercepts on the log2 scale (0 for all-zero genes)
    pub intercepts: Vec<f64>,
    /// Prior variance of the sample effects on the log2 scale
    pub beta_prior_var: f64,
}

/// Intercept plus one indicator column per sample
fn rlog_design(n_samples: usize) -> Array2<f64> {
    let mut x = Array2::<f64>::zeros((n_samples, n_samples + 1));
    for s in 0..n_samples {
        x[[s, 0]] = 1.0;
        x[[s, s + 1]] = 1.0;
    }
    x
}

/// Ridge-penalised IRLS for one gene; returns natural-log coefficients
fn fit_rlog_gene(
    y: ArrayView1<f64>,
    size_factors: ArrayView1<f64>,
    alpha: f64,
    x: &Array2<f64>,
    lambda: &[f64],
) -> Vec<f64> {
    let n = y.len();
    let p = x.ncols();
    let mean_nc = y.iter().zip(size_factors).map(|(c, s)| c / s).sum::<f64>() / n as f64;
    let mut beta = vec![0.0; p];
    beta[0] = mean_nc.max(0.1).ln();

    let eta = |beta: &[f64], s: usize| x.row(s).iter().zip(beta).map(|(a, b)| a * b).sum::<f64>();
    let penalized_deviance = |beta: &[f64]| {
        let dev: f64 = (0..n)
            .map(|s| -2.0 * nb_log_likelihood(y[s], nb_mean(eta(beta, s), size_factors[s]).max(MIN_MU), alpha))
            .sum();
        dev + beta.iter().zip(lambda).map(|(b, l)| l * b * b).sum::<f64>()
    };

    let mut dev_old = penalized_deviance(&beta);
    let mut w = vec![0.0; n];
    let mut z = vec![0.0; n];
    for _ in 0..RLOG_MAX_ITER {
        for s in 0..n {
            let mu = nb_mean(eta(&beta, s), size_factors[s]).max(MIN_MU);
            w[s] = nb_weight(mu, alpha);
            z[s] = (mu / size_factors[s]).ln() + (y[s] - mu) / mu;
        }
        let mut a = weighted_crossprod(x.view(), &w);
        for (j, l) in lambda.iter().enumerate() {
            a[[j, j]] += l;
        }
        let mut b = ndarray::Array1::<f64>::zeros(p);
        for s in 0..n {
            for j in 0..p {
                b[j] += x[[s, j]] * w[s] * z[s];
            }
        }
        let next = match solve_spd(a.view(), b.view()) {
            Some(next) if next.iter().all(|v| v.is_finite()) => next,
            _ => break,
        };
        beta = next.iter().map(|v| v.clamp(-MAX_BETA, MAX_BETA)).collect();

        let dev = penalized_deviance(&beta);
        if (dev - dev_old).abs() / (dev.abs() + 0.1) < RLOG_TOL {
            break;
        }
        dev_old = dev;
    }
    beta
}

/// Trended dispersions to use for the fit: re-estimated with an
/// intercept-only design when `blind`, otherwise taken from `dds`
fn rlog_dispersions(dds: &CountDataSet, blind: bool) -> Result<Vec<f64>> {
    if blind {
        let mut blind_dds = dds.blind_copy();
        estimate_dispersions(&mut blind_dds, &DispersionParams::default())?;
        return blind_dds
            .trended_dispersions()
            .map(|d| d.to_vec())
            .ok_or_else(|| DexError::InvalidInput {
                reason: "blind dispersion estimation produced no trend".to_string(),
            });
    }
    dds.trended_dispersions()
        .map(|d| d.to_vec())
        .ok_or_else(|| DexError::InvalidInput {
            reason: "blind = false requires dispersions to be estimated first".to_string(),
        })
}

/// Regularized log transformation of the counts in `dds`
pub fn rlog(dds: &CountDataSet, blind: bool) -> Result<RlogResult> {
    let size_factors = dds.size_factors().ok_or_else(|| DexError::InvalidInput {
        reason: "Size factors must be estimated before rlog".to_string(),
    })?;
    let normalized = dds.normalized_counts().ok_or_else(|| DexError::InvalidInput {
        reason: "Normalized counts must be available before rlog".to_string(),
    })?;
    let disp = rlog_dispersions(dds, blind)?;

    let counts = dds.counts().counts();
    let (n_genes, n_samples) = counts.dim();
    let base_means: Vec<f64> = normalized.rows().into_iter().map(|r| r.sum() / n_samples as f64).collect();
    let all_zero: Vec<bool> = counts.rows().into_iter().map(|r| r.iter().all(|&v| v == 0.0)).collect();

    // prior variance of sample effects from weighted log fold changes
    let mut lfcs = Vec::new();
    let mut weights = Vec::new();
    for i in (0..n_genes).filter(|&i| !all_zero[i]) {
        let w = 1.0 / (1.0 / base_means[i] + disp[i]);
        let log_base = (base_means[i] + 0.5).log2();
        for j in 0..n_samples {
            lfcs.push((normalized[[i, j]] + 0.5).log2() - log_base);
            weights.push(w);
        }
    }
    let beta_prior_var = match_weighted_upper_quantile_for_variance(&lfcs, &weights, 0.05);
    log::info!("rlog prior variance of sample effects: {:.4}", beta_prior_var);

    let ln2 = std::f64::consts::LN_2;
    let x = rlog_design(n_samples);
    let mut lambda = vec![1.0 / (beta_prior_var * ln2 * ln2); n_samples + 1];
    lambda[0] = INTERCEPT_LAMBDA;

    let fits: Vec<Option<Vec<f64>>> = (0..n_genes)
        .into_par_iter()
        .map(|i| {
            if all_zero[i] {
                None
            } else {
                Some(fit_rlog_gene(counts.row(i), size_factors.view(), disp[i], &x, &lambda))
            }
        })
        .collect();

    let mut values = Array2::<f64>::zeros((n_genes, n_samples));
    let mut intercepts = vec![0.0; n_genes];
    for (i, fit) in fits.into_iter().enumerate() {
        if let Some(beta) = fit {
            intercepts[i] = beta[0] / ln2;
            for j in 0..n_samples {
                values[[i, j]] = (beta[0] + beta[j + 1]) / ln2;
            }
        }
    }

    let matrix = ExpressionMatrix::new(
        values,
        dds.counts().gene_ids().to_vec(),
        dds.counts().sample_ids().to_vec(),
    )?;
    Ok(RlogResult {
        matrix,
        intercepts,
        beta_prior_var,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CountMatrix, SampleSheet};
    use crate::normalization::{estimate_size_factors, SizeFactorMethod};
    use ndarray::{array, Array1};

    fn dataset() -> CountDataSet {
        let counts = CountMatrix::new(
            array![
                [100.0, 110.0, 90.0, 400.0, 420.0, 380.0],
                [500.0, 520.0, 480.0, 500.0, 510.0, 490.0],
                [300.0, 310.0, 290.0, 75.0, 80.0, 70.0],
                [50.0, 55.0, 45.0, 50.0, 52.0, 48.0],
                [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
                [150.0, 160.0, 140.0, 300.0, 320.0, 280.0],
                [3.0, 0.0, 5.0, 1.0, 2.0, 0.0],
                [80.0, 85.0, 75.0, 80.0, 82.0, 78.0],
                [600.0, 620.0, 580.0, 600.0, 610.0, 590.0],
                [250.0, 260.0, 240.0, 500.0, 520.0, 480.0],
            ],
            (1..=10).map(|i| format!("g{}", i)).collect(),
            (1..=6).map(|i| format!("s{}", i)).collect(),
        )
        .unwrap();
        let mut sheet = SampleSheet::new(counts.sample_ids().to_vec()).unwrap();
        sheet
            .add_column(
                "condition",
                ["a", "a", "a", "b", "b", "b"].iter().map(|s| s.to_string()).collect(),
            )
            .unwrap();
        let mut dds = CountDataSet::new(counts, sheet, "condition", None).unwrap();
        estimate_size_factors(&mut dds, SizeFactorMethod::PosCounts).unwrap();
        dds
    }

    #[test]
    fn test_rlog_scale_and_zero_rows() {
        let dds = dataset();
        let res = rlog(&dds, true).unwrap();
        let m = res.matrix.values();
        assert!(m.iter().all(|v| v.is_finite()));
        assert!(m.row(4).iter().all(|&v| v == 0.0));
        // high-count rows sit near log2 of their normalized counts
        let sf = dds.size_factors().unwrap();
        let expected = (600.0 / sf[0]).log2();
        assert!((m[[8, 0]] - expected).abs() < 0.3, "{} vs {}", m[[8, 0]], expected);
        // group difference is shrunk below the raw 2 log2 units but keeps its sign
        let diff = m[[0, 3]] - m[[0, 0]];
        assert!(diff > 0.0 && diff < 2.0, "{}", diff);
    }

    #[test]
    fn test_shrinkage_toward_intercept() {
        let x = rlog_design(4);
        let y = array![10.0, 40.0, 10.0, 40.0];
        let sf = Array1::ones(4);
        let weak = fit_rlog_gene(y.view(), sf.view(), 0.05, &x, &[1e-6, 1e-3, 1e-3, 1e-3, 1e-3]);
        let strong = fit_rlog_gene(y.view(), sf.view(), 0.05, &x, &[1e-6, 100.0, 100.0, 100.0, 100.0]);
        let spread = |b: &[f64]| (b[2] - b[1]).abs();
        assert!(spread(&strong) < spread(&weak));
        assert!((spread(&weak) - 4.0_f64.ln()).abs() < 0.05);
    }

    #[test]
    fn test_unblinded_requires_dispersions() {
        assert!(rlog(&dataset(), false).is_err());
    }
}
