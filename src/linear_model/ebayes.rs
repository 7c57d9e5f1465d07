//! Empirical Bayes moderation of gene-wise variances
//!
//! Residual variances are squeezed toward a common prior estimated from
//! their distribution, giving moderated t statistics with extra degrees of
//! freedom, and log-odds (B) of differential expression.

use ndarray::Array2;
use statrs::distribution::{ContinuousCDF, StudentsT};

use super::lmfit::LinearModelFit;
use crate::error::{DexError, Result};
use crate::stats::{digamma, median, trigamma, trigamma_inverse};
use crate::testing::t_pvalue;

/// Tuning of the moderation
#[derive(Debug, Clone)]
pub struct EbayesParams {
    /// Assumed proportion of differentially expressed features
    pub proportion: f64,
    /// Limits on the prior SD of non-zero coefficients, relative to sigma
    pub stdev_coef_lim: (f64, f64),
}

impl Default for EbayesParams {
    fn default() -> Self {
        Self {
            proportion: 0.01,
            stdev_coef_lim: (0.1, 4.0),
        }
    }
}

/// Moderated statistics for every feature and coefficient
#[derive(Debug, Clone)]
pub struct EbayesFit {
    pub fit: LinearModelFit,
    pub df_prior: f64,
    pub s2_prior: f64,
    pub s2_post: Vec<f64>,
    pub df_total: Vec<f64>,
    /// Prior variance of non-zero coefficients, one per coefficient
    pub var_prior: Vec<f64>,
    pub t: Array2<f64>,
    pub p_value: Array2<f64>,
    pub lods: Array2<f64>,
}

/// Fit a scaled F distribution to sample variances `x` with `df1` degrees
/// of freedom; returns (prior variance, prior df)
pub fn fit_f_dist(x: &[f64], df1: &[f64]) -> (f64, f64) {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(df1)
        .filter(|(v, d)| v.is_finite() && **d > 0.0)
        .map(|(&v, &d)| (v.max(0.0), d))
        .collect();
    if pairs.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    // guard against zero variances
    let mut m = median(&pairs.iter().map(|p| p.0).collect::<Vec<_>>());
    if m == 0.0 {
        m = 1.0;
    }
    let n = pairs.len() as f64;
    let e: Vec<f64> = pairs
        .iter()
        .map(|&(v, d)| v.max(1e-5 * m).ln() - digamma(d / 2.0) + (d / 2.0).ln())
        .collect();
    let emean = e.iter().sum::<f64>() / n;
    if pairs.len() < 2 {
        return (emean.exp(), f64::INFINITY);
    }
    let evar = e.iter().map(|v| (v - emean).powi(2)).sum::<f64>() / (n - 1.0)
        - pairs.iter().map(|&(_, d)| trigamma(d / 2.0)).sum::<f64>() / n;

    if evar > 0.0 {
        let df2 = 2.0 * trigamma_inverse(evar);
        let s2 = (emean + digamma(df2 / 2.0) - (df2 / 2.0).ln()).exp();
        (s2, df2)
    } else {
        (emean.exp(), f64::INFINITY)
    }
}

/// Prior variance of non-zero coefficients from the top `proportion` of
/// moderated t statistics
fn tmixture(t: &[f64], stdev_unscaled: &[f64], df: &[f64], proportion: f64, v0_lim: (f64, f64)) -> Option<f64> {
    let n = t.len();
    let ntarget = (proportion / 2.0 * n as f64).ceil() as usize;
    if ntarget < 1 {
        return None;
    }
    let p = (ntarget as f64 / n as f64).max(proportion);
    let max_df = df.iter().copied().fold(0.0, f64::max);
    let max_dist = StudentsT::new(0.0, 1.0, max_df).ok();

    // put every |t| on the scale of the largest df
    let mut abs_t: Vec<(f64, usize)> = t
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let a = v.abs();
            let a = match (&max_dist, df[i] < max_df) {
                (Some(md), true) => match StudentsT::new(0.0, 1.0, df[i]) {
                    Ok(d) => md.inverse_cdf(d.cdf(a)),
                    Err(_) => a,
                },
                _ => a,
            };
            (a, i)
        })
        .filter(|(a, _)| a.is_finite())
        .collect();
    abs_t.sort_by(|x, y| y.0.total_cmp(&x.0));
    abs_t.truncate(ntarget);

    let mut v0 = Vec::with_capacity(abs_t.len());
    for (r, &(tv, i)) in abs_t.iter().enumerate() {
        let v1 = stdev_unscaled[i].powi(2);
        let p0 = t_pvalue(tv, max_df);
        let ptarget = ((r as f64 + 0.5) / n as f64 - (1.0 - p) * p0) / p;
        let mut v = 0.0;
        if ptarget > p0 {
            let q = match &max_dist {
                Some(md) => md.inverse_cdf(1.0 - ptarget / 2.0),
                None => f64::NAN,
            };
            if q.is_finite() && q > 0.0 {
                v = v1 * ((tv / q).powi(2) - 1.0);
            }
        }
        v0.push(v.clamp(v0_lim.0, v0_lim.1));
    }
    if v0.is_empty() {
        None
    } else {
        Some(v0.iter().sum::<f64>() / v0.len() as f64)
    }
}

/// Empirical Bayes moderation of a (contrast) fit
pub fn ebayes(fit: LinearModelFit, params: &EbayesParams) -> Result<EbayesFit> {
    let n = fit.n_features();
    if n == 0 {
        return Err(DexError::EmptyData {
            reason: "no features to moderate".to_string(),
        });
    }
    let s2: Vec<f64> = fit.sigma.iter().map(|s| s * s).collect();
    let (s2_prior, df_prior) = fit_f_dist(&s2, &fit.df_residual);
    if !s2_prior.is_finite() {
        return Err(DexError::NumericalInstability {
            operation: "variance prior".to_string(),
            details: "no finite residual variances".to_string(),
        });
    }
    log::info!("eBayes prior: s2_prior={:.4}, df_prior={:.2}", s2_prior, df_prior);

    let s2_post: Vec<f64> = s2
        .iter()
        .zip(&fit.df_residual)
        .map(|(&v, &d)| {
            if df_prior.is_infinite() {
                s2_prior
            } else {
                (d * v + df_prior * s2_prior) / (d + df_prior)
            }
        })
        .collect();
    let df_pooled: f64 = fit.df_residual.iter().sum();
    let df_total: Vec<f64> = fit.df_residual.iter().map(|d| (d + df_prior).min(df_pooled)).collect();

    let k = fit.n_coefs();
    let mut t = Array2::<f64>::zeros((n, k));
    let mut p_value = Array2::<f64>::zeros((n, k));
    for i in 0..n {
        for j in 0..k {
            let tv = fit.coefficients[[i, j]] / (fit.stdev_unscaled[[i, j]] * s2_post[i].sqrt());
            t[[i, j]] = tv;
            p_value[[i, j]] = t_pvalue(tv, df_total[i]);
        }
    }

    // limits on the unscaled prior variance of a true effect
    let v0_lim = (
        params.stdev_coef_lim.0.powi(2) / s2_prior,
        params.stdev_coef_lim.1.powi(2) / s2_prior,
    );
    let var_prior: Vec<f64> = (0..k)
        .map(|j| {
            let col_t = t.column(j).to_vec();
            let col_su = fit.stdev_unscaled.column(j).to_vec();
            tmixture(&col_t, &col_su, &df_total, params.proportion, v0_lim).unwrap_or(1.0 / s2_prior)
        })
        .collect();

    let log_prop = (params.proportion / (1.0 - params.proportion)).ln();
    let mut lods = Array2::<f64>::zeros((n, k));
    for i in 0..n {
        for j in 0..k {
            let su2 = fit.stdev_unscaled[[i, j]].powi(2);
            let r = (su2 + var_prior[j]) / su2;
            let t2 = t[[i, j]].powi(2);
            let kernel = if df_prior > 1e6 {
                t2 * (1.0 - 1.0 / r) / 2.0
            } else {
                let d = df_total[i];
                (1.0 + d) / 2.0 * ((t2 + d) / (t2 / r + d)).ln()
            };
            lods[[i, j]] = log_prop - r.ln() / 2.0 + kernel;
        }
    }

    Ok(EbayesFit {
        fit,
        df_prior,
        s2_prior,
        s2_post,
        df_total,
        var_prior,
        t,
        p_value,
        lods,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ExpressionMatrix, SampleSheet};
    use crate::glm::DesignInfo;
    use crate::linear_model::lm_fit;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_fit_f_dist_constant_variances() {
        let x = vec![0.5; 200];
        let df = vec![4.0; 200];
        let (s2, d) = fit_f_dist(&x, &df);
        assert!(d.is_infinite());
        // log-variance mean corrected for the chi-square bias
        let expected = (0.5_f64.ln() - digamma(2.0) + 2.0_f64.ln()).exp();
        assert_abs_diff_eq!(s2, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_fit_f_dist_spread_variances() {
        // variances spread far beyond chi-square noise give a finite prior df
        let x: Vec<f64> = (0..300).map(|i| 0.05 * (1.0 + (i % 30) as f64).powi(2)).collect();
        let df = vec![4.0; 300];
        let (s2, d) = fit_f_dist(&x, &df);
        assert!(d.is_finite() && d > 0.0);
        assert!(s2 > 0.0);
    }

    fn planted_fit(n_genes: usize, noise_scale: f64, effect: f64, n_planted: usize) -> LinearModelFit {
        let samples: Vec<String> = (1..=6).map(|i| format!("a{}", i)).collect();
        let mut sheet = SampleSheet::new(samples.clone()).unwrap();
        sheet
            .add_column("group", ["c", "c", "c", "t", "t", "t"].iter().map(|s| s.to_string()).collect())
            .unwrap();
        let design = DesignInfo::one_factor(&sheet, "group", Some("c")).unwrap();
        let noise = [0.1, -0.2, 0.1, -0.1, 0.2, -0.1];
        let mut values = ndarray::Array2::<f64>::zeros((n_genes, 6));
        for g in 0..n_genes {
            let scale = noise_scale * (0.5 + (g % 7) as f64 * 0.3);
            for s in 0..6 {
                let shift = if g < n_planted && s >= 3 { effect } else { 0.0 };
                values[[g, s]] = 8.0 + shift + noise[(s + g) % 6] * scale;
            }
        }
        let expr = ExpressionMatrix::new(values, (0..n_genes).map(|g| format!("g{}", g)).collect(), samples).unwrap();
        lm_fit(&expr, &design).unwrap()
    }

    #[test]
    fn test_prior_variance_limits_scale_with_s2_prior() {
        // tiny residual variances put s2_prior far below 1
        let eb = ebayes(planted_fit(400, 0.05, 6.0, 4), &EbayesParams::default()).unwrap();
        assert!(eb.s2_prior < 0.01, "{}", eb.s2_prior);
        let upper = 16.0 / eb.s2_prior;
        let lower = 0.01 / eb.s2_prior;
        assert!(eb.var_prior[1] > 16.0, "{:?}", eb.var_prior);
        assert!(eb.var_prior[1] <= upper * (1.0 + 1e-12));
        assert!(eb.var_prior[1] >= lower);
        for g in 0..4 {
            assert!(eb.lods[[g, 1]] > 10.0, "gene {} lods {}", g, eb.lods[[g, 1]]);
        }
    }

    fn toy_fit() -> LinearModelFit {
        planted_fit(100, 1.0, 3.0, 5)
    }

    #[test]
    fn test_ebayes_ranks_planted_genes() {
        let eb = ebayes(toy_fit(), &EbayesParams::default()).unwrap();
        assert_eq!(eb.t.ncols(), 2);
        for g in 0..5 {
            assert!(eb.p_value[[g, 1]] < 1e-3, "gene {} p {}", g, eb.p_value[[g, 1]]);
            assert!(eb.lods[[g, 1]] > 0.0);
        }
        assert!(eb.p_value[[50, 1]] > 0.01);
        assert!(eb.lods[[50, 1]] < 0.0);
        // posterior variances lie between the sample variance and the prior
        for i in 0..eb.fit.n_features() {
            let s2 = eb.fit.sigma[i].powi(2);
            let (lo, hi) = if s2 < eb.s2_prior { (s2, eb.s2_prior) } else { (eb.s2_prior, s2) };
            assert!(eb.s2_post[i] >= lo - 1e-12 && eb.s2_post[i] <= hi + 1e-12);
        }
    }
}
