//! Dispersion-mean trend fitting

use ndarray::Array1;

use crate::data::CountDataSet;
use crate::error::{DexError, Result};
use crate::stats::trimmed_mean;

/// Fitted relationship between mean normalized count and dispersion
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DispersionTrend {
    /// `asympt_disp + extra_pois / mean`
    Parametric { asympt_disp: f64, extra_pois: f64 },
    /// Constant dispersion for every gene
    Mean(f64),
}

impl DispersionTrend {
    /// Trended dispersion at a given mean normalized count
    pub fn eval(&self, mean: f64) -> f64 {
        match *self {
            DispersionTrend::Parametric { asympt_disp, extra_pois } => {
                if mean > 0.0 {
                    asympt_disp + extra_pois / mean
                } else {
                    asympt_disp
                }
            }
            DispersionTrend::Mean(d) => d,
        }
    }
}

const MAX_OUTER_ITER: usize = 11;
const MAX_GLM_ITER: usize = 50;

/// Fit a gamma GLM with identity link, `disp ~ a0 + a1 / mean`, by IRLS
fn fit_gamma_identity(data: &[(f64, f64)], start: (f64, f64)) -> Option<(f64, f64)> {
    let (mut a0, mut a1) = start;
    for _ in 0..MAX_GLM_ITER {
        // weights 1 / mu^2 for a gamma response with identity link
        let (mut s00, mut s01, mut s11, mut r0, mut r1) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for &(mean, disp) in data {
            let x = 1.0 / mean;
            let mu = (a0 + a1 * x).max(1e-12);
            let w = 1.0 / (mu * mu);
            s00 += w;
            s01 += w * x;
            s11 += w * x * x;
            r0 += w * disp;
            r1 += w * x * disp;
        }
        let det = s00 * s11 - s01 * s01;
        if det.abs() < 1e-300 || !det.is_finite() {
            return None;
        }
        let n0 = (s11 * r0 - s01 * r1) / det;
        let n1 = (s00 * r1 - s01 * r0) / det;
        let change = (n0 - a0).abs() + (n1 - a1).abs();
        a0 = n0;
        a1 = n1;
        if !a0.is_finite() || !a1.is_finite() {
            return None;
        }
        if change < 1e-10 * (a0.abs() + a1.abs() + 1e-10) {
            break;
        }
    }
    Some((a0, a1))
}

/// Parametric trend fit with iterative removal of genes whose residual
/// `disp / fitted` falls outside (1e-4, 15)
pub fn fit_parametric_trend(means: &[f64], dispersions: &[f64], min_disp: f64) -> Result<(f64, f64)> {
    let data: Vec<(f64, f64)> = means
        .iter()
        .zip(dispersions)
        .filter(|(&m, &d)| m > 0.0 && d.is_finite() && d >= 100.0 * min_disp)
        .map(|(&m, &d)| (m, d))
        .collect();
    if data.len() < 3 {
        return Err(DexError::TrendFittingFailed {
            reason: format!("only {} genes usable for the parametric trend", data.len()),
        });
    }

    let mut coefs = (0.1, 1.0);
    for iter in 0..MAX_OUTER_ITER {
        let good: Vec<(f64, f64)> = data
            .iter()
            .filter(|&&(m, d)| {
                let fitted = coefs.0 + coefs.1 / m;
                let r = d / fitted;
                fitted > 0.0 && r > 1e-4 && r < 15.0
            })
            .copied()
            .collect();
        if good.len() < 3 {
            return Err(DexError::TrendFittingFailed {
                reason: "too few genes left after residual filtering".to_string(),
            });
        }
        let old = coefs;
        coefs = fit_gamma_identity(&good, coefs).ok_or_else(|| DexError::TrendFittingFailed {
            reason: "gamma GLM did not converge".to_string(),
        })?;
        log::debug!(
            "trend iteration {}: {} genes, asympt_disp={:.5}, extra_pois={:.5}",
            iter + 1,
            good.len(),
            coefs.0,
            coefs.1
        );
        if coefs.0 <= 0.0 || coefs.1 <= 0.0 {
            return Err(DexError::TrendFittingFailed {
                reason: format!("coefficients not positive (a0={:.4}, a1={:.4})", coefs.0, coefs.1),
            });
        }
        let change = (coefs.0 / old.0).ln().powi(2) + (coefs.1 / old.1).ln().powi(2);
        if change < 1e-6 {
            return Ok(coefs);
        }
    }
    Err(DexError::TrendFittingFailed {
        reason: "parametric fit did not stabilise".to_string(),
    })
}

/// Fit the trend and store trended dispersions. Falls back to a constant
/// (trimmed mean) trend when the parametric fit fails.
pub fn fit_dispersion_trend(dds: &mut CountDataSet, min_disp: f64) -> Result<DispersionTrend> {
    let gene_disp = dds
        .gene_dispersions()
        .ok_or_else(|| DexError::TrendFittingFailed {
            reason: "Gene-wise dispersions must be estimated first".to_string(),
        })?
        .to_vec();
    let means = dds.base_means().ok_or_else(|| DexError::TrendFittingFailed {
        reason: "Normalized counts required for trend fitting".to_string(),
    })?;

    let trend = match fit_parametric_trend(&means, &gene_disp, min_disp) {
        Ok((asympt_disp, extra_pois)) => DispersionTrend::Parametric { asympt_disp, extra_pois },
        Err(e) => {
            log::warn!("{}; using the mean dispersion instead", e);
            let finite: Vec<f64> = gene_disp.iter().copied().filter(|d| d.is_finite()).collect();
            let usable: Vec<f64> = finite.iter().copied().filter(|d| *d > 10.0 * min_disp).collect();
            let mean = if usable.is_empty() {
                log::warn!("all gene-wise dispersions are at the minimum; the data look Poisson");
                trimmed_mean(&finite, 0.001)
            } else {
                trimmed_mean(&usable, 0.001)
            };
            if !mean.is_finite() {
                return Err(DexError::TrendFittingFailed {
                    reason: "no finite gene-wise dispersions".to_string(),
                });
            }
            DispersionTrend::Mean(mean)
        }
    };
    log::info!("dispersion trend: {:?}", trend);

    let trended: Array1<f64> = means.iter().map(|&m| trend.eval(m)).collect();
    dds.set_trended_dispersions(trended, trend)?;
    Ok(trend)
}
