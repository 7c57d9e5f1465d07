//! Gene-wise dispersion estimates from the Cox-Reid adjusted profile likelihood

use ndarray::{Array1, ArrayView1, ArrayView2};
use rayon::prelude::*;

use super::DispersionParams;
use crate::data::CountDataSet;
use crate::error::{DexError, Result};
use crate::glm::{nb_log_likelihood, nb_weight, MIN_MU};
use crate::linalg::{cholesky, weighted_crossprod};

/// Grid points scanned before the golden-section refinement
const GRID_POINTS: usize = 40;
const GOLDEN_ITERATIONS: usize = 60;

/// Fitted means of a one-factor model: the size factor times the group mean
/// of the normalized counts, floored at `MIN_MU`.
pub(crate) fn group_mean_mu(y: ArrayView1<f64>, size_factors: ArrayView1<f64>, groups: &[usize], n_groups: usize) -> Vec<f64> {
    let mut sums = vec![0.0; n_groups];
    let mut sizes = vec![0usize; n_groups];
    for (s, &g) in groups.iter().enumerate() {
        sums[g] += y[s] / size_factors[s];
        sizes[g] += 1;
    }
    groups
        .iter()
        .enumerate()
        .map(|(s, &g)| (size_factors[s] * sums[g] / sizes[g].max(1) as f64).max(MIN_MU))
        .collect()
}

/// Cox-Reid adjusted profile log-likelihood at dispersion `exp(log_alpha)`
pub(crate) fn cox_reid_log_likelihood(log_alpha: f64, y: ArrayView1<f64>, mu: &[f64], x: ArrayView2<f64>) -> f64 {
    let alpha = log_alpha.exp();
    let ll: f64 = y
        .iter()
        .zip(mu)
        .map(|(&yi, &mi)| nb_log_likelihood(yi, mi, alpha))
        .sum();
    let w: Vec<f64> = mu.iter().map(|&m| nb_weight(m, alpha)).collect();
    let info = weighted_crossprod(x, &w);
    let log_det = match cholesky(info.view()) {
        Some(l) => 2.0 * l.diag().iter().map(|v| v.ln()).sum::<f64>(),
        None => return f64::NEG_INFINITY,
    };
    ll - 0.5 * log_det
}

/// Maximise a function of log dispersion over `[lo, hi]`: coarse grid scan
/// followed by golden-section search around the best grid point
pub(crate) fn maximize_log_alpha<F: Fn(f64) -> f64>(f: F, lo: f64, hi: f64) -> f64 {
    let step = (hi - lo) / (GRID_POINTS - 1) as f64;
    let grid: Vec<f64> = (0..GRID_POINTS).map(|i| lo + step * i as f64).collect();
    let values: Vec<f64> = grid.iter().map(|&g| f(g)).collect();
    let best = values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);

    let mut a = grid[best.saturating_sub(1)];
    let mut b = grid[(best + 1).min(GRID_POINTS - 1)];
    let ratio = (5.0_f64.sqrt() - 1.0) / 2.0;
    let mut c = b - ratio * (b - a);
    let mut d = a + ratio * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);
    for _ in 0..GOLDEN_ITERATIONS {
        if fc > fd {
            b = d;
            d = c;
            fd = fc;
            c = b - ratio * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + ratio * (b - a);
            fd = f(d);
        }
        if (b - a).abs() < 1e-8 {
            break;
        }
    }
    let mid = (a + b) / 2.0;
    // keep the grid optimum when the bracket refinement lands somewhere worse
    if f(mid) >= values[best] || !values[best].is_finite() {
        mid
    } else {
        grid[best]
    }
}

/// Gene-wise dispersion for one gene, bounded to `[min_disp, max_disp]`
pub fn estimate_dispersion_gene(
    y: ArrayView1<f64>,
    size_factors: ArrayView1<f64>,
    x: ArrayView2<f64>,
    groups: &[usize],
    n_groups: usize,
    params: &DispersionParams,
    max_disp: f64,
) -> f64 {
    if y.iter().all(|&v| v == 0.0) {
        return f64::NAN;
    }
    let mu = group_mean_mu(y, size_factors, groups, n_groups);
    let log_alpha = maximize_log_alpha(
        |la| cox_reid_log_likelihood(la, y, &mu, x),
        params.min_disp.ln(),
        max_disp.ln(),
    );
    log_alpha.exp().clamp(params.min_disp, max_disp)
}

/// Estimate gene-wise dispersions for all genes
pub fn estimate_gene_dispersions(dds: &mut CountDataSet, params: &DispersionParams) -> Result<()> {
    let size_factors = dds
        .size_factors()
        .ok_or_else(|| DexError::InvalidInput {
            reason: "Size factors must be estimated before dispersions".to_string(),
        })?
        .clone();
    let counts = dds.counts().counts();
    let design = dds.design();
    let max_disp = (dds.n_samples() as f64).max(10.0);

    let disp: Vec<f64> = (0..dds.n_genes())
        .into_par_iter()
        .map(|i| {
            estimate_dispersion_gene(
                counts.row(i),
                size_factors.view(),
                design.matrix.view(),
                &design.groups,
                design.n_groups(),
                params,
                max_disp,
            )
        })
        .collect();

    log::debug!(
        "gene-wise dispersions estimated for {} genes ({} all-zero)",
        disp.len(),
        disp.iter().filter(|d| d.is_nan()).count()
    );
    dds.set_gene_dispersions(Array1::from(disp))
}
