//! Statistical utility functions shared across modules
//!
//! Robust location/scale estimates, quantiles, the weighted upper quantile
//! used for the rlog prior, polygamma helpers for the empirical Bayes
//! variance prior, and a kernel density mode estimate for background
//! correction.

use statrs::function::gamma::digamma as statrs_digamma;

/// qnorm(0.975), the 97.5th percentile of the standard normal
const QNORM_0975: f64 = 1.959963984540054;

/// Consistency constant making the MAD an estimate of the normal SD
const MAD_CONSTANT: f64 = 1.4826;

/// Number of grid points used by the density mode estimate
const DENSITY_GRID: usize = 512;

fn sorted_finite(x: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = x.iter().copied().filter(|v| v.is_finite()).collect();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// Arithmetic mean of the finite values (NaN when there are none)
pub fn mean(x: &[f64]) -> f64 {
    let (sum, n) = x
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Sample variance with denominator n - 1
pub fn variance(x: &[f64]) -> f64 {
    let m = mean(x);
    let vals: Vec<f64> = x.iter().copied().filter(|v| v.is_finite()).collect();
    if vals.len() < 2 {
        return f64::NAN;
    }
    vals.iter().map(|&v| (v - m) * (v - m)).sum::<f64>() / (vals.len() - 1) as f64
}

/// Median of the finite values
pub fn median(x: &[f64]) -> f64 {
    let v = sorted_finite(x);
    median_sorted(&v)
}

fn median_sorted(v: &[f64]) -> f64 {
    let n = v.len();
    if n == 0 {
        return f64::NAN;
    }
    if n % 2 == 0 {
        (v[n / 2 - 1] + v[n / 2]) / 2.0
    } else {
        v[n / 2]
    }
}

/// Median absolute deviation scaled to the normal SD
pub fn mad(x: &[f64]) -> f64 {
    let center = median(x);
    let deviations: Vec<f64> = x
        .iter()
        .filter(|v| v.is_finite())
        .map(|&v| (v - center).abs())
        .collect();
    MAD_CONSTANT * median(&deviations)
}

/// Sample quantile with linear interpolation between order statistics
/// (Hyndman and Fan type 7)
pub fn quantile(x: &[f64], prob: f64) -> f64 {
    let v = sorted_finite(x);
    quantile_sorted(&v, prob)
}

pub(crate) fn quantile_sorted(v: &[f64], prob: f64) -> f64 {
    let n = v.len();
    if n == 0 {
        return f64::NAN;
    }
    let h = (n - 1) as f64 * prob.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    v[lo] + (h - lo as f64) * (v[hi] - v[lo])
}

/// Trimmed mean dropping `trim` of the observations at each end
pub fn trimmed_mean(x: &[f64], trim: f64) -> f64 {
    let v = sorted_finite(x);
    let n = v.len();
    if n == 0 {
        return f64::NAN;
    }
    let k = ((n as f64) * trim).floor() as usize;
    let kept = &v[k..n - k];
    if kept.is_empty() {
        median_sorted(&v)
    } else {
        kept.iter().sum::<f64>() / kept.len() as f64
    }
}

/// Weighted quantile of `x`: the smallest value whose normalised cumulative
/// weight reaches `prob`, interpolated linearly between neighbours.
pub fn weighted_quantile(x: &[f64], weights: &[f64], prob: f64) -> f64 {
    let mut pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(weights.iter())
        .filter(|(xi, wi)| xi.is_finite() && wi.is_finite() && **wi > 0.0)
        .map(|(&xi, &wi)| (xi, wi))
        .collect();
    if pairs.is_empty() {
        return f64::NAN;
    }
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let total: f64 = pairs.iter().map(|p| p.1).sum();
    let target = prob.clamp(0.0, 1.0) * total;
    let mut cum = 0.0;
    for (i, &(xi, wi)) in pairs.iter().enumerate() {
        let next = cum + wi;
        if next >= target {
            if i == 0 || wi == 0.0 {
                return xi;
            }
            let prev = pairs[i - 1].0;
            let frac = (target - cum) / wi;
            return prev + frac * (xi - prev);
        }
        cum = next;
    }
    pairs[pairs.len() - 1].0
}

/// Variance of a zero-centred normal whose weighted upper `upper_quantile`
/// of absolute values matches that of `x`.
pub fn match_weighted_upper_quantile_for_variance(
    x: &[f64],
    weights: &[f64],
    upper_quantile: f64,
) -> f64 {
    let abs_x: Vec<f64> = x.iter().map(|v| v.abs()).collect();
    let q = weighted_quantile(&abs_x, weights, 1.0 - upper_quantile);
    let sd = q / QNORM_0975;
    let var = sd * sd;
    if var > 0.0 && var.is_finite() {
        var
    } else {
        1e-6
    }
}

/// Digamma function
pub fn digamma(x: f64) -> f64 {
    statrs_digamma(x)
}

/// Trigamma function (first derivative of digamma)
pub fn trigamma(x: f64) -> f64 {
    if !x.is_finite() || x <= 0.0 {
        return f64::NAN;
    }
    let mut x = x;
    let mut acc = 0.0;
    while x < 6.0 {
        acc += 1.0 / (x * x);
        x += 1.0;
    }
    let x2 = 1.0 / (x * x);
    acc + 1.0 / x
        + x2 / 2.0
        + x2 / x * (1.0 / 6.0 - x2 * (1.0 / 30.0 - x2 * (1.0 / 42.0 - x2 / 30.0)))
}

/// Tetragamma function (second derivative of digamma)
pub fn tetragamma(x: f64) -> f64 {
    if !x.is_finite() || x <= 0.0 {
        return f64::NAN;
    }
    let mut x = x;
    let mut acc = 0.0;
    while x < 6.0 {
        acc -= 2.0 / (x * x * x);
        x += 1.0;
    }
    let x2 = 1.0 / (x * x);
    acc - x2
        - x2 / x
        - x2 * x2 / 2.0
        + x2 * x2 * x2 * (1.0 / 6.0 - x2 * (1.0 / 6.0 - x2 * 3.0 / 10.0))
}

/// Solve trigamma(y) = x for y by Newton iteration on 1/trigamma
pub fn trigamma_inverse(x: f64) -> f64 {
    if !x.is_finite() || x <= 0.0 {
        return f64::NAN;
    }
    if x > 1e7 {
        return 1.0 / x.sqrt();
    }
    if x < 1e-6 {
        return 1.0 / x;
    }
    let mut y = 0.5 + 1.0 / x;
    for _ in 0..50 {
        let tri = trigamma(y);
        let dif = tri * (1.0 - tri / x) / tetragamma(y);
        y += dif;
        if -dif / y < 1e-8 {
            break;
        }
    }
    y
}

/// Gaussian kernel bandwidth by Silverman's rule of thumb
pub fn silverman_bandwidth(x: &[f64]) -> f64 {
    let v = sorted_finite(x);
    let n = v.len();
    if n < 2 {
        return 1.0;
    }
    let sd = variance(&v).sqrt();
    let iqr = quantile_sorted(&v, 0.75) - quantile_sorted(&v, 0.25);
    let mut lo = sd.min(iqr / 1.34);
    if lo <= 0.0 || !lo.is_finite() {
        lo = if sd > 0.0 { sd } else { v[0].abs().max(1.0) };
    }
    0.9 * lo * (n as f64).powf(-0.2)
}

/// Location of the maximum of a Gaussian kernel density estimate.
///
/// Values are linearly binned onto a regular grid before convolution, so the
/// cost does not grow with the product of data size and grid size.
pub fn density_mode(x: &[f64]) -> f64 {
    let v = sorted_finite(x);
    match v.len() {
        0 => return f64::NAN,
        1 => return v[0],
        _ => {}
    }
    let bw = silverman_bandwidth(&v);
    let lo = v[0] - 3.0 * bw;
    let hi = v[v.len() - 1] + 3.0 * bw;
    let dx = (hi - lo) / (DENSITY_GRID - 1) as f64;
    if dx <= 0.0 {
        return v[0];
    }

    let mut bins = vec![0.0_f64; DENSITY_GRID];
    for &xi in &v {
        let pos = (xi - lo) / dx;
        let k = (pos.floor() as usize).min(DENSITY_GRID - 2);
        let frac = pos - k as f64;
        bins[k] += 1.0 - frac;
        bins[k + 1] += frac;
    }

    let reach = ((4.0 * bw / dx).ceil() as usize).min(DENSITY_GRID);
    let kernel: Vec<f64> = (0..=reach)
        .map(|d| {
            let u = d as f64 * dx / bw;
            (-0.5 * u * u).exp()
        })
        .collect();

    let mut best = (0usize, f64::NEG_INFINITY);
    for g in 0..DENSITY_GRID {
        let start = g.saturating_sub(reach);
        let end = (g + reach).min(DENSITY_GRID - 1);
        let dens: f64 = (start..=end)
            .map(|k| bins[k] * kernel[g.abs_diff(k)])
            .sum();
        if dens > best.1 {
            best = (g, dens);
        }
    }
    lo + best.0 as f64 * dx
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_median_and_mad() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert!(median(&[]).is_nan());
        // deviations from 3: 2, 1, 0, 1, 2 -> median 1
        assert_abs_diff_eq!(mad(&[1.0, 2.0, 3.0, 4.0, 5.0]), 1.4826, epsilon = 1e-12);
    }

    #[test]
    fn test_quantile_type7() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert_abs_diff_eq!(quantile(&x, 0.25), 1.75, epsilon = 1e-12);
        assert_abs_diff_eq!(quantile(&x, 1.0), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_weighted_quantile_uniform_weights() {
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let w = vec![1.0; 5];
        let q = weighted_quantile(&x, &w, 0.6);
        assert_abs_diff_eq!(q, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_weighted_quantile_heavy_tail_weight() {
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let w = vec![1.0, 1.0, 1.0, 1.0, 100.0];
        assert!(weighted_quantile(&x, &w, 0.5) > 4.0);
    }

    #[test]
    fn test_upper_quantile_variance_positive() {
        let x = vec![0.1, -0.2, 0.3, -0.1, 0.5, -0.3, 0.2, -0.4, 0.15, -0.25];
        let w = vec![1.0; 10];
        let var = match_weighted_upper_quantile_for_variance(&x, &w, 0.05);
        assert!(var > 0.0 && var.is_finite());
        let all_zero = match_weighted_upper_quantile_for_variance(&[0.0; 4], &[1.0; 4], 0.05);
        assert_eq!(all_zero, 1e-6);
    }

    #[test]
    fn test_trigamma_known_values() {
        // trigamma(1) = pi^2 / 6
        let pi2_6 = std::f64::consts::PI.powi(2) / 6.0;
        assert_abs_diff_eq!(trigamma(1.0), pi2_6, epsilon = 1e-9);
        // trigamma(0.5) = pi^2 / 2
        assert_abs_diff_eq!(trigamma(0.5), 3.0 * pi2_6, epsilon = 1e-9);
        // tetragamma(1) = -2 * zeta(3)
        assert_abs_diff_eq!(tetragamma(1.0), -2.0 * 1.2020569031595942, epsilon = 1e-8);
    }

    #[test]
    fn test_trigamma_inverse_roundtrip() {
        for y in [0.3, 1.0, 2.5, 10.0, 150.0] {
            let x = trigamma(y);
            assert_abs_diff_eq!(trigamma_inverse(x), y, epsilon = 1e-6 * y.max(1.0));
        }
    }

    #[test]
    fn test_density_mode_unimodal() {
        let mut x = Vec::new();
        for i in 0..400 {
            let t = (i as f64 - 200.0) / 60.0;
            // symmetric cloud around 5.0, denser near the centre
            x.push(5.0 + t * t.abs());
        }
        let mode = density_mode(&x);
        assert!((mode - 5.0).abs() < 0.5, "mode was {}", mode);
    }

    #[test]
    fn test_trimmed_mean() {
        let x = [1.0, 2.0, 3.0, 4.0, 100.0];
        assert_abs_diff_eq!(trimmed_mean(&x, 0.2), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(trimmed_mean(&x, 0.0), 22.0, epsilon = 1e-12);
    }
}
