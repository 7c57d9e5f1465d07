//! Normal + exponential convolution background correction

use ndarray::{Array2, ArrayView1, Axis};
use rayon::prelude::*;
use statrs::distribution::{Continuous, ContinuousCDF, Normal};

use crate::stats::density_mode;

/// Background model of one array: normal noise with mean `mu` and SD
/// `sigma`, plus exponential signal with rate `alpha`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundParams {
    pub mu: f64,
    pub sigma: f64,
    pub alpha: f64,
}

/// Estimate the background parameters of one array from its intensities
pub fn estimate_background(x: ArrayView1<f64>) -> BackgroundParams {
    let values: Vec<f64> = x.to_vec();
    let first_mode = density_mode(&values);
    let below: Vec<f64> = values.iter().copied().filter(|&v| v < first_mode).collect();
    let mu = if below.len() > 1 { density_mode(&below) } else { first_mode };

    // background SD from the left tail, reflected about the mode
    let left: Vec<f64> = values.iter().filter(|&&v| v < mu).map(|v| v - mu).collect();
    let sigma = if left.len() > 1 {
        (left.iter().map(|d| d * d).sum::<f64>() / (left.len() - 1) as f64).sqrt() * std::f64::consts::SQRT_2
    } else {
        1.0
    };

    let right: Vec<f64> = values.iter().filter(|&&v| v > mu).map(|v| v - mu).collect();
    let signal_mode = density_mode(&right);
    let alpha = if signal_mode > 0.0 && signal_mode.is_finite() {
        1.0 / signal_mode
    } else {
        1.0
    };

    BackgroundParams {
        mu,
        sigma: if sigma > 0.0 && sigma.is_finite() { sigma } else { 1.0 },
        alpha,
    }
}

/// Expected signal given the observed intensity; always positive
pub fn adjust_intensity(x: f64, params: &BackgroundParams, normal: &Normal) -> f64 {
    let s = params.sigma;
    let a = x - params.mu - params.alpha * s * s;
    let z = a / s;
    let tail = normal.cdf(z);
    let adjusted = if tail > 1e-300 {
        a + s * normal.pdf(z) / tail
    } else {
        // Mills ratio limit for very negative z
        -s / z
    };
    adjusted.max(f64::MIN_POSITIVE)
}

/// Background-correct every array (column) independently
pub fn background_correct(values: &Array2<f64>) -> Array2<f64> {
    let normal = match Normal::new(0.0, 1.0) {
        Ok(n) => n,
        Err(_) => return values.clone(),
    };
    let columns: Vec<Vec<f64>> = values
        .axis_iter(Axis(1))
        .into_par_iter()
        .map(|col| {
            let params = estimate_background(col);
            log::debug!(
                "background mu={:.2} sigma={:.2} alpha={:.5}",
                params.mu,
                params.sigma,
                params.alpha
            );
            col.iter().map(|&x| adjust_intensity(x, &params, &normal)).collect()
        })
        .collect();

    let mut out = Array2::<f64>::zeros(values.dim());
    for (j, col) in columns.into_iter().enumerate() {
        for (i, v) in col.into_iter().enumerate() {
            out[[i, j]] = v;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    #[test]
    fn test_adjusted_values_positive_and_monotone() {
        let params = BackgroundParams {
            mu: 100.0,
            sigma: 20.0,
            alpha: 0.01,
        };
        let normal = Normal::new(0.0, 1.0).unwrap();
        let xs = [10.0, 80.0, 100.0, 150.0, 1000.0];
        let adj: Vec<f64> = xs.iter().map(|&x| adjust_intensity(x, &params, &normal)).collect();
        assert!(adj.iter().all(|&v| v > 0.0));
        assert!(adj.windows(2).all(|w| w[1] > w[0]));
        // far above background the correction approaches x - mu - alpha sigma^2
        assert!((adj[4] - (1000.0 - 100.0 - 4.0)).abs() < 1e-6);
    }

    #[test]
    fn test_background_estimate_finds_noise_level() {
        // noise around 100 and a sparse long tail of signal
        let mut values: Vec<f64> = (0..400).map(|i| 100.0 + ((i * 37) % 41) as f64 - 20.0).collect();
        values.extend((0..100).map(|i| 200.0 + 30.0 * i as f64));
        let params = estimate_background(Array1::from(values).view());
        assert!(params.mu > 70.0 && params.mu < 120.0, "mu {}", params.mu);
        assert!(params.sigma > 0.0);
        assert!(params.alpha > 0.0);
    }
}
