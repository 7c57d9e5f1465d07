//! Negative binomial helpers shared by the dispersion, GLM and rlog fits

use statrs::function::gamma::ln_gamma;

/// Lower bound applied to fitted means before computing weights
pub const MIN_MU: f64 = 0.5;

/// Largest absolute natural-log coefficient before a fit is considered divergent
pub const MAX_BETA: f64 = 30.0;

/// Linear predictors are clamped to this magnitude before exponentiation
const MAX_ETA: f64 = 700.0;

/// Mean from a linear predictor on the natural log scale and an offset factor
pub fn nb_mean(eta: f64, size_factor: f64) -> f64 {
    size_factor * eta.clamp(-MAX_ETA, MAX_ETA).exp()
}

/// Log probability of `y` under NB(mean `mu`, dispersion `alpha`),
/// parameterised so that Var = mu + alpha * mu^2
pub fn nb_log_likelihood(y: f64, mu: f64, alpha: f64) -> f64 {
    if mu <= 0.0 || alpha <= 0.0 {
        return f64::NEG_INFINITY;
    }
    let size = 1.0 / alpha;
    let log_denominator = (1.0 + alpha * mu).ln();
    ln_gamma(y + size) - ln_gamma(size) - ln_gamma(y + 1.0) - size * log_denominator
        + y * ((alpha * mu).ln() - log_denominator)
}

/// IRLS working weight `mu / (1 + alpha mu)`
pub fn nb_weight(mu: f64, alpha: f64) -> f64 {
    mu / (1.0 + alpha * mu)
}
