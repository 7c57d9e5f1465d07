//! Dispersion estimation for negative binomial models
//!
//! Gene-wise maximum likelihood, a dispersion-mean trend, then shrinkage of
//! the gene-wise values toward the trend.

mod gene_wise;
mod map;
mod trend;

pub use gene_wise::{estimate_dispersion_gene, estimate_gene_dispersions};
pub use map::{estimate_map_dispersions, estimate_prior_variance};
pub use trend::{fit_dispersion_trend, fit_parametric_trend, DispersionTrend};

use crate::data::CountDataSet;
use crate::error::{DexError, Result};

/// Configurable parameters for dispersion estimation
#[derive(Debug, Clone)]
pub struct DispersionParams {
    /// Lower bound for any dispersion estimate
    pub min_disp: f64,
    /// Genes this many SDs above the trend keep their gene-wise estimate
    pub outlier_sd: f64,
    /// Lower bound for the log-dispersion prior variance
    pub min_prior_var: f64,
}

impl Default for DispersionParams {
    fn default() -> Self {
        Self {
            min_disp: 1e-8,
            outlier_sd: 2.0,
            min_prior_var: 0.25,
        }
    }
}

/// Estimate gene-wise, trended and final dispersions
pub fn estimate_dispersions(dds: &mut CountDataSet, params: &DispersionParams) -> Result<()> {
    let design = dds.design();
    if design.n_samples() <= design.n_coefs() {
        return Err(DexError::InvalidDesign {
            reason: "as many or more coefficients than samples; no replicates for dispersion estimation"
                .to_string(),
        });
    }

    estimate_gene_dispersions(dds, params)?;
    fit_dispersion_trend(dds, params.min_disp)?;
    estimate_map_dispersions(dds, params)?;
    Ok(())
}
