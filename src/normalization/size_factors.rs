//! Size factor estimation using the median of ratios method

use ndarray::{Array1, ArrayView2, Axis};

use crate::data::CountDataSet;
use crate::error::{DexError, Result};
use crate::stats::median;

/// Method for size factor estimation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeFactorMethod {
    /// Median of ratios over genes with no zero counts
    Ratio,
    /// Geometric means over positive counts only, for sparse data
    PosCounts,
}

impl std::str::FromStr for SizeFactorMethod {
    type Err = DexError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ratio" => Ok(Self::Ratio),
            "poscounts" => Ok(Self::PosCounts),
            other => Err(DexError::InvalidInput {
                reason: format!("Unknown size factor method '{}'. Use 'ratio' or 'poscounts'.", other),
            }),
        }
    }
}

/// Estimate size factors and store them (with normalized counts) on the data set
pub fn estimate_size_factors(dds: &mut CountDataSet, method: SizeFactorMethod) -> Result<()> {
    let sf = size_factors_for(dds.counts().counts(), method)?;
    log::debug!("size factors: {:?}", sf.to_vec());
    dds.set_size_factors(sf)
}

/// Size factors for a raw count matrix (genes x samples)
pub fn size_factors_for(counts: ArrayView2<f64>, method: SizeFactorMethod) -> Result<Array1<f64>> {
    let (n_genes, n_samples) = counts.dim();
    if n_genes == 0 || n_samples == 0 {
        return Err(DexError::EmptyData {
            reason: "Count matrix is empty".to_string(),
        });
    }

    // log geometric mean per usable gene
    let log_geo_means: Vec<(usize, f64)> = counts
        .axis_iter(Axis(0))
        .enumerate()
        .filter_map(|(i, row)| match method {
            SizeFactorMethod::Ratio => {
                if row.iter().all(|&x| x > 0.0) {
                    Some((i, row.iter().map(|x| x.ln()).sum::<f64>() / n_samples as f64))
                } else {
                    None
                }
            }
            SizeFactorMethod::PosCounts => {
                let log_sum: f64 = row.iter().filter(|&&x| x > 0.0).map(|x| x.ln()).sum();
                if row.iter().any(|&x| x > 0.0) {
                    Some((i, log_sum / n_samples as f64))
                } else {
                    None
                }
            }
        })
        .collect();

    if log_geo_means.is_empty() {
        return Err(DexError::SizeFactorFailed {
            reason: match method {
                SizeFactorMethod::Ratio => {
                    "Every gene contains at least one zero; try the 'poscounts' method".to_string()
                }
                SizeFactorMethod::PosCounts => "No genes with positive counts found".to_string(),
            },
        });
    }

    let mut sf = Array1::<f64>::zeros(n_samples);
    for j in 0..n_samples {
        let log_ratios: Vec<f64> = log_geo_means
            .iter()
            .filter(|(i, _)| counts[[*i, j]] > 0.0)
            .map(|(i, lg)| counts[[*i, j]].ln() - lg)
            .collect();
        sf[j] = if log_ratios.is_empty() {
            1.0
        } else {
            median(&log_ratios).exp()
        };
    }

    if method == SizeFactorMethod::PosCounts {
        // centre so the geometric mean of size factors is 1
        let log_center = sf.iter().map(|s| s.ln()).sum::<f64>() / n_samples as f64;
        sf.mapv_inplace(|s| s / log_center.exp());
    }

    if sf.iter().any(|&x| x <= 0.0 || !x.is_finite()) {
        return Err(DexError::SizeFactorFailed {
            reason: "Invalid size factors computed".to_string(),
        });
    }
    Ok(sf)
}
