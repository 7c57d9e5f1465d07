//! CountDataSet - counts, sample sheet, design and the fitted model state

use ndarray::{Array1, Array2, Array3};

use super::{CountMatrix, SampleSheet};
use crate::dispersion::DispersionTrend;
use crate::error::{DexError, Result};
use crate::glm::DesignInfo;

/// Main data structure for negative binomial differential expression.
///
/// Analysis steps fill the optional fields in order: size factors,
/// dispersions, then the GLM fit.
#[derive(Debug, Clone)]
pub struct CountDataSet {
    counts: CountMatrix,
    samples: SampleSheet,
    design: DesignInfo,

    size_factors: Option<Array1<f64>>,
    normalized_counts: Option<Array2<f64>>,

    gene_dispersions: Option<Array1<f64>>,
    trended_dispersions: Option<Array1<f64>>,
    dispersions: Option<Array1<f64>>,
    dispersion_outliers: Option<Vec<bool>>,
    dispersion_trend: Option<DispersionTrend>,
    dispersion_prior_var: Option<f64>,

    coefficients: Option<Array2<f64>>,
    covariances: Option<Array3<f64>>,
    converged: Option<Vec<bool>>,
}

impl CountDataSet {
    /// Create a data set with design `~ factor`. Count columns missing from
    /// the sample sheet are dropped and the sheet is reordered to match the
    /// remaining columns. Without `reference` the first level in sheet order
    /// is the reference.
    pub fn new(counts: CountMatrix, samples: SampleSheet, factor: &str, reference: Option<&str>) -> Result<Self> {
        let reference = match reference {
            Some(r) => r.to_string(),
            None => samples.levels(factor)?.into_iter().next().ok_or_else(|| DexError::InvalidDesign {
                reason: format!("Design factor '{}' has no levels", factor),
            })?,
        };

        let keep: Vec<usize> = counts
            .sample_ids()
            .iter()
            .enumerate()
            .filter(|(_, id)| samples.sample_ids().contains(id))
            .map(|(j, _)| j)
            .collect();
        if keep.is_empty() {
            return Err(DexError::InvalidSampleSheet {
                reason: "No count matrix column is listed in the sample sheet".to_string(),
            });
        }
        let counts = if keep.len() < counts.n_samples() {
            let dropped: Vec<&str> = counts
                .sample_ids()
                .iter()
                .filter(|id| !samples.sample_ids().contains(id))
                .map(|id| id.as_str())
                .collect();
            log::warn!("dropping count columns not in the sample sheet: {}", dropped.join(", "));
            counts.subset_samples(&keep)?
        } else {
            counts
        };

        let samples = samples.reorder_to(counts.sample_ids()).map_err(|e| DexError::InvalidSampleSheet {
            reason: format!("Sample sheet does not cover the count matrix columns: {}", e),
        })?;
        if samples.n_samples() != counts.n_samples() {
            return Err(DexError::DimensionMismatch {
                expected: format!("{} samples", counts.n_samples()),
                got: format!("{} samples", samples.n_samples()),
            });
        }
        let design = DesignInfo::one_factor(&samples, factor, Some(&reference))?;
        Ok(Self::with_design(counts, samples, design))
    }

    /// Create a data set with an explicit design
    pub fn with_design(counts: CountMatrix, samples: SampleSheet, design: DesignInfo) -> Self {
        Self {
            counts,
            samples,
            design,
            size_factors: None,
            normalized_counts: None,
            gene_dispersions: None,
            trended_dispersions: None,
            dispersions: None,
            dispersion_outliers: None,
            dispersion_trend: None,
            dispersion_prior_var: None,
            coefficients: None,
            covariances: None,
            converged: None,
        }
    }

    /// Copy of this data set with an intercept-only design, keeping size factors
    pub fn blind_copy(&self) -> Self {
        let mut copy = Self::with_design(
            self.counts.clone(),
            self.samples.clone(),
            DesignInfo::intercept_only(self.n_samples()),
        );
        copy.size_factors = self.size_factors.clone();
        copy.normalized_counts = self.normalized_counts.clone();
        copy
    }

    pub fn counts(&self) -> &CountMatrix {
        &self.counts
    }

    pub fn samples(&self) -> &SampleSheet {
        &self.samples
    }

    pub fn design(&self) -> &DesignInfo {
        &self.design
    }

    pub fn n_genes(&self) -> usize {
        self.counts.n_genes()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.n_samples()
    }

    pub fn size_factors(&self) -> Option<&Array1<f64>> {
        self.size_factors.as_ref()
    }

    pub fn has_size_factors(&self) -> bool {
        self.size_factors.is_some()
    }

    pub fn normalized_counts(&self) -> Option<&Array2<f64>> {
        self.normalized_counts.as_ref()
    }

    /// Mean of normalized counts per gene
    pub fn base_means(&self) -> Option<Vec<f64>> {
        let n = self.n_samples() as f64;
        self.normalized_counts
            .as_ref()
            .map(|nc| nc.rows().into_iter().map(|r| r.sum() / n).collect())
    }

    pub fn gene_dispersions(&self) -> Option<&Array1<f64>> {
        self.gene_dispersions.as_ref()
    }

    pub fn trended_dispersions(&self) -> Option<&Array1<f64>> {
        self.trended_dispersions.as_ref()
    }

    /// Final (shrunken) dispersions used for testing
    pub fn dispersions(&self) -> Option<&Array1<f64>> {
        self.dispersions.as_ref()
    }

    pub fn has_dispersions(&self) -> bool {
        self.dispersions.is_some()
    }

    pub fn dispersion_outliers(&self) -> Option<&[bool]> {
        self.dispersion_outliers.as_deref()
    }

    pub fn dispersion_trend(&self) -> Option<&DispersionTrend> {
        self.dispersion_trend.as_ref()
    }

    pub fn dispersion_prior_var(&self) -> Option<f64> {
        self.dispersion_prior_var
    }

    pub fn coefficients(&self) -> Option<&Array2<f64>> {
        self.coefficients.as_ref()
    }

    pub fn covariances(&self) -> Option<&Array3<f64>> {
        self.covariances.as_ref()
    }

    pub fn converged(&self) -> Option<&[bool]> {
        self.converged.as_deref()
    }

    /// Set size factors and recompute normalized counts
    pub fn set_size_factors(&mut self, size_factors: Array1<f64>) -> Result<()> {
        if size_factors.len() != self.n_samples() {
            return Err(DexError::DimensionMismatch {
                expected: format!("{} size factors", self.n_samples()),
                got: format!("{} size factors", size_factors.len()),
            });
        }
        if size_factors.iter().any(|&s| s <= 0.0 || !s.is_finite()) {
            return Err(DexError::SizeFactorFailed {
                reason: "Size factors must be positive and finite".to_string(),
            });
        }
        let mut normalized = self.counts.counts().to_owned();
        for (j, mut col) in normalized.columns_mut().into_iter().enumerate() {
            col.mapv_inplace(|x| x / size_factors[j]);
        }
        self.normalized_counts = Some(normalized);
        self.size_factors = Some(size_factors);
        Ok(())
    }

    fn check_gene_len(&self, len: usize, what: &str) -> Result<()> {
        if len != self.n_genes() {
            return Err(DexError::DimensionMismatch {
                expected: format!("{} {}", self.n_genes(), what),
                got: format!("{} {}", len, what),
            });
        }
        Ok(())
    }

    pub fn set_gene_dispersions(&mut self, values: Array1<f64>) -> Result<()> {
        self.check_gene_len(values.len(), "gene-wise dispersions")?;
        self.gene_dispersions = Some(values);
        Ok(())
    }

    pub fn set_trended_dispersions(&mut self, values: Array1<f64>, trend: DispersionTrend) -> Result<()> {
        self.check_gene_len(values.len(), "trended dispersions")?;
        self.trended_dispersions = Some(values);
        self.dispersion_trend = Some(trend);
        Ok(())
    }

    pub fn set_dispersions(&mut self, values: Array1<f64>, outliers: Vec<bool>, prior_var: f64) -> Result<()> {
        self.check_gene_len(values.len(), "dispersions")?;
        self.check_gene_len(outliers.len(), "outlier flags")?;
        self.dispersions = Some(values);
        self.dispersion_outliers = Some(outliers);
        self.dispersion_prior_var = Some(prior_var);
        Ok(())
    }

    pub fn set_fit(&mut self, coefficients: Array2<f64>, covariances: Array3<f64>, converged: Vec<bool>) -> Result<()> {
        self.check_gene_len(coefficients.nrows(), "coefficient rows")?;
        self.check_gene_len(converged.len(), "convergence flags")?;
        self.coefficients = Some(coefficients);
        self.covariances = Some(covariances);
        self.converged = Some(converged);
        Ok(())
    }
}
