//! Count matrix representation for RNA-seq data

use std::collections::HashMap;

use ndarray::{Array2, ArrayView2, Axis};

use crate::error::{DexError, Result};

/// Deduplicate identifiers by appending _1, _2, ... to repeats
pub(crate) fn deduplicate_ids(ids: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        let count = seen.entry(id.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            out.push(id);
        } else {
            let renamed = format!("{}_{}", id, *count - 1);
            log::warn!("Duplicate identifier '{}' renamed to '{}'", id, renamed);
            out.push(renamed);
        }
    }
    out
}

/// Read counts per gene (rows) and sample (columns)
#[derive(Debug, Clone)]
pub struct CountMatrix {
    counts: Array2<f64>,
    gene_ids: Vec<String>,
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a new count matrix, validating shape and values
    pub fn new(counts: Array2<f64>, gene_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        let (n_genes, n_samples) = counts.dim();

        if gene_ids.len() != n_genes {
            return Err(DexError::DimensionMismatch {
                expected: format!("{} gene IDs", n_genes),
                got: format!("{} gene IDs", gene_ids.len()),
            });
        }
        if sample_ids.len() != n_samples {
            return Err(DexError::DimensionMismatch {
                expected: format!("{} sample IDs", n_samples),
                got: format!("{} sample IDs", sample_ids.len()),
            });
        }
        if counts.iter().any(|&x| x < 0.0 || !x.is_finite()) {
            return Err(DexError::InvalidCountMatrix {
                reason: "Counts must be non-negative finite values".to_string(),
            });
        }
        if !counts.is_empty() && counts.iter().all(|&x| x == 0.0) {
            return Err(DexError::InvalidCountMatrix {
                reason: "All samples have 0 counts for all genes".to_string(),
            });
        }
        if counts.iter().any(|&x| x != x.round()) {
            log::warn!("Some count values are not integers; negative binomial models expect integer counts");
        }

        Ok(Self {
            counts,
            gene_ids: deduplicate_ids(gene_ids),
            sample_ids,
        })
    }

    pub fn n_genes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.counts.ncols()
    }

    pub fn counts(&self) -> ArrayView2<'_, f64> {
        self.counts.view()
    }

    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Total counts per sample
    pub fn library_sizes(&self) -> Vec<f64> {
        self.counts.axis_iter(Axis(1)).map(|col| col.sum()).collect()
    }

    /// Total counts per gene
    pub fn row_sums(&self) -> Vec<f64> {
        self.counts.axis_iter(Axis(0)).map(|row| row.sum()).collect()
    }

    /// Keep genes whose total count across samples is at least `min_total`
    pub fn filter_min_total(&self, min_total: f64) -> Result<Self> {
        let keep: Vec<usize> = self
            .row_sums()
            .iter()
            .enumerate()
            .filter(|(_, &s)| s >= min_total)
            .map(|(i, _)| i)
            .collect();
        if keep.is_empty() {
            return Err(DexError::EmptyData {
                reason: format!("No genes have a total count >= {}", min_total),
            });
        }
        self.subset_genes(&keep)
    }

    pub fn subset_genes(&self, gene_indices: &[usize]) -> Result<Self> {
        let counts = self.counts.select(Axis(0), gene_indices);
        let gene_ids = gene_indices.iter().map(|&i| self.gene_ids[i].clone()).collect();
        Self::new(counts, gene_ids, self.sample_ids.clone())
    }

    pub fn subset_samples(&self, sample_indices: &[usize]) -> Result<Self> {
        let counts = self.counts.select(Axis(1), sample_indices);
        let sample_ids = sample_indices.iter().map(|&i| self.sample_ids[i].clone()).collect();
        Self::new(counts, self.gene_ids.clone(), sample_ids)
    }

    /// Round every count to the nearest integer
    pub fn rounded(&self) -> Self {
        Self {
            counts: self.counts.mapv(f64::round),
            gene_ids: self.gene_ids.clone(),
            sample_ids: self.sample_ids.clone(),
        }
    }
}
