//! Hypergeometric over-representation test

use std::collections::HashSet;

use statrs::distribution::{Discrete, Hypergeometric};

use crate::error::{DexError, Result};
use crate::io::GeneSet;
use crate::testing::benjamini_hochberg;

/// Set size limits and significance cutoff
#[derive(Debug, Clone)]
pub struct EnrichmentParams {
    pub pvalue_cutoff: f64,
    pub min_set_size: usize,
    pub max_set_size: usize,
}

impl Default for EnrichmentParams {
    fn default() -> Self {
        Self {
            pvalue_cutoff: 0.05,
            min_set_size: 10,
            max_set_size: 500,
        }
    }
}

/// One tested gene set
#[derive(Debug, Clone)]
pub struct EnrichedTerm {
    pub name: String,
    pub description: String,
    /// Query genes in the set
    pub overlap: usize,
    /// Set size within the universe
    pub set_size: usize,
    /// Query genes within the universe
    pub query_size: usize,
    pub universe_size: usize,
    pub pvalue: f64,
    pub padj: f64,
    pub genes: Vec<String>,
}

impl EnrichedTerm {
    /// overlap / query size
    pub fn gene_ratio(&self) -> f64 {
        self.overlap as f64 / self.query_size as f64
    }

    /// set size / universe size
    pub fn background_ratio(&self) -> f64 {
        self.set_size as f64 / self.universe_size as f64
    }

    pub fn fold_enrichment(&self) -> f64 {
        self.gene_ratio() / self.background_ratio()
    }
}

/// All tested terms for one gene subset, ordered by p-value
#[derive(Debug, Clone)]
pub struct EnrichmentResult {
    pub subset: String,
    pub terms: Vec<EnrichedTerm>,
    pub pvalue_cutoff: f64,
}

impl EnrichmentResult {
    /// Terms with adjusted p-value below the cutoff
    pub fn enriched(&self) -> Vec<&EnrichedTerm> {
        self.terms.iter().filter(|t| t.padj < self.pvalue_cutoff).collect()
    }
}

/// `P(X >= k)` for `X ~ Hypergeometric(universe, set, query)`
pub fn hypergeometric_upper_tail(k: u64, universe: u64, set_size: u64, query: u64) -> f64 {
    if k == 0 {
        return 1.0;
    }
    match Hypergeometric::new(universe, set_size, query) {
        Ok(dist) => {
            let max = set_size.min(query);
            (k..=max).map(|x| dist.pmf(x)).sum::<f64>().min(1.0)
        }
        Err(_) => f64::NAN,
    }
}

/// Test every size-eligible set for over-representation of `query` genes.
///
/// Returns [`DexError::NoEnrichedTerms`] when no set passes the cutoff,
/// including when the query has no genes in the universe.
pub fn over_representation(
    subset: &str,
    query: &[String],
    universe: &[String],
    sets: &[GeneSet],
    params: &EnrichmentParams,
) -> Result<EnrichmentResult> {
    let annotated: HashSet<&str> = sets.iter().flat_map(|s| s.genes.iter().map(String::as_str)).collect();
    let universe: HashSet<&str> = universe.iter().map(String::as_str).filter(|g| annotated.contains(g)).collect();
    let query: HashSet<&str> = query.iter().map(String::as_str).filter(|g| universe.contains(g)).collect();
    log::info!(
        "enrichment ({}): {} query genes, universe of {} annotated genes",
        subset,
        query.len(),
        universe.len()
    );
    if query.is_empty() {
        return Err(DexError::NoEnrichedTerms {
            subset: subset.to_string(),
        });
    }

    let mut terms: Vec<EnrichedTerm> = Vec::new();
    for set in sets {
        let members: Vec<&str> = set.genes.iter().map(String::as_str).filter(|g| universe.contains(g)).collect();
        if members.len() < params.min_set_size || members.len() > params.max_set_size {
            continue;
        }
        let genes: Vec<String> = members.iter().filter(|g| query.contains(*g)).map(|g| g.to_string()).collect();
        if genes.is_empty() {
            continue;
        }
        let pvalue = hypergeometric_upper_tail(
            genes.len() as u64,
            universe.len() as u64,
            members.len() as u64,
            query.len() as u64,
        );
        terms.push(EnrichedTerm {
            name: set.name.clone(),
            description: set.description.clone(),
            overlap: genes.len(),
            set_size: members.len(),
            query_size: query.len(),
            universe_size: universe.len(),
            pvalue,
            padj: f64::NAN,
            genes,
        });
    }

    let pvalues: Vec<f64> = terms.iter().map(|t| t.pvalue).collect();
    for (t, q) in terms.iter_mut().zip(benjamini_hochberg(&pvalues)) {
        t.padj = q;
    }
    terms.sort_by(|a, b| a.pvalue.total_cmp(&b.pvalue).then_with(|| a.name.cmp(&b.name)));

    let result = EnrichmentResult {
        subset: subset.to_string(),
        terms,
        pvalue_cutoff: params.pvalue_cutoff,
    };
    let n_enriched = result.enriched().len();
    log::info!("enrichment ({}): {} of {} terms enriched", subset, n_enriched, result.terms.len());
    if n_enriched == 0 {
        return Err(DexError::NoEnrichedTerms {
            subset: subset.to_string(),
        });
    }
    Ok(result)
}
