//! Pathway over-representation analysis of differentially expressed genes
//!
//! Each gene set is tested with the hypergeometric upper tail against a
//! universe of tested genes that belong to at least one set.

mod ora;

pub use ora::{over_representation, EnrichedTerm, EnrichmentParams, EnrichmentResult};

use std::fmt;

use crate::error::Result;
use crate::io::{DeTable, GeneSet};

/// Gene subsets tested for enrichment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneSubset {
    Up,
    Down,
    All,
}

impl GeneSubset {
    pub const ALL: [GeneSubset; 3] = [GeneSubset::Up, GeneSubset::Down, GeneSubset::All];
}

impl fmt::Display for GeneSubset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneSubset::Up => write!(f, "up-regulated"),
            GeneSubset::Down => write!(f, "down-regulated"),
            GeneSubset::All => write!(f, "all significant"),
        }
    }
}

/// Test one subset of `table`. Genes are matched to sets by symbol when the
/// table is annotated, otherwise by id; the universe is every tested row.
pub fn enrich_subset(
    table: &DeTable,
    subset: GeneSubset,
    sets: &[GeneSet],
    alpha: f64,
    lfc_threshold: f64,
    params: &EnrichmentParams,
) -> Result<EnrichmentResult> {
    let universe: Vec<String> = (0..table.n_rows())
        .filter(|&i| table.padj[i].is_finite())
        .map(|i| table.label(i).to_string())
        .collect();
    let query: Vec<String> = table
        .significant(alpha, lfc_threshold)
        .into_iter()
        .filter(|&i| match subset {
            GeneSubset::Up => table.log2_fold_changes[i] > 0.0,
            GeneSubset::Down => table.log2_fold_changes[i] < 0.0,
            GeneSubset::All => true,
        })
        .map(|i| table.label(i).to_string())
        .collect();
    over_representation(&subset.to_string(), &query, &universe, sets, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DexError;
    use crate::io::{Contrast, TableKind};

    fn table() -> DeTable {
        let ids: Vec<String> = (0..60).map(|i| format!("G{}", i)).collect();
        let mut t = DeTable::new(ids, Contrast::new("c", "b", "a"), TableKind::NegativeBinomial);
        for i in 0..60 {
            t.padj[i] = if i < 12 { 0.001 } else { 0.9 };
            t.pvalues[i] = t.padj[i];
            t.log2_fold_changes[i] = if i < 12 { 3.0 } else { 0.1 };
        }
        t
    }

    #[test]
    fn test_up_subset_enriched_down_subset_empty() {
        let sets = vec![
            GeneSet {
                name: "UP_SET".into(),
                description: String::new(),
                genes: (0..12).map(|i| format!("G{}", i)).collect(),
            },
            GeneSet {
                name: "OTHER".into(),
                description: String::new(),
                genes: (20..60).map(|i| format!("G{}", i)).collect(),
            },
        ];
        let params = EnrichmentParams::default();
        let up = enrich_subset(&table(), GeneSubset::Up, &sets, 0.05, 1.0, &params).unwrap();
        assert_eq!(up.enriched()[0].name, "UP_SET");
        assert_eq!(up.subset, "up-regulated");
        let down = enrich_subset(&table(), GeneSubset::Down, &sets, 0.05, 1.0, &params);
        assert!(matches!(down, Err(DexError::NoEnrichedTerms { .. })));
    }
}
