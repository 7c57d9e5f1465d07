//! dexflow: differential expression workflows for RNA-seq and microarray
//! data, from per-sample input files to a self-contained HTML report.
//!
//! RNA-seq counts are modelled with negative binomial GLMs and Wald tests;
//! microarray intensities go through RMA and an empirical Bayes moderated
//! linear model. Both paths share PCA, clustered heatmaps, volcano plots and
//! hypergeometric pathway enrichment.
//!
//! # Example
//!
//! ```ignore
//! use dexflow::prelude::*;
//!
//! let counts = read_count_matrix("counts.tsv")?;
//! let samples = read_sample_sheet("samples.tsv")?;
//! let mut dds = CountDataSet::new(counts, samples, "condition", Some("control"))?;
//! let table = run_negative_binomial(&mut dds, "treated", "control")?;
//! println!("{}", table.summary(0.05, 1.0));
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod data;
pub mod dispersion;
pub mod enrichment;
pub mod error;
pub mod glm;
pub mod io;
pub mod linalg;
pub mod linear_model;
pub mod microarray;
pub mod normalization;
pub mod pipeline;
pub mod plot;
pub mod report;
pub mod stats;
pub mod testing;
pub mod transform;

pub use error::{DexError, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::AnalysisConfig;
    pub use crate::data::{CountDataSet, CountMatrix, ExpressionMatrix, SampleSheet};
    pub use crate::dispersion::{estimate_dispersions, DispersionParams};
    pub use crate::enrichment::{enrich_subset, over_representation, EnrichmentParams, GeneSubset};
    pub use crate::error::{DexError, Result};
    pub use crate::glm::{fit_glm, DesignInfo, GlmFitParams};
    pub use crate::io::{read_count_matrix, read_gmt, read_intensities, read_sample_sheet, write_results, Contrast, DeTable};
    pub use crate::linear_model::{moderated_test, EbayesParams};
    pub use crate::microarray::rma;
    pub use crate::normalization::{estimate_size_factors, SizeFactorMethod};
    pub use crate::pipeline::{run_microarray, run_rnaseq, MicroarrayInputs, RnaSeqInputs};
    pub use crate::testing::{benjamini_hochberg, wald_test};
    pub use crate::transform::{rlog, RlogResult};
    pub use crate::run_negative_binomial;
}

use prelude::*;

/// Size factors (unless already set), dispersions, GLM fit and Wald test
/// of `numerator` vs `denominator`
pub fn run_negative_binomial(dds: &mut CountDataSet, numerator: &str, denominator: &str) -> Result<DeTable> {
    if !dds.has_size_factors() {
        estimate_size_factors(dds, SizeFactorMethod::Ratio)?;
    }
    estimate_dispersions(dds, &DispersionParams::default())?;
    fit_glm(dds, &GlmFitParams::default())?;
    wald_test(dds, numerator, denominator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_full_pipeline() {
        let counts = CountMatrix::new(
            array![
                [100.0, 110.0, 90.0, 400.0, 420.0, 380.0],  // up
                [500.0, 520.0, 480.0, 500.0, 510.0, 490.0], // flat
                [300.0, 310.0, 290.0, 75.0, 80.0, 70.0],    // down
                [50.0, 55.0, 45.0, 50.0, 52.0, 48.0],       // flat, low
                [200.0, 220.0, 180.0, 200.0, 210.0, 190.0], // flat, medium
                [150.0, 160.0, 140.0, 300.0, 320.0, 280.0], // up
                [400.0, 420.0, 380.0, 100.0, 110.0, 90.0],  // down
                [80.0, 85.0, 75.0, 80.0, 82.0, 78.0],       // flat
                [600.0, 620.0, 580.0, 600.0, 610.0, 590.0], // flat, high
                [250.0, 260.0, 240.0, 500.0, 520.0, 480.0], // up
            ],
            vec![
                "gene_up".into(),
                "gene_nc1".into(),
                "gene_down".into(),
                "gene_nc2".into(),
                "gene_nc3".into(),
                "gene_up2".into(),
                "gene_down2".into(),
                "gene_nc4".into(),
                "gene_nc5".into(),
                "gene_up3".into(),
            ],
            (1..=6).map(|i| format!("s{}", i)).collect(),
        )
        .unwrap();

        let mut samples = SampleSheet::new((1..=6).map(|i| format!("s{}", i)).collect()).unwrap();
        samples
            .add_column(
                "treatment",
                ["control", "control", "control", "treated", "treated", "treated"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            )
            .unwrap();

        let mut dds = CountDataSet::new(counts, samples, "treatment", Some("control")).unwrap();
        let results = run_negative_binomial(&mut dds, "treated", "control").unwrap();

        assert_eq!(results.n_rows(), 10);
        assert!(results.log2_fold_changes[0] > 1.0, "gene_up should be up-regulated");
        assert!(results.log2_fold_changes[2] < -1.0, "gene_down should be down-regulated");
        assert!(results.padj[0] < 0.05);
        assert!(results.padj[1] > 0.05);

        let summary = results.summary(0.05, 1.0);
        assert_eq!(summary.total, 10);
        println!("{}", summary);
    }
}
