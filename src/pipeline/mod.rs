//! End-to-end workflows: one invocation reads the inputs, runs the analysis
//! top to bottom and writes one HTML report plus result tables

mod microarray;
mod rnaseq;

pub use microarray::{run_microarray, summarize_arrays, MicroarrayInputs};
pub use rnaseq::{load_counts, run_rnaseq, transform_counts, RnaSeqInputs};

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::AnalysisConfig;
use crate::data::SampleSheet;
use crate::enrichment::{enrich_subset, GeneSubset};
use crate::error::{DexError, Result};
use crate::io::{read_annotation, read_gmt, read_sample_sheet, write_results, DeTable, GeneAnnotation, ResultsSummary};
use crate::plot::enrichment_dotplot;
use crate::report::{enrichment_table, results_table, Report};

/// Files written by a workflow, with the significance contingency table
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub report: PathBuf,
    pub results: PathBuf,
    pub significant: PathBuf,
    pub matrix: PathBuf,
    pub summary: ResultsSummary,
}

/// Sample sheet from a file, else from the config's inline table
pub fn load_sample_sheet(path: Option<&Path>, config: &AnalysisConfig) -> Result<SampleSheet> {
    if let Some(path) = path {
        log::info!("reading sample sheet {}", path.display());
        return read_sample_sheet(path);
    }
    config.inline_sample_sheet()?.ok_or_else(|| DexError::InvalidSampleSheet {
        reason: "no sample sheet file given and no inline samples in the config".to_string(),
    })
}

pub(crate) fn load_annotation(path: Option<&Path>) -> Result<Option<GeneAnnotation>> {
    path.map(read_annotation).transpose()
}

/// Condition label of every sample, in sheet order
pub(crate) fn conditions_of(sheet: &SampleSheet, condition: &str) -> Result<Vec<String>> {
    sheet
        .column(condition)
        .map(<[String]>::to_vec)
        .ok_or_else(|| DexError::InvalidSampleSheet {
            reason: format!("condition column '{}' not found", condition),
        })
}

/// Display labels for feature ids: annotated symbol when known
pub(crate) fn feature_labels(ids: &[String], annotation: Option<&GeneAnnotation>) -> Vec<String> {
    match annotation {
        Some(a) => a.symbols_for(ids),
        None => ids.to_vec(),
    }
}

/// Log and record one line per stage of the row count trail
pub(crate) fn log_row_count(trail: &mut Vec<Vec<String>>, stage: &str, rows: usize) {
    log::info!("{}: {} rows", stage, rows);
    trail.push(vec![stage.to_string(), rows.to_string()]);
}

/// Write the full and the significant-only result tables
pub(crate) fn write_tables(
    out_dir: &Path,
    table: &DeTable,
    config: &AnalysisConfig,
) -> Result<(PathBuf, PathBuf)> {
    let results = out_dir.join("results_all.tsv");
    let significant = out_dir.join("results_significant.tsv");
    let ranked = table.top(table.n_rows());
    write_results(&results, &ranked)?;
    write_results(&significant, &table.filter_significant(config.alpha, config.lfc_threshold()))?;
    log::info!("result tables written to {}", out_dir.display());
    Ok((results, significant))
}

/// Contingency table and top rows of the results
pub(crate) fn add_results_section(report: &mut Report, table: &DeTable, summary: &ResultsSummary, rows: usize) {
    report.heading("Differential expression");
    report.paragraph(&format!("Contrast: {}", table.contrast.label()));
    report.subheading("Contingency table");
    report.summary(summary);
    let (headers, body) = results_table(table, rows);
    report.subheading(&format!("Top {} rows", body.len()));
    report.table(&headers, &body);
}

/// Enrichment for the up, down and all-significant subsets. A subset with
/// no enriched term gets a note instead of a plot; other errors propagate.
pub(crate) fn add_enrichment_section(
    report: &mut Report,
    table: &DeTable,
    gene_sets: Option<&Path>,
    config: &AnalysisConfig,
) -> Result<()> {
    let path = match gene_sets {
        Some(p) => p,
        None => return Ok(()),
    };
    let sets = read_gmt(path)?;
    let params = config.enrichment_params();
    report.heading("Pathway enrichment");
    report.paragraph(&format!(
        "{} gene sets from {}; sets of {} to {} genes, adjusted p-value < {}",
        sets.len(),
        path.display(),
        config.min_set_size,
        config.max_set_size,
        config.pvalue_cutoff
    ));
    for subset in GeneSubset::ALL {
        report.subheading(&format!("{} genes", subset));
        match enrich_subset(table, subset, &sets, config.alpha, config.lfc_threshold(), &params) {
            Ok(result) => {
                report.figure(&enrichment_dotplot(&result), &format!("Enriched terms, {} genes", subset));
                let (headers, rows) = enrichment_table(&result);
                report.table(&headers, &rows);
            }
            Err(e @ DexError::NoEnrichedTerms { .. }) => {
                log::warn!("{}", e);
                report.note(&e.to_string());
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    Ok(())
}
