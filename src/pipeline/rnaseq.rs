//! RNA-seq workflow: quantifications to negative binomial Wald tests,
//! regularized-log figures, enrichment and report

use std::path::{Path, PathBuf};

use super::{
    add_enrichment_section, add_results_section, conditions_of, ensure_dir, feature_labels, load_annotation,
    load_sample_sheet, log_row_count, write_tables, PipelineOutput,
};
use crate::analysis::{most_variable, pca};
use crate::config::{AnalysisConfig, RNASEQ_HEATMAP_GENES};
use crate::data::{CountDataSet, CountMatrix, SampleSheet};
use crate::dispersion::{estimate_dispersions, DispersionParams};
use crate::error::{DexError, Result};
use crate::glm::{fit_glm, GlmFitParams};
use crate::io::{import_quantifications, read_count_matrix, read_tx2gene, write_expression_matrix};
use crate::normalization::{estimate_size_factors, SizeFactorMethod};
use crate::plot::{heatmap, pca_plot, volcano_plot};
use crate::report::{parameter_rows, sample_table, Report};
use crate::testing::wald_test;
use crate::transform::{rlog, RlogResult};

/// Input files of the RNA-seq workflow
#[derive(Debug, Clone, Default)]
pub struct RnaSeqInputs {
    /// Sample sheet; the config's inline samples are used when absent
    pub sample_sheet: Option<PathBuf>,
    /// Directory searched for per-sample quantification files
    pub quant_dir: Option<PathBuf>,
    /// Plain gene x sample count matrix, instead of quantification files
    pub counts: Option<PathBuf>,
    /// Transcript to gene table for gene-level summarisation
    pub tx2gene: Option<PathBuf>,
    pub annotation: Option<PathBuf>,
    /// GMT gene sets for enrichment
    pub gene_sets: Option<PathBuf>,
    pub out_dir: PathBuf,
}

/// Counts from a plain matrix or from per-sample quantifications
pub fn load_counts(inputs: &RnaSeqInputs, sheet: &SampleSheet) -> Result<CountMatrix> {
    if let Some(path) = &inputs.counts {
        log::info!("reading count matrix {}", path.display());
        return Ok(read_count_matrix(path)?.rounded());
    }
    let mut import = import_quantifications(sheet, inputs.quant_dir.as_deref())?;
    if let Some(path) = &inputs.tx2gene {
        let map = read_tx2gene(path)?;
        import = import.summarize_to_gene(&map)?;
    }
    import.count_matrix()
}

/// Pre-filtered data set with size factors
fn prepare_dataset(
    inputs: &RnaSeqInputs,
    config: &AnalysisConfig,
    trail: &mut Vec<Vec<String>>,
) -> Result<CountDataSet> {
    let sheet = load_sample_sheet(inputs.sample_sheet.as_deref(), config)?;
    let counts = load_counts(inputs, &sheet)?;
    log_row_count(trail, "imported", counts.n_genes());
    let counts = counts.filter_min_total(config.min_total_count)?;
    log_row_count(trail, &format!("total count >= {}", config.min_total_count), counts.n_genes());

    let mut dds = CountDataSet::new(counts, sheet, &config.condition, config.reference.as_deref())?;
    size_factors_with_fallback(&mut dds)?;
    Ok(dds)
}

/// Median-of-ratios size factors, or poscounts when no gene is positive in
/// every sample. Any other failure is returned as is.
fn size_factors_with_fallback(dds: &mut CountDataSet) -> Result<()> {
    match estimate_size_factors(dds, SizeFactorMethod::Ratio) {
        Err(e @ DexError::SizeFactorFailed { .. }) => {
            log::warn!("{}; falling back to poscounts size factors", e);
            estimate_size_factors(dds, SizeFactorMethod::PosCounts)
        }
        other => other,
    }
}

/// Regularized-log matrix only, written to `output`
pub fn transform_counts(inputs: &RnaSeqInputs, config: &AnalysisConfig, output: &Path) -> Result<RlogResult> {
    let mut trail = Vec::new();
    let mut dds = prepare_dataset(inputs, config, &mut trail)?;
    if !config.rlog_blind {
        estimate_dispersions(&mut dds, &DispersionParams::default())?;
    }
    let result = rlog(&dds, config.rlog_blind)?;
    write_expression_matrix(output, &result.matrix)?;
    log::info!("rlog matrix written to {}", output.display());
    Ok(result)
}

/// Full RNA-seq analysis and report
pub fn run_rnaseq(inputs: &RnaSeqInputs, config: &AnalysisConfig) -> Result<PipelineOutput> {
    config.validate()?;
    ensure_dir(&inputs.out_dir)?;
    let mut trail = Vec::new();
    let mut dds = prepare_dataset(inputs, config, &mut trail)?;
    let (numerator, denominator) = config.resolve_contrast(&dds.design().levels)?;
    log::info!(
        "comparing {} vs {} on '{}' ({} samples)",
        numerator,
        denominator,
        config.condition,
        dds.n_samples()
    );

    estimate_dispersions(&mut dds, &DispersionParams::default())?;
    fit_glm(&mut dds, &GlmFitParams::default())?;
    let mut table = wald_test(&dds, &numerator, &denominator)?;
    let annotation = load_annotation(inputs.annotation.as_deref())?;
    if let Some(a) = &annotation {
        table.annotate(a);
    }

    let summary = table.summary(config.alpha, config.lfc_threshold());
    log::info!("significance contingency table:\n{}", summary);
    log_row_count(&mut trail, "significant", summary.significant());

    let rlog_result = rlog(&dds, config.rlog_blind)?;
    let matrix = inputs.out_dir.join("rlog.tsv");
    write_expression_matrix(&matrix, &rlog_result.matrix)?;
    let (results, significant) = write_tables(&inputs.out_dir, &table, config)?;

    let conditions = conditions_of(dds.samples(), &config.condition)?;
    let title = config
        .title
        .clone()
        .unwrap_or_else(|| format!("RNA-seq differential expression: {} vs {}", numerator, denominator));
    let mut report = Report::new(&title);

    report.heading("Parameters");
    let params = parameter_rows(
        config,
        &[
            ("contrast", table.contrast.label()),
            ("heatmap rows", config.heatmap_genes_or(RNASEQ_HEATMAP_GENES).to_string()),
            ("rlog blind", config.rlog_blind.to_string()),
        ],
    );
    report.table(&["parameter", "value"], &params);
    report.heading("Samples");
    let (headers, rows) = sample_table(dds.samples());
    report.table(&headers, &rows);
    report.heading("Row counts");
    report.table(&["stage", "rows"], &trail);

    report.heading("Sample structure");
    let pcs = pca(&rlog_result.matrix, config.pca_top_genes, 2)?;
    report.figure(
        &pca_plot(&pcs, &conditions),
        &format!("PCA of regularized-log counts, {} most variable genes", pcs.n_features),
    );
    let top = most_variable(&rlog_result.matrix, config.heatmap_genes_or(RNASEQ_HEATMAP_GENES))?;
    let labels = feature_labels(top.feature_ids(), annotation.as_ref());
    report.figure(
        &heatmap(&top, Some(labels.as_slice()), &conditions),
        &format!("{} most variable genes, regularized-log, row-centred", top.n_features()),
    );

    add_results_section(&mut report, &table, &summary, config.report_rows);
    report.figure(
        &volcano_plot(&table, config.alpha, config.lfc_threshold()),
        "Volcano plot; dashed lines mark the cutoffs",
    );
    add_enrichment_section(&mut report, &table, inputs.gene_sets.as_deref(), config)?;

    let report_path = inputs.out_dir.join("report.html");
    report.write(&report_path)?;
    Ok(PipelineOutput {
        report: report_path,
        results,
        significant,
        matrix,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;
    use std::fs;
    use tempfile::tempdir;

    /// 300 genes, 3 control and 3 treated samples; genes 0-19 up 4x,
    /// genes 20-39 down 4x, every count jittered by up to 20%
    fn write_inputs(dir: &Path) {
        let mut state: u64 = 12345;
        let mut jitter = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            0.8 + 0.4 * ((state >> 33) as f64 / (1u64 << 31) as f64)
        };
        let mut counts = String::from("gene_id\tc1\tc2\tc3\tt1\tt2\tt3\n");
        for g in 0..300 {
            let base = 50.0 + (g % 17) as f64 * 40.0;
            let _ = write!(counts, "gene{:03}", g);
            for s in 0..6 {
                let fold = match (g, s >= 3) {
                    (0..=19, true) => 4.0,
                    (20..=39, true) => 0.25,
                    _ => 1.0,
                };
                let _ = write!(counts, "\t{}", (base * fold * jitter()).round());
            }
            counts.push('\n');
        }
        fs::write(dir.join("counts.tsv"), counts).unwrap();
        fs::write(
            dir.join("samples.tsv"),
            "sample\tcondition\nc1\tcontrol\nc2\tcontrol\nc3\tcontrol\nt1\ttreated\nt2\ttreated\nt3\ttreated\n",
        )
        .unwrap();
        let up: Vec<String> = (0..15).map(|g| format!("gene{:03}", g)).collect();
        let null: Vec<String> = (100..140).map(|g| format!("gene{:03}", g)).collect();
        fs::write(
            dir.join("sets.gmt"),
            format!("UP_PATH\tup genes\t{}\nNULL_PATH\tbackground\t{}\n", up.join("\t"), null.join("\t")),
        )
        .unwrap();
    }

    #[test]
    fn test_rnaseq_pipeline_report() {
        let dir = tempdir().unwrap();
        write_inputs(dir.path());
        let inputs = RnaSeqInputs {
            sample_sheet: Some(dir.path().join("samples.tsv")),
            counts: Some(dir.path().join("counts.tsv")),
            gene_sets: Some(dir.path().join("sets.gmt")),
            out_dir: dir.path().join("out"),
            ..RnaSeqInputs::default()
        };
        let config = AnalysisConfig {
            reference: Some("control".into()),
            ..AnalysisConfig::default()
        };
        let out = run_rnaseq(&inputs, &config).unwrap();

        assert!(out.summary.up_significant >= 15, "{}", out.summary);
        assert!(out.summary.down_significant >= 15, "{}", out.summary);
        let html = fs::read_to_string(&out.report).unwrap();
        for section in ["Parameters", "Samples", "Row counts", "Contingency table", "Volcano plot", "Pathway enrichment"] {
            assert!(html.contains(section), "missing {}", section);
        }
        // result rows only; the parameter table has a "gene set size" row
        let result_rows = html
            .match_indices("<tr><td>gene")
            .filter(|(i, m)| html[i + m.len()..].starts_with(|c: char| c.is_ascii_digit()))
            .count();
        assert_eq!(result_rows, 100);
        assert!(html.contains("<td>UP_PATH</td>"));
        // no gene set covers the down-regulated genes
        assert!(html.contains("No enriched terms for down-regulated genes"));

        let all = fs::read_to_string(&out.results).unwrap();
        assert_eq!(all.lines().count(), 301);
        assert!(all.lines().next().unwrap().starts_with("id\tsymbol"));
        assert!(out.matrix.is_file());
    }

    #[test]
    fn test_transform_counts_writes_matrix() {
        let dir = tempdir().unwrap();
        write_inputs(dir.path());
        let inputs = RnaSeqInputs {
            sample_sheet: Some(dir.path().join("samples.tsv")),
            counts: Some(dir.path().join("counts.tsv")),
            ..RnaSeqInputs::default()
        };
        let output = dir.path().join("rlog.tsv");
        let res = transform_counts(&inputs, &AnalysisConfig::default(), &output).unwrap();
        assert_eq!(res.matrix.n_features(), 300);
        assert_eq!(fs::read_to_string(&output).unwrap().lines().count(), 301);
    }

    #[test]
    fn test_size_factors_fall_back_to_poscounts() {
        // every gene has a zero somewhere, so median-of-ratios has no genes to use
        let counts = CountMatrix::new(
            ndarray::array![
                [0.0, 10.0, 20.0, 40.0],
                [5.0, 0.0, 10.0, 20.0],
                [8.0, 16.0, 0.0, 64.0],
                [3.0, 6.0, 12.0, 0.0],
            ],
            (1..=4).map(|i| format!("g{}", i)).collect(),
            vec!["a1".into(), "a2".into(), "b1".into(), "b2".into()],
        )
        .unwrap();
        let mut sheet = SampleSheet::new(counts.sample_ids().to_vec()).unwrap();
        sheet
            .add_column("condition", vec!["a".into(), "a".into(), "b".into(), "b".into()])
            .unwrap();
        let mut dds = CountDataSet::new(counts, sheet, "condition", None).unwrap();
        assert!(matches!(
            estimate_size_factors(&mut dds, SizeFactorMethod::Ratio),
            Err(DexError::SizeFactorFailed { .. })
        ));
        size_factors_with_fallback(&mut dds).unwrap();
        let sf = dds.size_factors().unwrap();
        assert!(sf.iter().all(|s| s.is_finite() && *s > 0.0));
        assert!(sf[3] > sf[0]);
    }

    #[test]
    fn test_missing_samples_is_an_error() {
        let dir = tempdir().unwrap();
        let inputs = RnaSeqInputs {
            out_dir: dir.path().join("out"),
            ..RnaSeqInputs::default()
        };
        assert!(run_rnaseq(&inputs, &AnalysisConfig::default()).is_err());
    }
}
