//! Microarray workflow: raw intensities through RMA, moderated linear
//! model tests, figures, enrichment and report

use std::path::{Path, PathBuf};

use super::{
    add_enrichment_section, add_results_section, conditions_of, ensure_dir, feature_labels, load_annotation,
    load_sample_sheet, log_row_count, write_tables, PipelineOutput,
};
use crate::analysis::{most_variable, pca};
use crate::config::{AnalysisConfig, MICROARRAY_HEATMAP_GENES};
use crate::error::Result;
use crate::glm::DesignInfo;
use crate::io::{read_intensities, write_expression_matrix};
use crate::linear_model::{moderated_test, EbayesParams};
use crate::microarray::{rma, RmaResult};
use crate::plot::{boxplot, heatmap, pca_plot, volcano_plot};
use crate::report::{parameter_rows, sample_table, Report};

/// Input files of the microarray workflow
#[derive(Debug, Clone, Default)]
pub struct MicroarrayInputs {
    /// Sample sheet; the config's inline samples are used when absent
    pub sample_sheet: Option<PathBuf>,
    /// Directory searched for per-array intensity files
    pub data_dir: Option<PathBuf>,
    /// Probeset annotation
    pub annotation: Option<PathBuf>,
    /// GMT gene sets for enrichment
    pub gene_sets: Option<PathBuf>,
    pub out_dir: PathBuf,
}

/// RMA expression matrix only, written to `output`
pub fn summarize_arrays(inputs: &MicroarrayInputs, config: &AnalysisConfig, output: &Path) -> Result<RmaResult> {
    let sheet = load_sample_sheet(inputs.sample_sheet.as_deref(), config)?;
    let raw = read_intensities(&sheet, inputs.data_dir.as_deref())?;
    let result = rma(&raw)?;
    write_expression_matrix(output, &result.expression)?;
    log::info!("RMA expression written to {}", output.display());
    Ok(result)
}

/// Full microarray analysis and report
pub fn run_microarray(inputs: &MicroarrayInputs, config: &AnalysisConfig) -> Result<PipelineOutput> {
    config.validate()?;
    ensure_dir(&inputs.out_dir)?;
    let mut trail = Vec::new();

    let sheet = load_sample_sheet(inputs.sample_sheet.as_deref(), config)?;
    let raw = read_intensities(&sheet, inputs.data_dir.as_deref())?;
    log_row_count(&mut trail, "probes", raw.n_probes());
    let rma_result = rma(&raw)?;
    let expr = &rma_result.expression;
    log_row_count(&mut trail, "probesets", expr.n_features());
    let matrix = inputs.out_dir.join("expression_rma.tsv");
    write_expression_matrix(&matrix, expr)?;

    let design = DesignInfo::one_factor(&sheet, &config.condition, config.reference.as_deref())?;
    let (numerator, denominator) = config.resolve_contrast(&design.levels)?;
    log::info!(
        "comparing {} vs {} on '{}' ({} arrays)",
        numerator,
        denominator,
        config.condition,
        raw.n_arrays()
    );
    let mut table = moderated_test(expr, &design, &numerator, &denominator, &EbayesParams::default())?;
    let annotation = load_annotation(inputs.annotation.as_deref())?;
    if let Some(a) = &annotation {
        table.annotate(a);
    }

    let summary = table.summary(config.alpha, config.lfc_threshold());
    log::info!("significance contingency table:\n{}", summary);
    log_row_count(&mut trail, "significant", summary.significant());
    let (results, significant) = write_tables(&inputs.out_dir, &table, config)?;

    let conditions = conditions_of(&sheet, &config.condition)?;
    let title = config
        .title
        .clone()
        .unwrap_or_else(|| format!("Microarray differential expression: {} vs {}", numerator, denominator));
    let mut report = Report::new(&title);

    report.heading("Parameters");
    let params = parameter_rows(
        config,
        &[
            ("contrast", table.contrast.label()),
            ("heatmap rows", config.heatmap_genes_or(MICROARRAY_HEATMAP_GENES).to_string()),
        ],
    );
    report.table(&["parameter", "value"], &params);
    report.heading("Samples");
    let (headers, rows) = sample_table(&sheet);
    report.table(&headers, &rows);
    report.heading("Row counts");
    report.table(&["stage", "rows"], &trail);

    report.heading("Normalization");
    report.figure(
        &boxplot(rma_result.raw_log2.view(), &raw.sample_ids, &conditions, "raw"),
        "log2 probe intensities before background correction and normalization",
    );
    report.figure(
        &boxplot(rma_result.normalized_log2.view(), &raw.sample_ids, &conditions, "normalized"),
        "log2 probe intensities after background correction and quantile normalization",
    );

    report.heading("Sample structure");
    let pcs = pca(expr, config.pca_top_genes, 2)?;
    report.figure(
        &pca_plot(&pcs, &conditions),
        &format!("PCA of RMA expression, {} most variable probesets", pcs.n_features),
    );
    let top = most_variable(expr, config.heatmap_genes_or(MICROARRAY_HEATMAP_GENES))?;
    let labels = feature_labels(top.feature_ids(), annotation.as_ref());
    report.figure(
        &heatmap(&top, Some(labels.as_slice()), &conditions),
        &format!("{} most variable probesets, row-centred", top.n_features()),
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

    /// 150 probesets of 4 probes on 6 arrays over a noisy background;
    /// probesets 0-9 are 8x higher on the last three arrays
    fn write_arrays(dir: &Path) {
        let mut state: u64 = 987654321;
        let mut uniform = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) as f64 / (1u64 << 31) as f64
        };
        for a in 0..6 {
            let mut text = String::from("probe_id\tprobeset_id\tintensity\n");
            for set in 0..150 {
                let level = 200.0 * (1.0 + (set % 11) as f64);
                for p in 0..4 {
                    let affinity = 0.6 + 0.2 * p as f64;
                    let fold = if set < 10 && a >= 3 { 8.0 } else { 1.0 };
                    let signal = level * affinity * fold * (0.9 + 0.2 * uniform());
                    let background = 60.0 + 40.0 * uniform();
                    let _ = writeln!(text, "ps{}_p{}\tps{}\t{:.1}", set, p, set, signal + background);
                }
            }
            // background-only probes
            for b in 0..200 {
                let _ = writeln!(text, "bg{}\tbg{}\t{:.1}", b, b / 4, 60.0 + 40.0 * uniform());
            }
            fs::write(dir.join(format!("a{}.txt", a + 1)), text).unwrap();
        }
        fs::write(
            dir.join("samples.tsv"),
            "sample\tgroup\na1\twt\na2\twt\na3\twt\na4\tko\na5\tko\na6\tko\n",
        )
        .unwrap();
        fs::write(dir.join("annotation.tsv"), "id\tsymbol\tdescription\nps0\tHK1\thexokinase 1\n").unwrap();
    }

    #[test]
    fn test_microarray_pipeline_report() {
        let dir = tempdir().unwrap();
        write_arrays(dir.path());
        let inputs = MicroarrayInputs {
            sample_sheet: Some(dir.path().join("samples.tsv")),
            data_dir: Some(dir.path().to_path_buf()),
            annotation: Some(dir.path().join("annotation.tsv")),
            out_dir: dir.path().join("out"),
            ..MicroarrayInputs::default()
        };
        let config = AnalysisConfig {
            condition: "group".into(),
            reference: Some("wt".into()),
            ..AnalysisConfig::default()
        };
        let out = run_microarray(&inputs, &config).unwrap();
        assert!(out.summary.up_significant >= 8, "{}", out.summary);

        let html = fs::read_to_string(&out.report).unwrap();
        for section in ["Normalization", "Sample structure", "Row counts", "Contingency table", "AveExpr"] {
            assert!(html.contains(section), "missing {}", section);
        }
        assert!(html.contains("<td>HK1</td>"));
        // 150 probesets plus 50 background sets
        let all = fs::read_to_string(&out.results).unwrap();
        assert_eq!(all.lines().count(), 201);
        assert!(html.matches("<tr><td>").count() > 100);
    }

    #[test]
    fn test_summarize_arrays() {
        let dir = tempdir().unwrap();
        write_arrays(dir.path());
        let inputs = MicroarrayInputs {
            sample_sheet: Some(dir.path().join("samples.tsv")),
            data_dir: Some(dir.path().to_path_buf()),
            ..MicroarrayInputs::default()
        };
        let output = dir.path().join("rma.tsv");
        let res = summarize_arrays(&inputs, &AnalysisConfig::default(), &output).unwrap();
        assert_eq!(res.expression.n_features(), 200);
        assert_eq!(res.expression.n_samples(), 6);
    }
}
