//! Analysis parameters, loadable from JSON and overridable from the CLI

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::{SampleSheet, SampleSpec};
use crate::enrichment::EnrichmentParams;
use crate::error::{DexError, Result};

/// Heatmap rows for RNA-seq reports
pub const RNASEQ_HEATMAP_GENES: usize = 30;
/// Heatmap rows for microarray reports
pub const MICROARRAY_HEATMAP_GENES: usize = 50;

/// Thresholds and options shared by both workflows.
///
/// ```json
/// {
///   "condition": "treatment",
///   "reference": "control",
///   "alpha": 0.05,
///   "samples": [
///     {"sample": "s1", "treatment": "control", "path": "quant/s1/quant.sf"}
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Report title
    pub title: Option<String>,
    /// Sample sheet column holding the groups to compare
    pub condition: String,
    /// Baseline level; the first level in sample-sheet order when unset
    pub reference: Option<String>,
    /// Level compared against the baseline; the first other level when unset
    pub numerator: Option<String>,
    /// Adjusted p-value cutoff
    pub alpha: f64,
    /// Linear fold change cutoff, applied as |log2 FC| >= log2(fold_change)
    pub fold_change: f64,
    /// Rows per result table in the report
    pub report_rows: usize,
    /// Most variable rows used for PCA
    pub pca_top_genes: usize,
    /// Most variable rows in the heatmap; 30 for RNA-seq, 50 for microarray
    pub heatmap_genes: Option<usize>,
    /// Genes need at least this many reads summed over samples
    pub min_total_count: f64,
    /// Adjusted p-value cutoff for enriched terms
    pub pvalue_cutoff: f64,
    pub min_set_size: usize,
    pub max_set_size: usize,
    /// Estimate rlog dispersions without the design
    pub rlog_blind: bool,
    /// Inline sample table, used when no sample sheet file is given
    pub samples: Vec<SampleSpec>,
    /// Directory that relative sample paths are resolved against
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            title: None,
            condition: "condition".to_string(),
            reference: None,
            numerator: None,
            alpha: 0.05,
            fold_change: 2.0,
            report_rows: 100,
            pca_top_genes: 500,
            heatmap_genes: None,
            min_total_count: 10.0,
            pvalue_cutoff: 0.05,
            min_set_size: 10,
            max_set_size: 500,
            rlog_blind: true,
            samples: Vec::new(),
            base_dir: None,
        }
    }
}

impl AnalysisConfig {
    /// Read a JSON config; missing fields take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let mut config: Self = serde_json::from_reader(reader)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        config.validate()?;
        log::info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| Err(DexError::InvalidInput { reason });
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return invalid(format!("alpha must lie in (0, 1), got {}", self.alpha));
        }
        if !(self.pvalue_cutoff > 0.0 && self.pvalue_cutoff <= 1.0) {
            return invalid(format!("pvalue_cutoff must lie in (0, 1], got {}", self.pvalue_cutoff));
        }
        if !(self.fold_change >= 1.0) {
            return invalid(format!("fold_change must be at least 1, got {}", self.fold_change));
        }
        if self.min_set_size > self.max_set_size {
            return invalid(format!(
                "min_set_size {} exceeds max_set_size {}",
                self.min_set_size, self.max_set_size
            ));
        }
        if self.report_rows == 0 || self.pca_top_genes == 0 {
            return invalid("report_rows and pca_top_genes must be positive".to_string());
        }
        Ok(())
    }

    /// |log2 FC| cutoff
    pub fn lfc_threshold(&self) -> f64 {
        self.fold_change.log2()
    }

    pub fn heatmap_genes_or(&self, default: usize) -> usize {
        self.heatmap_genes.unwrap_or(default)
    }

    pub fn enrichment_params(&self) -> EnrichmentParams {
        EnrichmentParams {
            pvalue_cutoff: self.pvalue_cutoff,
            min_set_size: self.min_set_size,
            max_set_size: self.max_set_size,
        }
    }

    /// Sample sheet from the inline table, with relative paths resolved
    /// against the config directory; `None` when no samples are inline
    pub fn inline_sample_sheet(&self) -> Result<Option<SampleSheet>> {
        if self.samples.is_empty() {
            return Ok(None);
        }
        let mut sheet = SampleSheet::from_specs(&self.samples)?;
        if let Some(base) = &self.base_dir {
            let paths = (0..sheet.n_samples())
                .map(|i| {
                    sheet.path(i).map(|p| if p.is_relative() { base.join(p) } else { p.to_path_buf() })
                })
                .collect();
            sheet.set_paths(paths)?;
        }
        Ok(Some(sheet))
    }

    /// Baseline and compared levels among `levels` (baseline first)
    pub fn resolve_contrast(&self, levels: &[String]) -> Result<(String, String)> {
        let reference = levels.first().cloned().ok_or_else(|| DexError::InvalidContrast {
            reason: format!("no levels for '{}'", self.condition),
        })?;
        let numerator = match &self.numerator {
            Some(n) => n.clone(),
            None => levels.get(1).cloned().ok_or_else(|| DexError::InvalidContrast {
                reason: format!("'{}' has a single level", self.condition),
            })?,
        };
        if !levels.contains(&numerator) {
            return Err(DexError::InvalidContrast {
                reason: format!("level '{}' not found (levels: {})", numerator, levels.join(", ")),
            });
        }
        Ok((numerator, reference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let c = AnalysisConfig::default();
        assert_eq!(c.alpha, 0.05);
        assert_eq!(c.lfc_threshold(), 1.0);
        assert_eq!(c.report_rows, 100);
        assert_eq!(c.heatmap_genes_or(RNASEQ_HEATMAP_GENES), 30);
        assert_eq!(c.heatmap_genes_or(MICROARRAY_HEATMAP_GENES), 50);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_load_with_inline_samples() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"condition": "treatment", "alpha": 0.1,
                "samples": [
                  {"sample": "s1", "treatment": "ctl", "path": "q/s1.sf"},
                  {"sample": "s2", "treatment": "trt"}
                ]}"#,
        )
        .unwrap();
        let c = AnalysisConfig::load(&path).unwrap();
        assert_eq!(c.alpha, 0.1);
        assert_eq!(c.fold_change, 2.0);
        let sheet = c.inline_sample_sheet().unwrap().unwrap();
        assert_eq!(sheet.column("treatment").unwrap(), &["ctl", "trt"]);
        assert_eq!(sheet.path(0).unwrap(), dir.path().join("q/s1.sf"));
        assert!(sheet.path(1).is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let c = AnalysisConfig {
            alpha: 1.5,
            ..AnalysisConfig::default()
        };
        assert!(c.validate().is_err());
        let c = AnalysisConfig {
            min_set_size: 600,
            ..AnalysisConfig::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_resolve_contrast() {
        let c = AnalysisConfig::default();
        let levels = vec!["ctl".to_string(), "trt".to_string()];
        assert_eq!(c.resolve_contrast(&levels).unwrap(), ("trt".to_string(), "ctl".to_string()));
        let c = AnalysisConfig {
            numerator: Some("nope".into()),
            ..AnalysisConfig::default()
        };
        assert!(c.resolve_contrast(&levels).is_err());
    }
}
