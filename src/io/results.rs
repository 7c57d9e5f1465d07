//! Differential expression results table

use serde::{Deserialize, Serialize};

use super::annotation::GeneAnnotation;

/// Contrast between two levels of the design factor
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contrast {
    /// Design factor (e.g. "condition")
    pub variable: String,
    /// Numerator level (e.g. "treated")
    pub numerator: String,
    /// Denominator level (e.g. "control")
    pub denominator: String,
}

impl Contrast {
    pub fn new(variable: &str, numerator: &str, denominator: &str) -> Self {
        Self {
            variable: variable.to_string(),
            numerator: numerator.to_string(),
            denominator: denominator.to_string(),
        }
    }

    pub fn label(&self) -> String {
        format!("{} {} vs {}", self.variable, self.numerator, self.denominator)
    }
}

/// Which model produced the table; decides the column headers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TableKind {
    /// Negative binomial Wald test: baseMean, lfcSE, stat
    NegativeBinomial,
    /// Moderated linear model: AveExpr, t, B
    LinearModel,
}

/// Results from a differential expression test, one entry per gene
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeTable {
    pub ids: Vec<String>,
    pub symbols: Vec<Option<String>>,
    pub descriptions: Vec<Option<String>>,
    /// Mean normalized count (RNA-seq) or average log2 expression (microarray)
    pub base_means: Vec<f64>,
    pub log2_fold_changes: Vec<f64>,
    pub lfc_se: Vec<f64>,
    pub stat: Vec<f64>,
    pub pvalues: Vec<f64>,
    pub padj: Vec<f64>,
    /// Log-odds of differential expression, linear model only
    pub b_stat: Option<Vec<f64>>,
    pub contrast: Contrast,
    pub kind: TableKind,
}

/// Contingency of direction against significance
#[derive(Debug, Clone, PartialEq)]
pub struct ResultsSummary {
    pub total: usize,
    pub tested: usize,
    pub up_significant: usize,
    pub up_not_significant: usize,
    pub down_significant: usize,
    pub down_not_significant: usize,
    /// Tested rows with a log2 fold change of exactly zero
    pub unchanged: usize,
    pub alpha: f64,
    pub lfc_threshold: f64,
}

impl ResultsSummary {
    pub fn significant(&self) -> usize {
        self.up_significant + self.down_significant
    }

    pub fn not_significant(&self) -> usize {
        self.up_not_significant + self.down_not_significant + self.unchanged
    }
}

impl std::fmt::Display for ResultsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "rows: {} (tested: {})", self.total, self.tested)?;
        writeln!(
            f,
            "significance: padj < {} and |log2FC| >= {}",
            self.alpha, self.lfc_threshold
        )?;
        writeln!(f, "{:>8} {:>12} {:>16}", "", "significant", "not significant")?;
        writeln!(f, "{:>8} {:>12} {:>16}", "up", self.up_significant, self.up_not_significant)?;
        write!(f, "{:>8} {:>12} {:>16}", "down", self.down_significant, self.down_not_significant)?;
        if self.unchanged > 0 {
            write!(f, "\n{:>8} {:>12} {:>16}", "zero", 0, self.unchanged)?;
        }
        Ok(())
    }
}

impl DeTable {
    /// Empty table with every statistic set to NaN
    pub fn new(ids: Vec<String>, contrast: Contrast, kind: TableKind) -> Self {
        let n = ids.len();
        Self {
            ids,
            symbols: vec![None; n],
            descriptions: vec![None; n],
            base_means: vec![f64::NAN; n],
            log2_fold_changes: vec![f64::NAN; n],
            lfc_se: vec![f64::NAN; n],
            stat: vec![f64::NAN; n],
            pvalues: vec![f64::NAN; n],
            padj: vec![f64::NAN; n],
            b_stat: match kind {
                TableKind::LinearModel => Some(vec![f64::NAN; n]),
                TableKind::NegativeBinomial => None,
            },
            contrast,
            kind,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Whether row `i` passes the adjusted p-value and fold change cutoffs
    pub fn is_significant(&self, i: usize, alpha: f64, lfc_threshold: f64) -> bool {
        let p = self.padj[i];
        let lfc = self.log2_fold_changes[i];
        p.is_finite() && p < alpha && lfc.is_finite() && lfc.abs() >= lfc_threshold
    }

    /// Row indices passing both cutoffs, in table order
    pub fn significant(&self, alpha: f64, lfc_threshold: f64) -> Vec<usize> {
        (0..self.n_rows())
            .filter(|&i| self.is_significant(i, alpha, lfc_threshold))
            .collect()
    }

    pub fn summary(&self, alpha: f64, lfc_threshold: f64) -> ResultsSummary {
        let mut s = ResultsSummary {
            total: self.n_rows(),
            tested: self.padj.iter().filter(|p| p.is_finite()).count(),
            up_significant: 0,
            up_not_significant: 0,
            down_significant: 0,
            down_not_significant: 0,
            unchanged: 0,
            alpha,
            lfc_threshold,
        };
        for i in 0..self.n_rows() {
            let lfc = self.log2_fold_changes[i];
            if !self.padj[i].is_finite() || !lfc.is_finite() {
                continue;
            }
            if lfc == 0.0 {
                s.unchanged += 1;
                continue;
            }
            match (lfc > 0.0, self.is_significant(i, alpha, lfc_threshold)) {
                (true, true) => s.up_significant += 1,
                (true, false) => s.up_not_significant += 1,
                (false, true) => s.down_significant += 1,
                (false, false) => s.down_not_significant += 1,
            }
        }
        s
    }

    /// Row order by adjusted p-value, then by decreasing |log2FC|; untested rows last
    pub fn ranked(&self) -> Vec<usize> {
        let key = |v: f64| if v.is_finite() { v } else { f64::INFINITY };
        let mut order: Vec<usize> = (0..self.n_rows()).collect();
        order.sort_by(|&a, &b| {
            key(self.padj[a])
                .total_cmp(&key(self.padj[b]))
                .then_with(|| key(self.pvalues[a]).total_cmp(&key(self.pvalues[b])))
                .then_with(|| {
                    let mag = |v: f64| if v.is_finite() { v.abs() } else { f64::NEG_INFINITY };
                    mag(self.log2_fold_changes[b]).total_cmp(&mag(self.log2_fold_changes[a]))
                })
        });
        order
    }

    /// New table holding the given rows in the given order
    pub fn subset(&self, rows: &[usize]) -> Self {
        let pick = |v: &[f64]| rows.iter().map(|&i| v[i]).collect::<Vec<f64>>();
        Self {
            ids: rows.iter().map(|&i| self.ids[i].clone()).collect(),
            symbols: rows.iter().map(|&i| self.symbols[i].clone()).collect(),
            descriptions: rows.iter().map(|&i| self.descriptions[i].clone()).collect(),
            base_means: pick(&self.base_means),
            log2_fold_changes: pick(&self.log2_fold_changes),
            lfc_se: pick(&self.lfc_se),
            stat: pick(&self.stat),
            pvalues: pick(&self.pvalues),
            padj: pick(&self.padj),
            b_stat: self.b_stat.as_ref().map(|b| pick(b)),
            contrast: self.contrast.clone(),
            kind: self.kind,
        }
    }

    /// The first `n` rows in ranked order
    pub fn top(&self, n: usize) -> Self {
        let order = self.ranked();
        self.subset(&order[..n.min(order.len())])
    }

    /// Significant rows in ranked order
    pub fn filter_significant(&self, alpha: f64, lfc_threshold: f64) -> Self {
        let rows: Vec<usize> = self
            .ranked()
            .into_iter()
            .filter(|&i| self.is_significant(i, alpha, lfc_threshold))
            .collect();
        self.subset(&rows)
    }

    /// Fill symbol and description columns from an annotation table
    pub fn annotate(&mut self, annotation: &GeneAnnotation) {
        let mut matched = 0;
        for (i, id) in self.ids.iter().enumerate() {
            if let Some(entry) = annotation.get(id) {
                self.symbols[i] = Some(entry.symbol.clone());
                self.descriptions[i] = entry.description.clone();
                matched += 1;
            }
        }
        log::info!("annotated {} of {} rows", matched, self.n_rows());
    }

    /// Display label of row `i`: symbol when known, otherwise the id
    pub fn label(&self, i: usize) -> &str {
        self.symbols[i].as_deref().unwrap_or(&self.ids[i])
    }

    /// Column headers matching `row_fields`
    pub fn headers(&self) -> Vec<&'static str> {
        match self.kind {
            TableKind::NegativeBinomial => vec![
                "id", "symbol", "description", "baseMean", "log2FoldChange", "lfcSE", "stat", "pvalue", "padj",
            ],
            TableKind::LinearModel => vec![
                "id", "symbol", "description", "AveExpr", "logFC", "SE", "t", "P.Value", "adj.P.Val", "B",
            ],
        }
    }

    /// Formatted fields of row `i`
    pub fn row_fields(&self, i: usize) -> Vec<String> {
        let num = |v: f64| if v.is_finite() { format!("{:.6}", v) } else { "NA".to_string() };
        let sci = |v: f64| if v.is_finite() { format!("{:.4e}", v) } else { "NA".to_string() };
        let mut fields = vec![
            self.ids[i].clone(),
            self.symbols[i].clone().unwrap_or_default(),
            self.descriptions[i].clone().unwrap_or_default(),
            num(self.base_means[i]),
            num(self.log2_fold_changes[i]),
            num(self.lfc_se[i]),
            num(self.stat[i]),
            sci(self.pvalues[i]),
            sci(self.padj[i]),
        ];
        if let Some(b) = &self.b_stat {
            fields.push(num(b[i]));
        }
        fields
    }
}
