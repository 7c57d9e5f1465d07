//! HTML document assembly. Every piece of text is escaped; figures are
//! plotly divs drawn by a single copy of plotly.js in the document head.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use plotly::Plot;

use crate::config::AnalysisConfig;
use crate::data::SampleSheet;
use crate::enrichment::EnrichmentResult;
use crate::error::Result;
use crate::io::{DeTable, ResultsSummary};

const STYLE: &str = "body{font-family:sans-serif;max-width:1100px;margin:2em auto;color:#222}\
table{border-collapse:collapse;font-size:0.85em;margin:0.5em 0 1.5em}\
th,td{border:1px solid #ccc;padding:3px 6px;text-align:left}\
th{background:#f0f0f0}\
.note{background:#fff4e5;border-left:4px solid #f0a030;padding:0.6em 1em}\
figure{margin:1em 0}figcaption{font-size:0.9em;color:#555}";

/// Used only when no script can be taken from plotly's own page
const PLOTLY_CDN: &str = r#"<script src="https://cdn.plot.ly/plotly-2.12.1.min.js"></script>"#;

/// Escape text for HTML content or attribute values
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// The `<script>` blocks in the head of a standalone plotly page, which load
/// the library; the body's block draws that page's own figure
fn library_scripts(page: &str) -> String {
    let mut scripts = String::new();
    let mut rest = page;
    while let Some(start) = rest.find("<script") {
        if rest[..start].contains("<body") {
            break;
        }
        let Some(len) = rest[start..].find("</script>") else {
            break;
        };
        let end = start + len + "</script>".len();
        scripts.push_str(&rest[start..end]);
        scripts.push('\n');
        rest = &rest[end..];
    }
    scripts
}

fn plotly_scripts() -> String {
    let scripts = library_scripts(&Plot::new().to_html());
    if scripts.is_empty() {
        log::warn!("plotly.js not found in the rendered page; the report loads it from the CDN");
        PLOTLY_CDN.to_string()
    } else {
        scripts
    }
}

/// An HTML report assembled top to bottom
pub struct Report {
    title: String,
    body: String,
    n_figures: usize,
}

impl Report {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            body: String::new(),
            n_figures: 0,
        }
    }

    pub fn heading(&mut self, text: &str) -> &mut Self {
        let _ = writeln!(self.body, "<h2>{}</h2>", escape(text));
        self
    }

    pub fn subheading(&mut self, text: &str) -> &mut Self {
        let _ = writeln!(self.body, "<h3>{}</h3>", escape(text));
        self
    }

    pub fn paragraph(&mut self, text: &str) -> &mut Self {
        let _ = writeln!(self.body, "<p>{}</p>", escape(text));
        self
    }

    /// Highlighted remark, used when a step produced nothing to show
    pub fn note(&mut self, text: &str) -> &mut Self {
        let _ = writeln!(self.body, "<p class=\"note\">{}</p>", escape(text));
        self
    }

    pub fn table<S: AsRef<str>>(&mut self, headers: &[S], rows: &[Vec<String>]) -> &mut Self {
        self.body.push_str("<table>\n<tr>");
        for h in headers {
            let _ = write!(self.body, "<th>{}</th>", escape(h.as_ref()));
        }
        self.body.push_str("</tr>\n");
        for row in rows {
            self.body.push_str("<tr>");
            for cell in row {
                let _ = write!(self.body, "<td>{}</td>", escape(cell));
            }
            self.body.push_str("</tr>\n");
        }
        self.body.push_str("</table>\n");
        self
    }

    /// plotly figure with a caption
    pub fn figure(&mut self, plot: &Plot, caption: &str) -> &mut Self {
        self.n_figures += 1;
        let div_id = format!("figure-{}", self.n_figures);
        let _ = writeln!(
            self.body,
            "<figure>{}<figcaption>{}</figcaption></figure>",
            plot.to_inline_html(Some(&div_id)),
            escape(caption)
        );
        self
    }

    /// Row counts and the direction/significance contingency table
    pub fn summary(&mut self, summary: &ResultsSummary) -> &mut Self {
        let mut rows = vec![
            vec![
                "up".to_string(),
                summary.up_significant.to_string(),
                summary.up_not_significant.to_string(),
            ],
            vec![
                "down".to_string(),
                summary.down_significant.to_string(),
                summary.down_not_significant.to_string(),
            ],
        ];
        if summary.unchanged > 0 {
            rows.push(vec!["zero".to_string(), "0".to_string(), summary.unchanged.to_string()]);
        }
        self.paragraph(&format!(
            "{} rows, {} tested; significance: padj < {} and |log2 FC| >= {}",
            summary.total, summary.tested, summary.alpha, summary.lfc_threshold
        ));
        self.table(&["direction", "significant", "not significant"], &rows)
    }

    pub fn render(&self) -> String {
        let scripts = if self.n_figures > 0 { plotly_scripts() } else { String::new() };
        format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{t}</title>\n<style>{style}</style>\n{scripts}</head>\n<body>\n<h1>{t}</h1>\n{body}</body>\n</html>\n",
            t = escape(&self.title),
            style = STYLE,
            scripts = scripts,
            body = self.body
        )
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.render())?;
        log::info!("report written to {}", path.display());
        Ok(())
    }
}

/// Parameter name/value rows for the report header
pub fn parameter_rows(config: &AnalysisConfig, extra: &[(&str, String)]) -> Vec<Vec<String>> {
    let mut rows = vec![
        vec!["condition column".to_string(), config.condition.clone()],
        vec!["adjusted p-value cutoff".to_string(), config.alpha.to_string()],
        vec![
            "fold change cutoff".to_string(),
            format!("{} (|log2 FC| >= {:.3})", config.fold_change, config.lfc_threshold()),
        ],
        vec!["PCA rows".to_string(), config.pca_top_genes.to_string()],
        vec!["table rows".to_string(), config.report_rows.to_string()],
        vec!["enrichment cutoff".to_string(), config.pvalue_cutoff.to_string()],
        vec![
            "gene set size".to_string(),
            format!("{}..{}", config.min_set_size, config.max_set_size),
        ],
    ];
    rows.extend(extra.iter().map(|(k, v)| vec![k.to_string(), v.clone()]));
    rows
}

/// Sample id, every categorical column and the data path
pub fn sample_table(sheet: &SampleSheet) -> (Vec<String>, Vec<Vec<String>>) {
    let mut headers = vec!["sample".to_string()];
    headers.extend(sheet.column_names().iter().cloned());
    headers.push("path".to_string());
    let rows = (0..sheet.n_samples())
        .map(|i| {
            let mut row = vec![sheet.sample_ids()[i].clone()];
            for name in sheet.column_names() {
                row.push(sheet.column(name).map(|c| c[i].clone()).unwrap_or_default());
            }
            row.push(sheet.path(i).map(|p| p.display().to_string()).unwrap_or_default());
            row
        })
        .collect();
    (headers, rows)
}

/// The first `n` rows of `table` in ranked order
pub fn results_table(table: &DeTable, n: usize) -> (Vec<String>, Vec<Vec<String>>) {
    let top = table.top(n);
    let headers = top.headers().iter().map(|h| h.to_string()).collect();
    let rows = (0..top.n_rows()).map(|i| top.row_fields(i)).collect();
    (headers, rows)
}

/// Enriched terms with ratios and overlapping genes
pub fn enrichment_table(result: &EnrichmentResult) -> (Vec<String>, Vec<Vec<String>>) {
    let headers = [
        "term",
        "description",
        "count",
        "GeneRatio",
        "BgRatio",
        "fold enrichment",
        "pvalue",
        "padj",
        "genes",
    ]
    .iter()
    .map(|h| h.to_string())
    .collect();
    let rows = result
        .enriched()
        .into_iter()
        .map(|t| {
            vec![
                t.name.clone(),
                t.description.clone(),
                t.overlap.to_string(),
                format!("{}/{}", t.overlap, t.query_size),
                format!("{}/{}", t.set_size, t.universe_size),
                format!("{:.2}", t.fold_enrichment()),
                format!("{:.3e}", t.pvalue),
                format!("{:.3e}", t.padj),
                t.genes.join("/"),
            ]
        })
        .collect();
    (headers, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{Contrast, TableKind};

    #[test]
    fn test_render_escapes_text() {
        let mut report = Report::new("A & B");
        report
            .heading("<script>")
            .note("no terms")
            .table(&["x"], &[vec!["1 < 2".to_string()]]);
        let html = report.render();
        assert!(html.contains("<title>A &amp; B</title>"));
        assert!(html.contains("<h2>&lt;script&gt;</h2>"));
        assert!(html.contains("<td>1 &lt; 2</td>"));
        assert!(html.contains("class=\"note\""));
        // no figures, no plotly.js
        assert!(!html.contains("<script"));
    }

    #[test]
    fn test_figures_share_one_library() {
        let mut report = Report::new("figures");
        report.figure(&Plot::new(), "first").figure(&Plot::new(), "second <b>");
        let html = report.render();
        assert!(html.contains("figure-1") && html.contains("figure-2"));
        assert!(!html.contains("figure-3"));
        assert!(html.contains("<figcaption>second &lt;b&gt;</figcaption>"));
        let head = &html[..html.find("</head>").unwrap()];
        assert!(head.contains("<script"));
    }

    #[test]
    fn test_library_scripts_skip_the_page_figure() {
        let page = "<html><head><script src=\"lib.js\"></script><script>var a = 1;</script></head>\
                    <body><div id=\"p\"></div><script>Plotly.newPlot(\"p\", {});</script></body></html>";
        let scripts = library_scripts(page);
        assert!(scripts.contains("lib.js") && scripts.contains("var a = 1;"));
        assert!(!scripts.contains("newPlot"));
        assert_eq!(library_scripts("<body><script>x()</script></body>"), "");
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a<b & \"c\" 'd'"), "a&lt;b &amp; &quot;c&quot; &#39;d&#39;");
    }

    #[test]
    fn test_results_table_is_limited() {
        let ids: Vec<String> = (0..250).map(|i| format!("g{}", i)).collect();
        let mut t = DeTable::new(ids, Contrast::new("c", "b", "a"), TableKind::NegativeBinomial);
        for i in 0..250 {
            t.pvalues[i] = (i + 1) as f64 / 1000.0;
            t.padj[i] = t.pvalues[i];
            t.log2_fold_changes[i] = 1.0;
        }
        let (headers, rows) = results_table(&t, 100);
        assert_eq!(headers[0], "id");
        assert_eq!(rows.len(), 100);
        assert_eq!(rows[0][0], "g0");
    }

    #[test]
    fn test_sample_table() {
        let mut sheet = SampleSheet::new(vec!["s1".into(), "s2".into()]).unwrap();
        sheet.add_column("condition", vec!["a".into(), "b".into()]).unwrap();
        let (headers, rows) = sample_table(&sheet);
        assert_eq!(headers, vec!["sample", "condition", "path"]);
        assert_eq!(rows[1], vec!["s2", "b", ""]);
    }
}
