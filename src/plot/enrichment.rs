//! Dot plot of enriched terms

use plotly::common::{Marker, Mode, Title};
use plotly::layout::Axis;
use plotly::{Layout, Plot, Scatter};

use super::style::sequential_colour;
use crate::enrichment::EnrichmentResult;

const MAX_TERMS: usize = 20;

/// Gene ratio per enriched term; dot size follows the overlap count and
/// colour the adjusted p-value (red lowest)
pub fn enrichment_dotplot(result: &EnrichmentResult) -> Plot {
    // best term on top of the category axis
    let terms: Vec<_> = result.enriched().into_iter().take(MAX_TERMS).rev().collect();
    let max_count = terms.iter().map(|t| t.overlap).max().unwrap_or(1).max(1) as f64;
    let padj_lo = terms.iter().map(|t| t.padj).fold(f64::INFINITY, f64::min);
    let padj_hi = terms.iter().map(|t| t.padj).fold(0.0_f64, f64::max);
    let colour_t = |p: f64| {
        if padj_hi > padj_lo && padj_lo > 0.0 {
            (p.log10() - padj_lo.log10()) / (padj_hi.log10() - padj_lo.log10())
        } else {
            0.0
        }
    };

    let trace = Scatter::new(
        terms.iter().map(|t| t.gene_ratio()).collect(),
        terms.iter().map(|t| t.name.clone()).collect(),
    )
    .mode(Mode::Markers)
    .name(&result.subset)
    .text_array(
        terms
            .iter()
            .map(|t| format!("{}: {} genes, padj {:.2e}", t.name, t.overlap, t.padj))
            .collect(),
    )
    .marker(
        Marker::new()
            .size_array(
                terms
                    .iter()
                    .map(|t| (8.0 + 14.0 * (t.overlap as f64 / max_count).sqrt()).round() as usize)
                    .collect(),
            )
            .color_array(terms.iter().map(|t| sequential_colour(colour_t(t.padj))).collect()),
    );

    let mut plot = Plot::new();
    plot.add_trace(trace);
    plot.set_layout(
        Layout::new()
            .title(Title::with_text(&format!(
                "{} genes, padj {:.1e} to {:.1e}",
                result.subset, padj_lo, padj_hi
            )))
            .height(200 + 26 * terms.len())
            .x_axis(Axis::new().title(Title::with_text("gene ratio"))),
    );
    plot
}
