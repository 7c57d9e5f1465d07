//! PCA scatter coloured by condition

use plotly::common::{Marker, Mode, Title};
use plotly::layout::Axis;
use plotly::{Layout, Plot, Scatter};

use super::style::{level_colour, levels_in_order};
use crate::analysis::PcaResult;

/// PC1 vs PC2, one trace per condition level
pub fn pca_plot(pca: &PcaResult, conditions: &[String]) -> Plot {
    let n = pca.sample_ids.len();
    let pc = |c: usize| -> Vec<f64> {
        if c < pca.n_components() {
            pca.scores.column(c).to_vec()
        } else {
            vec![0.0; n]
        }
    };
    let (xs, ys) = (pc(0), pc(1));
    let pct = |c: usize| pca.percent_variance.get(c).copied().unwrap_or(0.0);

    let mut plot = Plot::new();
    for (k, level) in levels_in_order(conditions).into_iter().enumerate() {
        let members: Vec<usize> = (0..n).filter(|&i| conditions.get(i).map(String::as_str) == Some(level)).collect();
        let trace = Scatter::new(
            members.iter().map(|&i| xs[i]).collect(),
            members.iter().map(|&i| ys[i]).collect(),
        )
        .mode(Mode::Markers)
        .name(level)
        .text_array(members.iter().map(|&i| pca.sample_ids[i].clone()).collect())
        .marker(Marker::new().color(level_colour(k)).size(12));
        plot.add_trace(trace);
    }

    let layout = Layout::new()
        .title(Title::with_text(&format!("PCA, top {} rows", pca.n_features)))
        .x_axis(
            Axis::new()
                .title(Title::with_text(&format!("PC1: {:.0}% variance", pct(0))))
                .zero_line(false),
        )
        .y_axis(
            Axis::new()
                .title(Title::with_text(&format!("PC2: {:.0}% variance", pct(1))))
                .zero_line(false),
        );
    plot.set_layout(layout);
    plot
}
