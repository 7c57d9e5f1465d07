//! Volcano plot: log2 fold change against -log10 p-value

use plotly::common::{DashType, Line, Marker, Mode, Position, Title};
use plotly::layout::Axis;
use plotly::{Layout, Plot, Scatter};

use super::style::{hex_num_to_rgb, DOWN_COLOUR, GUIDE_COLOUR, NEUTRAL_COLOUR, UP_COLOUR};
use crate::io::DeTable;

const LABELLED: usize = 10;

fn neg_log10(p: f64) -> f64 {
    -(p.max(1e-300)).log10()
}

fn points(table: &DeTable, rows: &[usize], name: &str, colour: usize) -> Box<Scatter<f64, f64>> {
    Scatter::new(
        rows.iter().map(|&i| table.log2_fold_changes[i]).collect(),
        rows.iter().map(|&i| neg_log10(table.pvalues[i])).collect(),
    )
    .mode(Mode::Markers)
    .name(&format!("{} ({})", name, rows.len()))
    .text_array(rows.iter().map(|&i| table.label(i).to_string()).collect())
    .marker(Marker::new().color(hex_num_to_rgb(colour)).size(5).opacity(0.7))
}

fn guide(x: Vec<f64>, y: Vec<f64>) -> Box<Scatter<f64, f64>> {
    Scatter::new(x, y)
        .mode(Mode::Lines)
        .show_legend(false)
        .line(Line::new().color(hex_num_to_rgb(GUIDE_COLOUR)).width(1.0).dash(DashType::Dash))
}

/// Volcano plot of every tested row, significant rows coloured by
/// direction, with guides at the cutoffs and labels on the top hits
pub fn volcano_plot(table: &DeTable, alpha: f64, lfc_threshold: f64) -> Plot {
    let rows: Vec<usize> = (0..table.n_rows())
        .filter(|&i| table.pvalues[i].is_finite() && table.log2_fold_changes[i].is_finite())
        .collect();
    let (mut up, mut down, mut flat) = (Vec::new(), Vec::new(), Vec::new());
    for &i in &rows {
        if !table.is_significant(i, alpha, lfc_threshold) {
            flat.push(i);
        } else if table.log2_fold_changes[i] > 0.0 {
            up.push(i);
        } else {
            down.push(i);
        }
    }

    let mut plot = Plot::new();
    plot.add_trace(points(table, &flat, "not significant", NEUTRAL_COLOUR));
    plot.add_trace(points(table, &down, "down", DOWN_COLOUR));
    plot.add_trace(points(table, &up, "up", UP_COLOUR));

    let y_max = rows.iter().map(|&i| neg_log10(table.pvalues[i])).fold(1.0_f64, f64::max);
    let x_max = rows
        .iter()
        .map(|&i| table.log2_fold_changes[i].abs())
        .fold(lfc_threshold + 1.0, f64::max);
    for v in [-lfc_threshold, lfc_threshold] {
        plot.add_trace(guide(vec![v, v], vec![0.0, y_max]));
    }
    // the raw p-value at which the adjusted p-value crosses alpha
    let p_cut = rows
        .iter()
        .filter(|&&i| table.padj[i] < alpha)
        .map(|&i| table.pvalues[i])
        .fold(f64::NAN, f64::max);
    if p_cut.is_finite() {
        plot.add_trace(guide(vec![-x_max, x_max], vec![neg_log10(p_cut); 2]));
    }

    let top: Vec<usize> = table
        .ranked()
        .into_iter()
        .filter(|&i| table.is_significant(i, alpha, lfc_threshold))
        .take(LABELLED)
        .collect();
    if !top.is_empty() {
        let labels = Scatter::new(
            top.iter().map(|&i| table.log2_fold_changes[i]).collect(),
            top.iter().map(|&i| neg_log10(table.pvalues[i])).collect(),
        )
        .mode(Mode::Text)
        .show_legend(false)
        .text_array(top.iter().map(|&i| table.label(i).to_string()).collect())
        .text_position(Position::TopRight);
        plot.add_trace(labels);
    }

    plot.set_layout(
        Layout::new()
            .title(Title::with_text(&table.contrast.label()))
            .x_axis(Axis::new().title(Title::with_text("log2 fold change")))
            .y_axis(Axis::new().title(Title::with_text("-log10 p-value"))),
    );
    plot
}
