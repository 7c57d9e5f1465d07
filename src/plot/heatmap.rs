//! Clustered heatmap of row-centred expression

use ndarray::{Array2, Axis as NdAxis};
use plotly::common::{ColorScale, ColorScalePalette, Title};
use plotly::layout::Axis;
use plotly::{HeatMap, Layout, Plot};

use super::style::unique_labels;
use crate::analysis::{cluster_order, ClusterAxis};
use crate::data::ExpressionMatrix;

/// Heatmap of `expr` (already restricted to the rows to show). Rows are
/// centred on their mean; rows and columns are ordered by clustering.
/// `row_labels` replaces feature ids when given.
pub fn heatmap(expr: &ExpressionMatrix, row_labels: Option<&[String]>, conditions: &[String]) -> Plot {
    let mut centred: Array2<f64> = expr.values().to_owned();
    for mut row in centred.axis_iter_mut(NdAxis(0)) {
        let m = row.mean().unwrap_or(0.0);
        row.mapv_inplace(|v| v - m);
    }
    let row_order = cluster_order(centred.view(), ClusterAxis::Rows);
    let col_order = cluster_order(centred.view(), ClusterAxis::Columns);

    let labels = unique_labels(row_labels.unwrap_or(expr.feature_ids()), expr.feature_ids());
    let columns: Vec<String> = col_order
        .iter()
        .map(|&j| match conditions.get(j) {
            Some(cond) => format!("{} [{}]", expr.sample_ids()[j], cond),
            None => expr.sample_ids()[j].clone(),
        })
        .collect();
    let rows: Vec<String> = row_order.iter().map(|&i| labels[i].clone()).collect();
    let z: Vec<Vec<f64>> = row_order
        .iter()
        .map(|&i| col_order.iter().map(|&j| centred[[i, j]]).collect())
        .collect();

    let trace = HeatMap::new(columns, rows, z)
        .color_scale(ColorScale::Palette(ColorScalePalette::RdBu))
        .reverse_scale(true);
    let mut plot = Plot::new();
    plot.add_trace(trace);
    plot.set_layout(
        Layout::new()
            .title(Title::with_text(&format!("{} most variable rows, centred log2", expr.n_features())))
            .height(300 + 14 * expr.n_features())
            .x_axis(Axis::new().tick_angle(-45.0)),
    );
    plot
}
