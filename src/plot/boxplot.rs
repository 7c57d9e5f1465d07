//! Per-sample boxplots of log2 intensities

use ndarray::ArrayView2;
use plotly::common::{Marker, Title};
use plotly::layout::Axis;
use plotly::{BoxPlot, Layout, Plot};

use super::style::{level_colour, levels_in_order};
use crate::stats::quantile_sorted;

/// Points kept per array; quartiles of the sketch equal those of the data
const SKETCH_POINTS: usize = 513;

/// Evenly spaced quantiles of the finite values, so that a box drawn from
/// the sketch matches the full distribution without embedding every value
fn distribution_sketch(values: &[f64], points: usize) -> Vec<f64> {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() <= points || points < 2 {
        return finite;
    }
    finite.sort_by(f64::total_cmp);
    (0..points)
        .map(|k| quantile_sorted(&finite, k as f64 / (points - 1) as f64))
        .collect()
}

/// One box per column of `values` (rows x arrays), coloured by condition
pub fn boxplot(values: ArrayView2<f64>, sample_ids: &[String], conditions: &[String], title: &str) -> Plot {
    let levels = levels_in_order(conditions);
    let mut plot = Plot::new();
    for (j, column) in values.columns().into_iter().enumerate() {
        let sample = sample_ids.get(j).cloned().unwrap_or_else(|| format!("array {}", j + 1));
        let k = conditions
            .get(j)
            .and_then(|c| levels.iter().position(|l| l == c))
            .unwrap_or(0);
        let trace = BoxPlot::<f64, f64>::new(distribution_sketch(&column.to_vec(), SKETCH_POINTS))
            .name(&sample)
            .marker(Marker::new().color(level_colour(k)));
        plot.add_trace(trace);
    }
    plot.set_layout(
        Layout::new()
            .title(Title::with_text(title))
            .show_legend(false)
            .y_axis(Axis::new().title(Title::with_text("log2 intensity"))),
    );
    plot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::quantile;
    use ndarray::array;

    #[test]
    fn test_sketch_keeps_quartiles() {
        let values: Vec<f64> = (1..=10_000).map(|v| (v as f64).ln()).collect();
        let sketch = distribution_sketch(&values, SKETCH_POINTS);
        assert_eq!(sketch.len(), SKETCH_POINTS);
        for p in [0.0, 0.25, 0.5, 0.75, 1.0] {
            assert!((quantile(&sketch, p) - quantile(&values, p)).abs() < 1e-12);
        }
        assert!(distribution_sketch(&[f64::NAN, 1.0], 10) == vec![1.0]);
    }

    #[test]
    fn test_boxplot_one_box_per_array() {
        let v = array![[6.0, 7.0], [8.0, 9.0], [10.0, 11.0], [7.5, 8.5]];
        let plot = boxplot(v.view(), &["a1".into(), "a2".into()], &["x".into(), "y".into()], "raw");
        let json: serde_json::Value = serde_json::from_str(&plot.to_json()).unwrap();
        let data = json["data"].as_array().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data[1]["type"], "box");
        assert_eq!(data[1]["name"], "a2");
        assert_eq!(data[1]["y"], serde_json::json!([7.0, 9.0, 11.0, 8.5]));
    }
}
