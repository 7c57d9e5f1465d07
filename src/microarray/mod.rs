//! Robust multichip average: background correction, quantile
//! normalization and median polish summarization of probe intensities

mod background;
mod quantile;
mod summarize;

pub use background::{adjust_intensity, background_correct, estimate_background, BackgroundParams};
pub use quantile::quantile_normalize;
pub use summarize::{median_polish, summarize_probeset, MedianPolish};

use ndarray::{Array2, Axis};
use rayon::prelude::*;

use crate::data::ExpressionMatrix;
use crate::error::Result;
use crate::io::RawIntensities;

/// Output of [`rma`]
#[derive(Debug, Clone)]
pub struct RmaResult {
    /// log2 probeset expression, probesets x arrays
    pub expression: ExpressionMatrix,
    /// log2 raw probe intensities, for before/after plots
    pub raw_log2: Array2<f64>,
    /// log2 background-corrected, normalized probe intensities
    pub normalized_log2: Array2<f64>,
}

/// Run background correction, quantile normalization and median polish
pub fn rma(raw: &RawIntensities) -> Result<RmaResult> {
    log::info!("RMA on {} probes x {} arrays", raw.n_probes(), raw.n_arrays());
    let corrected = background_correct(&raw.values);
    let normalized = quantile_normalize(&corrected);
    let normalized_log2 = normalized.mapv(f64::log2);

    let probesets = raw.probesets();
    let summaries: Vec<Vec<f64>> = probesets
        .par_iter()
        .map(|(_, rows)| summarize_probeset(normalized_log2.select(Axis(0), rows).view()))
        .collect();

    let mut values = Array2::<f64>::zeros((probesets.len(), raw.n_arrays()));
    for (p, row) in summaries.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            values[[p, j]] = v;
        }
    }
    log::info!("summarised {} probesets", probesets.len());

    let expression = ExpressionMatrix::new(
        values,
        probesets.into_iter().map(|(id, _)| id).collect(),
        raw.sample_ids.clone(),
    )?;
    Ok(RmaResult {
        expression,
        raw_log2: raw.values.mapv(f64::log2),
        normalized_log2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rma_detects_probeset_shift() {
        // three probesets of four probes; probeset "up" is 8x higher on array 3-4
        let mut probe_ids = Vec::new();
        let mut probeset_ids = Vec::new();
        let mut values = Array2::<f64>::zeros((12 + 200, 4));
        for (k, set) in ["flat1", "up", "flat2"].iter().enumerate() {
            for p in 0..4 {
                let row = k * 4 + p;
                probe_ids.push(format!("{}_{}", set, p));
                probeset_ids.push(set.to_string());
                for j in 0..4 {
                    let base = 2000.0 * (1.0 + p as f64 * 0.1) * (k as f64 + 1.0);
                    let factor = if *set == "up" && j >= 2 { 8.0 } else { 1.0 };
                    values[[row, j]] = base * factor + j as f64;
                }
            }
        }
        // background-only probes give the arrays a noise floor
        for b in 0..200 {
            probe_ids.push(format!("bg_{}", b));
            probeset_ids.push(format!("bg{}", b / 4));
            for j in 0..4 {
                values[[12 + b, j]] = 80.0 + ((b * 13 + j * 7) % 40) as f64;
            }
        }
        let raw = RawIntensities {
            probe_ids,
            probeset_ids,
            sample_ids: (1..=4).map(|i| format!("a{}", i)).collect(),
            values,
        };

        let res = rma(&raw).unwrap();
        let expr = res.expression.values();
        assert_eq!(res.expression.n_features(), 3 + 50);
        assert!(expr.iter().all(|v| v.is_finite()));
        let up = res.expression.feature_ids().iter().position(|id| id == "up").unwrap();
        let shift = (expr[[up, 2]] + expr[[up, 3]] - expr[[up, 0]] - expr[[up, 1]]) / 2.0;
        assert!(shift > 1.5, "log2 shift {}", shift);
        let flat = 0;
        assert!((expr[[flat, 2]] - expr[[flat, 0]]).abs() < 1.0);
    }
}
