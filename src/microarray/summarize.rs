//! Median polish summarization of probes into probesets

use ndarray::{Array2, ArrayView2};

use crate::stats::median;

const MAX_ITER: usize = 10;
const EPS: f64 = 0.01;

/// Additive fit `y[i][j] = overall + row[i] + col[j] + residual`
#[derive(Debug, Clone)]
pub struct MedianPolish {
    pub overall: f64,
    pub row: Vec<f64>,
    pub col: Vec<f64>,
    pub residuals: Array2<f64>,
}

/// Tukey's median polish, alternating row and column sweeps until the sum
/// of absolute residuals stops changing
pub fn median_polish(y: ArrayView2<f64>) -> MedianPolish {
    let (n_rows, n_cols) = y.dim();
    let mut z = y.to_owned();
    let mut overall = 0.0;
    let mut row = vec![0.0; n_rows];
    let mut col = vec![0.0; n_cols];
    let mut old_sum = 0.0;

    for _ in 0..MAX_ITER {
        let row_medians: Vec<f64> = (0..n_rows).map(|i| median(&z.row(i).to_vec())).collect();
        for i in 0..n_rows {
            for j in 0..n_cols {
                z[[i, j]] -= row_medians[i];
            }
            row[i] += row_medians[i];
        }
        let col_shift = median(&col);
        for c in col.iter_mut() {
            *c -= col_shift;
        }
        overall += col_shift;

        let col_medians: Vec<f64> = (0..n_cols).map(|j| median(&z.column(j).to_vec())).collect();
        for j in 0..n_cols {
            for i in 0..n_rows {
                z[[i, j]] -= col_medians[j];
            }
            col[j] += col_medians[j];
        }
        let row_shift = median(&row);
        for r in row.iter_mut() {
            *r -= row_shift;
        }
        overall += row_shift;

        let new_sum: f64 = z.iter().map(|v| v.abs()).sum();
        let converged = new_sum == 0.0 || (new_sum - old_sum).abs() < EPS * new_sum;
        old_sum = new_sum;
        if converged {
            break;
        }
    }

    MedianPolish {
        overall,
        row,
        col,
        residuals: z,
    }
}

/// Probeset expression per array: overall effect plus array effect
pub fn summarize_probeset(log_values: ArrayView2<f64>) -> Vec<f64> {
    let fit = median_polish(log_values);
    fit.col.iter().map(|c| fit.overall + c).collect()
}
