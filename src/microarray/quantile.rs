//! Quantile normalization across arrays

use ndarray::{Array2, Axis};

/// Give every column the same distribution: the mean of the sorted columns.
/// Tied values share the average of the reference values over their ranks.
pub fn quantile_normalize(values: &Array2<f64>) -> Array2<f64> {
    let (n_rows, n_cols) = values.dim();
    if n_rows == 0 || n_cols == 0 {
        return values.clone();
    }

    let orders: Vec<Vec<usize>> = values
        .axis_iter(Axis(1))
        .map(|col| {
            let mut idx: Vec<usize> = (0..n_rows).collect();
            idx.sort_by(|&a, &b| col[a].total_cmp(&col[b]));
            idx
        })
        .collect();

    let mut reference = vec![0.0; n_rows];
    for (j, order) in orders.iter().enumerate() {
        for (rank, &i) in order.iter().enumerate() {
            reference[rank] += values[[i, j]];
        }
    }
    reference.iter_mut().for_each(|r| *r /= n_cols as f64);

    let mut out = Array2::<f64>::zeros((n_rows, n_cols));
    for (j, order) in orders.iter().enumerate() {
        let mut start = 0;
        while start < n_rows {
            let v = values[[order[start], j]];
            let mut end = start + 1;
            while end < n_rows && values[[order[end], j]] == v {
                end += 1;
            }
            let shared = reference[start..end].iter().sum::<f64>() / (end - start) as f64;
            for &i in &order[start..end] {
                out[[i, j]] = shared;
            }
            start = end;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_identical_sorted_columns() {
        let x = array![[5.0, 4.0, 3.0], [2.0, 1.0, 4.0], [3.0, 4.5, 6.0], [4.0, 2.0, 8.0]];
        let q = quantile_normalize(&x);
        let sorted = |j: usize| {
            let mut c = q.column(j).to_vec();
            c.sort_by(|a, b| a.total_cmp(b));
            c
        };
        assert_eq!(sorted(0), sorted(1));
        assert_eq!(sorted(1), sorted(2));
        // smallest entry of each column maps to the mean of the column minima
        assert!((q[[1, 0]] - 2.0).abs() < 1e-12);
        // ranks are preserved
        assert!(q[[0, 0]] > q[[3, 0]]);
    }

    #[test]
    fn test_ties_share_rank_mean() {
        let x = array![[1.0, 1.0], [1.0, 2.0], [3.0, 3.0]];
        let q = quantile_normalize(&x);
        // reference is [1.0, 1.5, 3.0]; the tie in column 0 averages ranks 0 and 1
        assert!((q[[0, 0]] - 1.25).abs() < 1e-12);
        assert!((q[[1, 0]] - 1.25).abs() < 1e-12);
        assert!((q[[1, 1]] - 1.5).abs() < 1e-12);
    }
}
