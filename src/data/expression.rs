//! Continuous expression values (log scale) per feature and sample

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use super::count_matrix::deduplicate_ids;
use crate::error::{DexError, Result};

/// Log-scale expression matrix: features (genes or probesets) x samples.
///
/// Used for summarised microarray intensities and for transformed RNA-seq
/// counts.
#[derive(Debug, Clone)]
pub struct ExpressionMatrix {
    values: Array2<f64>,
    feature_ids: Vec<String>,
    sample_ids: Vec<String>,
}

impl ExpressionMatrix {
    pub fn new(values: Array2<f64>, feature_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        let (n_features, n_samples) = values.dim();
        if feature_ids.len() != n_features {
            return Err(DexError::DimensionMismatch {
                expected: format!("{} feature IDs", n_features),
                got: format!("{} feature IDs", feature_ids.len()),
            });
        }
        if sample_ids.len() != n_samples {
            return Err(DexError::DimensionMismatch {
                expected: format!("{} sample IDs", n_samples),
                got: format!("{} sample IDs", sample_ids.len()),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DexError::InvalidExpressionMatrix {
                reason: "Expression values must be finite".to_string(),
            });
        }
        Ok(Self {
            values,
            feature_ids: deduplicate_ids(feature_ids),
            sample_ids,
        })
    }

    pub fn n_features(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.values.ncols()
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn row(&self, idx: usize) -> ArrayView1<'_, f64> {
        self.values.row(idx)
    }

    pub fn row_means(&self) -> Vec<f64> {
        let n = self.n_samples() as f64;
        self.values.axis_iter(Axis(0)).map(|r| r.sum() / n).collect()
    }

    /// Per-row sample variance (n - 1 denominator)
    pub fn row_variances(&self) -> Vec<f64> {
        let n = self.n_samples();
        if n < 2 {
            return vec![0.0; self.n_features()];
        }
        self.values
            .axis_iter(Axis(0))
            .map(|r| {
                let m = r.sum() / n as f64;
                r.iter().map(|&v| (v - m) * (v - m)).sum::<f64>() / (n - 1) as f64
            })
            .collect()
    }

    /// Indices of the `n` rows with the largest variance, most variable first
    pub fn top_variance(&self, n: usize) -> Vec<usize> {
        let vars = self.row_variances();
        let mut order: Vec<usize> = (0..vars.len()).collect();
        order.sort_by(|&a, &b| vars[b].total_cmp(&vars[a]).then(a.cmp(&b)));
        order.truncate(n.min(vars.len()));
        order
    }

    pub fn subset_features(&self, indices: &[usize]) -> Result<Self> {
        let values = self.values.select(Axis(0), indices);
        let ids = indices.iter().map(|&i| self.feature_ids[i].clone()).collect();
        Self::new(values, ids, self.sample_ids.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn matrix() -> ExpressionMatrix {
        ExpressionMatrix::new(
            array![[1.0, 1.0, 1.0], [0.0, 5.0, 10.0], [2.0, 3.0, 4.0]],
            vec!["flat".into(), "wide".into(), "narrow".into()],
            vec!["a".into(), "b".into(), "c".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_top_variance_order() {
        let m = matrix();
        assert_eq!(m.top_variance(2), vec![1, 2]);
        assert_eq!(m.top_variance(10).len(), 3);
        assert_eq!(m.row_variances()[0], 0.0);
    }

    #[test]
    fn test_rejects_non_finite() {
        let res = ExpressionMatrix::new(array![[f64::NAN]], vec!["x".into()], vec!["s".into()]);
        assert!(res.is_err());
    }

    #[test]
    fn test_subset_features() {
        let m = matrix().subset_features(&[2]).unwrap();
        assert_eq!(m.feature_ids(), &["narrow"]);
        assert_eq!(m.row_means(), vec![3.0]);
    }
}
