//! Principal component analysis of samples

use ndarray::{Array2, Axis};

use super::most_variable;
use crate::data::ExpressionMatrix;
use crate::error::{DexError, Result};
use crate::linalg::symmetric_eigen;

/// Sample coordinates on the leading principal components
#[derive(Debug, Clone)]
pub struct PcaResult {
    pub sample_ids: Vec<String>,
    /// samples x components
    pub scores: Array2<f64>,
    /// Percent of total variance per component
    pub percent_variance: Vec<f64>,
    /// Number of rows the decomposition used
    pub n_features: usize,
}

impl PcaResult {
    pub fn n_components(&self) -> usize {
        self.scores.ncols()
    }
}

/// PCA on the `n_top` most variable rows, centred per row and not scaled.
///
/// Uses the samples x samples Gram matrix, which is small for any realistic
/// study. Component signs are fixed so the largest absolute score is positive.
pub fn pca(expr: &ExpressionMatrix, n_top: usize, n_components: usize) -> Result<PcaResult> {
    let n = expr.n_samples();
    if n < 2 {
        return Err(DexError::InvalidInput {
            reason: "PCA needs at least two samples".to_string(),
        });
    }
    let top = most_variable(expr, n_top)?;
    let mut x = top.values().to_owned();
    for mut row in x.axis_iter_mut(Axis(0)) {
        let m = row.sum() / n as f64;
        row.mapv_inplace(|v| v - m);
    }

    let gram = x.t().dot(&x);
    let (values, vectors) = symmetric_eigen(gram.view());
    let total: f64 = values.iter().map(|v| v.max(0.0)).sum();
    if total <= 0.0 {
        return Err(DexError::NumericalInstability {
            operation: "PCA".to_string(),
            details: "selected rows have no variance".to_string(),
        });
    }

    let k = n_components.min(n);
    let mut scores = Array2::<f64>::zeros((n, k));
    let mut percent_variance = Vec::with_capacity(k);
    for c in 0..k {
        let lambda = values[c].max(0.0);
        let col = vectors.column(c);
        let flip = col
            .iter()
            .copied()
            .fold(0.0_f64, |acc, v| if v.abs() > acc.abs() { v } else { acc })
            < 0.0;
        let sign = if flip { -1.0 } else { 1.0 };
        for s in 0..n {
            scores[[s, c]] = sign * col[s] * lambda.sqrt();
        }
        percent_variance.push(100.0 * lambda / total);
    }
    log::info!(
        "PCA on {} rows: {}",
        top.n_features(),
        percent_variance
            .iter()
            .enumerate()
            .map(|(i, p)| format!("PC{} {:.1}%", i + 1, p))
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(PcaResult {
        sample_ids: expr.sample_ids().to_vec(),
        scores,
        percent_variance,
        n_features: top.n_features(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_two_groups_split_on_pc1() {
        let expr = ExpressionMatrix::new(
            array![
                [1.0, 1.2, 0.9, 5.0, 5.1, 4.8],
                [2.0, 2.1, 1.9, 7.0, 6.8, 7.1],
                [3.0, 3.3, 2.9, 3.1, 2.8, 3.0],
            ],
            vec!["g1".into(), "g2".into(), "g3".into()],
            (1..=6).map(|i| format!("s{}", i)).collect(),
        )
        .unwrap();
        let res = pca(&expr, 500, 2).unwrap();
        assert_eq!(res.n_components(), 2);
        assert_eq!(res.n_features, 3);
        assert!(res.percent_variance[0] > 90.0);
        let pc1 = res.scores.column(0);
        assert!(pc1[0].signum() == pc1[1].signum() && pc1[0].signum() != pc1[4].signum());
        // scores are centred
        assert_abs_diff_eq!(pc1.sum(), 0.0, epsilon = 1e-8);
    }

    #[test]
    fn test_single_sample_rejected() {
        let expr = ExpressionMatrix::new(array![[1.0], [2.0]], vec!["a".into(), "b".into()], vec!["s".into()]).unwrap();
        assert!(pca(&expr, 10, 2).is_err());
    }
}
