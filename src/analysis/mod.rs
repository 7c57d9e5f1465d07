//! Exploratory analysis of log-scale expression: variance ranking, PCA and
//! hierarchical clustering

mod cluster;
mod pca;

pub use cluster::{cluster_order, euclidean_distances, ClusterAxis};
pub use pca::{pca, PcaResult};

use crate::data::ExpressionMatrix;
use crate::error::{DexError, Result};

/// The `n` rows with the largest variance across samples, most variable first
pub fn most_variable(expr: &ExpressionMatrix, n: usize) -> Result<ExpressionMatrix> {
    if expr.n_features() == 0 {
        return Err(DexError::EmptyData {
            reason: "no features to rank by variance".to_string(),
        });
    }
    let rows = expr.top_variance(n);
    log::debug!("selected {} of {} rows by variance", rows.len(), expr.n_features());
    expr.subset_features(&rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_most_variable_order() {
        let expr = ExpressionMatrix::new(
            array![[1.0, 1.0, 1.0], [0.0, 5.0, 10.0], [2.0, 3.0, 4.0]],
            vec!["flat".into(), "wide".into(), "mid".into()],
            vec!["a".into(), "b".into(), "c".into()],
        )
        .unwrap();
        let top = most_variable(&expr, 2).unwrap();
        assert_eq!(top.feature_ids(), &["wide", "mid"]);
        // asking for more rows than exist returns all of them
        assert_eq!(most_variable(&expr, 10).unwrap().n_features(), 3);
    }
}
