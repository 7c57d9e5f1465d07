//! Multiple testing correction

/// Benjamini-Hochberg adjusted p-values. NaN inputs stay NaN and do not
/// count toward the number of tests.
pub fn benjamini_hochberg(pvalues: &[f64]) -> Vec<f64> {
    let n = pvalues.len();
    let mut order: Vec<usize> = (0..n).filter(|&i| pvalues[i].is_finite()).collect();
    let m = order.len();
    let mut padj = vec![f64::NAN; n];
    if m == 0 {
        return padj;
    }
    order.sort_by(|&a, &b| pvalues[a].total_cmp(&pvalues[b]));

    // walk from the largest p-value down, carrying the running minimum
    let mut cummin = f64::INFINITY;
    for (rank, &i) in order.iter().enumerate().rev() {
        let adj = (pvalues[i] * m as f64 / (rank + 1) as f64).min(1.0);
        cummin = cummin.min(adj);
        padj[i] = cummin;
    }
    padj
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_bh_known_values() {
        let padj = benjamini_hochberg(&[0.01, 0.04, 0.03, 0.02]);
        for v in &padj {
            assert_abs_diff_eq!(*v, 0.04, epsilon = 1e-12);
        }
        let padj = benjamini_hochberg(&[0.001, 0.01, 0.05, 0.5]);
        assert_abs_diff_eq!(padj[0], 0.004, epsilon = 1e-12);
        assert_abs_diff_eq!(padj[1], 0.02, epsilon = 1e-12);
        assert_abs_diff_eq!(padj[2], 0.2 / 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(padj[3], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_bh_with_nan() {
        let pvalues = vec![0.01, f64::NAN, 0.03, 0.02];
        let padj = benjamini_hochberg(&pvalues);
        assert!(padj[1].is_nan());
        assert_abs_diff_eq!(padj[0], 0.03, epsilon = 1e-12);
        for (p, adj) in pvalues.iter().zip(&padj).filter(|(p, _)| p.is_finite()) {
            assert!(adj >= p && *adj <= 1.0);
        }
    }

    #[test]
    fn test_bh_empty() {
        assert!(benjamini_hochberg(&[]).is_empty());
        assert!(benjamini_hochberg(&[f64::NAN])[0].is_nan());
    }
}
