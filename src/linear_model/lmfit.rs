//! Gene-wise ordinary least squares with a shared design, and contrasts

use ndarray::{Array1, Array2, ArrayView2};
use rayon::prelude::*;

use crate::data::ExpressionMatrix;
use crate::error::{DexError, Result};
use crate::glm::DesignInfo;
use crate::linalg::invert_spd;

/// Least squares fit of every feature against one design
#[derive(Debug, Clone)]
pub struct LinearModelFit {
    pub feature_ids: Vec<String>,
    pub coef_names: Vec<String>,
    /// features x coefficients
    pub coefficients: Array2<f64>,
    /// Coefficient SDs divided by the residual SD, features x coefficients
    pub stdev_unscaled: Array2<f64>,
    /// Residual SD per feature
    pub sigma: Vec<f64>,
    pub df_residual: Vec<f64>,
    /// Average log expression per feature
    pub amean: Vec<f64>,
    /// Unscaled covariance of the coefficients, shared by all features
    pub cov_coefficients: Array2<f64>,
}

impl LinearModelFit {
    pub fn n_features(&self) -> usize {
        self.feature_ids.len()
    }

    pub fn n_coefs(&self) -> usize {
        self.coef_names.len()
    }
}

/// Fit `y = X b + e` for every row of `expr`
pub fn lm_fit(expr: &ExpressionMatrix, design: &DesignInfo) -> Result<LinearModelFit> {
    let x = design.matrix.view();
    let (n, p) = x.dim();
    if n != expr.n_samples() {
        return Err(DexError::DimensionMismatch {
            expected: format!("{} design rows", expr.n_samples()),
            got: format!("{} design rows", n),
        });
    }
    if n <= p {
        return Err(DexError::InvalidDesign {
            reason: "no residual degrees of freedom".to_string(),
        });
    }
    let xtx = x.t().dot(&x);
    let cov = invert_spd(xtx.view()).ok_or_else(|| DexError::InvalidDesign {
        reason: "design matrix is not of full column rank".to_string(),
    })?;
    // (X'X)^-1 X', applied to every feature
    let hat = cov.dot(&x.t());
    let df = (n - p) as f64;

    let values = expr.values();
    let rows: Vec<(Array1<f64>, f64)> = (0..expr.n_features())
        .into_par_iter()
        .map(|i| {
            let y = values.row(i);
            let beta = hat.dot(&y);
            let fitted = x.dot(&beta);
            let rss: f64 = y.iter().zip(fitted.iter()).map(|(a, b)| (a - b) * (a - b)).sum();
            (beta, (rss / df).sqrt())
        })
        .collect();

    let mut coefficients = Array2::<f64>::zeros((expr.n_features(), p));
    let mut sigma = Vec::with_capacity(rows.len());
    for (i, (beta, s)) in rows.into_iter().enumerate() {
        coefficients.row_mut(i).assign(&beta);
        sigma.push(s);
    }
    let unscaled: Array1<f64> = cov.diag().mapv(f64::sqrt);
    let stdev_unscaled = Array2::from_shape_fn((expr.n_features(), p), |(_, j)| unscaled[j]);

    log::info!("linear model fitted for {} features, {} residual df", expr.n_features(), df);
    Ok(LinearModelFit {
        feature_ids: expr.feature_ids().to_vec(),
        coef_names: design.column_names.clone(),
        coefficients,
        stdev_unscaled,
        sigma,
        df_residual: vec![df; expr.n_features()],
        amean: expr.row_means(),
        cov_coefficients: cov,
    })
}

/// Re-express a fit in terms of contrasts: column `k` of `contrasts`
/// (coefficients x contrasts) weights the original coefficients
pub fn contrasts_fit(fit: &LinearModelFit, contrasts: ArrayView2<f64>, names: Vec<String>) -> Result<LinearModelFit> {
    if contrasts.nrows() != fit.n_coefs() || names.len() != contrasts.ncols() {
        return Err(DexError::InvalidContrast {
            reason: format!(
                "contrast matrix is {}x{} for {} coefficients and {} names",
                contrasts.nrows(),
                contrasts.ncols(),
                fit.n_coefs(),
                names.len()
            ),
        });
    }
    let coefficients = fit.coefficients.dot(&contrasts);
    let cov = contrasts.t().dot(&fit.cov_coefficients).dot(&contrasts);
    let unscaled: Array1<f64> = cov.diag().mapv(|v| v.max(0.0).sqrt());
    let stdev_unscaled = Array2::from_shape_fn((fit.n_features(), contrasts.ncols()), |(_, j)| unscaled[j]);
    Ok(LinearModelFit {
        feature_ids: fit.feature_ids.clone(),
        coef_names: names,
        coefficients,
        stdev_unscaled,
        sigma: fit.sigma.clone(),
        df_residual: fit.df_residual.clone(),
        amean: fit.amean.clone(),
        cov_coefficients: cov,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SampleSheet;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn design() -> DesignInfo {
        let mut sheet = SampleSheet::new((1..=6).map(|i| format!("a{}", i)).collect()).unwrap();
        sheet
            .add_column("group", ["wt", "wt", "wt", "ko", "ko", "ko"].iter().map(|s| s.to_string()).collect())
            .unwrap();
        DesignInfo::one_factor(&sheet, "group", Some("wt")).unwrap()
    }

    #[test]
    fn test_lm_fit_group_means() {
        let expr = ExpressionMatrix::new(
            array![[5.0, 6.0, 7.0, 9.0, 10.0, 11.0]],
            vec!["p1".into()],
            (1..=6).map(|i| format!("a{}", i)).collect(),
        )
        .unwrap();
        let fit = lm_fit(&expr, &design()).unwrap();
        assert_abs_diff_eq!(fit.coefficients[[0, 0]], 6.0, epsilon = 1e-10);
        assert_abs_diff_eq!(fit.coefficients[[0, 1]], 4.0, epsilon = 1e-10);
        // residuals -1, 0, 1 in each group: RSS 4 on 4 df
        assert_abs_diff_eq!(fit.sigma[0], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(fit.stdev_unscaled[[0, 1]], (2.0_f64 / 3.0).sqrt(), epsilon = 1e-10);
        assert_abs_diff_eq!(fit.amean[0], 8.0, epsilon = 1e-10);

        let c = array![[0.0], [-1.0]];
        let cf = contrasts_fit(&fit, c.view(), vec!["wt-ko".into()]).unwrap();
        assert_abs_diff_eq!(cf.coefficients[[0, 0]], -4.0, epsilon = 1e-10);
        assert_abs_diff_eq!(cf.stdev_unscaled[[0, 0]], (2.0_f64 / 3.0).sqrt(), epsilon = 1e-10);
    }
}
