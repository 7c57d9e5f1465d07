//! Small dense linear algebra used by the model fits and PCA
//!
//! Matrices here are tiny (coefficients x coefficients, samples x samples),
//! so plain Cholesky and cyclic Jacobi are sufficient.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Cholesky factor `L` of a symmetric positive definite matrix (`A = L L'`)
pub fn cholesky(a: ArrayView2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    if a.ncols() != n {
        return None;
    }
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[[i, i]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }
    Some(l)
}

fn cholesky_solve_factored(l: &Array2<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    let n = l.nrows();
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * y[k];
        }
        y[i] = sum / l[[i, i]];
    }
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for k in (i + 1)..n {
            sum -= l[[k, i]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }
    x
}

/// Solve `A x = b` for symmetric positive definite `A`
pub fn solve_spd(a: ArrayView2<f64>, b: ArrayView1<f64>) -> Option<Array1<f64>> {
    let l = cholesky(a)?;
    Some(cholesky_solve_factored(&l, b))
}

/// Inverse of a symmetric positive definite matrix
pub fn invert_spd(a: ArrayView2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let l = cholesky(a)?;
    let mut inv = Array2::<f64>::zeros((n, n));
    let mut e = Array1::<f64>::zeros(n);
    for j in 0..n {
        e.fill(0.0);
        e[j] = 1.0;
        let col = cholesky_solve_factored(&l, e.view());
        inv.column_mut(j).assign(&col);
    }
    Some(inv)
}

/// `X' diag(w) X`
pub fn weighted_crossprod(x: ArrayView2<f64>, w: &[f64]) -> Array2<f64> {
    let (n, p) = x.dim();
    let mut out = Array2::<f64>::zeros((p, p));
    for s in 0..n {
        for j in 0..p {
            let xj = x[[s, j]] * w[s];
            if xj == 0.0 {
                continue;
            }
            for k in j..p {
                out[[j, k]] += xj * x[[s, k]];
            }
        }
    }
    for j in 0..p {
        for k in 0..j {
            out[[j, k]] = out[[k, j]];
        }
    }
    out
}

/// Quadratic form `c' A c`
pub fn quadratic_form(a: ArrayView2<f64>, c: &[f64]) -> f64 {
    let n = c.len();
    let mut total = 0.0;
    for i in 0..n {
        if c[i] == 0.0 {
            continue;
        }
        for j in 0..n {
            total += c[i] * a[[i, j]] * c[j];
        }
    }
    total
}

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns eigenvalues in decreasing order and the matching eigenvectors as
/// columns.
pub fn symmetric_eigen(a: ArrayView2<f64>) -> (Vec<f64>, Array2<f64>) {
    let n = a.nrows();
    let mut m = a.to_owned();
    let mut v = Array2::<f64>::eye(n);

    for _sweep in 0..100 {
        let off: f64 = (0..n)
            .flat_map(|i| (0..n).filter(move |&j| j != i).map(move |j| (i, j)))
            .map(|(i, j)| m[[i, j]] * m[[i, j]])
            .sum();
        if off < 1e-22 {
            break;
        }
        for p in 0..n {
            for q in (p + 1)..n {
                let apq = m[[p, q]];
                if apq.abs() < 1e-300 {
                    continue;
                }
                let theta = (m[[q, q]] - m[[p, p]]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let t = if theta == 0.0 { 1.0 } else { t };
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let mkp = m[[k, p]];
                    let mkq = m[[k, q]];
                    m[[k, p]] = c * mkp - s * mkq;
                    m[[k, q]] = s * mkp + c * mkq;
                }
                for k in 0..n {
                    let mpk = m[[p, k]];
                    let mqk = m[[q, k]];
                    m[[p, k]] = c * mpk - s * mqk;
                    m[[q, k]] = s * mpk + c * mqk;
                }
                for k in 0..n {
                    let vkp = v[[k, p]];
                    let vkq = v[[k, q]];
                    v[[k, p]] = c * vkp - s * vkq;
                    v[[k, q]] = s * vkp + c * vkq;
                }
            }
        }
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| m[[j, j]].total_cmp(&m[[i, i]]));
    let values: Vec<f64> = order.iter().map(|&i| m[[i, i]]).collect();
    let mut vectors = Array2::<f64>::zeros((n, n));
    for (dst, &src) in order.iter().enumerate() {
        vectors.column_mut(dst).assign(&v.column(src));
    }
    (values, vectors)
}
