//! Weighted least squares via the normal equations.
//!
//! Every linear fit in this crate solves the same problem: given a P x N
//! matrix of basis-function values evaluated at each observation (row 0
//! conventionally all-ones for an intercept), find the coefficients `c`
//! minimizing
//!
//! ```text
//! Σ_k ((y_k - Σ_i c_i · basis_i_k) / w_k)^2
//! ```
//!
//! where `w_k` is the observation's standard deviation. We form the weighted
//! normal equations
//!
//! ```text
//! A[i][j] = Σ_k basis[i][k]·basis[j][k]/w[k]²
//! b[i]    = Σ_k y[k]·basis[i][k]/w[k]²
//! ```
//!
//! and solve `A·c = b` by explicit inversion. The inverse is kept: the
//! statistics engine needs `(XᵗWX)⁻¹` to derive the covariance matrix, so
//! computing it once here avoids a second factorization. Parameter counts
//! are tiny (a handful of basis functions), so inversion cost is irrelevant.

use nalgebra::{DMatrix, DVector};

use crate::error::{FitError, Result};

/// Output of a normal-equation solve.
#[derive(Debug, Clone)]
pub struct WlsSolution {
    /// Coefficients minimizing the weighted sum of squared residuals.
    pub coefficients: Vec<f64>,
    /// `(XᵗWX)⁻¹`, consumed by the statistics engine.
    pub inverse: DMatrix<f64>,
}

/// Build and solve the weighted normal equations.
///
/// `basis` holds one row per basis function, each of length N. Fails with
/// [`FitError::DegenerateSystem`] when there are at least as many parameters
/// as observations, and [`FitError::SingularSystem`] when the normal-equation
/// matrix cannot be inverted (collinear basis rows).
pub fn solve_weighted_normal(basis: &[Vec<f64>], y: &[f64], weight: &[f64]) -> Result<WlsSolution> {
    let p = basis.len();
    let n = y.len();
    if p == 0 || n == 0 {
        return Err(FitError::EmptyDataset);
    }
    for row in basis {
        if row.len() != n {
            return Err(FitError::LengthMismatch {
                context: "basis row",
                expected: n,
                got: row.len(),
            });
        }
    }
    if weight.len() != n {
        return Err(FitError::LengthMismatch {
            context: "weight array",
            expected: n,
            got: weight.len(),
        });
    }
    if n <= p {
        return Err(FitError::DegenerateSystem { n, p });
    }

    let mut a = DMatrix::<f64>::zeros(p, p);
    let mut b = DVector::<f64>::zeros(p);
    for k in 0..n {
        let w2 = weight[k] * weight[k];
        for i in 0..p {
            let xi = basis[i][k] / w2;
            b[i] += y[k] * xi;
            // A is symmetric; fill the upper triangle and mirror below.
            for j in i..p {
                a[(i, j)] += xi * basis[j][k];
            }
        }
    }
    for i in 1..p {
        for j in 0..i {
            a[(i, j)] = a[(j, i)];
        }
    }

    let inverse = a
        .try_inverse()
        .filter(|inv| inv.iter().all(|v| v.is_finite()))
        .ok_or(FitError::SingularSystem { n, p })?;
    let c = &inverse * b;

    Ok(WlsSolution {
        coefficients: c.iter().copied().collect(),
        inverse,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_exact_line() {
        // Fit y = 2 + 3x on noiseless collinear data.
        let x = [0.0, 1.0, 2.0, 3.0];
        let basis = vec![vec![1.0; 4], x.to_vec()];
        let y: Vec<f64> = x.iter().map(|&v| 2.0 + 3.0 * v).collect();
        let w = vec![1.0; 4];

        let sol = solve_weighted_normal(&basis, &y, &w).unwrap();
        assert!((sol.coefficients[0] - 2.0).abs() < 1e-10);
        assert!((sol.coefficients[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn constant_weights_do_not_change_coefficients() {
        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        let basis = vec![vec![1.0; 5], x.to_vec()];
        let y = [1.0, 2.9, 5.2, 6.8, 9.1];

        let unit = solve_weighted_normal(&basis, &y, &[1.0; 5]).unwrap();
        let scaled = solve_weighted_normal(&basis, &y, &[7.5; 5]).unwrap();
        for (a, b) in unit.coefficients.iter().zip(scaled.coefficients.iter()) {
            assert!((a - b).abs() < 1e-9, "weighted least squares must be scale-invariant");
        }
    }

    #[test]
    fn rejects_more_parameters_than_data() {
        let basis = vec![vec![1.0, 1.0], vec![0.0, 1.0], vec![0.0, 2.0]];
        let err = solve_weighted_normal(&basis, &[1.0, 2.0], &[1.0, 1.0]).unwrap_err();
        assert!(matches!(err, FitError::DegenerateSystem { n: 2, p: 3 }));
    }

    #[test]
    fn rejects_collinear_basis_rows() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let doubled: Vec<f64> = x.iter().map(|v| 2.0 * v).collect();
        let basis = vec![vec![1.0; 4], x.to_vec(), doubled];
        let err = solve_weighted_normal(&basis, &[0.0; 4], &[1.0; 4]).unwrap_err();
        assert!(matches!(err, FitError::SingularSystem { .. }));
    }

    #[test]
    fn downweights_high_sigma_observations() {
        // One wildly wrong point with a huge sigma should barely move the fit.
        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        let basis = vec![vec![1.0; 5], x.to_vec()];
        let mut y: Vec<f64> = x.iter().map(|&v| 2.0 + 3.0 * v).collect();
        y[2] = 100.0;
        let mut w = vec![1.0; 5];
        w[2] = 1e6;

        let sol = solve_weighted_normal(&basis, &y, &w).unwrap();
        assert!((sol.coefficients[0] - 2.0).abs() < 1e-3);
        assert!((sol.coefficients[1] - 3.0).abs() < 1e-3);
    }
}
