//! Analytic statistics for linear fits, and the shared goodness-of-fit
//! summary.
//!
//! For a model linear in its coefficients the covariance matrix is exact:
//!
//! ```text
//! cov = σ² · (XᵗWX)⁻¹
//! ```
//!
//! with `σ²` the (weighted) mean squared residual over `n - p` degrees of
//! freedom. Standard errors are the square roots of the diagonal and the
//! correlation matrix follows by normalizing with them.

use nalgebra::DMatrix;

use crate::domain::FitQuality;

/// Covariance-derived error statistics.
#[derive(Debug, Clone)]
pub struct CovarianceStats {
    /// Square roots of the covariance diagonal (NaN where negative).
    pub standard_errors: Vec<f64>,
    pub covariance: Vec<Vec<f64>>,
    pub correlation: Vec<Vec<f64>>,
    /// False when any covariance-diagonal entry was negative.
    pub positive_variance: bool,
}

/// Scale `(XᵗWX)⁻¹` by the reduced variance and derive standard errors and
/// correlations.
pub fn covariance_from_inverse(inverse: &DMatrix<f64>, reduced_variance: f64) -> CovarianceStats {
    let p = inverse.nrows();
    let covariance: Vec<Vec<f64>> = (0..p)
        .map(|i| (0..p).map(|j| reduced_variance * inverse[(i, j)]).collect())
        .collect();
    finish_covariance(covariance)
}

/// Standard errors and correlations from an already-built covariance matrix.
/// Negative diagonal entries yield NaN standard errors (and NaN in every
/// correlation entry touching them) rather than an error.
pub fn finish_covariance(covariance: Vec<Vec<f64>>) -> CovarianceStats {
    let p = covariance.len();
    let mut positive_variance = true;
    let standard_errors: Vec<f64> = (0..p)
        .map(|i| {
            let var = covariance[i][i];
            if var >= 0.0 {
                var.sqrt()
            } else {
                positive_variance = false;
                f64::NAN
            }
        })
        .collect();

    let correlation: Vec<Vec<f64>> = (0..p)
        .map(|i| {
            (0..p)
                .map(|j| {
                    if i == j {
                        1.0
                    } else {
                        covariance[i][j] / (standard_errors[i] * standard_errors[j])
                    }
                })
                .collect()
        })
        .collect();

    CovarianceStats {
        standard_errors,
        covariance,
        correlation,
        positive_variance,
    }
}

/// Goodness-of-fit summary from flattened responses, weights, and residuals.
///
/// `weighted` controls whether the chi-square family is reported; `p` is the
/// number of fitted parameters. Multi-response fits flatten their series
/// before calling this.
pub fn goodness_of_fit(
    y: &[f64],
    weight: &[f64],
    residuals: &[f64],
    weighted: bool,
    p: usize,
) -> FitQuality {
    let n = y.len();
    let ss: f64 = residuals
        .iter()
        .zip(weight.iter())
        .map(|(&r, &w)| {
            let rw = r / w;
            rw * rw
        })
        .sum();

    let dof = n.saturating_sub(p);
    let (chi_square, reduced_chi_square) = if weighted {
        (
            Some(ss),
            (dof > 0).then(|| ss / dof as f64),
        )
    } else {
        (None, None)
    };

    // Weighted response mean, then total sum of squares about it.
    let inv_var_sum: f64 = weight.iter().map(|&w| 1.0 / (w * w)).sum();
    let y_bar: f64 = y
        .iter()
        .zip(weight.iter())
        .map(|(&yk, &w)| yk / (w * w))
        .sum::<f64>()
        / inv_var_sum;
    let ss_total: f64 = y
        .iter()
        .zip(weight.iter())
        .map(|(&yk, &w)| {
            let d = (yk - y_bar) / w;
            d * d
        })
        .sum();

    let r_squared = if ss_total > 0.0 {
        1.0 - ss / ss_total
    } else {
        f64::NAN
    };
    let r = if r_squared.is_nan() {
        f64::NAN
    } else {
        r_squared.max(0.0).sqrt()
    };

    // F-ratio only for multivariate fits with residual variance to spare.
    let f_ratio = if p > 1 && dof > 0 && r_squared.is_finite() && (1.0 - r_squared) > 1e-15 {
        Some((r_squared / (p - 1) as f64) / ((1.0 - r_squared) / dof as f64))
    } else {
        None
    };

    FitQuality {
        sum_of_squares: ss,
        chi_square,
        reduced_chi_square,
        r,
        r_squared,
        f_ratio,
    }
}
