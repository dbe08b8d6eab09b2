//! Pseudo-linear statistics for nonlinear fits.
//!
//! The simplex optimizer produces no derivative information, so standard
//! errors are recovered by treating the objective as locally quadratic at
//! the optimum and differentiating it numerically:
//!
//! - perturbations are *fractional*: each parameter moves by
//!   `delta * hold_i`, where `hold_i` is the best estimate (or the
//!   optimizer's step size when the estimate is exactly zero, which is
//!   flagged rather than silently dividing by zero)
//! - the Hessian of the sum of squares is built from four-point finite
//!   differences over every parameter pair (three-point on the diagonal)
//! - covariance follows as `2 · reduced_variance · hold_i · hold_j · (H⁻¹)_ij`
//!
//! Failure to invert the Hessian, or a negative variance on its diagonal,
//! is a soft failure: the affected statistics become NaN and status flags
//! record what happened, but the fit result stays usable.
//!
//! A second, cheaper estimate — the *pseudo standard deviation*, derived
//! from the asymmetry of one-sided gradients — is reported alongside the
//! covariance-based errors as a cross-check.

use nalgebra::DMatrix;

/// Default fractional step for numerical differentiation.
pub const DEFAULT_DELTA: f64 = 1e-4;

/// Numerically-derived error statistics for a nonlinear fit.
#[derive(Debug, Clone)]
pub struct PseudoLinearStats {
    /// Covariance-based standard errors (NaN where undefined).
    pub standard_errors: Vec<f64>,
    /// Gradient-asymmetry estimate per parameter (NaN where the curvature
    /// denominator is non-positive).
    pub pseudo_sd: Vec<f64>,
    pub covariance: Vec<Vec<f64>>,
    pub correlation: Vec<Vec<f64>>,
    /// The finite-difference Hessian inverted successfully.
    pub invert_ok: bool,
    /// Every covariance-diagonal entry was non-negative.
    pub positive_variance: bool,
    /// Per parameter: best estimate was exactly zero, step size substituted.
    pub zero_substituted: Vec<bool>,
}

/// Differentiate `objective` (the unconstrained weighted sum of squares, in
/// model space) around `best` and derive covariance-based and pseudo
/// standard deviations.
///
/// `step` supplies the substitute magnitude for exactly-zero parameters and
/// `reduced_variance` is the objective at the optimum divided by the degrees
/// of freedom.
pub fn pseudo_linear_stats<F>(
    objective: F,
    best: &[f64],
    step: &[f64],
    reduced_variance: f64,
    delta: f64,
) -> PseudoLinearStats
where
    F: Fn(&[f64]) -> f64,
{
    let p = best.len();

    let zero_substituted: Vec<bool> = best.iter().map(|&b| b == 0.0).collect();
    let hold: Vec<f64> = best
        .iter()
        .zip(step.iter())
        .map(|(&b, &s)| if b == 0.0 { s } else { b })
        .collect();

    let f0 = objective(best);

    let at = |offsets: &[(usize, f64)]| -> f64 {
        let mut params = best.to_vec();
        for &(i, frac) in offsets {
            params[i] += frac * delta * hold[i];
        }
        objective(&params)
    };

    // Axis evaluations, shared by the gradient and the Hessian diagonal.
    let f_plus: Vec<f64> = (0..p).map(|i| at(&[(i, 1.0)])).collect();
    let f_minus: Vec<f64> = (0..p).map(|i| at(&[(i, -1.0)])).collect();

    // Pseudo standard deviation from one-sided gradients (fractional units).
    let dd = delta * delta;
    let pseudo_sd: Vec<f64> = (0..p)
        .map(|i| {
            let grad_forward = (f_plus[i] - f0) / delta;
            let grad_backward = (f0 - f_minus[i]) / delta;
            let asymmetry = grad_forward - grad_backward;
            if asymmetry > 0.0 {
                // Curvature = asymmetry / delta; variance = 2σ²/curvature.
                (2.0 * reduced_variance * delta / asymmetry).sqrt() * hold[i].abs()
            } else {
                f64::NAN
            }
        })
        .collect();

    // Hessian of the sum of squares in fractional-parameter space.
    let mut hessian = DMatrix::<f64>::zeros(p, p);
    for i in 0..p {
        hessian[(i, i)] = (f_plus[i] - 2.0 * f0 + f_minus[i]) / dd;
        for j in (i + 1)..p {
            let fpp = at(&[(i, 1.0), (j, 1.0)]);
            let fpm = at(&[(i, 1.0), (j, -1.0)]);
            let fmp = at(&[(i, -1.0), (j, 1.0)]);
            let fmm = at(&[(i, -1.0), (j, -1.0)]);
            let d2 = (fpp - fpm - fmp + fmm) / (4.0 * dd);
            hessian[(i, j)] = d2;
            hessian[(j, i)] = d2;
        }
    }

    let nan_matrix = || vec![vec![f64::NAN; p]; p];

    let Some(inverse) = hessian.try_inverse().filter(|m| m.iter().all(|v| v.is_finite()))
    else {
        return PseudoLinearStats {
            standard_errors: vec![f64::NAN; p],
            pseudo_sd,
            covariance: nan_matrix(),
            correlation: nan_matrix(),
            invert_ok: false,
            positive_variance: false,
            zero_substituted,
        };
    };

    // Back to real parameter units: cov_ij = 2σ²·hold_i·hold_j·inv_ij.
    let covariance: Vec<Vec<f64>> = (0..p)
        .map(|i| {
            (0..p)
                .map(|j| 2.0 * reduced_variance * hold[i] * hold[j] * inverse[(i, j)])
                .collect()
        })
        .collect();

    let finished = crate::stats::linear::finish_covariance(covariance);

    PseudoLinearStats {
        standard_errors: finished.standard_errors,
        pseudo_sd,
        covariance: finished.covariance,
        correlation: finished.correlation,
        invert_ok: true,
        positive_variance: finished.positive_variance,
        zero_substituted,
    }
}
