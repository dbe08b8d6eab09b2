//! Fit entry points.
//!
//! A [`Fitter`] owns one [`Dataset`] and the constraint set registered for
//! the next fit. It exposes:
//!
//! - `linear`: weighted least squares for any caller-supplied basis matrix
//!   (plus `polynomial` / `straight_line` conveniences that build the
//!   Vandermonde basis)
//! - `simplex`: derivative-free Nelder-Mead search for an arbitrary
//!   [`Model`] callback
//!
//! Both produce a [`FitResult`] carrying parameters, error statistics, and
//! soft-failure flags. Constraints accumulate across calls on purpose (a
//! caller may refit with the same constraints); clearing them between
//! independent fits is the caller's responsibility via `clear_constraints`.

use crate::domain::{Dataset, FitFlags, FitResult, Series};
use crate::error::{FitError, Result};
use crate::fit::constraint::{ConstraintSet, Direction};
use crate::fit::objective::{FitContext, ObjectiveEvaluator};
use crate::fit::simplex::{minimize, Scaling, SimplexOptions};
use crate::math::solve_weighted_normal;
use crate::models::Model;
use crate::stats::{covariance_from_inverse, goodness_of_fit, pseudo_linear_stats, DEFAULT_DELTA};

/// Parameter-estimation engine for one dataset.
pub struct Fitter {
    dataset: Dataset,
    constraints: ConstraintSet,
}

impl Fitter {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset,
            constraints: ConstraintSet::new(),
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Constrain `params[index] direction bound` in the next simplex fit.
    pub fn add_single_constraint(&mut self, index: usize, direction: Direction, bound: f64) {
        self.constraints.add_single(index, direction, bound);
    }

    /// Constrain `Σ signs[j]·params[indices[j]] direction bound`.
    pub fn add_multi_constraint(
        &mut self,
        indices: Vec<usize>,
        signs: Vec<f64>,
        direction: Direction,
        bound: f64,
    ) -> Result<()> {
        self.constraints.add_multi(indices, signs, direction, bound)
    }

    /// Drop all registered constraints.
    pub fn clear_constraints(&mut self) {
        self.constraints.clear();
    }

    /// Override the cliff-penalty weight for subsequent simplex fits.
    pub fn set_penalty_weight(&mut self, weight: f64) {
        self.constraints.set_penalty_weight(weight);
    }

    /// Weighted least-squares fit of a model linear in the supplied basis.
    ///
    /// `basis` holds one row per basis function (row 0 conventionally
    /// all-ones for an intercept), each evaluated at every observation.
    pub fn linear(&self, basis: &[Vec<f64>]) -> Result<FitResult> {
        let Series::Single { y, weight } = self.dataset.series() else {
            return Err(FitError::MultiResponseLinear);
        };

        let sol = solve_weighted_normal(basis, y, weight)?;
        let p = basis.len();
        let n = y.len();

        let predicted: Vec<f64> = (0..n)
            .map(|k| {
                sol.coefficients
                    .iter()
                    .zip(basis.iter())
                    .map(|(&c, row)| c * row[k])
                    .sum()
            })
            .collect();
        let residuals: Vec<f64> = y.iter().zip(predicted.iter()).map(|(&a, &b)| a - b).collect();

        let quality = goodness_of_fit(y, weight, &residuals, self.dataset.is_weighted(), p);
        let reduced_variance = quality.sum_of_squares / (n - p) as f64;
        let cov = covariance_from_inverse(&sol.inverse, reduced_variance);

        let mut flags = FitFlags::analytic(p);
        flags.positive_variance = cov.positive_variance;

        Ok(FitResult {
            params: sol.coefficients,
            standard_errors: cov.standard_errors,
            pseudo_sd: None,
            covariance: cov.covariance,
            correlation: cov.correlation,
            quality,
            converged: true,
            iterations: 0,
            restarts: 0,
            flags,
            predicted: vec![predicted],
            residuals: vec![residuals],
        })
    }

    /// Polynomial fit of the given degree on the first independent-variable
    /// row (Vandermonde basis `1, x, x², ...`).
    pub fn polynomial(&self, degree: usize) -> Result<FitResult> {
        let x = &self.dataset.x_rows()[0];
        let basis: Vec<Vec<f64>> = (0..=degree)
            .map(|d| x.iter().map(|&v| v.powi(d as i32)).collect())
            .collect();
        self.linear(&basis)
    }

    /// `y = a + b·x` on the first independent-variable row.
    pub fn straight_line(&self) -> Result<FitResult> {
        self.polynomial(1)
    }

    /// Nelder-Mead fit of an arbitrary model callback from `start`.
    ///
    /// Defaults for step sizes, tolerance, iteration budget, and restart
    /// count come from [`SimplexOptions::default`].
    pub fn simplex<M: Model + ?Sized>(
        &self,
        model: &M,
        start: &[f64],
        opts: &SimplexOptions,
    ) -> Result<FitResult> {
        let p = start.len();
        if p == 0 {
            return Err(FitError::EmptyDataset);
        }
        self.constraints.validate(p)?;

        let n_total = self.dataset.n_total();
        if n_total <= p {
            return Err(FitError::NoDegreesOfFreedom { n: n_total, p });
        }
        let dof = n_total - p;

        let step = resolve_step(start, opts)?;
        let scale = resolve_scale(start, &opts.scaling)?;
        let start_scaled: Vec<f64> = start.iter().zip(scale.iter()).map(|(&v, &s)| v * s).collect();
        let step_scaled: Vec<f64> = step.iter().zip(scale.iter()).map(|(&v, &s)| v * s).collect();

        let eval = ObjectiveEvaluator::new(&self.dataset, model, &self.constraints);
        let mut ctx = FitContext::new(p, scale, self.constraints.penalty_weight());
        let run = minimize(
            &eval,
            &mut ctx,
            &start_scaled,
            &step_scaled,
            opts,
            dof,
            self.dataset.mean_abs_y(),
        );

        // Statistics differentiate the unconstrained sum of squares: at a
        // feasible optimum the two surfaces agree, and the frozen-penalty
        // cliff would poison finite differences taken across the boundary.
        let best = run.params;
        let ss = eval.sum_of_squares(&best);
        let reduced_variance = ss / dof as f64;
        let nl = pseudo_linear_stats(
            |theta: &[f64]| eval.sum_of_squares(theta),
            &best,
            &step,
            reduced_variance,
            DEFAULT_DELTA,
        );

        let predicted = eval.predicted(&best);
        let residuals = self.residuals_from(&predicted);
        let (y_flat, w_flat) = self.flattened_y_weight();
        let res_flat: Vec<f64> = residuals.iter().flatten().copied().collect();
        let quality = goodness_of_fit(&y_flat, &w_flat, &res_flat, self.dataset.is_weighted(), p);

        Ok(FitResult {
            params: best,
            standard_errors: nl.standard_errors,
            pseudo_sd: Some(nl.pseudo_sd),
            covariance: nl.covariance,
            correlation: nl.correlation,
            quality,
            converged: run.converged,
            iterations: run.iterations,
            restarts: run.restarts,
            flags: FitFlags {
                hessian_invert_ok: nl.invert_ok,
                positive_variance: nl.positive_variance,
                zero_substituted: nl.zero_substituted,
                penalty_applied: ctx.any_penalty,
            },
            predicted,
            residuals,
        })
    }

    fn residuals_from(&self, predicted: &[Vec<f64>]) -> Vec<Vec<f64>> {
        match self.dataset.series() {
            Series::Single { y, .. } => vec![
                y.iter()
                    .zip(predicted[0].iter())
                    .map(|(&a, &b)| a - b)
                    .collect(),
            ],
            Series::Multi { y, .. } => y
                .iter()
                .zip(predicted.iter())
                .map(|(ys, ps)| ys.iter().zip(ps.iter()).map(|(&a, &b)| a - b).collect())
                .collect(),
        }
    }

    fn flattened_y_weight(&self) -> (Vec<f64>, Vec<f64>) {
        match self.dataset.series() {
            Series::Single { y, weight } => (y.clone(), weight.clone()),
            Series::Multi { y, weight } => (
                y.iter().flatten().copied().collect(),
                weight.iter().flatten().copied().collect(),
            ),
        }
    }
}

fn resolve_step(start: &[f64], opts: &SimplexOptions) -> Result<Vec<f64>> {
    match &opts.step {
        Some(s) => {
            if s.len() != start.len() {
                return Err(FitError::LengthMismatch {
                    context: "step array",
                    expected: start.len(),
                    got: s.len(),
                });
            }
            for (index, &v) in s.iter().enumerate() {
                if v == 0.0 {
                    return Err(FitError::ZeroStepSize { index });
                }
            }
            Ok(s.clone())
        }
        // Default: 10% of each start value, 0.1 for a zero start value.
        None => Ok(start
            .iter()
            .map(|&v| if v != 0.0 { 0.1 * v.abs() } else { 0.1 })
            .collect()),
    }
}

fn resolve_scale(start: &[f64], scaling: &Scaling) -> Result<Vec<f64>> {
    match scaling {
        Scaling::None => Ok(vec![1.0; start.len()]),
        Scaling::Auto => {
            // Normalizing to 1 would divide by zero; fail over to unscaled.
            if start.iter().any(|&v| v == 0.0) {
                Ok(vec![1.0; start.len()])
            } else {
                Ok(start.iter().map(|&v| 1.0 / v).collect())
            }
        }
        Scaling::Manual(s) => {
            if s.len() != start.len() {
                return Err(FitError::LengthMismatch {
                    context: "scale array",
                    expected: start.len(),
                    got: s.len(),
                });
            }
            for (index, &v) in s.iter().enumerate() {
                if v == 0.0 || !v.is_finite() {
                    return Err(FitError::InvalidScaleFactor { index });
                }
            }
            Ok(s.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn line_fitter() -> Fitter {
        let x = vec![0.0, 1.0, 2.0, 3.0];
        let y: Vec<f64> = x.iter().map(|&v| 2.0 + 3.0 * v).collect();
        Fitter::new(Dataset::single(vec![x], y).unwrap())
    }

    #[test]
    fn linear_recovers_exact_line() {
        let fitter = line_fitter();
        let fit = fitter.straight_line().unwrap();

        assert!((fit.params[0] - 2.0).abs() < 1e-10);
        assert!((fit.params[1] - 3.0).abs() < 1e-10);
        assert!(fit.quality.sum_of_squares < 1e-20);
        assert!(fit.converged);
        assert_eq!(fit.iterations, 0);
        // Noiseless data: standard errors collapse to ~0.
        assert!(fit.standard_errors.iter().all(|&sd| sd < 1e-9));
    }

    #[test]
    fn polynomial_recovers_quadratic() {
        let x: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&v| 1.0 - 2.0 * v + 0.5 * v * v).collect();
        let fitter = Fitter::new(Dataset::single(vec![x], y).unwrap());

        let fit = fitter.polynomial(2).unwrap();
        let expected = [1.0, -2.0, 0.5];
        for (a, b) in fit.params.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-8, "got {:?}", fit.params);
        }
    }

    #[test]
    fn linear_detects_degenerate_system() {
        let x = vec![0.0, 1.0];
        let y = vec![1.0, 2.0];
        let fitter = Fitter::new(Dataset::single(vec![x.clone()], y).unwrap());

        // Three basis rows, two observations.
        let basis = vec![vec![1.0; 2], x.clone(), x.iter().map(|v| v * v).collect()];
        let err = fitter.linear(&basis).unwrap_err();
        assert!(matches!(err, FitError::DegenerateSystem { n: 2, p: 3 }));
    }

    #[test]
    fn constant_weights_match_unit_weights() {
        let x: Vec<f64> = (0..6).map(|i| i as f64).collect();
        let y = [1.1, 2.8, 5.3, 6.9, 9.2, 10.8];

        let unit = Fitter::new(Dataset::single(vec![x.clone()], y.to_vec()).unwrap())
            .straight_line()
            .unwrap();
        let scaled = Fitter::new(
            Dataset::weighted(vec![x], y.to_vec(), vec![4.0; 6]).unwrap(),
        )
        .straight_line()
        .unwrap();

        for (a, b) in unit.params.iter().zip(scaled.params.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn zero_weight_disables_chi_square() {
        let x = vec![0.0, 1.0, 2.0, 3.0];
        let y = vec![2.0, 5.0, 8.0, 11.0];
        let ds = Dataset::weighted(vec![x], y, vec![1.0, 0.0, 1.0, 1.0]).unwrap();
        let fit = Fitter::new(ds).straight_line().unwrap();
        assert!(fit.quality.chi_square.is_none());
    }

    #[test]
    fn simplex_recovers_exponential_decay() {
        // y = a·exp(-b·x) with a = 5, b = 0.7.
        let x: Vec<f64> = (0..10).map(|i| 0.5 * i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&v| 5.0 * (-0.7 * v).exp()).collect();
        let fitter = Fitter::new(Dataset::single(vec![x], y).unwrap());

        let model = |p: &[f64], x: &[f64]| p[0] * (-p[1] * x[0]).exp();
        let fit = fitter
            .simplex(&model, &[2.0, 0.2], &SimplexOptions::default())
            .unwrap();

        assert!(fit.converged);
        assert!((fit.params[0] - 5.0).abs() < 1e-4, "a = {}", fit.params[0]);
        assert!((fit.params[1] - 0.7).abs() < 1e-4, "b = {}", fit.params[1]);
        assert!(fit.quality.sum_of_squares < 1e-8);
        assert!(fit.flags.hessian_invert_ok);
    }

    #[test]
    fn simplex_on_noisy_data_stays_near_truth() {
        let mut rng = StdRng::seed_from_u64(7);
        let noise = Normal::new(0.0, 0.05).unwrap();

        let x: Vec<f64> = (0..40).map(|i| 0.25 * i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&v| 4.0 * (-0.5 * v).exp() + noise.sample(&mut rng))
            .collect();
        let fitter = Fitter::new(Dataset::single(vec![x], y).unwrap());

        let model = |p: &[f64], x: &[f64]| p[0] * (-p[1] * x[0]).exp();
        let fit = fitter
            .simplex(&model, &[3.0, 0.3], &SimplexOptions::default())
            .unwrap();

        assert!(fit.converged);
        assert!((fit.params[0] - 4.0).abs() < 0.2, "a = {}", fit.params[0]);
        assert!((fit.params[1] - 0.5).abs() < 0.1, "b = {}", fit.params[1]);
        // Standard errors should be small but nonzero on noisy data.
        assert!(fit.standard_errors.iter().all(|&sd| sd.is_finite() && sd > 0.0));
    }

    #[test]
    fn simplex_final_objective_beats_start_objective() {
        let x: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&v| 1.0 + 0.4 * v + 0.02 * v * v).collect();
        let ds = Dataset::single(vec![x.clone()], y.clone()).unwrap();
        let fitter = Fitter::new(ds);

        let model = |p: &[f64], x: &[f64]| p[0] + p[1] * x[0];
        let start = [10.0, -2.0];
        let start_ss: f64 = x
            .iter()
            .zip(y.iter())
            .map(|(&xk, &yk)| {
                let r = yk - (start[0] + start[1] * xk);
                r * r
            })
            .sum();

        let fit = fitter.simplex(&model, &start, &SimplexOptions::default()).unwrap();
        assert!(fit.quality.sum_of_squares <= start_ss);
    }

    #[test]
    fn active_constraint_is_respected() {
        // Unconstrained optimum has slope -1; constrain slope >= 0.
        let x = vec![0.0, 1.0, 2.0, 3.0];
        let y: Vec<f64> = x.iter().map(|&v| 3.0 - v).collect();
        let mut fitter = Fitter::new(Dataset::single(vec![x], y).unwrap());
        fitter.add_single_constraint(1, Direction::AtLeast, 0.0);

        let model = |p: &[f64], x: &[f64]| p[0] + p[1] * x[0];
        let fit = fitter
            .simplex(&model, &[3.0, 0.5], &SimplexOptions::default())
            .unwrap();

        assert!(fit.params[1] >= -1e-9, "slope = {}", fit.params[1]);
        assert!(fit.params[1] < 0.2, "slope should be pinned near 0");
        assert!(fit.flags.penalty_applied);
        // Best slope-0 fit is the mean response level.
        assert!((fit.params[0] - 1.5).abs() < 0.2, "intercept = {}", fit.params[0]);
    }

    #[test]
    fn restarts_never_exceed_configuration() {
        let x: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&v| 2.0 * v + 1.0).collect();
        let fitter = Fitter::new(Dataset::single(vec![x], y).unwrap());
        let model = |p: &[f64], x: &[f64]| p[0] + p[1] * x[0];

        for max_restarts in [0usize, 2, 5] {
            let opts = SimplexOptions {
                max_restarts,
                ..SimplexOptions::default()
            };
            let fit = fitter.simplex(&model, &[0.0, 0.0], &opts).unwrap();
            assert!(fit.restarts <= max_restarts);
        }
    }

    #[test]
    fn covariance_is_symmetric_with_nonnegative_diagonal() {
        let mut rng = StdRng::seed_from_u64(11);
        let noise = Normal::new(0.0, 0.1).unwrap();
        let x: Vec<f64> = (0..25).map(|i| 0.2 * i as f64).collect();
        let y: Vec<f64> = x
            .iter()
            .map(|&v| 2.0 + 1.5 * v + noise.sample(&mut rng))
            .collect();
        let fitter = Fitter::new(Dataset::single(vec![x], y).unwrap());

        let model = |p: &[f64], x: &[f64]| p[0] + p[1] * x[0];
        let fit = fitter
            .simplex(&model, &[1.0, 1.0], &SimplexOptions::default())
            .unwrap();

        let p = fit.params.len();
        for i in 0..p {
            for j in 0..p {
                assert!((fit.covariance[i][j] - fit.covariance[j][i]).abs() < 1e-10);
            }
        }
        if fit.flags.positive_variance {
            for i in 0..p {
                assert!(fit.covariance[i][i] >= 0.0);
            }
        }
    }

    #[test]
    fn zero_step_size_is_fatal() {
        let fitter = line_fitter();
        let model = |p: &[f64], x: &[f64]| p[0] + p[1] * x[0];
        let opts = SimplexOptions {
            step: Some(vec![0.1, 0.0]),
            ..SimplexOptions::default()
        };
        let err = fitter.simplex(&model, &[1.0, 1.0], &opts).unwrap_err();
        assert!(matches!(err, FitError::ZeroStepSize { index: 1 }));
    }

    #[test]
    fn too_few_observations_is_fatal() {
        let x = vec![0.0, 1.0];
        let y = vec![1.0, 2.0];
        let fitter = Fitter::new(Dataset::single(vec![x], y).unwrap());
        let model = |p: &[f64], _x: &[f64]| p[0] + p[1] + p[2];
        let err = fitter
            .simplex(&model, &[1.0, 1.0, 1.0], &SimplexOptions::default())
            .unwrap_err();
        assert!(matches!(err, FitError::NoDegreesOfFreedom { n: 2, p: 3 }));
    }

    #[test]
    fn out_of_range_constraint_is_fatal_before_iteration() {
        let fitter = {
            let mut f = line_fitter();
            f.add_single_constraint(5, Direction::AtMost, 1.0);
            f
        };
        let model = |p: &[f64], x: &[f64]| p[0] + p[1] * x[0];
        let err = fitter
            .simplex(&model, &[1.0, 1.0], &SimplexOptions::default())
            .unwrap_err();
        assert!(matches!(err, FitError::ConstraintIndexOutOfRange { index: 5, .. }));
    }

    #[test]
    fn auto_scaling_falls_over_on_zero_start() {
        let fitter = line_fitter();
        let model = |p: &[f64], x: &[f64]| p[0] + p[1] * x[0];
        let opts = SimplexOptions {
            scaling: Scaling::Auto,
            ..SimplexOptions::default()
        };
        // Zero start value: auto scaling silently degrades to unscaled.
        let fit = fitter.simplex(&model, &[0.0, 1.0], &opts).unwrap();
        assert!(fit.converged);
        assert!((fit.params[1] - 3.0).abs() < 1e-3);
    }

    #[test]
    fn auto_scaling_handles_disparate_magnitudes() {
        // a ~ 1e4, b ~ 1e-3: unscaled default steps crawl on one axis.
        let x: Vec<f64> = (1..15).map(|i| 100.0 * i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&v| 2.0e4 * (-2.0e-3 * v).exp()).collect();
        let fitter = Fitter::new(Dataset::single(vec![x], y).unwrap());

        let model = |p: &[f64], x: &[f64]| p[0] * (-p[1] * x[0]).exp();
        let opts = SimplexOptions {
            scaling: Scaling::Auto,
            ..SimplexOptions::default()
        };
        let fit = fitter.simplex(&model, &[1.0e4, 1.0e-3], &opts).unwrap();

        assert!(fit.converged);
        assert!((fit.params[0] / 2.0e4 - 1.0).abs() < 1e-3);
        assert!((fit.params[1] / 2.0e-3 - 1.0).abs() < 1e-3);
    }

    #[test]
    fn multi_response_fit_recovers_per_series_slopes() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y = vec![
            x.iter().map(|&v| 1.5 * v).collect::<Vec<f64>>(),
            x.iter().map(|&v| -0.5 * v).collect::<Vec<f64>>(),
        ];
        let ds = Dataset::multi(vec![x], y).unwrap();
        let fitter = Fitter::new(ds);

        let model =
            crate::models::MultiResponseFn(|p: &[f64], x: &[f64], r: usize| p[r] * x[0]);
        let fit = fitter
            .simplex(&model, &[1.0, 1.0], &SimplexOptions::default())
            .unwrap();

        assert!(fit.converged);
        assert!((fit.params[0] - 1.5).abs() < 1e-4);
        assert!((fit.params[1] + 0.5).abs() < 1e-4);
        assert_eq!(fit.predicted.len(), 2);
        assert_eq!(fit.residuals.len(), 2);
    }

    #[test]
    fn constraints_persist_until_cleared() {
        let x = vec![0.0, 1.0, 2.0, 3.0];
        let y: Vec<f64> = x.iter().map(|&v| 3.0 - v).collect();
        let mut fitter = Fitter::new(Dataset::single(vec![x], y).unwrap());
        fitter.add_single_constraint(1, Direction::AtLeast, 0.0);

        let model = |p: &[f64], x: &[f64]| p[0] + p[1] * x[0];
        let constrained = fitter
            .simplex(&model, &[3.0, 0.5], &SimplexOptions::default())
            .unwrap();
        assert!(constrained.params[1] >= -1e-9);

        fitter.clear_constraints();
        let free = fitter
            .simplex(&model, &[3.0, 0.5], &SimplexOptions::default())
            .unwrap();
        assert!((free.params[1] + 1.0).abs() < 1e-4, "slope = {}", free.params[1]);
        assert!(!free.flags.penalty_applied);
    }
}
