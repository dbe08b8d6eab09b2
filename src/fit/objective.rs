//! The constrained objective evaluated by the simplex optimizer.
//!
//! The objective is the weighted sum of squared residuals
//!
//! ```text
//! S(θ) = Σ_k ((y_k - f(θ, x_k)) / w_k)²
//! ```
//!
//! (summed additionally over response series for multi-response datasets),
//! with inequality constraints folded in as a quadratic "cliff" penalty.
//!
//! The penalty rule is deliberate: when any constraint is violated, the
//! evaluator returns the **last cached feasible objective value** plus the
//! penalty, without evaluating the model at all. This keeps the surface
//! continuous enough for the simplex to retreat from an infeasible region
//! and guarantees the model function is never called outside its domain
//! (where it may be undefined, e.g. a negative Weibull shape).
//!
//! Per-fit mutable state (scale factors, the cached feasible value, the
//! working penalty weight) lives in [`FitContext`], created fresh for every
//! fit so one evaluator borrow chain never leaks state into the next fit.

use crate::domain::{Dataset, Series};
use crate::fit::constraint::ConstraintSet;
use crate::models::Model;

/// Per-fit evaluation state threaded through the optimizer.
#[derive(Debug, Clone)]
pub struct FitContext {
    /// Per-parameter scale factors; the optimizer works on `θ·scale` and the
    /// evaluator divides back before touching the model.
    pub scale: Vec<f64>,
    /// Last objective value computed without any constraint firing.
    pub last_feasible: f64,
    /// Working cliff-penalty weight. Starts at the constraint set's weight
    /// and escalates when the simplex gets stuck infeasible (see below).
    pub penalty_weight: f64,
    base_penalty_weight: f64,
    consecutive_infeasible: usize,
    /// Escalation threshold: one full simplex pass worth of evaluations.
    escalate_after: usize,
    /// True once any evaluation incurred a penalty.
    pub any_penalty: bool,
}

/// Cap on penalty escalation relative to the base weight.
const MAX_ESCALATION: f64 = 1.0e12;

impl FitContext {
    pub fn new(n_params: usize, scale: Vec<f64>, penalty_weight: f64) -> Self {
        Self {
            scale,
            last_feasible: 0.0,
            penalty_weight,
            base_penalty_weight: penalty_weight,
            consecutive_infeasible: 0,
            // Two shrunk-simplex generations of evaluations.
            escalate_after: 2 * (n_params + 1),
            any_penalty: false,
        }
    }

    /// Map optimizer-space parameters back to model-space values.
    pub fn rescale(&self, params: &[f64]) -> Vec<f64> {
        params
            .iter()
            .zip(self.scale.iter())
            .map(|(p, s)| p / s)
            .collect()
    }

    fn note_feasible(&mut self) {
        self.consecutive_infeasible = 0;
        self.penalty_weight = self.base_penalty_weight;
    }

    // The frozen-feasible rule can return a stale objective indefinitely if
    // every candidate in an iteration lands infeasible. Escalating the
    // penalty weight after each stuck run steepens the cliff until reflection
    // is forced back into the feasible region.
    fn note_infeasible(&mut self) {
        self.any_penalty = true;
        self.consecutive_infeasible += 1;
        if self.consecutive_infeasible % self.escalate_after == 0 {
            self.penalty_weight =
                (self.penalty_weight * 10.0).min(self.base_penalty_weight * MAX_ESCALATION);
        }
    }
}

/// Evaluates the constrained objective for one (dataset, model, constraints)
/// triple. Immutable; all fit-local mutation goes through [`FitContext`].
pub struct ObjectiveEvaluator<'a, M: Model + ?Sized> {
    dataset: &'a Dataset,
    model: &'a M,
    constraints: &'a ConstraintSet,
    /// x vector per observation, gathered once up front.
    points: Vec<Vec<f64>>,
}

impl<'a, M: Model + ?Sized> ObjectiveEvaluator<'a, M> {
    pub fn new(dataset: &'a Dataset, model: &'a M, constraints: &'a ConstraintSet) -> Self {
        let points = (0..dataset.n()).map(|k| dataset.x_point(k)).collect();
        Self {
            dataset,
            model,
            constraints,
            points,
        }
    }

    /// Evaluate the constrained objective at optimizer-space `params`.
    pub fn evaluate(&self, ctx: &mut FitContext, params: &[f64]) -> f64 {
        let actual = ctx.rescale(params);

        let violations = self.constraints.check(&actual);
        if !violations.is_empty() {
            ctx.note_infeasible();
            let penalty: f64 = violations
                .iter()
                .map(|v| ctx.penalty_weight * v.excess * v.excess)
                .sum();
            return ctx.last_feasible + penalty;
        }

        ctx.note_feasible();
        let ss = self.sum_of_squares(&actual);
        ctx.last_feasible = ss;
        ss
    }

    /// The true weighted sum of squared residuals at model-space `actual`,
    /// with no constraint handling. Also used by the statistics engine to
    /// differentiate the objective surface near the optimum.
    pub fn sum_of_squares(&self, actual: &[f64]) -> f64 {
        match self.dataset.series() {
            Series::Single { y, weight } => self
                .points
                .iter()
                .zip(y.iter().zip(weight.iter()))
                .map(|(x, (&yk, &wk))| {
                    let r = (yk - self.model.evaluate(actual, x)) / wk;
                    r * r
                })
                .sum(),
            Series::Multi { y, weight } => {
                let mut ss = 0.0;
                for (r_idx, (ys, ws)) in y.iter().zip(weight.iter()).enumerate() {
                    for (x, (&yk, &wk)) in self.points.iter().zip(ys.iter().zip(ws.iter())) {
                        let r = (yk - self.model.evaluate_response(actual, x, r_idx)) / wk;
                        ss += r * r;
                    }
                }
                ss
            }
        }
    }

    /// Model values at model-space `actual`, one inner vector per response
    /// series.
    pub fn predicted(&self, actual: &[f64]) -> Vec<Vec<f64>> {
        (0..self.dataset.n_responses())
            .map(|r| {
                self.points
                    .iter()
                    .map(|x| self.model.evaluate_response(actual, x, r))
                    .collect()
            })
            .collect()
    }
}
