//! Nelder-Mead simplex minimization of the constrained objective.
//!
//! Derivative-free: the optimizer walks a simplex of P+1 vertices through
//! parameter space using only objective values, which is what makes the
//! engine work for any caller-supplied model family.
//!
//! One iteration is the classic reflect / expand / contract / shrink
//! sequence:
//!
//! - reflect the worst vertex through the centroid of the others
//! - if the reflection beats the best vertex, try expanding further
//! - if it is worse than every other vertex, contract toward the worst side
//! - if even contraction fails, shrink the whole simplex toward the best
//!
//! Convergence is judged each iteration from the spread (standard deviation)
//! of the P+1 objective values. On convergence the optimizer may re-seed a
//! fresh simplex around the current best vertex with the original step sizes
//! and try again, up to `max_restarts` times, to avoid accepting a false or
//! flat minimum. Exhausting the iteration budget is a soft failure: the best
//! vertex is still returned, with `converged = false`.

use serde::{Deserialize, Serialize};

use crate::fit::objective::{FitContext, ObjectiveEvaluator};
use crate::models::Model;

/// How parameters are normalized before the search.
///
/// Scaling matters when parameters differ by orders of magnitude: an
/// unscaled simplex step that is right for one axis is useless for another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scaling {
    /// Search raw parameter values.
    None,
    /// Normalize every start value to 1 (steps scaled proportionally).
    /// Falls over to `None` when any start value is exactly 0.
    Auto,
    /// Caller-supplied per-parameter scale factors.
    Manual(Vec<f64>),
}

/// Convergence policy evaluated once per iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConvergencePolicy {
    /// Standard deviation of the P+1 objective values < tolerance.
    ObjectiveSd,
    /// `sqrt(best / dof) < tolerance * mean(|y|)`: residual scale relative
    /// to the response scale.
    RelativeResidual,
}

/// Tuning knobs for one simplex run. `Default` supplies the values used by
/// the defaulted fit entry points.
#[derive(Debug, Clone)]
pub struct SimplexOptions {
    /// Initial per-parameter step sizes; `None` derives 10% of each start
    /// value (0.1 for a zero start value).
    pub step: Option<Vec<f64>>,
    pub tolerance: f64,
    /// Total iteration budget, shared across restarts.
    pub max_iterations: usize,
    pub max_restarts: usize,
    /// Reflection coefficient (alpha).
    pub reflection: f64,
    /// Expansion coefficient (gamma).
    pub expansion: f64,
    /// Contraction coefficient (beta).
    pub contraction: f64,
    pub scaling: Scaling,
    pub convergence: ConvergencePolicy,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        Self {
            step: None,
            tolerance: 1e-9,
            max_iterations: 3000,
            max_restarts: 3,
            reflection: 1.0,
            expansion: 2.0,
            contraction: 0.5,
            scaling: Scaling::None,
            convergence: ConvergencePolicy::ObjectiveSd,
        }
    }
}

/// One corner of the simplex: a parameter vector plus its cached objective.
#[derive(Debug, Clone)]
struct Vertex {
    params: Vec<f64>,
    value: f64,
}

/// Raw optimizer output, before the statistics engine runs.
#[derive(Debug, Clone)]
pub(crate) struct SimplexRun {
    /// Best parameters in model space (already rescaled).
    pub params: Vec<f64>,
    pub objective: f64,
    pub iterations: usize,
    pub restarts: usize,
    pub converged: bool,
    /// Objective standard deviation of the final simplex.
    pub final_sd: f64,
}

/// Minimize the constrained objective starting from `start` (optimizer
/// space) with per-axis `step` sizes (also optimizer space).
///
/// `dof` and `mean_abs_y` feed the relative-residual convergence policy.
pub(crate) fn minimize<M: Model + ?Sized>(
    eval: &ObjectiveEvaluator<'_, M>,
    ctx: &mut FitContext,
    start: &[f64],
    step: &[f64],
    opts: &SimplexOptions,
    dof: usize,
    mean_abs_y: f64,
) -> SimplexRun {
    let mut simplex = build_simplex(eval, ctx, start, step);
    let mut iterations = 0usize;
    let mut restarts = 0usize;
    let mut final_sd = objective_sd(&simplex);
    let mut prev_converged_best: Option<f64> = None;

    let converged = loop {
        // Iterate until this round converges or the budget runs out.
        let round_converged = loop {
            if iterations >= opts.max_iterations {
                break false;
            }
            iterations += 1;
            step_once(eval, ctx, &mut simplex, opts);

            final_sd = objective_sd(&simplex);
            let best = simplex[best_index(&simplex)].value;
            if convergence_reached(opts, final_sd, best, dof, mean_abs_y) {
                break true;
            }
        };
        if !round_converged {
            break false;
        }

        let best = best_index(&simplex);
        let best_value = simplex[best].value;

        // A restart that lands on the same minimum confirms it; stop early
        // rather than burning the remaining restarts.
        if let Some(prev) = prev_converged_best {
            if (prev - best_value).abs() <= opts.tolerance.max(1e-12 * prev.abs()) {
                break true;
            }
        }
        if restarts >= opts.max_restarts {
            break true;
        }

        prev_converged_best = Some(best_value);
        restarts += 1;
        let seed = simplex[best].params.clone();
        simplex = build_simplex(eval, ctx, &seed, step);
    };

    let best = best_index(&simplex);
    SimplexRun {
        params: ctx.rescale(&simplex[best].params),
        objective: simplex[best].value,
        iterations,
        restarts,
        converged,
        final_sd,
    }
}

/// P+1 vertices: the start point plus one offset by `step[i]` along each
/// axis.
fn build_simplex<M: Model + ?Sized>(
    eval: &ObjectiveEvaluator<'_, M>,
    ctx: &mut FitContext,
    start: &[f64],
    step: &[f64],
) -> Vec<Vertex> {
    let p = start.len();
    let mut simplex = Vec::with_capacity(p + 1);
    let value = eval.evaluate(ctx, start);
    simplex.push(Vertex {
        params: start.to_vec(),
        value,
    });
    for i in 0..p {
        let mut params = start.to_vec();
        params[i] += step[i];
        let value = eval.evaluate(ctx, &params);
        simplex.push(Vertex { params, value });
    }
    simplex
}

fn step_once<M: Model + ?Sized>(
    eval: &ObjectiveEvaluator<'_, M>,
    ctx: &mut FitContext,
    simplex: &mut [Vertex],
    opts: &SimplexOptions,
) {
    let p = simplex.len() - 1;
    let (best, worst) = scan(simplex);

    // Centroid of every vertex except the worst.
    let mut centroid = vec![0.0; p];
    for (i, v) in simplex.iter().enumerate() {
        if i == worst {
            continue;
        }
        for (c, &x) in centroid.iter_mut().zip(v.params.iter()) {
            *c += x;
        }
    }
    for c in centroid.iter_mut() {
        *c /= p as f64;
    }

    let alpha = opts.reflection;
    let reflected: Vec<f64> = centroid
        .iter()
        .zip(simplex[worst].params.iter())
        .map(|(&c, &w)| (1.0 + alpha) * c - alpha * w)
        .collect();
    let f_reflected = eval.evaluate(ctx, &reflected);

    if f_reflected < simplex[best].value {
        // New best direction: try going further.
        let gamma = opts.expansion;
        let expanded: Vec<f64> = reflected
            .iter()
            .zip(centroid.iter())
            .map(|(&r, &c)| (1.0 + gamma) * r - gamma * c)
            .collect();
        let f_expanded = eval.evaluate(ctx, &expanded);
        simplex[worst] = if f_expanded < f_reflected {
            Vertex {
                params: expanded,
                value: f_expanded,
            }
        } else {
            Vertex {
                params: reflected,
                value: f_reflected,
            }
        };
        return;
    }

    let worse_than_all_others = simplex
        .iter()
        .enumerate()
        .all(|(i, v)| i == worst || f_reflected > v.value);
    if !worse_than_all_others {
        simplex[worst] = Vertex {
            params: reflected,
            value: f_reflected,
        };
        return;
    }

    // Reflection overshot. Keep it if it at least beats the worst vertex,
    // then contract toward the worst side.
    if f_reflected <= simplex[worst].value {
        simplex[worst] = Vertex {
            params: reflected,
            value: f_reflected,
        };
    }
    let beta = opts.contraction;
    let contracted: Vec<f64> = simplex[worst]
        .params
        .iter()
        .zip(centroid.iter())
        .map(|(&w, &c)| beta * w + (1.0 - beta) * c)
        .collect();
    let f_contracted = eval.evaluate(ctx, &contracted);

    if f_contracted > simplex[worst].value {
        // Contraction failed too: shrink every vertex toward the best.
        let best_params = simplex[best].params.clone();
        for (i, v) in simplex.iter_mut().enumerate() {
            if i == best {
                continue;
            }
            for (x, &b) in v.params.iter_mut().zip(best_params.iter()) {
                *x = 0.5 * (*x + b);
            }
            v.value = eval.evaluate(ctx, &v.params);
        }
    } else {
        simplex[worst] = Vertex {
            params: contracted,
            value: f_contracted,
        };
    }
}

/// Best (lowest) and worst (highest) vertex indices, first occurrence
/// winning ties.
fn scan(simplex: &[Vertex]) -> (usize, usize) {
    let mut best = 0;
    let mut worst = 0;
    for (i, v) in simplex.iter().enumerate() {
        if v.value < simplex[best].value {
            best = i;
        }
        if v.value > simplex[worst].value {
            worst = i;
        }
    }
    (best, worst)
}

fn best_index(simplex: &[Vertex]) -> usize {
    scan(simplex).0
}

/// Population standard deviation of the P+1 objective values.
fn objective_sd(simplex: &[Vertex]) -> f64 {
    let n = simplex.len() as f64;
    let mean = simplex.iter().map(|v| v.value).sum::<f64>() / n;
    let var = simplex
        .iter()
        .map(|v| {
            let d = v.value - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    var.sqrt()
}

fn convergence_reached(
    opts: &SimplexOptions,
    sd: f64,
    best: f64,
    dof: usize,
    mean_abs_y: f64,
) -> bool {
    match opts.convergence {
        ConvergencePolicy::ObjectiveSd => sd < opts.tolerance,
        ConvergencePolicy::RelativeResidual => {
            (best.max(0.0) / dof as f64).sqrt() < opts.tolerance * mean_abs_y
        }
    }
}
