//! Inequality constraints on fitted parameters.
//!
//! Constraints are **soft**: they are enforced only through the penalty the
//! objective evaluator adds when a candidate parameter vector violates them,
//! never by clipping parameter values. The optimizer can therefore approach
//! a boundary asymptotically instead of sliding along it.
//!
//! Two shapes are supported:
//!
//! - `Single`: one parameter compared against a bound
//! - `Multi`: a signed linear combination of parameters compared against a
//!   bound
//!
//! The collection is append-only within a fit and must be cleared explicitly
//! between independent fits (`ConstraintSet::clear`); the engine does not do
//! this for the caller.

use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};

/// Which side of the bound the constrained value must stay on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Constrained value must satisfy `value <= bound`.
    AtMost,
    /// Constrained value must satisfy `value >= bound`.
    AtLeast,
}

/// One registered inequality constraint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Constraint {
    Single {
        index: usize,
        direction: Direction,
        bound: f64,
    },
    Multi {
        indices: Vec<usize>,
        signs: Vec<f64>,
        direction: Direction,
        bound: f64,
    },
}

/// A constraint evaluated against a concrete parameter vector and found
/// violated. Carries the offending value and its distance past the bound.
#[derive(Debug, Clone, Copy)]
pub struct Violation {
    pub value: f64,
    pub bound: f64,
    /// Positive distance past the bound.
    pub excess: f64,
}

/// Penalty shape applied to violations.
///
/// Only the quadratic "cliff" exists today; the enum is the extension point
/// for alternative shapes keyed by method identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PenaltyMethod {
    Cliff,
}

/// Default cliff-penalty weight. Large enough that any violation dwarfs a
/// realistic sum of squares.
pub const DEFAULT_PENALTY_WEIGHT: f64 = 1.0e30;

/// The set of constraints active for one fit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintSet {
    constraints: Vec<Constraint>,
    method: PenaltyMethod,
    penalty_weight: f64,
}

impl Default for ConstraintSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self {
            constraints: Vec::new(),
            method: PenaltyMethod::Cliff,
            penalty_weight: DEFAULT_PENALTY_WEIGHT,
        }
    }

    /// Constrain a single parameter: `params[index] direction bound`.
    pub fn add_single(&mut self, index: usize, direction: Direction, bound: f64) {
        self.constraints.push(Constraint::Single {
            index,
            direction,
            bound,
        });
    }

    /// Constrain a signed linear combination:
    /// `Σ_j signs[j]·params[indices[j]] direction bound`.
    ///
    /// Fails when `indices` and `signs` disagree in length.
    pub fn add_multi(
        &mut self,
        indices: Vec<usize>,
        signs: Vec<f64>,
        direction: Direction,
        bound: f64,
    ) -> Result<()> {
        if indices.len() != signs.len() {
            return Err(FitError::ConstraintShapeMismatch {
                indices: indices.len(),
                signs: signs.len(),
            });
        }
        self.constraints.push(Constraint::Multi {
            indices,
            signs,
            direction,
            bound,
        });
        Ok(())
    }

    /// Drop every registered constraint. Call between independent fits.
    pub fn clear(&mut self) {
        self.constraints.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn penalty_weight(&self) -> f64 {
        self.penalty_weight
    }

    pub fn set_penalty_weight(&mut self, weight: f64) {
        self.penalty_weight = weight.abs();
    }

    pub fn method(&self) -> PenaltyMethod {
        self.method
    }

    /// Verify every referenced parameter index exists. Run once at fit start.
    pub fn validate(&self, n_params: usize) -> Result<()> {
        let check = |index: usize| {
            if index >= n_params {
                Err(FitError::ConstraintIndexOutOfRange { index, n_params })
            } else {
                Ok(())
            }
        };
        for c in &self.constraints {
            match c {
                Constraint::Single { index, .. } => check(*index)?,
                Constraint::Multi { indices, .. } => {
                    for &index in indices {
                        check(index)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Evaluate single-parameter constraints against `params`.
    pub fn check_single(&self, params: &[f64]) -> Vec<Violation> {
        self.constraints
            .iter()
            .filter_map(|c| match c {
                Constraint::Single {
                    index,
                    direction,
                    bound,
                } => violation(params[*index], *direction, *bound),
                Constraint::Multi { .. } => None,
            })
            .collect()
    }

    /// Evaluate multi-parameter constraints against `params`.
    pub fn check_multi(&self, params: &[f64]) -> Vec<Violation> {
        self.constraints
            .iter()
            .filter_map(|c| match c {
                Constraint::Single { .. } => None,
                Constraint::Multi {
                    indices,
                    signs,
                    direction,
                    bound,
                } => {
                    let value: f64 = indices
                        .iter()
                        .zip(signs.iter())
                        .map(|(&i, &s)| s * params[i])
                        .sum();
                    violation(value, *direction, *bound)
                }
            })
            .collect()
    }

    /// Evaluate every constraint against `params`.
    pub fn check(&self, params: &[f64]) -> Vec<Violation> {
        let mut v = self.check_single(params);
        v.extend(self.check_multi(params));
        v
    }
}

fn violation(value: f64, direction: Direction, bound: f64) -> Option<Violation> {
    let excess = match direction {
        Direction::AtMost => value - bound,
        Direction::AtLeast => bound - value,
    };
    (excess > 0.0).then_some(Violation {
        value,
        bound,
        excess,
    })
}
