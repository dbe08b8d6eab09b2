//! Fitting machinery.
//!
//! Responsibilities:
//!
//! - constraint bookkeeping and violation checks
//! - the penalized objective with the frozen-feasible rule
//! - the Nelder-Mead simplex search with restarts
//! - the [`Fitter`] entry points tying it all together

pub mod constraint;
pub mod fitter;
pub mod objective;
pub mod simplex;

pub use constraint::*;
pub use fitter::*;
pub use objective::{FitContext, ObjectiveEvaluator};
pub use simplex::{ConvergencePolicy, Scaling, SimplexOptions};
