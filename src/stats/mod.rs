//! Post-fit statistics.
//!
//! Linear fits get analytic covariance from the already-inverted normal
//! equations; nonlinear fits get "pseudo-linear" statistics from numerical
//! differentiation of the objective surface at the optimum. Both share the
//! goodness-of-fit summary (R, R-squared, F-ratio, chi-square family).

pub mod linear;
pub mod nonlinear;

pub use linear::*;
pub use nonlinear::*;
