//! `lsqfit` library crate.
//!
//! Weighted least-squares parameter estimation in two flavors:
//!
//! - analytic linear fits against an arbitrary basis matrix
//! - derivative-free Nelder-Mead fits of nonlinear model callbacks, with
//!   optional linear inequality constraints
//!
//! Both paths share the same [`Dataset`] input and [`FitResult`] output, so
//! callers can swap one for the other without reshaping their data.

pub mod domain;
pub mod error;
pub mod fit;
pub mod math;
pub mod models;
pub mod stats;

pub use domain::{Dataset, FitFlags, FitQuality, FitResult, Series};
pub use error::{FitError, Result};
pub use fit::{
    ConvergencePolicy, Direction, Fitter, Scaling, SimplexOptions, DEFAULT_PENALTY_WEIGHT,
};
pub use models::{Model, MultiResponseFn};
