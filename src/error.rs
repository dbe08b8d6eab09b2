//! Error types for the fitting engine.
//!
//! Only *fatal configuration* problems surface as errors: inconsistent array
//! shapes, impossible degrees of freedom, malformed constraints, or a linear
//! system that cannot determine its parameters. Numerical trouble encountered
//! after a fit has started (non-convergence, a Hessian that will not invert,
//! a negative variance estimate) is never an error. It is recorded as a
//! status flag on [`FitResult`](crate::domain::FitResult) and the fit still
//! returns best-effort values.

use thiserror::Error;

/// Fatal configuration errors. A fit that returns one of these aborted before
/// any iteration ran.
#[derive(Debug, Error)]
pub enum FitError {
    /// Input arrays whose lengths must agree do not.
    #[error("{context}: expected length {expected}, got {got}")]
    LengthMismatch {
        context: &'static str,
        expected: usize,
        got: usize,
    },

    /// The dataset holds no observations (or no independent-variable rows).
    #[error("Dataset contains no observations")]
    EmptyDataset,

    /// More parameters than data points: the normal equations cannot
    /// determine a unique solution.
    #[error("Degenerate system: {n} observations cannot determine {p} parameters")]
    DegenerateSystem { n: usize, p: usize },

    /// The normal-equation matrix is singular (collinear basis columns).
    #[error("Normal-equation matrix is singular (n={n}, p={p}); basis columns may be collinear")]
    SingularSystem { n: usize, p: usize },

    /// Degrees of freedom (observations minus parameters) is not positive.
    #[error("No degrees of freedom: n={n} observations, p={p} parameters")]
    NoDegreesOfFreedom { n: usize, p: usize },

    /// A caller-supplied initial step size is exactly zero, which would
    /// collapse one axis of the starting simplex.
    #[error("Initial step size for parameter {index} is zero")]
    ZeroStepSize { index: usize },

    /// A multi-parameter constraint was registered with mismatched
    /// index/sign array lengths.
    #[error("Multi-parameter constraint has {indices} indices but {signs} signs")]
    ConstraintShapeMismatch { indices: usize, signs: usize },

    /// A constraint references a parameter index the fit does not have.
    #[error("Constraint references parameter {index}, but the fit has {n_params} parameters")]
    ConstraintIndexOutOfRange { index: usize, n_params: usize },

    /// Caller-supplied scale factors do not match the parameter count, or a
    /// scale factor is zero/non-finite.
    #[error("Invalid scale factor for parameter {index}")]
    InvalidScaleFactor { index: usize },

    /// The linear solver was handed a multi-response dataset; linear fits
    /// operate on a single response series.
    #[error("Linear fits require a single response series")]
    MultiResponseLinear,
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FitError>;
