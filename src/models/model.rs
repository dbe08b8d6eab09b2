//! The model-evaluation capability.
//!
//! The nonlinear fitter relies on one primitive operation: evaluate the model
//! at a parameter vector and an observation's x values. Concrete model
//! families (distributions, dose-response curves, threshold functions, ...)
//! live with the callers; a plain closure is enough for most of them.

/// A parametric scalar model `f(params, x) -> f64`.
///
/// For multi-response datasets the fitter calls [`Model::evaluate_response`]
/// with the response-series index; single-response models get the default
/// implementation, which ignores the index.
pub trait Model {
    /// Evaluate the model at `params` for one observation's x values.
    fn evaluate(&self, params: &[f64], x: &[f64]) -> f64;

    /// Evaluate one response series of a multi-response model.
    fn evaluate_response(&self, params: &[f64], x: &[f64], response: usize) -> f64 {
        let _ = response;
        self.evaluate(params, x)
    }
}

impl<F> Model for F
where
    F: Fn(&[f64], &[f64]) -> f64,
{
    fn evaluate(&self, params: &[f64], x: &[f64]) -> f64 {
        self(params, x)
    }
}

/// Adapter that routes the response index into a three-argument closure.
///
/// Lets callers fit multi-response datasets without writing a trait impl:
///
/// ```ignore
/// let model = MultiResponseFn(|params, x, r| params[r] * x[0]);
/// ```
pub struct MultiResponseFn<F>(pub F);

impl<F> Model for MultiResponseFn<F>
where
    F: Fn(&[f64], &[f64], usize) -> f64,
{
    fn evaluate(&self, params: &[f64], x: &[f64]) -> f64 {
        (self.0)(params, x, 0)
    }

    fn evaluate_response(&self, params: &[f64], x: &[f64], response: usize) -> f64 {
        (self.0)(params, x, response)
    }
}
