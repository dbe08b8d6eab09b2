//! Model-evaluation interface supplied by callers.
//!
//! The engine never knows the model family it is fitting. Callers hand over
//! a [`Model`] capability so that fitting code can stay generic.

pub mod model;

pub use model::*;
