//! Mathematical utilities: the weighted normal-equation solver.

pub mod wls;

pub use wls::*;
