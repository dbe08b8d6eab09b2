//! Domain types used throughout the fitting engine.
//!
//! This module defines:
//!
//! - observation datasets (`Dataset`, `Series`)
//! - fit outputs (`FitResult`, `FitQuality`)
//! - soft-failure status flags (`FitFlags`)

pub mod types;

pub use types::*;
