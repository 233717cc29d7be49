//! Group recourse math utilities.

pub mod cost;

pub use cost::*;
