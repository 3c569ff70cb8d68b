//! Mathematical utilities: least squares and 1D interpolation.

pub mod interp;
pub mod ols;

pub use interp::*;
pub use ols::*;
