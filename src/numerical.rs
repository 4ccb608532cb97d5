//! Numeric iteration primitives and the nonlinear least-squares minimizer.

pub mod iteration;
pub mod levenberg_marquardt;
pub mod trust_region;
