//! Surface families: parameters, sag/slope evaluation and reference-sphere
//! analysis.

pub mod analysis;
pub mod parameters;
pub mod profile;
