//! Nonlinear least-squares fitting of surface families to measured
//! profiles: objective construction, the fit driver, statistics and report
//! writers.

pub mod driver;
pub mod objective;
pub mod report;
pub mod statistics;
