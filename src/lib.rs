//! Optical surface profile evaluation and fitting.
//!
//! Six rotationally symmetric surface families (even/odd aspheres, the Opal
//! universal and polynomial forms, and a pure polynomial) share one sag and
//! slope evaluation core, with reference-sphere analysis utilities and a
//! trust-region Levenberg-Marquardt fitter for recovering surface
//! parameters from measured `(r, z)` profiles.

pub mod error;
pub mod fitting;
pub mod io;
pub mod numerical;
pub mod surface;
