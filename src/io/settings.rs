//! Fit configuration parsing.
//!
//! The settings file is `key=value` lines; lines without `=` are ignored.
//! `SurfaceType` and `Radius` are mandatory, everything else has a default.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use strum_macros::{Display, EnumString};

use crate::error::FitError;
use crate::numerical::iteration::policies::DEFAULT_FIT_ITERATIONS;
use crate::surface::parameters::SurfaceFamily;

/// The supported minimizer. All accepted spellings select the same
/// trust-region Levenberg-Marquardt implementation; anything else is a
/// configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum OptimizationAlgorithm {
    #[strum(serialize = "leastsq", serialize = "least_squares", serialize = "lm")]
    LevenbergMarquardt,
}

/// Parsed fit configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FitSettings {
    pub family: SurfaceFamily,
    pub radius: f64,
    pub h: f64,
    pub e2: f64,
    pub e2_is_variable: bool,
    pub conic: f64,
    pub conic_is_variable: bool,
    pub term_number: usize,
    pub algorithm: OptimizationAlgorithm,
    /// Pure Poly internal normalization override; resolved from the data
    /// extents when absent.
    pub h_internal: Option<f64>,
    /// Root-finder iterations per model evaluation in the fitting regime.
    pub fit_iterations: usize,
}

impl FitSettings {
    pub fn parse(content: &str) -> Result<Self, FitError> {
        let mut map: HashMap<&str, &str> = HashMap::new();
        for line in content.lines() {
            if let Some((key, value)) = line.trim().split_once('=') {
                map.insert(key.trim(), value.trim());
            }
        }

        let selector: u32 = parse_required(&map, "SurfaceType")?;
        let family = SurfaceFamily::from_selector(selector).ok_or_else(|| {
            FitError::Configuration(format!("invalid SurfaceType {selector}, expected 1..=6"))
        })?;
        let radius: f64 = parse_required(&map, "Radius")?;

        let algorithm_name = map.get("OptimizationAlgorithm").copied().unwrap_or("leastsq");
        let algorithm = OptimizationAlgorithm::from_str(algorithm_name).map_err(|_| {
            FitError::Configuration(format!(
                "unsupported OptimizationAlgorithm {algorithm_name:?}"
            ))
        })?;

        let fit_iterations = parse_or(&map, "FitIterations", DEFAULT_FIT_ITERATIONS)?;
        if fit_iterations == 0 {
            return Err(FitError::Configuration(
                "FitIterations must be at least 1".to_string(),
            ));
        }

        Ok(FitSettings {
            family,
            radius,
            h: parse_or(&map, "H", 1.0)?,
            e2: parse_or(&map, "e2", 1.0)?,
            e2_is_variable: parse_or::<i64>(&map, "e2_isVariable", 0)? != 0,
            conic: parse_or(&map, "conic", 0.0)?,
            conic_is_variable: parse_or::<i64>(&map, "conic_isVariable", 0)? != 0,
            term_number: parse_or(&map, "TermNumber", 0)?,
            algorithm,
            h_internal: parse_optional(&map, "H_internal")?,
            fit_iterations,
        })
    }

    pub fn load(path: &Path) -> Result<Self, FitError> {
        let content = fs::read_to_string(path)?;
        FitSettings::parse(&content)
    }
}

fn parse_required<T: FromStr>(map: &HashMap<&str, &str>, key: &str) -> Result<T, FitError> {
    let value = map
        .get(key)
        .ok_or_else(|| FitError::Configuration(format!("missing required setting {key}")))?;
    value
        .parse()
        .map_err(|_| FitError::Configuration(format!("invalid value {value:?} for {key}")))
}

fn parse_or<T: FromStr>(map: &HashMap<&str, &str>, key: &str, default: T) -> Result<T, FitError> {
    match map.get(key) {
        Some(value) => value
            .parse()
            .map_err(|_| FitError::Configuration(format!("invalid value {value:?} for {key}"))),
        None => Ok(default),
    }
}

fn parse_optional<T: FromStr>(map: &HashMap<&str, &str>, key: &str) -> Result<Option<T>, FitError> {
    match map.get(key) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| FitError::Configuration(format!("invalid value {value:?} for {key}"))),
        None => Ok(None),
    }
}
