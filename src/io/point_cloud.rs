//! Measured profile loading.
//!
//! Input is a plain text file with two whitespace-separated columns per
//! line, `r z`. Blank lines and `#` comments are skipped. Any malformed or
//! non-finite value is fatal: a fit over poisoned data would silently
//! produce garbage coefficients.

use std::fs;
use std::path::Path;

use nalgebra::DVector;

use crate::error::FitError;

/// One measured profile sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    pub r: f64,
    pub z: f64,
}

/// The measured profile as parallel column vectors.
#[derive(Debug, Clone)]
pub struct PointCloud {
    pub r: DVector<f64>,
    pub z: DVector<f64>,
}

impl PointCloud {
    pub fn from_points(points: &[SurfacePoint]) -> Self {
        PointCloud {
            r: DVector::from_iterator(points.len(), points.iter().map(|p| p.r)),
            z: DVector::from_iterator(points.len(), points.iter().map(|p| p.z)),
        }
    }

    pub fn len(&self) -> usize {
        self.r.len()
    }

    pub fn is_empty(&self) -> bool {
        self.r.len() == 0
    }

    /// Largest |z| over the cloud, used for Pure Poly normalization.
    pub fn max_abs_z(&self) -> f64 {
        self.z.iter().fold(0.0, |acc: f64, &z| acc.max(z.abs()))
    }

    /// Largest |r| over the cloud.
    pub fn max_abs_r(&self) -> f64 {
        self.r.iter().fold(0.0, |acc: f64, &r| acc.max(r.abs()))
    }

    /// Parse the two-column text format, validating every value.
    pub fn parse(content: &str) -> Result<Self, FitError> {
        let mut points = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (Some(r_text), Some(z_text)) = (fields.next(), fields.next()) else {
                return Err(FitError::InputData(format!(
                    "line {}: expected two columns, got {:?}",
                    line_no + 1,
                    line
                )));
            };
            let r: f64 = r_text.parse().map_err(|_| {
                FitError::InputData(format!("line {}: invalid r value {:?}", line_no + 1, r_text))
            })?;
            let z: f64 = z_text.parse().map_err(|_| {
                FitError::InputData(format!("line {}: invalid z value {:?}", line_no + 1, z_text))
            })?;
            if !r.is_finite() || !z.is_finite() {
                return Err(FitError::InputData(format!(
                    "line {}: data contains NaN or infinite values",
                    line_no + 1
                )));
            }
            points.push(SurfacePoint { r, z });
        }
        if points.is_empty() {
            return Err(FitError::InputData("no data points found".to_string()));
        }
        Ok(PointCloud::from_points(&points))
    }

    pub fn load(path: &Path) -> Result<Self, FitError> {
        let content = fs::read_to_string(path)?;
        PointCloud::parse(&content)
    }
}
