//! Fit output files.
//!
//! Three artifacts per successful fit: `FitReport.txt` (the fitted surface
//! in `key=value` form keyed by the family tag), `FitMetrics.txt`
//! (goodness-of-fit numbers) and `FitDeviations.txt` (per-point residual
//! table for plotting). Nothing is written for a failed fit.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use itertools::izip;
use nalgebra::DVector;

use crate::error::FitError;
use crate::fitting::statistics::FitStatistics;
use crate::io::point_cloud::PointCloud;
use crate::surface::parameters::{SurfaceFamily, SurfaceParameters};

/// Convert a full Pure Poly series fitted with normalization `h` to the
/// standard `H = 1` form: `A_std[i] = A_fit[i] / h^(i-1)` with 1-based
/// coefficient numbering, so A1 is untouched.
pub fn rescale_poly_coefficients(coeffs: &[f64], h: f64) -> Vec<f64> {
    coeffs
        .iter()
        .enumerate()
        .map(|(i, &a)| a / h.powi(i as i32))
        .collect()
}

/// Write the fitted surface description.
///
/// Each family leads with its type tag and lists exactly the quantities the
/// downstream profile tooling needs to re-evaluate the surface. Shape
/// parameters use fixed notation, series coefficients scientific.
pub fn write_fit_report(path: &Path, surface: &SurfaceParameters) -> Result<(), FitError> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "Type={}", surface.family)?;

    match surface.family {
        SurfaceFamily::EvenAsphere | SurfaceFamily::OddAsphere => {
            writeln!(out, "R={:.12}", surface.radius)?;
            writeln!(out, "k={:.12}", surface.conic)?;
            write_coefficients(&mut out, surface)?;
        }
        SurfaceFamily::OpalUniversalZ => {
            writeln!(out, "R={:.12}", surface.radius)?;
            writeln!(out, "H={:.12}", surface.h)?;
            writeln!(out, "e2={:.12}", surface.e2)?;
            write_coefficients(&mut out, surface)?;
        }
        SurfaceFamily::OpalUniversalU => {
            writeln!(out, "R={:.12}", surface.radius)?;
            writeln!(out, "e2={:.12}", surface.e2)?;
            writeln!(out, "H={:.12}", surface.h)?;
            write_coefficients(&mut out, surface)?;
        }
        SurfaceFamily::OpalPolynomial => {
            writeln!(out, "A1={:.12e}", 2.0 * surface.radius)?;
            writeln!(out, "A2={:.12e}", surface.e2 - 1.0)?;
            write_coefficients(&mut out, surface)?;
        }
        SurfaceFamily::PurePoly => {
            writeln!(
                out,
                "# Fitted with internal H={:.6}, rescaled to H=1",
                surface.h
            )?;
            let rescaled = rescale_poly_coefficients(&surface.poly_series(), surface.h);
            for (i, coeff) in rescaled.iter().enumerate() {
                writeln!(out, "A{}={:.12e}", i + 1, coeff)?;
            }
        }
    }
    Ok(())
}

fn write_coefficients<W: Write>(out: &mut W, surface: &SurfaceParameters) -> Result<(), FitError> {
    let labels = surface.family.coefficient_labels(surface.coeffs.len());
    for (label, coeff) in labels.iter().zip(surface.coeffs.iter()) {
        writeln!(out, "{label}={coeff:.12e}")?;
    }
    Ok(())
}

/// Write the goodness-of-fit block. A metrics file only exists for a
/// successful fit, so `Success` is unconditionally true.
pub fn write_metrics(path: &Path, stats: &FitStatistics) -> Result<(), FitError> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "RMSE={:.12e}", stats.rmse)?;
    writeln!(out, "R_squared={:.12}", stats.r_squared)?;
    writeln!(out, "AIC={:.12}", stats.aic)?;
    writeln!(out, "BIC={:.12}", stats.bic)?;
    writeln!(out, "Chi_square={:.12e}", stats.chi_square)?;
    writeln!(out, "Reduced_chi_square={:.12e}", stats.reduced_chi_square)?;
    writeln!(out, "Iterations={}", stats.num_evaluations)?;
    writeln!(out, "Success=true")?;
    Ok(())
}

/// Write the per-point deviation table: `r`, measured `z`, fitted `z` and
/// their difference, tab-separated for the plotting tools.
pub fn write_deviations(
    path: &Path,
    cloud: &PointCloud,
    fitted: &DVector<f64>,
    deviations: &DVector<f64>,
) -> Result<(), FitError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(path)
        .map_err(|e| FitError::Io(std::io::Error::other(e)))?;
    for (r, z, fz, dev) in izip!(&cloud.r, &cloud.z, fitted, deviations) {
        writer
            .write_record(&[
                format!("{r:.12e}"),
                format!("{z:.12e}"),
                format!("{fz:.12e}"),
                format!("{dev:.12e}"),
            ])
            .map_err(|e| FitError::Io(std::io::Error::other(e)))?;
    }
    writer.flush()?;
    Ok(())
}
