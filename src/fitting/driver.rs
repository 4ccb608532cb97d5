//! End-to-end fit pipeline: load, fit, report.
//!
//! Failure at any stage is fatal and leaves no output artifacts; partially
//! written reports over stale data are worse than no reports.

use std::path::Path;

use log::info;
use nalgebra::DVector;

use crate::error::FitError;
use crate::fitting::objective::SurfaceFitProblem;
use crate::fitting::report;
use crate::fitting::statistics::FitStatistics;
use crate::io::point_cloud::PointCloud;
use crate::io::settings::FitSettings;
use crate::numerical::levenberg_marquardt::{LMConfig, LeastSquaresProblem, levenberg_marquardt};
use crate::surface::parameters::{SurfaceFamily, SurfaceParameters};

/// A completed fit, ready for reporting.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub surface: SurfaceParameters,
    pub statistics: FitStatistics,
    pub fitted: DVector<f64>,
    pub deviations: DVector<f64>,
}

/// Resolve the Pure Poly internal normalization: explicit override first,
/// then the data sag extent, then a tenth of the radial extent for profiles
/// measured before any sag develops.
fn resolve_h_internal(settings: &FitSettings, cloud: &PointCloud) -> Result<f64, FitError> {
    if let Some(h) = settings.h_internal {
        if h == 0.0 {
            return Err(FitError::Configuration(
                "H_internal must be non-zero".to_string(),
            ));
        }
        return Ok(h);
    }
    let z_extent = cloud.max_abs_z();
    let h = if z_extent > 0.0 {
        z_extent
    } else {
        cloud.max_abs_r() / 10.0
    };
    if h == 0.0 {
        return Err(FitError::InputData(
            "cannot resolve internal normalization from all-zero data".to_string(),
        ));
    }
    Ok(h)
}

/// Fit the configured surface to the measured cloud.
pub fn fit_surface(settings: &FitSettings, cloud: &PointCloud) -> Result<FitOutcome, FitError> {
    let h = if settings.family == SurfaceFamily::PurePoly {
        let h = resolve_h_internal(settings, cloud)?;
        info!("using internal normalization H = {h:.6}, coefficients rescaled to H=1 on output");
        h
    } else {
        settings.h
    };

    let problem = SurfaceFitProblem::new(settings, cloud, h);
    let config = LMConfig {
        ftol: 1e-12,
        xtol: 1e-12,
        max_evaluations: 10_000,
        ..LMConfig::default()
    };

    info!(
        "fitting {} surface: {} free parameters, {} points",
        settings.family,
        problem.num_parameters(),
        cloud.len()
    );

    let result = levenberg_marquardt(&problem, problem.initial_guess(), config);
    if !result.termination.was_successful() {
        return Err(FitError::Optimization(format!(
            "minimizer did not converge: {:?} after {} evaluations",
            result.termination, result.num_evaluations
        )));
    }

    let surface = problem.surface_for(&result.parameters);
    let fitted = problem.model(&result.parameters);
    let deviations = &fitted - &cloud.z;
    let statistics = FitStatistics::compute(
        &cloud.z,
        &deviations,
        problem.num_model_parameters(),
        result.parameters.len(),
        result.num_evaluations,
    );
    info!("fit converged ({:?})\n{}", result.termination, statistics.as_table());

    Ok(FitOutcome {
        surface,
        statistics,
        fitted,
        deviations,
    })
}

/// Full pipeline: read input files, fit, write the three report files into
/// `out_dir`.
pub fn run_fit(data_path: &Path, settings_path: &Path, out_dir: &Path) -> Result<FitOutcome, FitError> {
    let cloud = PointCloud::load(data_path)?;
    info!("loaded {} points from {}", cloud.len(), data_path.display());
    let settings = FitSettings::load(settings_path)?;

    let outcome = fit_surface(&settings, &cloud)?;

    report::write_fit_report(&out_dir.join("FitReport.txt"), &outcome.surface)?;
    report::write_metrics(&out_dir.join("FitMetrics.txt"), &outcome.statistics)?;
    report::write_deviations(
        &out_dir.join("FitDeviations.txt"),
        &cloud,
        &outcome.fitted,
        &outcome.deviations,
    )?;
    info!("reports written to {}", out_dir.display());

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::profile;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use std::fs;
    use tempfile::tempdir;

    fn write_profile(path: &Path, truth: &SurfaceParameters, n: usize, r_max: f64) {
        let mut text = String::new();
        for i in 0..n {
            let r = r_max * i as f64 / (n - 1) as f64;
            let z = profile::sag(r, truth);
            text.push_str(&format!("{r:.12e} {z:.12e}\n"));
        }
        fs::write(path, text).unwrap();
    }

    #[test]
    fn recovers_even_asphere_parameters() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("tempsurfacedata.txt");
        let settings_path = dir.path().join("ConvertSettings.txt");

        let truth = SurfaceParameters::even_asphere(100.0, -1.0, vec![1e-7, 2e-9]);
        write_profile(&data, &truth, 50, 20.0);
        fs::write(
            &settings_path,
            "SurfaceType=1\nRadius=100.0\nconic_isVariable=1\nTermNumber=2\n",
        )
        .unwrap();

        let outcome = run_fit(&data, &settings_path, dir.path()).unwrap();

        assert_abs_diff_eq!(outcome.surface.conic, -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(outcome.surface.coeffs[0], 1e-7, epsilon = 1e-9);
        assert_abs_diff_eq!(outcome.surface.coeffs[1], 2e-9, epsilon = 1e-11);
        assert!(outcome.statistics.rmse < 1e-9);
        assert!(outcome.statistics.r_squared > 0.9999);

        let report = fs::read_to_string(dir.path().join("FitReport.txt")).unwrap();
        assert!(report.starts_with("Type=EA\n"));
        let metrics = fs::read_to_string(dir.path().join("FitMetrics.txt")).unwrap();
        assert!(metrics.contains("Success=true"));
        let deviations = fs::read_to_string(dir.path().join("FitDeviations.txt")).unwrap();
        assert_eq!(deviations.lines().count(), 50);
    }

    #[test]
    fn recovers_opal_polynomial_coefficient() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data.txt");
        let settings_path = dir.path().join("settings.txt");

        let truth = SurfaceParameters::opal_polynomial(100.0, 1.0, vec![1e-5]);
        write_profile(&data, &truth, 40, 15.0);
        fs::write(&settings_path, "SurfaceType=5\nRadius=100.0\ne2=1.0\nTermNumber=1\n").unwrap();

        let outcome = run_fit(&data, &settings_path, dir.path()).unwrap();
        assert_abs_diff_eq!(outcome.surface.coeffs[0], 1e-5, epsilon = 1e-9);
        assert!(outcome.statistics.rmse < 1e-9);
    }

    #[test]
    fn tolerates_measurement_noise() {
        use rand::{Rng, SeedableRng, rngs::StdRng};

        let dir = tempdir().unwrap();
        let data = dir.path().join("data.txt");
        let settings_path = dir.path().join("settings.txt");

        let truth = SurfaceParameters::even_asphere(100.0, -1.0, vec![1e-7]);
        let mut rng = StdRng::seed_from_u64(7);
        let mut text = String::new();
        for i in 0..50 {
            let r = 20.0 * i as f64 / 49.0;
            let z = profile::sag(r, &truth) + rng.random_range(-1e-8..1e-8);
            text.push_str(&format!("{r:.12e} {z:.12e}\n"));
        }
        fs::write(&data, text).unwrap();
        fs::write(
            &settings_path,
            "SurfaceType=1\nRadius=100.0\nconic_isVariable=1\nTermNumber=1\n",
        )
        .unwrap();

        let outcome = run_fit(&data, &settings_path, dir.path()).unwrap();
        assert_abs_diff_eq!(outcome.surface.conic, -1.0, epsilon = 1e-3);
        assert!(outcome.statistics.rmse < 1e-7);
    }

    #[test]
    fn pure_poly_fit_reports_standard_coefficients() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data.txt");
        let settings_path = dir.path().join("settings.txt");

        // truth in the standard H=1 form; the driver fits in its own
        // internal normalization and must rescale back on output
        let truth = SurfaceParameters::pure_poly(100.0, 1.0, 1.0, vec![1e-5]);
        write_profile(&data, &truth, 50, 15.0);
        fs::write(&settings_path, "SurfaceType=6\nRadius=100.0\nTermNumber=1\n").unwrap();

        let outcome = run_fit(&data, &settings_path, dir.path()).unwrap();
        assert!(outcome.statistics.rmse < 1e-9);

        // internal H comes from the data sag extent, not the standard form
        assert!(outcome.surface.h > 1.0);
        let rescaled =
            report::rescale_poly_coefficients(&outcome.surface.poly_series(), outcome.surface.h);
        assert_relative_eq!(rescaled[0], 200.0, epsilon = 1e-6);
        assert_abs_diff_eq!(rescaled[2], 1e-5, epsilon = 1e-8);

        let text = fs::read_to_string(dir.path().join("FitReport.txt")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Type=Poly");
        assert!(lines[1].starts_with("# Fitted with internal H="));
        let a3: f64 = lines[4].strip_prefix("A3=").unwrap().parse().unwrap();
        assert_abs_diff_eq!(a3, 1e-5, epsilon = 1e-8);
    }

    #[test]
    fn non_finite_data_is_fatal_and_writes_nothing() {
        let dir = tempdir().unwrap();
        let data = dir.path().join("data.txt");
        let settings_path = dir.path().join("settings.txt");
        fs::write(&data, "0.0 0.0\n1.0 NaN\n").unwrap();
        fs::write(&settings_path, "SurfaceType=1\nRadius=100.0\n").unwrap();

        let err = run_fit(&data, &settings_path, dir.path()).unwrap_err();
        assert!(matches!(err, FitError::InputData(_)));
        assert!(!dir.path().join("FitReport.txt").exists());
        assert!(!dir.path().join("FitMetrics.txt").exists());
    }

    #[test]
    fn pure_poly_normalization_resolves_from_data() {
        let cloud = PointCloud::parse("0.0 0.0\n1.0 0.2\n2.0 0.8\n").unwrap();
        let settings = FitSettings::parse("SurfaceType=6\nRadius=100.0\n").unwrap();
        assert_relative_eq!(resolve_h_internal(&settings, &cloud).unwrap(), 0.8);

        let flat = PointCloud::parse("0.0 0.0\n5.0 0.0\n").unwrap();
        assert_relative_eq!(resolve_h_internal(&settings, &flat).unwrap(), 0.5);

        let with_override =
            FitSettings::parse("SurfaceType=6\nRadius=100.0\nH_internal=0.25\n").unwrap();
        assert_relative_eq!(
            resolve_h_internal(&with_override, &cloud).unwrap(),
            0.25
        );
    }
}
