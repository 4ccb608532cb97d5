//! The least-squares objective binding a surface family to measured data.
//!
//! Residuals are `model(r) - z` with the model evaluated in the fixed-count
//! fitting regime. The Jacobian is forward-difference; all families stay on
//! the same code path whether their sag is closed-form or implicit.

use nalgebra::{DMatrix, DVector};

use crate::io::point_cloud::PointCloud;
use crate::io::settings::FitSettings;
use crate::numerical::levenberg_marquardt::LeastSquaresProblem;
use crate::surface::parameters::{SurfaceFamily, SurfaceParameters};
use crate::surface::profile;

/// Nonlinear least-squares problem for one surface family over one cloud.
///
/// The free parameter vector is `[shape, A...]` when the shape parameter
/// (conic `k` or `e2`, per family) is marked variable, `[A...]` otherwise.
pub struct SurfaceFitProblem {
    family: SurfaceFamily,
    radius: f64,
    h: f64,
    fixed_conic: f64,
    fixed_e2: f64,
    shape_is_variable: bool,
    num_coeffs: usize,
    fit_iterations: usize,
    r: DVector<f64>,
    z: DVector<f64>,
}

impl SurfaceFitProblem {
    /// Build the problem. `h` is the normalization actually used during
    /// fitting; for Pure Poly the driver passes the resolved internal H.
    pub fn new(settings: &FitSettings, cloud: &PointCloud, h: f64) -> Self {
        let shape_is_variable = if settings.family.uses_conic() {
            settings.conic_is_variable
        } else {
            settings.e2_is_variable
        };
        SurfaceFitProblem {
            family: settings.family,
            radius: settings.radius,
            h,
            fixed_conic: settings.conic,
            fixed_e2: settings.e2,
            shape_is_variable,
            num_coeffs: settings.term_number,
            fit_iterations: settings.fit_iterations,
            r: cloud.r.clone(),
            z: cloud.z.clone(),
        }
    }

    /// Starting point: `k = -1` or `e2 = 1` when the shape is free,
    /// all series coefficients at zero.
    pub fn initial_guess(&self) -> DVector<f64> {
        let mut x = DVector::zeros(self.num_parameters());
        if self.shape_is_variable {
            x[0] = if self.family.uses_conic() { -1.0 } else { 1.0 };
        }
        x
    }

    /// Whether the parameter vector carries the shape parameter in slot 0.
    pub fn shape_is_variable(&self) -> bool {
        self.shape_is_variable
    }

    /// Total parameter count reported in the information criteria: the shape
    /// parameter always counts, varied or not, matching the parameter-object
    /// convention of the reference reports.
    pub fn num_model_parameters(&self) -> usize {
        self.num_coeffs + 1
    }

    /// Map a parameter vector to a concrete surface.
    pub fn surface_for(&self, x: &DVector<f64>) -> SurfaceParameters {
        let offset = usize::from(self.shape_is_variable);
        let coeffs: Vec<f64> = x.iter().skip(offset).copied().collect();
        let shape = if self.shape_is_variable {
            x[0]
        } else if self.family.uses_conic() {
            self.fixed_conic
        } else {
            self.fixed_e2
        };
        match self.family {
            SurfaceFamily::EvenAsphere => {
                SurfaceParameters::even_asphere(self.radius, shape, coeffs)
            }
            SurfaceFamily::OddAsphere => {
                SurfaceParameters::odd_asphere(self.radius, shape, coeffs)
            }
            SurfaceFamily::OpalUniversalZ => {
                SurfaceParameters::opal_universal_z(self.radius, shape, self.h, coeffs)
            }
            SurfaceFamily::OpalUniversalU => {
                SurfaceParameters::opal_universal_u(self.radius, shape, self.h, coeffs)
            }
            SurfaceFamily::OpalPolynomial => {
                SurfaceParameters::opal_polynomial(self.radius, shape, coeffs)
            }
            SurfaceFamily::PurePoly => {
                SurfaceParameters::pure_poly(self.radius, shape, self.h, coeffs)
            }
        }
    }

    /// Model sag over the cloud in the fitting regime.
    pub fn model(&self, x: &DVector<f64>) -> DVector<f64> {
        let surface = self.surface_for(x);
        profile::sag_batch(&self.r, &surface, self.fit_iterations)
    }
}

impl LeastSquaresProblem for SurfaceFitProblem {
    fn residuals(&self, params: &DVector<f64>) -> Option<DVector<f64>> {
        let residuals = self.model(params) - &self.z;
        residuals.iter().all(|v| v.is_finite()).then_some(residuals)
    }

    fn jacobian(&self, params: &DVector<f64>) -> Option<DMatrix<f64>> {
        let base = self.residuals(params)?;
        let n = self.num_parameters();
        let mut jacobian = DMatrix::zeros(self.num_residuals(), n);
        for j in 0..n {
            let step = f64::EPSILON.sqrt() * params[j].abs().max(1.0);
            let mut perturbed = params.clone();
            perturbed[j] += step;
            let shifted = self.residuals(&perturbed)?;
            jacobian.set_column(j, &((shifted - &base) / step));
        }
        Some(jacobian)
    }

    fn num_parameters(&self) -> usize {
        self.num_coeffs + usize::from(self.shape_is_variable)
    }

    fn num_residuals(&self) -> usize {
        self.r.len()
    }
}
