//! Sag and slope evaluators for the six surface families.
//!
//! Every evaluator is a pure function of `(r, SurfaceParameters)`. Domain
//! errors (negative discriminant, division by zero, zero base radius) return
//! 0 instead of failing, so dense sampling for rendering is never
//! interrupted.
//!
//! The implicit families run under two regimes sharing one formula core:
//! [`sag`] uses the high-precision single-point policies, [`sag_batch`] runs
//! a fixed iteration count uniformly over a point cloud (the fitting
//! regime). The two are not bit-identical but agree to within fit tolerance
//! for well-conditioned inputs.

use crate::numerical::iteration::{ConvergencePolicy, fixed_point, newton_raphson, policies};
use crate::surface::parameters::{SurfaceFamily, SurfaceParameters};
use nalgebra::DVector;

/// Horner evaluation of `c[0] + c[1]*x + c[2]*x² + ...`.
fn horner(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

/// Coefficients of the term-wise weighted series `n_i * A_i` used by the
/// analytic derivatives, where `n_i` is the power carried by `A_i`.
fn power_weighted(coeffs: &[f64], first_power: usize, step: usize) -> Vec<f64> {
    coeffs
        .iter()
        .enumerate()
        .map(|(i, &a)| (first_power + step * i) as f64 * a)
        .collect()
}

/// Sag in the high-precision single-point regime (interactive sampling).
pub fn sag(r: f64, params: &SurfaceParameters) -> f64 {
    let policy = match params.family {
        SurfaceFamily::OpalUniversalZ | SurfaceFamily::PurePoly => policies::NEWTON_DISPLAY,
        _ => policies::PICARD_DISPLAY,
    };
    sag_with_policy(r, params, policy)
}

/// Sag under an explicit convergence policy. Closed-form families ignore the
/// policy; implicit families hand it to their root finder unchanged.
pub fn sag_with_policy(r: f64, params: &SurfaceParameters, policy: ConvergencePolicy<f64>) -> f64 {
    match params.family {
        SurfaceFamily::EvenAsphere => even_asphere_sag(r, params),
        SurfaceFamily::OddAsphere => odd_asphere_sag(r, params),
        SurfaceFamily::OpalUniversalZ => opal_universal_z_sag(r, params, policy),
        SurfaceFamily::OpalUniversalU => opal_universal_u_sag(r, params, policy),
        SurfaceFamily::OpalPolynomial => opal_polynomial_sag(r, params, policy),
        SurfaceFamily::PurePoly => pure_poly_sag(r, params, policy),
    }
}

/// Vectorized fitting regime: `iterations` root-finder steps per point,
/// applied uniformly over the whole radius vector.
pub fn sag_batch(r: &DVector<f64>, params: &SurfaceParameters, iterations: usize) -> DVector<f64> {
    let policy = ConvergencePolicy::FixedCount(iterations);
    r.map(|ri| sag_with_policy(ri, params, policy))
}

/// Local slope dz/dr in the high-precision regime.
pub fn slope(r: f64, params: &SurfaceParameters) -> f64 {
    match params.family {
        SurfaceFamily::EvenAsphere => even_asphere_slope(r, params),
        SurfaceFamily::OddAsphere => odd_asphere_slope(r, params),
        SurfaceFamily::OpalUniversalZ => opal_universal_z_slope(r, params),
        SurfaceFamily::OpalUniversalU => opal_universal_u_slope(r, params),
        SurfaceFamily::OpalPolynomial => opal_polynomial_slope(r, params),
        SurfaceFamily::PurePoly => pure_poly_slope(r, params),
    }
}

/// Conic base term `r² / (R(1 + sqrt(1 - (1+k)r²/R²)))`, or None on a
/// domain error (R = 0 or negative discriminant).
fn conic_base_sag(r: f64, radius: f64, conic: f64) -> Option<f64> {
    if radius == 0.0 {
        return None;
    }
    let discriminant = 1.0 - (1.0 + conic) * r * r / (radius * radius);
    if discriminant < 0.0 {
        return None;
    }
    Some(r * r / (radius * (1.0 + discriminant.sqrt())))
}

fn conic_base_slope(r: f64, radius: f64, conic: f64) -> Option<f64> {
    if radius == 0.0 {
        return None;
    }
    let discriminant = 1.0 - (1.0 + conic) * r * r / (radius * radius);
    if discriminant < 0.0 {
        return None;
    }
    let q = discriminant.sqrt();
    if q == 0.0 {
        return None;
    }
    let numerator = 2.0 * r * (1.0 + q) + (1.0 + conic) * r.powi(3) / (radius * radius * q);
    Some(numerator / (radius * (1.0 + q) * (1.0 + q)))
}

fn even_asphere_sag(r: f64, p: &SurfaceParameters) -> f64 {
    match conic_base_sag(r, p.radius, p.conic) {
        // A4*r^4 + A6*r^6 + ... = r^4 * horner(coeffs, r²)
        Some(base) => base + r.powi(4) * horner(&p.coeffs, r * r),
        None => 0.0,
    }
}

fn even_asphere_slope(r: f64, p: &SurfaceParameters) -> f64 {
    match conic_base_slope(r, p.radius, p.conic) {
        Some(base) => {
            let weighted = power_weighted(&p.coeffs, 4, 2);
            base + r.powi(3) * horner(&weighted, r * r)
        }
        None => 0.0,
    }
}

fn odd_asphere_sag(r: f64, p: &SurfaceParameters) -> f64 {
    match conic_base_sag(r, p.radius, p.conic) {
        Some(base) => base + r.powi(3) * horner(&p.coeffs, r),
        None => 0.0,
    }
}

fn odd_asphere_slope(r: f64, p: &SurfaceParameters) -> f64 {
    match conic_base_slope(r, p.radius, p.conic) {
        Some(base) => {
            let weighted = power_weighted(&p.coeffs, 3, 1);
            base + r * r * horner(&weighted, r)
        }
        None => 0.0,
    }
}

/// Opal Universal Z: Newton-Raphson on
/// `F(z) = z - c(r² + (1-e2)z²)/2 - Q(z/H)` with `Q(w) = w³(A3 + A4 w + ...)`.
fn opal_universal_z_sag(r: f64, p: &SurfaceParameters, policy: ConvergencePolicy<f64>) -> f64 {
    if p.radius == 0.0 {
        return 0.0;
    }
    let c = 1.0 / p.radius;
    let r_squared = r * r;
    let one_minus_e2 = 1.0 - p.e2;
    let derivative_weights = power_weighted(&p.coeffs, 3, 1);

    newton_raphson(r / p.radius, policy, |z| {
        let w = z / p.h;
        let q = w.powi(3) * horner(&p.coeffs, w);
        let residual = z - c * (r_squared + one_minus_e2 * z * z) / 2.0 - q;
        let dq_dz = w * w * horner(&derivative_weights, w) / p.h;
        let derivative = 1.0 - c * one_minus_e2 * z - dq_dz;
        (residual, derivative)
    })
}

fn opal_universal_z_slope(r: f64, p: &SurfaceParameters) -> f64 {
    if p.radius == 0.0 {
        return 0.0;
    }
    let z = sag(r, p);
    let c = 1.0 / p.radius;
    let w = z / p.h;
    let derivative_weights = power_weighted(&p.coeffs, 3, 1);
    let dq_dz = w * w * horner(&derivative_weights, w) / p.h;
    let df_dz = 1.0 - c * (1.0 - p.e2) * z - dq_dz;
    if df_dz == 0.0 {
        return 0.0;
    }
    // dz/dr = -dF/dr / dF/dz with dF/dr = -c*r
    c * r / df_dz
}

/// Opal Universal U: fixed-point `z <- (r² + (1-e2)z²)/(2R) + Q(r²/H²)`.
/// The series argument does not depend on z, so Q is hoisted out of the loop.
fn opal_universal_u_sag(r: f64, p: &SurfaceParameters, policy: ConvergencePolicy<f64>) -> f64 {
    if p.radius == 0.0 {
        return 0.0;
    }
    let r_squared = r * r;
    let w = r_squared / (p.h * p.h);
    // Q(w) = w²(A2 + A3 w + ...)
    let q = w * w * horner(&p.coeffs, w);
    let inv_2r = 1.0 / (2.0 * p.radius);
    let one_minus_e2 = 1.0 - p.e2;

    fixed_point(r_squared * inv_2r, policy, |z| {
        (r_squared + one_minus_e2 * z * z) * inv_2r + q
    })
}

fn opal_universal_u_slope(r: f64, p: &SurfaceParameters) -> f64 {
    if p.radius == 0.0 {
        return 0.0;
    }
    let z = sag(r, p);
    let w = r * r / (p.h * p.h);
    let derivative_weights = power_weighted(&p.coeffs, 2, 1);
    // dQ/dr = Q'(w) * dw/dr = w(2A2 + 3A3 w + ...) * 2r/H²
    let dq_dr = w * horner(&derivative_weights, w) * 2.0 * r / (p.h * p.h);
    let denominator = 1.0 - (1.0 - p.e2) * z / p.radius;
    if denominator == 0.0 {
        return 0.0;
    }
    (r / p.radius + dq_dr) / denominator
}

/// Opal Polynomial: same implicit shape as Universal Z but the series
/// argument is z itself; `A1 = 2R`, `A2 = e2 - 1` pin the linear part.
/// Fixed-point `z <- (r² - A2 z² - Q(z)) / A1`.
fn opal_polynomial_sag(r: f64, p: &SurfaceParameters, policy: ConvergencePolicy<f64>) -> f64 {
    let a1 = 2.0 * p.radius;
    if a1 == 0.0 {
        return 0.0;
    }
    let a2 = p.e2 - 1.0;
    let r_squared = r * r;

    fixed_point(r_squared / a1, policy, |z| {
        let q = z.powi(3) * horner(&p.coeffs, z);
        (r_squared - a2 * z * z - q) / a1
    })
}

fn opal_polynomial_slope(r: f64, p: &SurfaceParameters) -> f64 {
    let a1 = 2.0 * p.radius;
    if a1 == 0.0 {
        return 0.0;
    }
    let a2 = p.e2 - 1.0;
    let z = sag(r, p);
    let derivative_weights = power_weighted(&p.coeffs, 3, 1);
    // implicit differentiation of A1 z + A2 z² + Q(z) = r²
    let denominator = a1 + 2.0 * a2 * z + z * z * horner(&derivative_weights, z);
    if denominator == 0.0 {
        return 0.0;
    }
    2.0 * r / denominator
}

/// Pure Poly: Newton-Raphson on `P(z) = z*Q(z/H) - r²` with the general
/// series `Q(w) = A1 + A2 w + A3 w² + ...`.
fn pure_poly_sag(r: f64, p: &SurfaceParameters, policy: ConvergencePolicy<f64>) -> f64 {
    let series = p.poly_series();
    let derivative_weights: Vec<f64> = series
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, &a)| i as f64 * a)
        .collect();
    let r_squared = r * r;

    newton_raphson(1.0, policy, |z| {
        let w = z / p.h;
        let q = horner(&series, w);
        // Q'(w) = A2 + 2 A3 w + ...
        let dq = horner(&derivative_weights, w);
        let residual = z * q - r_squared;
        let derivative = q + z * dq / p.h;
        (residual, derivative)
    })
}

fn pure_poly_slope(r: f64, p: &SurfaceParameters) -> f64 {
    let z = sag(r, p);
    let series = p.poly_series();
    let derivative_weights: Vec<f64> = series
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, &a)| i as f64 * a)
        .collect();
    let w = z / p.h;
    // dP/dz at the solved z; dz/dr = 2r / P'(z)
    let denominator = horner(&series, w) + z * horner(&derivative_weights, w) / p.h;
    if denominator == 0.0 {
        return 0.0;
    }
    2.0 * r / denominator
}
