//! Reference-sphere comparisons: best-fit spheres, asphericity and the
//! aberration of normals.
//!
//! Same error discipline as the profile evaluators: degenerate geometry
//! (zero sag, zero slope, negative square-root arguments) yields 0, never a
//! failure, so column-wise evaluation over a profile stays total.

/// Sag of a sphere in the paraxial form `z = r²/(2R)`, 0 when `R = 0`.
pub fn sphere_sag(r: f64, radius: f64) -> f64 {
    if radius == 0.0 {
        return 0.0;
    }
    r * r / (2.0 * radius)
}

/// Slope of the paraxial sphere, `dz/dr = r/R`, 0 when `R = 0`.
pub fn sphere_slope(r: f64, radius: f64) -> f64 {
    if radius == 0.0 {
        return 0.0;
    }
    r / radius
}

/// Radius of the sphere through the vertex and the profile edge
/// `(r_max, z_max)`: `R = r_max²/(2 z_max) + z_max/2`. 0 when `z_max = 0`.
/// For full (hole-free) apertures.
pub fn best_fit_sphere_3point(r_max: f64, z_max: f64) -> f64 {
    if z_max == 0.0 {
        return 0.0;
    }
    r_max * r_max / (2.0 * z_max) + z_max / 2.0
}

/// Best-fit sphere derived from the aperture chord. All five values are
/// needed together by the four-point asphericity, hence one struct.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestFitSphere {
    pub radius: f64,
    /// Chord midpoint sag coordinate.
    pub z_mid: f64,
    /// Chord midpoint radial coordinate.
    pub r_mid: f64,
    /// Distance from the chord midpoint to the sphere center axis.
    pub g: f64,
    /// Axial chord extent; its sign carries the surface orientation.
    pub l_z: f64,
}

impl BestFitSphere {
    fn zeroed() -> Self {
        BestFitSphere {
            radius: 0.0,
            z_mid: 0.0,
            r_mid: 0.0,
            g: 0.0,
            l_z: 0.0,
        }
    }
}

/// Four-point best-fit sphere for apertures with a central hole: the chord
/// runs from `(min_r, z_min)` to `(max_r, z_max)` and the sphere follows
/// from the chord midpoint geometry. Degenerate when the axial extent
/// vanishes.
pub fn best_fit_sphere_4point(min_r: f64, max_r: f64, z_min: f64, z_max: f64) -> BestFitSphere {
    let l_r = max_r - min_r;
    let l_z = z_max - z_min;
    if l_z == 0.0 {
        return BestFitSphere::zeroed();
    }
    let two_f = (l_z * l_z + l_r * l_r).sqrt();
    let z_mid = (z_min + z_max) / 2.0;
    let r_mid = (min_r + max_r) / 2.0;
    let g = two_f * r_mid / l_z.abs();
    let radius = (g * g + (two_f / 2.0) * (two_f / 2.0)).sqrt();
    BestFitSphere {
        radius,
        z_mid,
        r_mid,
        g,
        l_z,
    }
}

/// Signed deviation of a profile point from the three-point sphere:
/// `sign(R) * (|R3| - sqrt((R3 - z)² + r²))`. The sign comes from the
/// surface's base radius so concave and convex profiles report
/// consistently.
pub fn asphericity_3point(r: f64, z: f64, sphere_radius: f64, base_radius: f64) -> f64 {
    if sphere_radius == 0.0 {
        return 0.0;
    }
    let sign = if base_radius >= 0.0 { 1.0 } else { -1.0 };
    let distance = ((sphere_radius - z) * (sphere_radius - z) + r * r).sqrt();
    sign * (sphere_radius.abs() - distance)
}

/// Signed deviation from the four-point sphere. The sphere center sag
/// coordinate is recovered from the midpoint geometry first; a negative
/// square-root argument means the construction is degenerate and yields 0.
pub fn asphericity_4point(r: f64, z: f64, sphere: &BestFitSphere) -> f64 {
    if sphere.radius == 0.0 {
        return 0.0;
    }
    let center_arg = sphere.g * sphere.g - sphere.r_mid * sphere.r_mid;
    if center_arg < 0.0 {
        return 0.0;
    }
    let sign_lz = if sphere.l_z >= 0.0 { 1.0 } else { -1.0 };
    let z_center = sphere.z_mid + sign_lz * center_arg.sqrt();
    let sign_z = if z >= 0.0 { 1.0 } else { -1.0 };
    let distance = ((z_center - z) * (z_center - z) + r * r).sqrt();
    sign_z * (sphere.radius - distance)
}

/// Longitudinal aberration of normals: where the surface normal at `(r, z)`
/// crosses the axis, measured from the paraxial center, `z + r/z' - R`.
/// 0 when the slope vanishes.
pub fn aberration_of_normals(r: f64, z: f64, slope: f64, radius: f64) -> f64 {
    if slope == 0.0 {
        return 0.0;
    }
    z + r / slope - radius
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::parameters::SurfaceParameters;
    use crate::surface::profile;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn exact_sphere_sag(r: f64, radius: f64) -> f64 {
        radius - (radius * radius - r * r).sqrt()
    }

    #[test]
    fn paraxial_sphere_guards_zero_radius() {
        assert_abs_diff_eq!(sphere_sag(3.0, 0.0), 0.0);
        assert_abs_diff_eq!(sphere_slope(3.0, 0.0), 0.0);
        assert_relative_eq!(sphere_sag(3.0, 50.0), 0.09);
        assert_relative_eq!(sphere_slope(3.0, 50.0), 0.06);
    }

    #[test]
    fn three_point_sphere_recovers_true_sphere() {
        let radius = 75.0;
        let r_max = 30.0;
        let z_max = exact_sphere_sag(r_max, radius);
        assert_relative_eq!(
            best_fit_sphere_3point(r_max, z_max),
            radius,
            epsilon = 1e-9
        );
    }

    #[test]
    fn three_point_sphere_degenerate_on_flat_profile() {
        assert_abs_diff_eq!(best_fit_sphere_3point(10.0, 0.0), 0.0);
    }

    #[test]
    fn four_point_sphere_recovers_true_sphere_over_an_annulus() {
        let radius = 75.0;
        let (min_r, max_r) = (10.0, 30.0);
        let z_min = exact_sphere_sag(min_r, radius);
        let z_max = exact_sphere_sag(max_r, radius);
        let sphere = best_fit_sphere_4point(min_r, max_r, z_min, z_max);
        assert_relative_eq!(sphere.radius, radius, epsilon = 1e-9);
        assert_relative_eq!(sphere.r_mid, 20.0);
        assert_relative_eq!(sphere.z_mid, (z_min + z_max) / 2.0);
    }

    #[test]
    fn four_point_sphere_degenerate_on_flat_profile() {
        assert_eq!(
            best_fit_sphere_4point(2.0, 10.0, 0.0, 0.0),
            BestFitSphere::zeroed()
        );
    }

    #[test]
    fn asphericity_vanishes_on_the_fit_sphere() {
        let radius = 60.0;
        let (min_r, max_r) = (5.0, 25.0);
        let z_max = exact_sphere_sag(max_r, radius);
        let r3 = best_fit_sphere_3point(max_r, z_max);
        let sphere4 = best_fit_sphere_4point(
            min_r,
            max_r,
            exact_sphere_sag(min_r, radius),
            z_max,
        );
        for r in [0.0, 5.0, 12.0, 20.0, max_r] {
            let z = exact_sphere_sag(r, radius);
            assert_abs_diff_eq!(asphericity_3point(r, z, r3, radius), 0.0, epsilon = 1e-9);
            assert_abs_diff_eq!(asphericity_4point(r, z, &sphere4), 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn asphericity_sign_follows_base_radius() {
        let radius = -60.0_f64;
        let r_max = 25.0;
        let z_max = exact_sphere_sag(r_max, radius.abs());
        let r3 = best_fit_sphere_3point(r_max, z_max);
        // same geometry, flipped base radius flips the reported sign
        let plus = asphericity_3point(10.0, 0.5, r3, 60.0);
        let minus = asphericity_3point(10.0, 0.5, r3, radius);
        assert_relative_eq!(plus, -minus);
    }

    #[test]
    fn asphericity_detects_aspheric_departure() {
        // parabola against its vertex-and-edge sphere: interior points deviate
        let p = SurfaceParameters::even_asphere(100.0, -1.0, vec![]);
        let r_max = 30.0;
        let z_max = profile::sag(r_max, &p);
        let r3 = best_fit_sphere_3point(r_max, z_max);
        let mid = asphericity_3point(15.0, profile::sag(15.0, &p), r3, p.radius);
        assert!(mid.abs() > 1e-4);
        // the edge point lies on the sphere by construction
        assert_abs_diff_eq!(
            asphericity_3point(r_max, z_max, r3, p.radius),
            0.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn normals_of_a_sphere_pass_through_its_center() {
        let radius = 50.0;
        for r in [2.0, 10.0, 25.0] {
            let z = exact_sphere_sag(r, radius);
            let slope = r / (radius * radius - r * r).sqrt();
            assert_abs_diff_eq!(
                aberration_of_normals(r, z, slope, radius),
                0.0,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn aberration_guards_zero_slope() {
        assert_abs_diff_eq!(aberration_of_normals(5.0, 1.0, 0.0, 100.0), 0.0);
    }
}
