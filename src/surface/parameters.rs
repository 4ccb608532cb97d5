use strum_macros::{Display, EnumString};

/// The six supported surface families.
///
/// The string form of each variant is the type tag used in fit reports and
/// understood by the downstream tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum SurfaceFamily {
    #[strum(serialize = "EA")]
    EvenAsphere,
    /// Also known as Extended Asphere.
    #[strum(serialize = "OA")]
    OddAsphere,
    #[strum(serialize = "OUZ")]
    OpalUniversalZ,
    #[strum(serialize = "OUU")]
    OpalUniversalU,
    #[strum(serialize = "OP")]
    OpalPolynomial,
    #[strum(serialize = "Poly")]
    PurePoly,
}

impl SurfaceFamily {
    /// Map the numeric `SurfaceType` selector of the settings file (1..=6).
    pub fn from_selector(selector: u32) -> Option<Self> {
        match selector {
            1 => Some(SurfaceFamily::EvenAsphere),
            2 => Some(SurfaceFamily::OddAsphere),
            3 => Some(SurfaceFamily::OpalUniversalZ),
            4 => Some(SurfaceFamily::OpalUniversalU),
            5 => Some(SurfaceFamily::OpalPolynomial),
            6 => Some(SurfaceFamily::PurePoly),
            _ => None,
        }
    }

    /// Index of the first free power-series coefficient.
    ///
    /// Even Asphere starts at A4 and uses even powers only; Opal Universal U
    /// starts at A2; Pure Poly's free coefficients start at A3 because A1 and
    /// A2 are pinned to `2R` and `e2 - 1`.
    pub fn first_coefficient_index(&self) -> usize {
        match self {
            SurfaceFamily::EvenAsphere => 4,
            SurfaceFamily::OddAsphere => 3,
            SurfaceFamily::OpalUniversalZ => 3,
            SurfaceFamily::OpalUniversalU => 2,
            SurfaceFamily::OpalPolynomial => 3,
            SurfaceFamily::PurePoly => 3,
        }
    }

    /// Index distance between consecutive coefficients (2 for Even Asphere).
    pub fn coefficient_index_step(&self) -> usize {
        match self {
            SurfaceFamily::EvenAsphere => 2,
            _ => 1,
        }
    }

    /// Report labels for `count` free coefficients, e.g. `A4, A6, ...`.
    pub fn coefficient_labels(&self, count: usize) -> Vec<String> {
        let first = self.first_coefficient_index();
        let step = self.coefficient_index_step();
        (0..count).map(|i| format!("A{}", first + step * i)).collect()
    }

    /// Whether the family's shape parameter is the conic constant `k`
    /// (asphere families) rather than `e2` (Opal families, Pure Poly).
    pub fn uses_conic(&self) -> bool {
        matches!(self, SurfaceFamily::EvenAsphere | SurfaceFamily::OddAsphere)
    }
}

/// Geometric parameters of one surface.
///
/// `coeffs` holds the free power-series coefficients ordered from
/// `first_coefficient_index()` upward; Pure Poly derives its full series
/// `A1 = 2R`, `A2 = e2 - 1`, `A3..` through [`SurfaceParameters::poly_series`].
/// Fixed/variable flags live in the fit configuration, not here.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceParameters {
    pub family: SurfaceFamily,
    /// Base radius of curvature R. Unused by Pure Poly evaluation except
    /// through the derived A1.
    pub radius: f64,
    /// Conic constant k (asphere families only).
    pub conic: f64,
    /// Second-eccentricity-like term (Opal families, Pure Poly).
    pub e2: f64,
    /// Normalization length H (Opal Universal families, Pure Poly).
    pub h: f64,
    pub coeffs: Vec<f64>,
}

impl SurfaceParameters {
    pub fn even_asphere(radius: f64, conic: f64, coeffs: Vec<f64>) -> Self {
        SurfaceParameters {
            family: SurfaceFamily::EvenAsphere,
            radius,
            conic,
            e2: 1.0,
            h: 1.0,
            coeffs,
        }
    }

    pub fn odd_asphere(radius: f64, conic: f64, coeffs: Vec<f64>) -> Self {
        SurfaceParameters {
            family: SurfaceFamily::OddAsphere,
            radius,
            conic,
            e2: 1.0,
            h: 1.0,
            coeffs,
        }
    }

    pub fn opal_universal_z(radius: f64, e2: f64, h: f64, coeffs: Vec<f64>) -> Self {
        SurfaceParameters {
            family: SurfaceFamily::OpalUniversalZ,
            radius,
            conic: 0.0,
            e2,
            h,
            coeffs,
        }
    }

    pub fn opal_universal_u(radius: f64, e2: f64, h: f64, coeffs: Vec<f64>) -> Self {
        SurfaceParameters {
            family: SurfaceFamily::OpalUniversalU,
            radius,
            conic: 0.0,
            e2,
            h,
            coeffs,
        }
    }

    pub fn opal_polynomial(radius: f64, e2: f64, coeffs: Vec<f64>) -> Self {
        SurfaceParameters {
            family: SurfaceFamily::OpalPolynomial,
            radius,
            conic: 0.0,
            e2,
            h: 1.0,
            coeffs,
        }
    }

    pub fn pure_poly(radius: f64, e2: f64, h: f64, coeffs: Vec<f64>) -> Self {
        SurfaceParameters {
            family: SurfaceFamily::PurePoly,
            radius,
            conic: 0.0,
            e2,
            h,
            coeffs,
        }
    }

    /// Full Pure Poly series `[A1, A2, A3, ...]` with the pinned linear part.
    pub fn poly_series(&self) -> Vec<f64> {
        let mut series = Vec::with_capacity(self.coeffs.len() + 2);
        series.push(2.0 * self.radius);
        series.push(self.e2 - 1.0);
        series.extend_from_slice(&self.coeffs);
        series
    }
}
