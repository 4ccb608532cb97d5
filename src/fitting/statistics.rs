//! Goodness-of-fit metrics.

use nalgebra::DVector;
use tabled::{Table, Tabled};

/// Metrics of one completed fit. `chi_square` is the raw sum of squared
/// deviations; `reduced_chi_square` divides by `n - n_varied`.
#[derive(Debug, Clone, PartialEq, Tabled)]
pub struct FitStatistics {
    #[tabled(rename = "RMSE")]
    pub rmse: f64,
    #[tabled(rename = "R²")]
    pub r_squared: f64,
    #[tabled(rename = "AIC")]
    pub aic: f64,
    #[tabled(rename = "BIC")]
    pub bic: f64,
    #[tabled(rename = "chi²")]
    pub chi_square: f64,
    #[tabled(rename = "reduced chi²")]
    pub reduced_chi_square: f64,
    #[tabled(rename = "evaluations")]
    pub num_evaluations: usize,
}

impl FitStatistics {
    /// Compute the metrics from observed data and fit deviations.
    ///
    /// `num_model_parameters` enters the information criteria (every model
    /// parameter counts, fixed or not); `num_varied` enters the reduced
    /// chi-square denominator. Degenerate denominators yield NaN rather
    /// than an error so a report can still be inspected.
    pub fn compute(
        z_data: &DVector<f64>,
        deviations: &DVector<f64>,
        num_model_parameters: usize,
        num_varied: usize,
        num_evaluations: usize,
    ) -> Self {
        let n = z_data.len() as f64;
        let ss_res: f64 = deviations.iter().map(|d| d * d).sum();
        let z_mean = z_data.mean();
        let ss_tot: f64 = z_data.iter().map(|z| (z - z_mean) * (z - z_mean)).sum();

        let rmse = (ss_res / n).sqrt();
        let r_squared = if ss_tot != 0.0 {
            1.0 - ss_res / ss_tot
        } else {
            f64::NAN
        };

        let k = num_model_parameters as f64;
        let (aic, bic) = if ss_res > 0.0 {
            (
                n * (ss_res / n).ln() + 2.0 * k,
                n * (ss_res / n).ln() + k * n.ln(),
            )
        } else {
            (f64::NAN, f64::NAN)
        };

        let dof = z_data.len() as i64 - num_varied as i64;
        let reduced_chi_square = if dof > 0 { ss_res / dof as f64 } else { f64::NAN };

        FitStatistics {
            rmse,
            r_squared,
            aic,
            bic,
            chi_square: ss_res,
            reduced_chi_square,
            num_evaluations,
        }
    }

    /// One-row table for log output.
    pub fn as_table(&self) -> String {
        Table::new([self]).to_string()
    }
}
