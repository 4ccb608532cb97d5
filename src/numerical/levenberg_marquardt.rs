use crate::numerical::trust_region::solve_trust_region_subproblem;
use log::debug;
use nalgebra::{DMatrix, DVector};

/// Configuration parameters for the Levenberg-Marquardt algorithm.
#[derive(Debug, Clone)]
pub struct LMConfig {
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
    /// Initial trust region bound factor.
    pub stepbound: f64,
    pub max_evaluations: usize,
    /// Whether to scale the diagonal matrix from Jacobian column norms.
    pub scale_diag: bool,
}

impl Default for LMConfig {
    fn default() -> Self {
        Self {
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
            stepbound: 100.0,
            max_evaluations: 1000,
            scale_diag: true,
        }
    }
}

/// Termination reasons for the algorithm.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationReason {
    Converged { ftol: bool, xtol: bool },
    /// Gradient orthogonality condition satisfied.
    Orthogonal,
    /// Residuals are essentially zero.
    ResidualsZero,
    MaxEvaluationsReached,
    /// No improvement possible at machine precision.
    NoImprovementPossible(String),
    NumericalError(String),
    FunctionEvaluationFailed,
}

impl TerminationReason {
    pub fn was_successful(&self) -> bool {
        matches!(
            self,
            TerminationReason::Converged { .. }
                | TerminationReason::Orthogonal
                | TerminationReason::ResidualsZero
        )
    }
}

/// Result of a Levenberg-Marquardt minimization.
#[derive(Debug, Clone)]
pub struct LMResult {
    pub parameters: DVector<f64>,
    pub residuals: DVector<f64>,
    pub objective_value: f64,
    pub termination: TerminationReason,
    pub num_evaluations: usize,
    pub num_jacobian_evaluations: usize,
}

/// Black-box contract between the minimizer and a residual problem.
///
/// Any Levenberg-Marquardt-class solver satisfying this shape is acceptable
/// to the fit driver; nothing couples the objective to a particular
/// parameter-object API.
pub trait LeastSquaresProblem {
    /// Evaluate residuals at given parameters; `None` marks a failed evaluation.
    fn residuals(&self, params: &DVector<f64>) -> Option<DVector<f64>>;

    /// Evaluate the Jacobian at given parameters.
    fn jacobian(&self, params: &DVector<f64>) -> Option<DMatrix<f64>>;

    fn num_parameters(&self) -> usize;

    fn num_residuals(&self) -> usize;
}

/// Minimize `0.5*||residuals(params)||²` with a trust-region LM iteration.
pub fn levenberg_marquardt<P: LeastSquaresProblem>(
    problem: &P,
    initial_params: DVector<f64>,
    config: LMConfig,
) -> LMResult {
    const MACHINE_EPS: f64 = f64::EPSILON;
    const MIN_RATIO: f64 = 1e-4;

    let mut params = initial_params;
    let n = problem.num_parameters();
    let m = problem.num_residuals();

    if params.len() != n {
        return error_result(
            params,
            TerminationReason::NumericalError("Parameter dimension mismatch".to_string()),
            0,
            0,
        );
    }

    let mut num_evaluations = 0;
    let mut num_jacobian_evaluations = 0;
    let mut lambda = 0.0;
    let mut delta = 0.0;
    let mut first_iteration = true;
    let mut diag: DVector<f64> = DVector::from_element(n, 1.0);

    let mut residuals = match problem.residuals(&params) {
        Some(r) => r,
        None => {
            return error_result(params, TerminationReason::FunctionEvaluationFailed, 1, 0);
        }
    };
    num_evaluations += 1;

    let mut residuals_norm = residuals.norm();
    let mut objective_value = 0.5 * residuals_norm * residuals_norm;

    if residuals_norm <= MACHINE_EPS.sqrt() {
        return LMResult {
            parameters: params,
            residuals,
            objective_value,
            termination: TerminationReason::ResidualsZero,
            num_evaluations,
            num_jacobian_evaluations,
        };
    }

    loop {
        let jacobian = match problem.jacobian(&params) {
            Some(j) => j,
            None => {
                return error_result(
                    params,
                    TerminationReason::FunctionEvaluationFailed,
                    num_evaluations,
                    num_jacobian_evaluations,
                );
            }
        };
        num_jacobian_evaluations += 1;

        if jacobian.nrows() != m || jacobian.ncols() != n {
            return error_result(
                params,
                TerminationReason::NumericalError("Jacobian dimension mismatch".to_string()),
                num_evaluations,
                num_jacobian_evaluations,
            );
        }

        let jacobian_t = jacobian.transpose();

        if config.scale_diag {
            for j in 0..n {
                let col_norm = jacobian.column(j).norm();
                if col_norm > 0.0 {
                    diag[j] = diag[j].max(col_norm);
                }
            }
        }

        let gnorm = scaled_gradient_norm(&jacobian, &residuals, residuals_norm);
        if gnorm <= config.gtol {
            return LMResult {
                parameters: params,
                residuals,
                objective_value,
                termination: TerminationReason::Orthogonal,
                num_evaluations,
                num_jacobian_evaluations,
            };
        }

        if first_iteration {
            let xnorm = scaled_norm(&params, &diag);
            delta = if xnorm == 0.0 {
                config.stepbound
            } else {
                config.stepbound * xnorm
            };
            first_iteration = false;
        }

        // Inner loop: shrink the trust region until a step is accepted or a
        // termination test fires.
        loop {
            let tr = match solve_trust_region_subproblem(
                &jacobian,
                &jacobian_t,
                &residuals,
                &diag,
                delta,
                lambda,
            ) {
                Ok(result) => result,
                Err(msg) => {
                    return error_result(
                        params,
                        TerminationReason::NumericalError(format!(
                            "Trust region solver failed: {}",
                            msg
                        )),
                        num_evaluations,
                        num_jacobian_evaluations,
                    );
                }
            };

            lambda = tr.lambda;
            let step = tr.step;
            let pnorm = tr.scaled_step_norm;

            let new_params = &params - &step;
            let new_residuals = match problem.residuals(&new_params) {
                Some(r) => r,
                None => {
                    return error_result(
                        params,
                        TerminationReason::FunctionEvaluationFailed,
                        num_evaluations,
                        num_jacobian_evaluations,
                    );
                }
            };
            num_evaluations += 1;

            let new_residuals_norm = new_residuals.norm();
            let (predicted_reduction, actual_reduction, ratio) = reduction_ratio(
                &jacobian,
                &step,
                residuals_norm,
                new_residuals_norm,
                lambda,
                pnorm,
            );

            let (new_delta, new_lambda) = update_trust_region_radius(
                delta,
                lambda,
                ratio,
                pnorm,
                predicted_reduction,
                actual_reduction,
                residuals_norm,
                new_residuals_norm,
            );
            delta = new_delta;
            lambda = new_lambda;
            debug!(
                "LM trial: ratio = {:.3e}, delta = {:.3e}, lambda = {:.3e}",
                ratio, delta, lambda
            );

            let step_accepted = ratio >= MIN_RATIO;
            if step_accepted {
                params = new_params;
                residuals = new_residuals;
                residuals_norm = new_residuals_norm;
                objective_value = 0.5 * residuals_norm * residuals_norm;
            }

            if residuals_norm <= MACHINE_EPS.sqrt() {
                return LMResult {
                    parameters: params,
                    residuals,
                    objective_value,
                    termination: TerminationReason::ResidualsZero,
                    num_evaluations,
                    num_jacobian_evaluations,
                };
            }

            let ftol_satisfied = predicted_reduction.abs() <= config.ftol
                && actual_reduction.abs() <= config.ftol
                && ratio * 0.5 <= 1.0;
            let xnorm = scaled_norm(&params, &diag);
            let xtol_satisfied = delta <= config.xtol * xnorm;

            if ftol_satisfied || xtol_satisfied {
                return LMResult {
                    parameters: params,
                    residuals,
                    objective_value,
                    termination: TerminationReason::Converged {
                        ftol: ftol_satisfied,
                        xtol: xtol_satisfied,
                    },
                    num_evaluations,
                    num_jacobian_evaluations,
                };
            }

            if num_evaluations >= config.max_evaluations {
                return LMResult {
                    parameters: params,
                    residuals,
                    objective_value,
                    termination: TerminationReason::MaxEvaluationsReached,
                    num_evaluations,
                    num_jacobian_evaluations,
                };
            }

            // Machine-precision stalls.
            if predicted_reduction.abs() <= MACHINE_EPS
                && actual_reduction.abs() <= MACHINE_EPS
                && ratio * 0.5 <= 1.0
            {
                return LMResult {
                    parameters: params,
                    residuals,
                    objective_value,
                    termination: TerminationReason::NoImprovementPossible("ftol".to_string()),
                    num_evaluations,
                    num_jacobian_evaluations,
                };
            }
            if delta <= MACHINE_EPS * xnorm {
                return LMResult {
                    parameters: params,
                    residuals,
                    objective_value,
                    termination: TerminationReason::NoImprovementPossible("xtol".to_string()),
                    num_evaluations,
                    num_jacobian_evaluations,
                };
            }
            if gnorm <= MACHINE_EPS {
                return LMResult {
                    parameters: params,
                    residuals,
                    objective_value,
                    termination: TerminationReason::NoImprovementPossible("gtol".to_string()),
                    num_evaluations,
                    num_jacobian_evaluations,
                };
            }

            if step_accepted {
                // recompute the Jacobian at the new point
                break;
            }
        }
    }
}

/// Scaled gradient norm for the orthogonality test.
fn scaled_gradient_norm(
    jacobian: &DMatrix<f64>,
    residuals: &DVector<f64>,
    residuals_norm: f64,
) -> f64 {
    let mut max_scaled_grad: f64 = 0.0;
    for j in 0..jacobian.ncols() {
        let col = jacobian.column(j);
        let col_norm = col.norm();
        if col_norm > 0.0 && residuals_norm > 0.0 {
            let scaled = col.dot(residuals).abs() / (col_norm * residuals_norm);
            max_scaled_grad = max_scaled_grad.max(scaled);
        }
    }
    max_scaled_grad
}

/// ||D*x|| where D is diagonal.
fn scaled_norm(x: &DVector<f64>, diag: &DVector<f64>) -> f64 {
    x.iter()
        .zip(diag.iter())
        .map(|(&xi, &di)| (di * xi).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Predicted and actual reduction of the quadratic model, and their ratio.
fn reduction_ratio(
    jacobian: &DMatrix<f64>,
    step: &DVector<f64>,
    residuals_norm: f64,
    new_residuals_norm: f64,
    lambda: f64,
    pnorm: f64,
) -> (f64, f64, f64) {
    let temp1 = ((jacobian * step).norm() / residuals_norm).powi(2);
    let temp2 = ((lambda.sqrt() * pnorm) / residuals_norm).powi(2);
    let predicted_reduction = temp1 + temp2 / 2.0;

    let actual_reduction = if new_residuals_norm * 0.1 < residuals_norm {
        1.0 - (new_residuals_norm / residuals_norm).powi(2)
    } else {
        -1.0
    };

    let ratio = if predicted_reduction == 0.0 {
        0.0
    } else {
        actual_reduction / predicted_reduction
    };

    (predicted_reduction, actual_reduction, ratio)
}

/// Update trust region radius and lambda from the reduction ratio: poor
/// agreement shrinks the region and raises lambda toward steepest descent,
/// good agreement expands it and lowers lambda toward Gauss-Newton.
fn update_trust_region_radius(
    delta: f64,
    lambda: f64,
    ratio: f64,
    pnorm: f64,
    predicted_reduction: f64,
    actual_reduction: f64,
    residuals_norm: f64,
    new_residuals_norm: f64,
) -> (f64, f64) {
    const P1: f64 = 0.1;
    const P25: f64 = 0.25;
    const P75: f64 = 0.75;
    const P5: f64 = 0.5;

    let mut new_delta = delta;
    let mut new_lambda = lambda;

    if ratio <= P25 {
        let mut temp = if actual_reduction >= 0.0 {
            P5
        } else {
            let dir_derivative = -(predicted_reduction * 2.0 - actual_reduction);
            if dir_derivative != 0.0 {
                P5 * dir_derivative / (dir_derivative + P5 * actual_reduction)
            } else {
                P5
            }
        };
        if new_residuals_norm * P1 >= residuals_norm || temp < P1 {
            temp = P1;
        }
        new_delta = temp * delta.min(pnorm * 10.0);
        new_lambda = lambda / temp;
    } else if lambda == 0.0 || ratio >= P75 {
        new_delta = pnorm / P5;
        new_lambda = lambda * P5;
    }

    new_lambda = new_lambda.max(0.0);
    new_delta = new_delta.max(f64::EPSILON * 100.0);

    (new_delta, new_lambda)
}

fn error_result(
    params: DVector<f64>,
    termination: TerminationReason,
    num_evaluations: usize,
    num_jacobian_evaluations: usize,
) -> LMResult {
    LMResult {
        parameters: params,
        residuals: DVector::zeros(0),
        objective_value: f64::INFINITY,
        termination,
        num_evaluations,
        num_jacobian_evaluations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use nalgebra::{dmatrix, dvector};

    struct QuadraticProblem {
        a: DMatrix<f64>,
        b: DVector<f64>,
    }

    impl LeastSquaresProblem for QuadraticProblem {
        fn residuals(&self, params: &DVector<f64>) -> Option<DVector<f64>> {
            Some(&self.a * params - &self.b)
        }
        fn jacobian(&self, _params: &DVector<f64>) -> Option<DMatrix<f64>> {
            Some(self.a.clone())
        }
        fn num_parameters(&self) -> usize {
            self.a.ncols()
        }
        fn num_residuals(&self) -> usize {
            self.a.nrows()
        }
    }

    struct RosenbrockProblem;

    impl LeastSquaresProblem for RosenbrockProblem {
        fn residuals(&self, params: &DVector<f64>) -> Option<DVector<f64>> {
            let x = params[0];
            let y = params[1];
            Some(dvector![10.0 * (y - x * x), 1.0 - x])
        }
        fn jacobian(&self, params: &DVector<f64>) -> Option<DMatrix<f64>> {
            let x = params[0];
            Some(dmatrix![
                -20.0 * x, 10.0;
                -1.0,       0.0;
            ])
        }
        fn num_parameters(&self) -> usize {
            2
        }
        fn num_residuals(&self) -> usize {
            2
        }
    }

    struct FailingProblem;

    impl LeastSquaresProblem for FailingProblem {
        fn residuals(&self, _params: &DVector<f64>) -> Option<DVector<f64>> {
            None
        }
        fn jacobian(&self, _params: &DVector<f64>) -> Option<DMatrix<f64>> {
            None
        }
        fn num_parameters(&self) -> usize {
            2
        }
        fn num_residuals(&self) -> usize {
            2
        }
    }

    #[test]
    fn solves_identity_least_squares() {
        let problem = QuadraticProblem {
            a: DMatrix::identity(2, 2),
            b: dvector![1.0, 2.0],
        };
        let result = levenberg_marquardt(&problem, dvector![0.0, 0.0], LMConfig::default());

        assert!(result.termination.was_successful());
        assert_relative_eq!(result.parameters[0], 1.0, epsilon = 1e-8);
        assert_relative_eq!(result.parameters[1], 2.0, epsilon = 1e-8);
    }

    #[test]
    fn solves_overdetermined_system() {
        let problem = QuadraticProblem {
            a: dmatrix![
                1.0, 0.0;
                0.0, 1.0;
                1.0, 1.0;
            ],
            b: dvector![1.0, 2.0, 3.1],
        };
        let result = levenberg_marquardt(&problem, dvector![0.0, 0.0], LMConfig::default());

        assert!(result.termination.was_successful());
        assert_relative_eq!(result.parameters[0], 1.05, epsilon = 1e-8);
        assert_relative_eq!(result.parameters[1], 2.05, epsilon = 1e-8);
    }

    #[test]
    fn solves_rosenbrock() {
        let mut config = LMConfig::default();
        config.max_evaluations = 2000;
        config.ftol = 1e-12;
        config.xtol = 1e-12;

        let result = levenberg_marquardt(&RosenbrockProblem, dvector![-1.2, 1.0], config);

        assert!(result.termination.was_successful());
        assert_relative_eq!(result.parameters[0], 1.0, epsilon = 1e-6);
        assert_relative_eq!(result.parameters[1], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn zero_residuals_at_start() {
        let problem = QuadraticProblem {
            a: DMatrix::identity(2, 2),
            b: dvector![1.0, 2.0],
        };
        let result = levenberg_marquardt(&problem, dvector![1.0, 2.0], LMConfig::default());
        assert_eq!(result.termination, TerminationReason::ResidualsZero);
        assert_abs_diff_eq!(result.objective_value, 0.0);
    }

    #[test]
    fn failed_evaluation_is_reported() {
        let result = levenberg_marquardt(&FailingProblem, dvector![1.0, 2.0], LMConfig::default());
        assert_eq!(
            result.termination,
            TerminationReason::FunctionEvaluationFailed
        );
        assert!(!result.termination.was_successful());
    }

    #[test]
    fn evaluation_budget_is_enforced() {
        let mut config = LMConfig::default();
        config.max_evaluations = 5;
        let result = levenberg_marquardt(&RosenbrockProblem, dvector![-1.2, 1.0], config);
        assert!(result.num_evaluations <= 6);
        assert!(!matches!(
            result.termination,
            TerminationReason::NumericalError(_)
        ));
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let problem = QuadraticProblem {
            a: DMatrix::identity(2, 2),
            b: dvector![1.0, 2.0],
        };
        let result = levenberg_marquardt(&problem, dvector![1.0, 2.0, 3.0], LMConfig::default());
        assert!(matches!(
            result.termination,
            TerminationReason::NumericalError(_)
        ));
    }
}
