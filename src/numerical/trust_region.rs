use log::debug;
use nalgebra::{Cholesky, DMatrix, DVector};

/// Solution of one trust region subproblem.
#[derive(Debug, Clone)]
pub struct TrustRegionStep {
    /// Step vector p to be subtracted from the current parameters.
    pub step: DVector<f64>,
    /// Levenberg-Marquardt parameter lambda.
    pub lambda: f64,
    /// Norm of the scaled step ||D*p||.
    pub scaled_step_norm: f64,
    /// Whether the solution lies on the trust region boundary.
    pub on_boundary: bool,
}

/// Solve `min ||J*p - r||²` subject to `||D*p|| <= delta`.
///
/// Equivalent to solving `(J^T*J + lambda*D²)*p = J^T*r` with `lambda >= 0`
/// chosen so the scaled step fits the trust region. The Gauss-Newton step
/// (`lambda = 0`) is tried first; otherwise Newton's method finds the lambda
/// with `||D*p(lambda)|| = delta`.
pub fn solve_trust_region_subproblem(
    jacobian: &DMatrix<f64>,
    jacobian_t: &DMatrix<f64>,
    residuals: &DVector<f64>,
    diag: &DVector<f64>,
    delta: f64,
    lambda_prev: f64,
) -> Result<TrustRegionStep, &'static str> {
    let n = jacobian.ncols();
    let m = jacobian.nrows();

    if jacobian_t.nrows() != n || jacobian_t.ncols() != m {
        return Err("Jacobian transpose dimensions mismatch");
    }
    if residuals.len() != m {
        return Err("Residuals dimension mismatch");
    }
    if diag.len() != n {
        return Err("Diagonal vector dimension mismatch");
    }
    if delta <= 0.0 {
        return Err("Trust region radius must be positive");
    }

    let jt_r = jacobian_t * residuals;
    let jtj = jacobian_t * jacobian;
    let diag_squared: DVector<f64> = diag.map(|x| x * x);

    // Gauss-Newton step first: J^T*J*p = J^T*r
    if let Some(step) = solve_regularized(&jtj, &jt_r, &diag_squared, 0.0) {
        let scaled_norm = scaled_norm(&step, diag);
        if scaled_norm <= delta {
            debug!(
                "Gauss-Newton step within trust region: |D*p| = {:.4e}, delta = {:.4e}",
                scaled_norm, delta
            );
            return Ok(TrustRegionStep {
                step,
                lambda: 0.0,
                scaled_step_norm: scaled_norm,
                on_boundary: false,
            });
        }
    }

    let lambda = find_lambda(&jtj, &jt_r, diag, &diag_squared, delta, lambda_prev)?;
    let step = solve_regularized(&jtj, &jt_r, &diag_squared, lambda)
        .ok_or("Failed to solve linear system with computed lambda")?;
    let scaled_norm = scaled_norm(&step, diag);

    Ok(TrustRegionStep {
        step,
        lambda,
        scaled_step_norm: scaled_norm,
        on_boundary: true,
    })
}

/// Solve `(J^T*J + lambda*D²)*p = J^T*r`, Cholesky first, LU as fallback.
fn solve_regularized(
    jtj: &DMatrix<f64>,
    jt_r: &DVector<f64>,
    diag_squared: &DVector<f64>,
    lambda: f64,
) -> Option<DVector<f64>> {
    let n = jtj.nrows();
    let mut regularized = jtj.clone();
    for i in 0..n {
        regularized[(i, i)] += lambda * diag_squared[i];
    }

    if let Some(chol) = Cholesky::new(regularized.clone()) {
        return Some(chol.solve(jt_r));
    }
    regularized.lu().solve(jt_r)
}

/// Newton's method on `phi(lambda) = ||D*p(lambda)|| - delta`.
fn find_lambda(
    jtj: &DMatrix<f64>,
    jt_r: &DVector<f64>,
    diag: &DVector<f64>,
    diag_squared: &DVector<f64>,
    delta: f64,
    lambda_init: f64,
) -> Result<f64, &'static str> {
    const MAX_ITER: usize = 50;
    const TOL: f64 = 1e-12;

    let mut lambda = lambda_init.max(0.0);
    if lambda == 0.0 {
        lambda = estimate_initial_lambda(jtj, jt_r, diag_squared, delta);
    }

    for iter in 0..MAX_ITER {
        let step = solve_regularized(jtj, jt_r, diag_squared, lambda)
            .ok_or("Failed to solve linear system in lambda search")?;
        let norm = scaled_norm(&step, diag);
        let residual = norm - delta;
        if residual.abs() <= TOL * delta {
            return Ok(lambda);
        }

        let derivative = lambda_derivative(jtj, &step, diag_squared, lambda, norm)?;
        if derivative.abs() < f64::EPSILON {
            break;
        }
        debug!(
            "lambda search {}: lambda = {:.4e}, |D*p| - delta = {:.4e}",
            iter, lambda, residual
        );
        lambda = (lambda - residual / derivative).max(0.0);
    }

    Ok(lambda)
}

fn estimate_initial_lambda(
    jtj: &DMatrix<f64>,
    jt_r: &DVector<f64>,
    diag_squared: &DVector<f64>,
    delta: f64,
) -> f64 {
    let max_diag = (0..jtj.nrows()).map(|i| jtj[(i, i)]).fold(0.0, f64::max);
    let grad_norm = jt_r.norm();
    let diag_norm = diag_squared.iter().map(|&x| x.sqrt()).fold(0.0, f64::max);

    if diag_norm > 0.0 && delta > 0.0 {
        (grad_norm / (delta * diag_norm)).max(max_diag * 1e-6)
    } else {
        max_diag * 1e-3
    }
}

/// d||D*p(lambda)||/dlambda = -p^T*D²*v / ||D*p||
/// where `(J^T*J + lambda*D²)*v = D²*p`.
fn lambda_derivative(
    jtj: &DMatrix<f64>,
    step: &DVector<f64>,
    diag_squared: &DVector<f64>,
    lambda: f64,
    scaled_step_norm: f64,
) -> Result<f64, &'static str> {
    if scaled_step_norm < f64::EPSILON {
        return Err("Scaled norm too small for derivative computation");
    }

    let n = jtj.nrows();
    let rhs = DVector::from_iterator(n, (0..n).map(|i| diag_squared[i] * step[i]));
    let v = solve_regularized(jtj, &rhs, diag_squared, lambda)
        .ok_or("Failed to solve for lambda derivative")?;

    let numerator: f64 = (0..n).map(|i| step[i] * diag_squared[i] * v[i]).sum();
    Ok(-numerator / scaled_step_norm)
}

/// ||D*p|| with D given as a vector.
fn scaled_norm(step: &DVector<f64>, diag: &DVector<f64>) -> f64 {
    step.iter()
        .zip(diag.iter())
        .map(|(&p, &d)| (d * p).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector};

    #[test]
    fn boundary_solution_when_gauss_newton_too_long() {
        let jacobian = dmatrix![
            1.0, 0.0;
            0.0, 1.0;
        ];
        let jacobian_t = jacobian.transpose();
        let residuals = dvector![1.0, 1.0];
        let diag = dvector![1.0, 1.0];
        let delta = 0.5;

        let result =
            solve_trust_region_subproblem(&jacobian, &jacobian_t, &residuals, &diag, delta, 0.0)
                .unwrap();

        // unconstrained solution has norm sqrt(2) > 0.5
        assert!(result.on_boundary);
        assert!(result.lambda > 0.0);
        assert_relative_eq!(result.scaled_step_norm, delta, epsilon = 1e-8);
    }

    #[test]
    fn gauss_newton_step_within_region() {
        let jacobian = dmatrix![
            1.0, 0.0;
            0.0, 1.0;
        ];
        let jacobian_t = jacobian.transpose();
        let residuals = dvector![0.1, 0.1];
        let diag = dvector![1.0, 1.0];
        let delta = 1.0;

        let result =
            solve_trust_region_subproblem(&jacobian, &jacobian_t, &residuals, &diag, delta, 0.0)
                .unwrap();

        assert!(!result.on_boundary);
        assert_relative_eq!(result.lambda, 0.0);
        // identity Jacobian: p solves p = r exactly
        assert_relative_eq!(result.step[0], 0.1, epsilon = 1e-12);
        assert_relative_eq!(result.step[1], 0.1, epsilon = 1e-12);
    }

    #[test]
    fn rejects_bad_dimensions() {
        let jacobian = dmatrix![1.0, 0.0; 0.0, 1.0];
        let jacobian_t = jacobian.transpose();
        let residuals = dvector![1.0];
        let diag = dvector![1.0, 1.0];
        assert!(
            solve_trust_region_subproblem(&jacobian, &jacobian_t, &residuals, &diag, 1.0, 0.0)
                .is_err()
        );
    }

    #[test]
    fn rejects_non_positive_radius() {
        let jacobian = dmatrix![1.0, 0.0; 0.0, 1.0];
        let jacobian_t = jacobian.transpose();
        let residuals = dvector![1.0, 1.0];
        let diag = dvector![1.0, 1.0];
        assert!(
            solve_trust_region_subproblem(&jacobian, &jacobian_t, &residuals, &diag, 0.0, 0.0)
                .is_err()
        );
    }
}
