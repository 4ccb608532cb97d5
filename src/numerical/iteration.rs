use num_traits::Float;

/// Stopping discipline shared by every implicit-surface solve.
///
/// The same update function can be run under two regimes: interactive
/// sampling wants `ToTolerance` (tight tolerance, large cap), while the
/// vectorized fitting path runs `FixedCount` uniformly over a whole point
/// cloud for speed. The two regimes are not bit-identical but must agree to
/// within fit tolerance for well-conditioned inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConvergencePolicy<F: Float> {
    ToTolerance { tolerance: F, max_iterations: usize },
    FixedCount(usize),
}

impl<F: Float> ConvergencePolicy<F> {
    fn cap(&self) -> usize {
        match *self {
            ConvergencePolicy::ToTolerance { max_iterations, .. } => max_iterations,
            ConvergencePolicy::FixedCount(count) => count,
        }
    }

    fn tolerance(&self) -> Option<F> {
        match *self {
            ConvergencePolicy::ToTolerance { tolerance, .. } => Some(tolerance),
            ConvergencePolicy::FixedCount(_) => None,
        }
    }
}

/// Picard iteration `z <- f(z)`.
///
/// On cap exhaustion the last iterate is returned, best effort: callers that
/// need guaranteed precision must inspect the residual themselves. A
/// non-finite iterate is replaced by zero and iteration continues, so any
/// finite in-domain input yields a finite value.
pub fn fixed_point<F, U>(seed: F, policy: ConvergencePolicy<F>, update: U) -> F
where
    F: Float,
    U: Fn(F) -> F,
{
    let mut z = seed;
    for _ in 0..policy.cap() {
        let mut z_new = update(z);
        if !z_new.is_finite() {
            z_new = F::zero();
        }
        if let Some(tolerance) = policy.tolerance() {
            if (z_new - z).abs() < tolerance {
                return z_new;
            }
        }
        z = z_new;
    }
    z
}

/// Newton-Raphson iteration `z <- z - F(z)/F'(z)`.
///
/// `eval` returns the residual and its analytic derivative at once so shared
/// subexpressions are computed a single time. A zero derivative stops the
/// iteration and returns the pre-step iterate; the step is never formed by
/// dividing by zero. A non-finite trial iterate likewise stops at the
/// pre-step value, so the output is finite for any finite input.
pub fn newton_raphson<F, E>(seed: F, policy: ConvergencePolicy<F>, eval: E) -> F
where
    F: Float,
    E: Fn(F) -> (F, F),
{
    let mut z = seed;
    for _ in 0..policy.cap() {
        let (residual, derivative) = eval(z);
        if derivative == F::zero() {
            return z;
        }
        let step = residual / derivative;
        let z_new = z - step;
        if !z_new.is_finite() {
            return z;
        }
        if let Some(tolerance) = policy.tolerance() {
            if step.abs() < tolerance {
                return z_new;
            }
        }
        z = z_new;
    }
    z
}

/// Default policies used by the surface profile library.
pub mod policies {
    use super::ConvergencePolicy;

    /// High-precision single-point regime for Newton families.
    pub const NEWTON_DISPLAY: ConvergencePolicy<f64> = ConvergencePolicy::ToTolerance {
        tolerance: 1e-12,
        max_iterations: 1000,
    };

    /// High-precision single-point regime for fixed-point families.
    pub const PICARD_DISPLAY: ConvergencePolicy<f64> = ConvergencePolicy::ToTolerance {
        tolerance: 1e-15,
        max_iterations: 1_000_000,
    };

    /// Default iteration count of the vectorized fitting regime. Whether 10
    /// is enough for extreme parameter ranges is an open question, so the
    /// fit settings expose it as a tunable rather than baking it in here.
    pub const DEFAULT_FIT_ITERATIONS: usize = 10;
}
