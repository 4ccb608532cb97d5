use std::fmt;

/// Fatal failures of the fitting pipeline.
///
/// Numeric domain errors inside a single sag/slope evaluation (negative
/// discriminant, division by zero) are deliberately not represented here:
/// evaluators recover locally by returning 0 so that dense sampling is never
/// interrupted. Only fit-level problems abort the run.
#[derive(Debug)]
pub enum FitError {
    /// Non-finite or malformed values in the input point cloud.
    InputData(String),
    /// Unknown family selector, missing required setting, unsupported algorithm.
    Configuration(String),
    /// The minimizer failed or did not converge; no report artifacts exist.
    Optimization(String),
    Io(std::io::Error),
}

impl fmt::Display for FitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitError::InputData(msg) => write!(f, "input data error: {}", msg),
            FitError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            FitError::Optimization(msg) => write!(f, "optimization failed: {}", msg),
            FitError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for FitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FitError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FitError {
    fn from(err: std::io::Error) -> Self {
        FitError::Io(err)
    }
}
