use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SchismError>;

/// Errors raised while assembling immersed-boundary stencils.
///
/// Every variant is fatal: constructors fail before returning a value, so no
/// partially built object is ever observable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchismError {
    /// Nonzero right-hand side, mismatched equation sizes, or a left-hand side
    /// that is not a linear differential expression.
    #[error("Unsupported equation shape: {0}")]
    UnsupportedEquation(String),

    /// A derivative of something other than a bare selected field.
    #[error("Unsupported derivative structure: {0}")]
    UnsupportedDerivative(String),

    /// Inputs that disagree about the grid they live on.
    #[error("Configuration mismatch: {0}")]
    ConfigurationMismatch(String),

    /// A derivative targets a field that has no basis.
    #[error("No basis supplied for field `{0}`")]
    MissingBasis(String),

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Parse error: {0}")]
    Parse(String),

    /// A factorization failed or the boundary conditions leave nothing to fit.
    #[error("Linear algebra failure: {0}")]
    LinearAlgebra(String),
}

impl SchismError {
    pub(crate) fn mismatch(message: impl Into<String>) -> Self {
        SchismError::ConfigurationMismatch(message.into())
    }

    pub(crate) fn equation(message: impl Into<String>) -> Self {
        SchismError::UnsupportedEquation(message.into())
    }

    pub(crate) fn derivative(message: impl Into<String>) -> Self {
        SchismError::UnsupportedDerivative(message.into())
    }
}
