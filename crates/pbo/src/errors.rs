use thiserror::Error;

/// A result type for preference-based optimization errors
pub type Result<T> = std::result::Result<T, PrefError>;

/// An error for preference-based optimization
#[derive(Error, Debug)]
pub enum PrefError {
    /// When an argument value is invalid
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// When arrays do not have the expected shapes
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),
    /// When an ndarray reshaping fails
    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
    /// When a preference model error occurs
    #[error("GP error: {0}")]
    Gp(#[from] prefbo_gp::GpError),
    /// When an acquisition function evaluation fails
    #[error("Acquisition error: {0}")]
    Acquisition(String),
}
