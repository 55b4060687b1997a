use thiserror::Error;

/// A result type for preference GP algorithms
pub type Result<T> = std::result::Result<T, GpError>;

/// An error when using [`PairwiseGp`](crate::PairwiseGp) or [`PairwiseVariationalGp`](crate::PairwiseVariationalGp) algorithms
#[derive(Error, Debug)]
pub enum GpError {
    /// When likelihood or evidence computation fails
    #[error("LikelihoodComputation computation error: {0}")]
    LikelihoodComputationError(String),
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
    /// When error due to a bad value
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
}
