//! Acquisition functions scoring a batch of candidate points
//! with regards to a preference model of the utility
mod posterior_mean;
mod qeubo;

pub use posterior_mean::PosteriorMean;
pub use qeubo::{QExpectedUtilityOfBestOption, QEUBO_MC_SAMPLES};

use crate::errors::Result;
use linfa::Float;
use ndarray::{Array2, ArrayView2};

/// A trait for acquisition functions which maximum location determines
/// the next most promising query to be submitted to the decision maker
pub trait AcquisitionFunction: Sync {
    /// Name of the acquisition function
    fn name(&self) -> &'static str;

    /// Acquisition value of the batch of q points given as a (q, nx) matrix
    fn value(&self, x: &ArrayView2<f64>) -> Result<f64>;
}

impl std::fmt::Debug for dyn AcquisitionFunction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Candidate points in the model precision
pub(crate) fn to_model_precision<F: Float>(x: &ArrayView2<f64>) -> Array2<F> {
    x.mapv(F::cast)
}
