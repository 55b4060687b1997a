use crate::correlation_models::CorrelationModel;
use crate::errors::Result;
use crate::{PairwiseGp, PairwiseVariationalGp};
use linfa::Float;
use ndarray::{Array1, Array2, ArrayView2};
use std::fmt;

/// A trait for a preference model of a latent utility function
///
/// Predictions are given at n points given as a (n, nx) matrix.
pub trait PreferenceSurrogate<F: Float>: fmt::Display + Sync + Send {
    /// Returns input dimension
    fn dims(&self) -> usize;
    /// Predict utility posterior mean values as a vector (n,)
    fn predict(&self, x: &ArrayView2<F>) -> Result<Array1<F>>;
    /// Predict utility posterior variance values as a vector (n,)
    fn predict_var(&self, x: &ArrayView2<F>) -> Result<Array1<F>>;
    /// Predict utility posterior joint covariance as a (n, n) matrix
    fn predict_cov(&self, x: &ArrayView2<F>) -> Result<Array2<F>>;
}

impl<F: Float, Corr: CorrelationModel<F>> PreferenceSurrogate<F> for PairwiseGp<F, Corr> {
    fn dims(&self) -> usize {
        self.dims()
    }
    fn predict(&self, x: &ArrayView2<F>) -> Result<Array1<F>> {
        self.predict(x)
    }
    fn predict_var(&self, x: &ArrayView2<F>) -> Result<Array1<F>> {
        self.predict_var(x)
    }
    fn predict_cov(&self, x: &ArrayView2<F>) -> Result<Array2<F>> {
        self.predict_cov(x)
    }
}

impl<F: Float, Corr: CorrelationModel<F>> PreferenceSurrogate<F>
    for PairwiseVariationalGp<F, Corr>
{
    fn dims(&self) -> usize {
        self.dims()
    }
    fn predict(&self, x: &ArrayView2<F>) -> Result<Array1<F>> {
        self.predict(x)
    }
    fn predict_var(&self, x: &ArrayView2<F>) -> Result<Array1<F>> {
        self.predict_var(x)
    }
    fn predict_cov(&self, x: &ArrayView2<F>) -> Result<Array2<F>> {
        self.predict_cov(x)
    }
}
