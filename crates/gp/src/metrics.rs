//! A module for metrics to evaluate preference models against comparison data

use crate::correlation_models::CorrelationModel;
use crate::errors::{GpError, Result};
use crate::{PairwiseGp, PairwiseVariationalGp, PreferenceSurrogate};
use linfa::Float;
use ndarray::{Array2, Axis, Zip};

/// A trait for comparison agreement scores of a preference model
pub trait ComparisonScore<F: Float>: PreferenceSurrogate<F> {
    /// Return the training comparisons as (winners, losers) points,
    /// ith comparison stating `winners[i]` is preferred over `losers[i]`
    fn comparison_points(&self) -> (Array2<F>, Array2<F>);

    /// Share of given comparisons whose winner gets a strictly greater posterior mean
    fn accuracy(&self, winners: &Array2<F>, losers: &Array2<F>) -> Result<F> {
        if winners.dim() != losers.dim() || winners.nrows() == 0 {
            return Err(GpError::InvalidValueError(
                "winners and losers should be non empty with same shape".to_string(),
            ));
        }
        let mu_w = self.predict(&winners.view())?;
        let mu_l = self.predict(&losers.view())?;
        let agreed = Zip::from(&mu_w)
            .and(&mu_l)
            .fold(0usize, |acc, w, l| if w > l { acc + 1 } else { acc });
        Ok(F::cast(agreed) / F::cast(winners.nrows()))
    }

    /// Share of training comparisons correctly ordered by the posterior mean
    fn comparison_accuracy(&self) -> Result<F> {
        let (winners, losers) = self.comparison_points();
        self.accuracy(&winners, &losers)
    }
}

impl<F: Float, Corr: CorrelationModel<F>> ComparisonScore<F> for PairwiseGp<F, Corr> {
    fn comparison_points(&self) -> (Array2<F>, Array2<F>) {
        let (x, comparisons) = self.training_data();
        let winners = comparisons.column(0).to_vec();
        let losers = comparisons.column(1).to_vec();
        (x.select(Axis(0), &winners), x.select(Axis(0), &losers))
    }
}

impl<F: Float, Corr: CorrelationModel<F>> ComparisonScore<F> for PairwiseVariationalGp<F, Corr> {
    fn comparison_points(&self) -> (Array2<F>, Array2<F>) {
        let (winners, losers) = self.training_pairs();
        (winners.to_owned(), losers.to_owned())
    }
}
