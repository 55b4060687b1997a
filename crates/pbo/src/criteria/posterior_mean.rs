use crate::criteria::{to_model_precision, AcquisitionFunction};
use crate::errors::Result;
use linfa::Float;
use ndarray::ArrayView2;
use prefbo_gp::PreferenceSurrogate;

/// Average of the utility posterior mean over the batch points (pure exploitation)
pub struct PosteriorMean<'a, F: Float> {
    model: &'a dyn PreferenceSurrogate<F>,
}

impl<'a, F: Float> PosteriorMean<'a, F> {
    /// Constructor given the utility model
    pub fn new(model: &'a dyn PreferenceSurrogate<F>) -> Self {
        PosteriorMean { model }
    }
}

impl<'a, F: Float> AcquisitionFunction for PosteriorMean<'a, F> {
    fn name(&self) -> &'static str {
        "PosteriorMean"
    }

    fn value(&self, x: &ArrayView2<f64>) -> Result<f64> {
        let mu = self.model.predict(&to_model_precision(x).view())?;
        Ok(mu.mapv(|v| v.to_f64().unwrap_or(f64::NAN)).mean().unwrap_or(f64::NAN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::fit_model;
    use crate::types::ModelSpec;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_posterior_mean_favours_larger_utility() {
        let queries = array![
            [[0.05], [0.9]],
            [[0.3], [0.75]],
            [[0.5], [0.1]],
            [[0.35], [0.2]],
            [[0.8], [0.6]]
        ];
        let model = fit_model(&queries, &array![1, 1, 0, 0, 0], &ModelSpec::default())
            .expect("model fitted");
        let acq = PosteriorMean::new(&model);
        assert_eq!(acq.name(), "PosteriorMean");

        let high = acq.value(&array![[0.9]].view()).unwrap();
        let low = acq.value(&array![[0.1]].view()).unwrap();
        assert!(high > low);

        let batch = array![[0.2], [0.7]];
        let mu = model.predict(&batch.view()).unwrap();
        assert_abs_diff_eq!(
            acq.value(&batch.view()).unwrap(),
            0.5 * (mu[0] + mu[1]),
            epsilon = 1e-12
        );

        assert!(acq.value(&array![[0.2, 0.7]].view()).is_err());
    }
}
