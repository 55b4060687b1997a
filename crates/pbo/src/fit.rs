use crate::comparisons::{check_queries, training_data_for_pairwise_gp};
use crate::errors::Result;
use crate::types::ModelSpec;
use crate::DEFAULT_JITTER;
use linfa::prelude::{Dataset, Fit, Float};
use log::info;
use ndarray::{Array1, Array2, ArrayBase, ArrayView2, Data, Ix1, Ix3};
use prefbo_gp::correlation_models::SquaredExponentialCorr;
use prefbo_gp::metrics::ComparisonScore;
use prefbo_gp::{PairwiseGp, PairwiseVariationalGp, PreferenceSurrogate};
use std::fmt;

/// A preference model fitted on comparisons data
///
/// Both model families use a squared exponential kernel whose inverse length scales
/// and variance are estimated at fitting time.
#[derive(Clone, Debug)]
pub enum FittedModel<F: Float> {
    /// Laplace approximated pairwise GP
    PairwiseGp(PairwiseGp<F, SquaredExponentialCorr>),
    /// Pairwise variational GP
    PairwiseVariationalGp(PairwiseVariationalGp<F, SquaredExponentialCorr>),
}

impl<F: Float> fmt::Display for FittedModel<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FittedModel::PairwiseGp(gp) => write!(f, "{gp}"),
            FittedModel::PairwiseVariationalGp(vgp) => write!(f, "{vgp}"),
        }
    }
}

impl<F: Float> PreferenceSurrogate<F> for FittedModel<F> {
    fn dims(&self) -> usize {
        match self {
            FittedModel::PairwiseGp(gp) => gp.dims(),
            FittedModel::PairwiseVariationalGp(vgp) => vgp.dims(),
        }
    }

    fn predict(&self, x: &ArrayView2<F>) -> prefbo_gp::Result<Array1<F>> {
        match self {
            FittedModel::PairwiseGp(gp) => gp.predict(x),
            FittedModel::PairwiseVariationalGp(vgp) => vgp.predict(x),
        }
    }

    fn predict_var(&self, x: &ArrayView2<F>) -> prefbo_gp::Result<Array1<F>> {
        match self {
            FittedModel::PairwiseGp(gp) => gp.predict_var(x),
            FittedModel::PairwiseVariationalGp(vgp) => vgp.predict_var(x),
        }
    }

    fn predict_cov(&self, x: &ArrayView2<F>) -> prefbo_gp::Result<Array2<F>> {
        match self {
            FittedModel::PairwiseGp(gp) => gp.predict_cov(x),
            FittedModel::PairwiseVariationalGp(vgp) => vgp.predict_cov(x),
        }
    }
}

impl<F: Float> ComparisonScore<F> for FittedModel<F> {
    fn comparison_points(&self) -> (Array2<F>, Array2<F>) {
        match self {
            FittedModel::PairwiseGp(gp) => gp.comparison_points(),
            FittedModel::PairwiseVariationalGp(vgp) => vgp.comparison_points(),
        }
    }
}

/// Fit a preference model on queries (num_queries, batch_size, input_dim) and
/// responses (num_queries,), the index of the preferred item of each query.
///
/// * [`ModelSpec::PairwiseGp`]: queries are encoded as (datapoints, comparisons)
///   (see [`training_data_for_pairwise_gp`]) and a Laplace pairwise GP is fitted with
///   jitter [`DEFAULT_JITTER`] by maximizing its approximate marginal likelihood,
/// * [`ModelSpec::PairwiseVariationalGp`]: a pairwise variational GP is fitted
///   directly on queries and responses.
pub fn fit_model<F: Float>(
    queries: &ArrayBase<impl Data<Elem = F>, Ix3>,
    responses: &ArrayBase<impl Data<Elem = usize>, Ix1>,
    spec: &ModelSpec,
) -> Result<FittedModel<F>> {
    let model = match spec {
        ModelSpec::PairwiseGp { likelihood } => {
            let (datapoints, comparisons) = training_data_for_pairwise_gp(queries, responses)?;
            let gp = PairwiseGp::<F, SquaredExponentialCorr>::params(SquaredExponentialCorr())
                .likelihood(*likelihood)
                .jitter(F::cast(DEFAULT_JITTER))
                .fit(&Dataset::new(datapoints, comparisons))?;
            FittedModel::PairwiseGp(gp)
        }
        ModelSpec::PairwiseVariationalGp => {
            check_queries(queries, responses)?;
            let vgp = PairwiseVariationalGp::<F, SquaredExponentialCorr>::params(
                SquaredExponentialCorr(),
            )
            .fit_queries(queries, responses)?;
            FittedModel::PairwiseVariationalGp(vgp)
        }
    };
    info!("Fitted {spec} model: {model}");
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PrefError;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use prefbo_gp::Likelihood;

    fn identity_queries() -> (ndarray::Array3<f64>, Array1<usize>) {
        let queries = array![
            [[0.05], [0.9]],
            [[0.3], [0.75]],
            [[0.5], [0.1]],
            [[0.35], [0.2]],
            [[0.8], [0.6]]
        ];
        (queries, array![1, 1, 0, 0, 0])
    }

    macro_rules! test_fit_model {
        ($name:ident, $spec:expr) => {
            paste::paste! {
                #[test]
                fn [<test_fit_model_ $name>]() {
                    let (queries, responses) = identity_queries();
                    let model = fit_model(&queries, &responses, &$spec).expect("model fitted");
                    assert_eq!(model.dims(), 1);
                    assert_abs_diff_eq!(model.comparison_accuracy().unwrap(), 1.);

                    let x = array![[0.1], [0.5], [0.9]];
                    let mu = model.predict(&x.view()).unwrap();
                    assert!(mu[2] > mu[0]);
                    let var = model.predict_var(&x.view()).unwrap();
                    let cov = model.predict_cov(&x.view()).unwrap();
                    assert_abs_diff_eq!(cov.diag(), var, epsilon = 1e-6);
                }
            }
        };
    }

    test_fit_model!(pgp_probit, ModelSpec::PairwiseGp { likelihood: Likelihood::Probit });
    test_fit_model!(pgp_logit, ModelSpec::PairwiseGp { likelihood: Likelihood::Logit });
    test_fit_model!(pvgp, ModelSpec::PairwiseVariationalGp);

    #[test]
    fn test_fit_model_f32() {
        let (queries, responses) = identity_queries();
        let queries = queries.mapv(|v| v as f32);
        let model = fit_model(&queries, &responses, &ModelSpec::default()).expect("model fitted");
        let mu = model.predict(&array![[0.1f32], [0.9]].view()).unwrap();
        assert!(mu[1] > mu[0]);
    }

    #[test]
    fn test_fit_model_bad_responses() {
        let (queries, _) = identity_queries();
        for spec in [ModelSpec::default(), ModelSpec::PairwiseVariationalGp] {
            assert!(matches!(
                fit_model(&queries, &array![0, 1], &spec),
                Err(PrefError::ShapeMismatch(_))
            ));
        }
    }
}
