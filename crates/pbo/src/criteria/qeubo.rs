use crate::criteria::{to_model_precision, AcquisitionFunction};
use crate::errors::{PrefError, Result};
use linfa::Float;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use prefbo_gp::{norm_cdf, norm_pdf, robust_cholesky, PreferenceSurrogate};
use rand_xoshiro::Xoshiro256Plus;

/// Default number of Monte Carlo samples used for batches of more than 2 points
pub const QEUBO_MC_SAMPLES: usize = 512;

/// Expected utility of the best option (qEUBO)
///
/// Expected value of the utility of the item the decision maker would prefer
/// in the batch, ie `E[max_i f(x_i)]` under the utility posterior. The expectation
/// is computed in closed form for a pair of points and estimated with Monte Carlo
/// otherwise. Base samples are drawn from a fixed seed so that the estimate is a
/// deterministic function of the batch.
pub struct QExpectedUtilityOfBestOption<'a, F: Float> {
    model: &'a dyn PreferenceSurrogate<F>,
    n_samples: usize,
    seed: u64,
}

impl<'a, F: Float> QExpectedUtilityOfBestOption<'a, F> {
    /// Constructor given the utility model
    pub fn new(model: &'a dyn PreferenceSurrogate<F>) -> Self {
        QExpectedUtilityOfBestOption {
            model,
            n_samples: QEUBO_MC_SAMPLES,
            seed: 0,
        }
    }

    /// Set the number of Monte Carlo samples used for batches of more than 2 points
    pub fn n_samples(mut self, n_samples: usize) -> Self {
        self.n_samples = n_samples.max(1);
        self
    }

    /// Set the seed of Monte Carlo base samples
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn posterior(&self, x: &ArrayView2<f64>) -> Result<(Array1<f64>, Array2<f64>)> {
        let x = to_model_precision::<F>(x);
        let mu = self.model.predict(&x.view())?;
        let cov = self.model.predict_cov(&x.view())?;
        let to_f64 = |v: &F| v.to_f64().unwrap_or(f64::NAN);
        Ok((mu.map(to_f64), cov.map(to_f64)))
    }

    fn monte_carlo(&self, mu: &Array1<f64>, cov: &Array2<f64>) -> Result<f64> {
        let q = mu.len();
        let chol = robust_cholesky(cov)
            .map_err(|err| PrefError::Acquisition(format!("posterior covariance: {err}")))?;
        let mut rng = Xoshiro256Plus::seed_from_u64(self.seed);
        let z = Array2::<f64>::random_using((self.n_samples, q), StandardNormal, &mut rng);
        let samples = z.dot(&chol.t()) + mu;
        let best = samples.map_axis(Axis(1), |row| {
            row.fold(f64::NEG_INFINITY, |acc, v| acc.max(*v))
        });
        Ok(best.mean().unwrap_or(f64::NAN))
    }
}

/// `E[max(f1, f2)]` for a gaussian pair of given means, variances and covariance
fn expected_max_of_pair(mu: (f64, f64), var: (f64, f64), cov: f64) -> f64 {
    let delta = mu.0 - mu.1;
    let sigma = (var.0 + var.1 - 2. * cov).max(0.).sqrt();
    if sigma < f64::EPSILON {
        return mu.0.max(mu.1);
    }
    let z = delta / sigma;
    mu.0 * norm_cdf(z) + mu.1 * norm_cdf(-z) + sigma * norm_pdf(z)
}

impl<'a, F: Float> AcquisitionFunction for QExpectedUtilityOfBestOption<'a, F> {
    fn name(&self) -> &'static str {
        "qEUBO"
    }

    fn value(&self, x: &ArrayView2<f64>) -> Result<f64> {
        if x.nrows() == 0 {
            return Err(PrefError::Acquisition(
                "empty batch of candidates".to_string(),
            ));
        }
        let (mu, cov) = self.posterior(x)?;
        match mu.len() {
            1 => Ok(mu[0]),
            2 => Ok(expected_max_of_pair(
                (mu[0], mu[1]),
                (cov[[0, 0]], cov[[1, 1]]),
                cov[[0, 1]],
            )),
            _ => self.monte_carlo(&mu, &cov),
        }
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
    fn test_expected_max_of_pair() {
        // independent standard normals: E[max] = 1 / sqrt(pi)
        assert_abs_diff_eq!(
            expected_max_of_pair((0., 0.), (1., 1.), 0.),
            1. / std::f64::consts::PI.sqrt(),
            epsilon = 1e-12
        );
        // fully correlated: max of means
        assert_abs_diff_eq!(expected_max_of_pair((1., -2.), (1., 1.), 1.), 1.);
        // expected max is not less than each mean
        let v = expected_max_of_pair((0.3, 0.1), (0.5, 2.), 0.2);
        assert!(v > 0.3);
    }

    #[test]
    fn test_qeubo_duplicated_points() {
        let queries = array![[[0.05f32], [0.9]], [[0.3], [0.75]], [[0.5], [0.1]]];
        let model = fit_model(&queries, &array![1, 1, 0], &ModelSpec::default()).unwrap();
        let acq = QExpectedUtilityOfBestOption::new(&model);
        // singular posterior covariance of a batch with repeated points
        let x = array![[0.4], [0.4], [0.4 + 1e-9]];
        let value = acq.value(&x.view()).unwrap();
        let x0 = array![[0.4f32]];
        let mu = model.predict(&x0.view()).unwrap()[0] as f64;
        let sigma = (model.predict_var(&x0.view()).unwrap()[0] as f64).sqrt();
        // max of equal utilities: Monte Carlo estimate of the mean
        let tol = 4. * sigma / (QEUBO_MC_SAMPLES as f64).sqrt() + 1e-3;
        assert_abs_diff_eq!(value, mu, epsilon = tol);
    }

    #[test]
    fn test_qeubo_monte_carlo_agrees_with_closed_form() {
        let queries = array![
            [[0.05], [0.9]],
            [[0.3], [0.75]],
            [[0.5], [0.1]],
            [[0.35], [0.2]]
        ];
        let model = fit_model(&queries, &array![1, 1, 0, 0], &ModelSpec::default()).unwrap();
        let acq = QExpectedUtilityOfBestOption::new(&model).n_samples(20000);
        let x = array![[0.2], [0.7]];
        let exact = acq.value(&x.view()).unwrap();
        let (mu, cov) = acq.posterior(&x.view()).unwrap();
        let estimate = acq.monte_carlo(&mu, &cov).unwrap();
        assert_abs_diff_eq!(exact, estimate, epsilon = 5e-2);

        // deterministic for q > 2
        let x3 = array![[0.2], [0.7], [0.95]];
        assert_eq!(acq.value(&x3.view()).unwrap(), acq.value(&x3.view()).unwrap());
        // adding an option cannot decrease the expected best utility (up to MC error)
        assert!(acq.value(&x3.view()).unwrap() > exact - 5e-2);
    }
}
