use crate::correlation_models::*;
use crate::errors::{GpError, Result};
use crate::likelihoods::Likelihood;
use crate::optimization::{optimize_hyperparams, HyperParams};
use crate::parameters::{PairwiseGpParams, PairwiseGpValidParams};
use crate::utils::{
    add_jitter, cholesky_inverse, cholesky_solve, into_f64, kernel_matrix, robust_cholesky,
};
use crate::PGP_MAX_INNER_ITERS;

use linfa::prelude::{DatasetBase, Fit, Float};
use linfa_linalg::triangular::*;
use log::{debug, warn};
use ndarray::{s, Array1, Array2, ArrayBase, Axis, Data, Ix2, Zip};
use std::fmt;

/// Newton iterations stop when the largest utility update is below this value
const NEWTON_TOL: f64 = 1e-8;
/// Max number of step halvings of one damped Newton iteration
const MAX_HALVINGS: usize = 10;

/// Check comparisons are (winner, loser) rows of indices within `n` datapoints
pub(crate) fn check_comparisons(
    n: usize,
    comparisons: &ArrayBase<impl Data<Elem = usize>, Ix2>,
) -> Result<()> {
    if n == 0 || comparisons.nrows() == 0 {
        return Err(GpError::InvalidValueError(
            "at least one datapoint and one comparison are required".to_string(),
        ));
    }
    if comparisons.ncols() != 2 {
        return Err(GpError::InvalidValueError(format!(
            "comparisons should be (winner, loser) pairs, got {} columns",
            comparisons.ncols()
        )));
    }
    for (k, pair) in comparisons.rows().into_iter().enumerate() {
        if pair[0] >= n || pair[1] >= n {
            return Err(GpError::InvalidValueError(format!(
                "comparison {k} refers to datapoint out of range (nb datapoints = {n})"
            )));
        }
        if pair[0] == pair[1] {
            return Err(GpError::InvalidValueError(format!(
                "comparison {k} compares datapoint {} to itself",
                pair[0]
            )));
        }
    }
    Ok(())
}

/// Laplace approximation of the utility posterior at given hyperparameters
#[derive(Clone, Debug)]
pub(crate) struct LaplaceApprox<F: Float> {
    /// Posterior mode of the utility at training datapoints
    pub utility: Array1<F>,
    /// `K^-1 utility`
    pub alpha: Array1<F>,
    /// Cholesky factor of the prior covariance
    pub k_chol: Array2<F>,
    /// Cholesky factor of `K^-1 + W` where W is the negative hessian of the log likelihood
    pub b_chol: Array2<F>,
    /// Laplace approximation of the log marginal likelihood
    pub log_evidence: F,
}

/// Sum of comparison log likelihoods with gradient and negative hessian
/// with respect to the utility at datapoints.
fn comparisons_derivatives<F: Float>(
    utility: &Array1<F>,
    comparisons: &ArrayBase<impl Data<Elem = usize>, Ix2>,
    likelihood: Likelihood,
) -> (f64, Array1<F>, Array2<F>) {
    let n = utility.len();
    let mut logp = 0.;
    let mut grad = Array1::<F>::zeros(n);
    let mut w_mat = Array2::<F>::zeros((n, n));
    for pair in comparisons.rows() {
        let (w, l) = (pair[0], pair[1]);
        let d = into_f64(utility[w] - utility[l]);
        let (lp, g, nh) = likelihood.derivatives(d);
        logp += lp;
        let (g, nh) = (F::cast(g), F::cast(nh));
        grad[w] += g;
        grad[l] -= g;
        w_mat[[w, w]] += nh;
        w_mat[[l, l]] += nh;
        w_mat[[w, l]] -= nh;
        w_mat[[l, w]] -= nh;
    }
    (logp, grad, w_mat)
}

fn log_prior_unnormalized<F: Float>(k_inv: &Array2<F>, utility: &Array1<F>) -> f64 {
    -0.5 * into_f64(utility.dot(&k_inv.dot(utility)))
}

/// Reason for ending damped Newton iterations
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NewtonStop {
    /// Largest utility update below tolerance
    Converged,
    /// No ascent found after max step halvings
    Stalled,
}

fn newton_stop(max_update: f64, halvings: usize) -> Option<NewtonStop> {
    if max_update < NEWTON_TOL {
        Some(NewtonStop::Converged)
    } else if halvings >= MAX_HALVINGS {
        Some(NewtonStop::Stalled)
    } else {
        None
    }
}

/// Find the posterior mode of the utility with damped Newton iterations
/// and compute the corresponding Laplace evidence.
pub(crate) fn laplace_approximation<F: Float>(
    k: &Array2<F>,
    comparisons: &ArrayBase<impl Data<Elem = usize>, Ix2>,
    likelihood: Likelihood,
) -> Result<LaplaceApprox<F>> {
    let n = k.nrows();
    let k_chol = robust_cholesky(k)?;
    let (k_inv, k_half_logdet) = cholesky_inverse(&k_chol)?;

    let psi = |f: &Array1<F>| -> f64 {
        comparisons_derivatives(f, comparisons, likelihood).0 + log_prior_unnormalized(&k_inv, f)
    };

    let mut utility = Array1::<F>::zeros(n);
    let mut psi_current = psi(&utility);
    let mut stop = None;
    for iter in 0..PGP_MAX_INNER_ITERS {
        let (_, grad, w_mat) = comparisons_derivatives(&utility, comparisons, likelihood);
        let b_chol = robust_cholesky(&(&k_inv + &w_mat))?;
        let rhs = (w_mat.dot(&utility) + grad).insert_axis(Axis(1));
        let target = cholesky_solve(&b_chol, &rhs)?.remove_axis(Axis(1));
        let direction = target - &utility;

        let mut step = F::one();
        let mut candidate = &utility + &direction;
        let mut psi_candidate = psi(&candidate);
        let mut halvings = 0;
        while !(psi_candidate >= psi_current) && halvings < MAX_HALVINGS {
            step = step * F::cast(0.5);
            candidate = &utility + &direction.mapv(|v| v * step);
            psi_candidate = psi(&candidate);
            halvings += 1;
        }
        if !psi_candidate.is_finite() {
            return Err(GpError::LikelihoodComputationError(
                "Laplace approximation: non finite log posterior".to_string(),
            ));
        }
        let max_update = direction
            .iter()
            .fold(0., |acc: f64, v| acc.max(into_f64(v.abs() * step)));
        if psi_candidate >= psi_current {
            utility = candidate;
            psi_current = psi_candidate;
        }
        stop = newton_stop(max_update, halvings);
        match stop {
            Some(NewtonStop::Converged) => {
                debug!("Laplace mode found in {} iterations", iter + 1);
                break;
            }
            Some(NewtonStop::Stalled) => {
                warn!(
                    "Laplace approximation: line search stalled at iteration {}, max update {:e}",
                    iter + 1,
                    max_update
                );
                break;
            }
            None => (),
        }
    }
    if stop.is_none() {
        warn!(
            "Laplace approximation: Newton iterations not converged after {} iterations",
            PGP_MAX_INNER_ITERS
        );
    }

    let (_, _, w_mat) = comparisons_derivatives(&utility, comparisons, likelihood);
    let b_chol = robust_cholesky(&(&k_inv + &w_mat))?;
    let b_half_logdet = b_chol.diag().mapv(|v| v.ln()).sum();
    // log Z = psi(f) - 1/2 log|I + K W| = psi(f) - 1/2 (log|K| + log|K^-1 + W|)
    let log_evidence = psi_current - into_f64(k_half_logdet + b_half_logdet);
    let alpha = k_inv.dot(&utility);
    Ok(LaplaceApprox {
        utility,
        alpha,
        k_chol,
        b_chol,
        log_evidence: F::cast(log_evidence),
    })
}

/// Pairwise Gaussian Process model of a latent utility function
///
/// The utility `f` has a zero mean GP prior with covariance `variance * r(x, x')`
/// where `r` is the correlation model. Each training comparison states that the
/// winner datapoint is preferred over the loser one with probability `P(d)`,
/// `d = f(winner) - f(loser)`, `P` being given by the [`Likelihood`].
///
/// The posterior is approximated with a Laplace approximation around its mode, and
/// the hyperparameters `theta` and `variance` maximize the approximated evidence.
///
/// # Example
///
/// ```
/// use prefbo_gp::{correlation_models::*, Likelihood, PairwiseGp};
/// use linfa::prelude::*;
/// use ndarray::array;
///
/// // utility increases with x: each pair is (winner, loser) row indices
/// let x = array![[0.1], [0.4], [0.6], [0.9]];
/// let comparisons = array![[1, 0], [2, 1], [3, 2], [3, 0]];
/// let pgp = PairwiseGp::<f64, SquaredExponentialCorr>::params(SquaredExponentialCorr::default())
///     .likelihood(Likelihood::Probit)
///     .fit(&Dataset::new(x, comparisons))
///     .expect("PairwiseGp fitted");
/// let mu = pgp.predict(&array![[0.], [1.]].view()).expect("prediction");
/// assert!(mu[1] > mu[0]);
/// ```
#[derive(Clone, Debug)]
pub struct PairwiseGp<F: Float, Corr: CorrelationModel<F>> {
    /// Inverse length scales
    theta: Array1<F>,
    /// Kernel variance
    variance: F,
    /// Laplace approximation of the log marginal likelihood
    log_evidence: F,
    /// Posterior mode of the utility at training datapoints
    utility: Array1<F>,
    /// `K^-1 utility`
    alpha: Array1<F>,
    /// Cholesky factor of the prior covariance at training datapoints
    k_chol: Array2<F>,
    /// Cholesky factor of `K^-1 + W`
    b_chol: Array2<F>,
    /// Training data (datapoints, comparisons)
    training_data: (Array2<F>, Array2<usize>),
    /// Parameters used to fit this model
    params: PairwiseGpValidParams<F, Corr>,
}

impl<F: Float, Corr: CorrelationModel<F>> fmt::Display for PairwiseGp<F, Corr> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "PairwiseGP(corr={}, theta={}, variance={}, likelihood={}, log_evidence={})",
            self.params.corr, self.theta, self.variance, self.params.likelihood, self.log_evidence
        )
    }
}

impl<F: Float, Corr: CorrelationModel<F>> PairwiseGp<F, Corr> {
    /// Pairwise GP parameters constructor
    pub fn params<NewCorr: CorrelationModel<F>>(corr: NewCorr) -> PairwiseGpParams<F, NewCorr> {
        PairwiseGpParams::new(corr)
    }

    /// Predict utility posterior mean at n points given as (n, nx) matrix
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        self.check_dims(x.ncols())?;
        Ok(self.cross_covariance(x).dot(&self.alpha))
    }

    /// Predict utility posterior variance at n points given as (n, nx) matrix
    pub fn predict_var(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        self.check_dims(x.ncols())?;
        let (kxt, a, v) = self.conditioning_terms(x)?;
        let reduction = (&kxt.t() * &a).sum_axis(Axis(0));
        let increase = v.mapv(|e| e * e).sum_axis(Axis(0));
        let mut var = Array1::from_elem(x.nrows(), self.variance) - reduction + increase;
        var.mapv_inplace(|e| e.max(F::zero()));
        Ok(var)
    }

    /// Predict utility posterior joint covariance at n points given as (n, nx) matrix
    pub fn predict_cov(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        self.check_dims(x.ncols())?;
        let (kxt, a, v) = self.conditioning_terms(x)?;
        let kxx = kernel_matrix(&self.params.corr, x, x, &self.theta, self.variance);
        Ok(kxx - kxt.dot(&a) + v.t().dot(&v))
    }

    /// Covariance between x points and training datapoints (n, ntrain)
    fn cross_covariance(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        kernel_matrix(
            &self.params.corr,
            x,
            &self.training_data.0,
            &self.theta,
            self.variance,
        )
    }

    /// Returns `(K_xt, A = K^-1 K_tx, V = L_B^-1 A)`
    fn conditioning_terms(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array2<F>, Array2<F>, Array2<F>)> {
        let kxt = self.cross_covariance(x);
        let a = cholesky_solve(&self.k_chol, &kxt.t())?;
        let v = self.b_chol.solve_triangular(&a, UPLO::Lower)?;
        Ok((kxt, a, v))
    }

    fn check_dims(&self, nx: usize) -> Result<()> {
        if nx != self.dims() {
            return Err(GpError::InvalidValueError(format!(
                "Expected {} input components, got {nx}",
                self.dims()
            )));
        }
        Ok(())
    }

    /// Input dimension
    pub fn dims(&self) -> usize {
        self.training_data.0.ncols()
    }

    /// Optimized inverse length scales
    pub fn theta(&self) -> &Array1<F> {
        &self.theta
    }

    /// Optimized kernel variance
    pub fn variance(&self) -> F {
        self.variance
    }

    /// Laplace approximation of the log marginal likelihood
    pub fn log_evidence(&self) -> F {
        self.log_evidence
    }

    /// Posterior mode of the utility at training datapoints
    pub fn utility(&self) -> &Array1<F> {
        &self.utility
    }

    /// Training data (datapoints, comparisons)
    pub fn training_data(&self) -> &(Array2<F>, Array2<usize>) {
        &self.training_data
    }

    /// Parameters used to fit this model
    pub fn params_used(&self) -> &PairwiseGpValidParams<F, Corr> {
        &self.params
    }
}

impl<F: Float, Corr: CorrelationModel<F>, D: Data<Elem = F>, C: Data<Elem = usize>>
    Fit<ArrayBase<D, Ix2>, ArrayBase<C, Ix2>, GpError> for PairwiseGpValidParams<F, Corr>
{
    type Object = PairwiseGp<F, Corr>;

    /// Fit pairwise GP hyperparameters maximizing the Laplace approximated evidence
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<C, Ix2>>,
    ) -> Result<Self::Object> {
        let x = dataset.records().to_owned();
        let comparisons = dataset.targets().to_owned();
        check_comparisons(x.nrows(), &comparisons)?;

        let hparams = HyperParams::new(self.theta_tuning(), self.variance_tuning(), x.ncols())?;
        let nx = x.ncols();
        let corr_unit = kernel_matrix(&self.corr, &x, &x, &Array1::ones(nx), F::one());
        if Zip::from(&corr_unit)
            .and(&Array2::<F>::eye(x.nrows()))
            .fold(false, |acc, v, e| acc || (*e == F::zero() && *v == F::one()))
        {
            warn!("Pairwise GP: some datapoints are duplicated");
        }

        let prior = |params: &Array1<F>| -> Array2<F> {
            let theta = params.slice(s![..nx]);
            let k = kernel_matrix(&self.corr, &x, &x, &theta, params[nx]);
            add_jitter(k, self.jitter)
        };
        let objfn = |params: &Array1<F>| -> f64 {
            match laplace_approximation(&prior(params), &comparisons, self.likelihood) {
                Ok(approx) => -into_f64(approx.log_evidence),
                Err(_) => f64::INFINITY,
            }
        };
        let opt_params = optimize_hyperparams(objfn, &hparams, self.n_start(), self.max_eval());

        let approx = laplace_approximation(&prior(&opt_params), &comparisons, self.likelihood)?;
        let theta = opt_params.slice(s![..nx]).to_owned();
        let variance = opt_params[nx];
        debug!(
            "Pairwise GP fitted: theta={theta}, variance={variance}, log evidence={}",
            approx.log_evidence
        );
        Ok(PairwiseGp {
            theta,
            variance,
            log_evidence: approx.log_evidence,
            utility: approx.utility,
            alpha: approx.alpha,
            k_chol: approx.k_chol,
            b_chol: approx.b_chol,
            training_data: (x, comparisons),
            params: self.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ComparisonScore;
    use crate::parameters::{ParamTuning, ThetaTuning};
    use approx::assert_abs_diff_eq;
    use linfa::prelude::Dataset;
    use ndarray::{array, Array};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use paste::paste;
    use rand_xoshiro::Xoshiro256Plus;

    /// Comparisons of consecutive random points ordered by the given utility
    fn comparisons_of(x: &Array2<f64>, utility: impl Fn(f64) -> f64) -> Array2<usize> {
        let mut pairs = vec![];
        for i in 0..x.nrows() - 1 {
            let (ui, uj) = (utility(x[[i, 0]]), utility(x[[i + 1, 0]]));
            if ui > uj {
                pairs.extend([i, i + 1]);
            } else {
                pairs.extend([i + 1, i]);
            }
        }
        Array2::from_shape_vec((x.nrows() - 1, 2), pairs).unwrap()
    }

    #[test]
    fn test_check_comparisons() {
        assert!(check_comparisons(3, &array![[0, 1], [2, 1]]).is_ok());
        assert!(check_comparisons(3, &array![[0, 3]]).is_err());
        assert!(check_comparisons(3, &array![[1, 1]]).is_err());
        assert!(check_comparisons(3, &array![[0, 1, 2]]).is_err());
        assert!(check_comparisons(3, &Array2::<usize>::zeros((0, 2))).is_err());
    }

    #[test]
    fn test_newton_stop() {
        assert_eq!(newton_stop(1e-10, 0), Some(NewtonStop::Converged));
        assert_eq!(newton_stop(1e-10, MAX_HALVINGS), Some(NewtonStop::Converged));
        // a stalled line search is not a convergence
        assert_eq!(newton_stop(0.5, MAX_HALVINGS), Some(NewtonStop::Stalled));
        assert_eq!(newton_stop(0.5, MAX_HALVINGS - 1), None);
    }

    #[test]
    fn test_laplace_mode_is_stationary() {
        let x = array![[0.], [0.3], [0.7], [1.]];
        let comparisons = array![[1, 0], [2, 1], [3, 2]];
        let k = add_jitter(
            kernel_matrix(&SquaredExponentialCorr(), &x, &x, &array![1.], 1.),
            1e-4,
        );
        for likelihood in [Likelihood::Probit, Likelihood::Logit] {
            let approx = laplace_approximation(&k, &comparisons, likelihood).unwrap();
            // at the mode: grad log p(c|f) = K^-1 f
            let (_, grad, _) = comparisons_derivatives(&approx.utility, &comparisons, likelihood);
            assert_abs_diff_eq!(grad, approx.alpha, epsilon = 1e-6);
            let f = &approx.utility;
            assert!(f[3] > f[2] && f[2] > f[1] && f[1] > f[0]);
            assert!(approx.log_evidence < 0.);
        }
    }

    #[test]
    fn test_identity_objective_probit() {
        let x = array![[0.05], [0.9], [0.3], [0.75], [0.5], [0.1], [0.35], [0.2], [0.8], [0.6]];
        // (winner, loser) pairs from five queries of two items
        let comparisons = array![[1, 0], [3, 2], [4, 5], [6, 7], [8, 9]];
        let pgp = PairwiseGp::<f64, SquaredExponentialCorr>::params(SquaredExponentialCorr())
            .likelihood(Likelihood::Probit)
            .fit(&Dataset::new(x.to_owned(), comparisons.to_owned()))
            .expect("PairwiseGp fitted");
        let mu = pgp.predict(&x).unwrap();
        for pair in comparisons.rows() {
            assert!(mu[pair[0]] > mu[pair[1]]);
        }
        assert_abs_diff_eq!(pgp.comparison_accuracy().unwrap(), 1.);
        assert_abs_diff_eq!(&mu, pgp.utility(), epsilon = 1e-2);
    }

    #[test]
    fn test_predict_cov_consistency() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let x = Array::random_using((12, 2), Uniform::new(0., 1.), &mut rng);
        let mut pairs = vec![];
        for i in 0..6 {
            let (a, b) = (2 * i, 2 * i + 1);
            let (ua, ub) = (x[[a, 0]] + x[[a, 1]], x[[b, 0]] + x[[b, 1]]);
            pairs.extend(if ua > ub { [a, b] } else { [b, a] });
        }
        let comparisons = Array2::from_shape_vec((6, 2), pairs).unwrap();
        let pgp = PairwiseGp::<f64, Matern52Corr>::params(Matern52Corr())
            .n_start(1)
            .fit(&Dataset::new(x, comparisons))
            .expect("PairwiseGp fitted");

        let xtest = Array::random_using((5, 2), Uniform::new(0., 1.), &mut rng);
        let var = pgp.predict_var(&xtest).unwrap();
        let cov = pgp.predict_cov(&xtest).unwrap();
        assert_abs_diff_eq!(cov.diag(), var, epsilon = 1e-8);
        assert_abs_diff_eq!(cov, cov.t(), epsilon = 1e-8);
        assert!(var.iter().all(|v| *v >= 0. && *v <= pgp.variance() + 1e-8));

        assert!(pgp.predict(&array![[0.1, 0.2, 0.3]]).is_err());
    }

    #[test]
    fn test_fixed_hyperparameters() {
        let x = array![[0.], [0.5], [1.]];
        let comparisons = array![[2, 1], [1, 0]];
        let pgp = PairwiseGp::<f64, SquaredExponentialCorr>::params(SquaredExponentialCorr())
            .theta_tuning(ThetaTuning::Fixed(array![2.]))
            .variance_tuning(ParamTuning::Fixed(0.5))
            .fit(&Dataset::new(x, comparisons))
            .expect("PairwiseGp fitted");
        assert_eq!(pgp.theta(), &array![2.]);
        assert_eq!(pgp.variance(), 0.5);
        assert_eq!(pgp.params_used().likelihood(), Likelihood::Logit);
        assert_eq!(pgp.params_used().variance_tuning(), &ParamTuning::Fixed(0.5));
        // far from data the posterior is the prior
        let far = array![[100.]];
        assert_abs_diff_eq!(pgp.predict(&far).unwrap()[0], 0., epsilon = 1e-10);
        assert_abs_diff_eq!(pgp.predict_var(&far).unwrap()[0], 0.5, epsilon = 1e-10);
    }

    #[test]
    fn test_pairwise_gp_f32() {
        let x = array![[0.1f32], [0.4], [0.6], [0.9]];
        let comparisons = array![[1, 0], [2, 1], [3, 2]];
        let pgp = PairwiseGp::<f32, SquaredExponentialCorr>::params(SquaredExponentialCorr())
            .fit(&Dataset::new(x, comparisons))
            .expect("PairwiseGp fitted");
        let mu = pgp.predict(&array![[0.1f32], [0.9]]).unwrap();
        assert!(mu[1] > mu[0]);
    }

    macro_rules! test_pgp {
        ($corr:ident, $lkh:ident) => {
            paste! {
                #[test]
                fn [<test_pgp_ $corr:snake _ $lkh:snake>]() {
                    let mut rng = Xoshiro256Plus::seed_from_u64(0);
                    let x = Array::random_using((15, 1), Uniform::new(0., 1.), &mut rng);
                    let utility = |v: f64| -(v - 0.6) * (v - 0.6);
                    let comparisons = comparisons_of(&x, utility);
                    let pgp = PairwiseGp::<f64, [<$corr Corr>]>::params([<$corr Corr>]::default())
                        .likelihood(Likelihood::$lkh)
                        .fit(&Dataset::new(x, comparisons))
                        .expect("PairwiseGp fitted");
                    assert!(pgp.comparison_accuracy().unwrap() >= 0.8);
                    let mu = pgp.predict(&array![[0.6], [0.0]]).unwrap();
                    assert!(mu[0] > mu[1]);
                    let var = pgp.predict_var(&array![[0.6], [0.0]]).unwrap();
                    assert!(var.iter().all(|v| *v >= 0.));
                }
            }
        };
    }

    test_pgp!(SquaredExponential, Probit);
    test_pgp!(SquaredExponential, Logit);
    test_pgp!(AbsoluteExponential, Probit);
    test_pgp!(Matern32, Logit);
    test_pgp!(Matern52, Probit);
}
