use crate::algorithm::check_comparisons;
use crate::correlation_models::*;
use crate::errors::{GpError, Result};
use crate::likelihoods::Likelihood;
use crate::optimization::{optimize_hyperparams, HyperParams};
use crate::utils::{
    add_jitter, cholesky_solve_vec, gauss_hermite, into_f64, kernel_matrix, robust_cholesky,
};
use crate::vgp_parameters::{PairwiseVgpParams, PairwiseVgpValidParams};
use crate::PGP_MAX_INNER_ITERS;

use linfa::prelude::{DatasetBase, Fit, Float, ParamGuard};
use linfa_linalg::triangular::*;
use log::{debug, warn};
use ndarray::{s, Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2, Ix3, Zip};
use std::fmt;

/// Variational updates stop when natural parameters change less than this value
const CVI_TOL: f64 = 1e-6;

/// Covariance of the preference function `g(a, b) = f(a) - f(b)` between
/// pairs (w1, l1) and (w2, l2), ie `k(w1, w2) + k(l1, l2) - k(w1, l2) - k(l1, w2)`.
fn pair_kernel<F: Float, Corr: CorrelationModel<F>>(
    corr: &Corr,
    (w1, l1): (&Array2<F>, &Array2<F>),
    (w2, l2): (&Array2<F>, &Array2<F>),
    theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    variance: F,
) -> Array2<F> {
    kernel_matrix(corr, w1, w2, theta, variance) + kernel_matrix(corr, l1, l2, theta, variance)
        - kernel_matrix(corr, w1, l2, theta, variance)
        - kernel_matrix(corr, l1, w2, theta, variance)
}

/// Gaussian variational posterior of the preference function at training pairs
///
/// Natural parameters of the likelihood sites are `lambda` (precisions) and `gamma`,
/// the posterior being `q(g) = N(m, S)` with `S = (K^-1 + diag(lambda))^-1` and `m = S gamma`.
#[derive(Clone, Debug)]
struct VariationalApprox<F: Float> {
    /// Posterior mean `m` at training pairs
    mean: Array1<F>,
    /// Posterior marginal variances at training pairs
    var: Array1<F>,
    /// `sqrt(lambda)`
    lambda_sqrt: Array1<F>,
    /// Cholesky factor of `B = I + diag(sqrt(lambda)) K diag(sqrt(lambda))`
    b_chol: Array2<F>,
    /// `K^-1 m`
    alpha: Array1<F>,
}

impl<F: Float> VariationalApprox<F> {
    fn new(k: &Array2<F>, lambda: &Array1<F>, gamma: &Array1<F>) -> Result<Self> {
        let n = k.nrows();
        let lambda_sqrt = lambda.mapv(|v| v.sqrt());
        let ls_col = lambda_sqrt.view().insert_axis(Axis(1));
        let ls_k = k * &ls_col;
        let b = &ls_k * &lambda_sqrt.view().insert_axis(Axis(0)) + Array2::<F>::eye(n);
        let b_chol = robust_cholesky(&b)?;

        // alpha = gamma - Ls B^-1 Ls K gamma
        let k_gamma = k.dot(gamma);
        let tmp = cholesky_solve_vec(&b_chol, &(&lambda_sqrt * &k_gamma))?;
        let alpha = gamma - &(&lambda_sqrt * &tmp);
        let mean = k.dot(&alpha);

        // S = K - V^T V with V = L^-1 Ls K
        let v = b_chol.solve_triangular(&ls_k, UPLO::Lower)?;
        let mut var = k.diag().to_owned() - v.mapv(|e| e * e).sum_axis(Axis(0));
        var.mapv_inplace(|e| e.max(F::zero()));
        Ok(VariationalApprox {
            mean,
            var,
            lambda_sqrt,
            b_chol,
            alpha,
        })
    }

    /// KL divergence between the variational posterior and the prior
    fn kl_divergence(&self) -> Result<f64> {
        let n = self.b_chol.nrows();
        let linv = self
            .b_chol
            .solve_triangular(&Array2::<F>::eye(n), UPLO::Lower)?;
        let trace = into_f64(linv.mapv(|v| v * v).sum());
        let mahalanobis = into_f64(self.mean.dot(&self.alpha));
        let logdet = 2. * into_f64(self.b_chol.diag().mapv(|v| v.ln()).sum());
        Ok(0.5 * (trace + mahalanobis - n as f64 + logdet))
    }
}

/// Gauss-Hermite expectations `(E[l(g)], E[l'(g)], E[-l''(g)])` under `g ~ N(mean, var)`
fn expected_derivatives(
    likelihood: Likelihood,
    mean: f64,
    var: f64,
    (nodes, weights): (&Array1<f64>, &Array1<f64>),
) -> (f64, f64, f64) {
    let sd = var.max(0.).sqrt();
    Zip::from(nodes)
        .and(weights)
        .fold((0., 0., 0.), |(el, eg, enh), x, w| {
            let (l, g, nh) = likelihood.derivatives(mean + sd * x);
            (el + w * l, eg + w * g, enh + w * nh)
        })
}

/// Fit the variational posterior with conjugate-computation variational inference
/// (damped natural gradient steps) and return it with its evidence lower bound.
fn cvi_posterior<F: Float>(
    k: &Array2<F>,
    likelihood: Likelihood,
    quadrature: (&Array1<f64>, &Array1<f64>),
    damping: F,
) -> Result<(VariationalApprox<F>, f64)> {
    let n = k.nrows();
    let nh0 = likelihood.derivatives(0.).2;
    let mut lambda = Array1::from_elem(n, F::cast(nh0));
    let mut gamma = Array1::<F>::zeros(n);
    let mut approx = VariationalApprox::new(k, &lambda, &gamma)?;
    let mut converged = false;
    for iter in 0..PGP_MAX_INNER_ITERS {
        let mut lambda_target = Array1::<F>::zeros(n);
        let mut gamma_target = Array1::<F>::zeros(n);
        Zip::from(&mut lambda_target)
            .and(&mut gamma_target)
            .and(&approx.mean)
            .and(&approx.var)
            .for_each(|lt, gt, m, v| {
                let (_, eg, enh) =
                    expected_derivatives(likelihood, into_f64(*m), into_f64(*v), quadrature);
                *lt = F::cast(enh);
                *gt = F::cast(eg + enh * into_f64(*m));
            });
        let new_lambda = lambda.mapv(|v| (F::one() - damping) * v) + lambda_target * damping;
        let new_gamma = gamma.mapv(|v| (F::one() - damping) * v) + gamma_target * damping;
        let change = Zip::from(&lambda)
            .and(&new_lambda)
            .and(&gamma)
            .and(&new_gamma)
            .fold(0., |acc: f64, l0, l1, g0, g1| {
                acc.max(into_f64((*l1 - *l0).abs().max((*g1 - *g0).abs())))
            });
        lambda = new_lambda;
        gamma = new_gamma;
        approx = VariationalApprox::new(k, &lambda, &gamma)?;
        if change < CVI_TOL {
            debug!("Variational posterior converged in {} iterations", iter + 1);
            converged = true;
            break;
        }
    }
    if !converged {
        warn!(
            "Variational posterior: updates not converged after {} iterations",
            PGP_MAX_INNER_ITERS
        );
    }

    let expected_loglik = Zip::from(&approx.mean)
        .and(&approx.var)
        .fold(0., |acc, m, v| {
            acc + expected_derivatives(likelihood, into_f64(*m), into_f64(*v), quadrature).0
        });
    let elbo = expected_loglik - approx.kl_divergence()?;
    if !elbo.is_finite() {
        return Err(GpError::LikelihoodComputationError(
            "Variational posterior: non finite ELBO".to_string(),
        ));
    }
    Ok((approx, elbo))
}

/// Pairwise variational Gaussian Process model
///
/// The preference function `g(a, b) = f(a) - f(b)` of a latent utility `f ~ GP(0, k)`
/// is modelled over (winner, loser) training pairs with the skew-symmetric kernel
/// `k(a, c) + k(b, d) - k(a, d) - k(b, c)`. Each training pair is observed as a win
/// with probability `P(g)` given by the [`Likelihood`] (probit by default).
///
/// The posterior of `g` at training pairs is a Gaussian fitted by maximizing the
/// evidence lower bound (ELBO), which is also the objective of kernel hyperparameters.
/// Utility predictions use the exact cross covariance `cov(f(x), g(a, b)) = k(x, a) - k(x, b)`.
#[derive(Clone, Debug)]
pub struct PairwiseVariationalGp<F: Float, Corr: CorrelationModel<F>> {
    /// Inverse length scales
    theta: Array1<F>,
    /// Kernel variance
    variance: F,
    /// Evidence lower bound
    elbo: F,
    /// Variational posterior mean of `g` at training pairs
    pair_mean: Array1<F>,
    /// `K^-1 pair_mean`
    alpha: Array1<F>,
    /// Square root of likelihood sites precisions
    lambda_sqrt: Array1<F>,
    /// Cholesky factor of `I + diag(lambda_sqrt) K diag(lambda_sqrt)`
    b_chol: Array2<F>,
    /// Training pairs points (winners, losers)
    training_pairs: (Array2<F>, Array2<F>),
    /// Parameters used to fit this model
    params: PairwiseVgpValidParams<F, Corr>,
}

impl<F: Float, Corr: CorrelationModel<F>> fmt::Display for PairwiseVariationalGp<F, Corr> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "PairwiseVariationalGP(corr={}, theta={}, variance={}, likelihood={}, elbo={})",
            self.params.corr, self.theta, self.variance, self.params.likelihood, self.elbo
        )
    }
}

impl<F: Float, Corr: CorrelationModel<F>> PairwiseVariationalGp<F, Corr> {
    /// Pairwise variational GP parameters constructor
    pub fn params<NewCorr: CorrelationModel<F>>(corr: NewCorr) -> PairwiseVgpParams<F, NewCorr> {
        PairwiseVgpParams::new(corr)
    }

    /// Covariance between f(x) and g at training pairs, (n, npairs)
    fn cross_covariance(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
        let (w, l) = &self.training_pairs;
        let corr = &self.params.corr;
        kernel_matrix(corr, x, w, &self.theta, self.variance)
            - kernel_matrix(corr, x, l, &self.theta, self.variance)
    }

    /// `L^-1 diag(lambda_sqrt) K_ux`, (npairs, n)
    fn whitened_cross_covariance(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array2<F>, Array2<F>)> {
        let kxu = self.cross_covariance(x);
        let ls_kux = &kxu.t() * &self.lambda_sqrt.view().insert_axis(Axis(1));
        let w = self.b_chol.solve_triangular(&ls_kux, UPLO::Lower)?;
        Ok((kxu, w))
    }

    /// Predict utility posterior mean at n points given as (n, nx) matrix
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        self.check_dims(x.ncols())?;
        Ok(self.cross_covariance(x).dot(&self.alpha))
    }

    /// Predict utility posterior variance at n points given as (n, nx) matrix
    pub fn predict_var(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        self.check_dims(x.ncols())?;
        let (_, w) = self.whitened_cross_covariance(x)?;
        let mut var =
            Array1::from_elem(x.nrows(), self.variance) - w.mapv(|v| v * v).sum_axis(Axis(0));
        var.mapv_inplace(|v| v.max(F::zero()));
        Ok(var)
    }

    /// Predict utility posterior joint covariance at n points given as (n, nx) matrix
    pub fn predict_cov(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        self.check_dims(x.ncols())?;
        let (_, w) = self.whitened_cross_covariance(x)?;
        let kxx = kernel_matrix(&self.params.corr, x, x, &self.theta, self.variance);
        Ok(kxx - w.t().dot(&w))
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
        self.training_pairs.0.ncols()
    }

    /// Optimized inverse length scales
    pub fn theta(&self) -> &Array1<F> {
        &self.theta
    }

    /// Optimized kernel variance
    pub fn variance(&self) -> F {
        self.variance
    }

    /// Evidence lower bound
    pub fn elbo(&self) -> F {
        self.elbo
    }

    /// Posterior mean of the preference function at training pairs
    pub fn pair_mean(&self) -> &Array1<F> {
        &self.pair_mean
    }

    /// Training pairs points (winners, losers)
    pub fn training_pairs(&self) -> (&Array2<F>, &Array2<F>) {
        (&self.training_pairs.0, &self.training_pairs.1)
    }
}

/// (winners, losers) points from query batches and index of the preferred item per query
pub(crate) fn pairs_from_queries<F: Float>(
    queries: &ArrayBase<impl Data<Elem = F>, Ix3>,
    responses: &ArrayBase<impl Data<Elem = usize>, Ix1>,
) -> Result<(Array2<F>, Array2<F>)> {
    let (n_queries, batch_size, dim) = queries.dim();
    if responses.len() != n_queries {
        return Err(GpError::InvalidValueError(format!(
            "Expected one response per query ({n_queries}), got {}",
            responses.len()
        )));
    }
    if batch_size < 2 {
        return Err(GpError::InvalidValueError(
            "queries should contain at least 2 items".to_string(),
        ));
    }
    let n_pairs = n_queries * (batch_size - 1);
    let mut winners = Array2::zeros((n_pairs, dim));
    let mut losers = Array2::zeros((n_pairs, dim));
    let mut k = 0;
    for (i, &r) in responses.iter().enumerate() {
        if r >= batch_size {
            return Err(GpError::InvalidValueError(format!(
                "response {r} of query {i} out of batch range ({batch_size})"
            )));
        }
        for j in (0..batch_size).filter(|j| *j != r) {
            winners.row_mut(k).assign(&queries.slice(s![i, r, ..]));
            losers.row_mut(k).assign(&queries.slice(s![i, j, ..]));
            k += 1;
        }
    }
    Ok((winners, losers))
}

impl<F: Float, Corr: CorrelationModel<F>> PairwiseVgpValidParams<F, Corr> {
    /// Fit the model given query batches `(n_queries, batch_size, nx)` and
    /// the index of the preferred item in each query.
    pub fn fit_queries(
        &self,
        queries: &ArrayBase<impl Data<Elem = F>, Ix3>,
        responses: &ArrayBase<impl Data<Elem = usize>, Ix1>,
    ) -> Result<PairwiseVariationalGp<F, Corr>> {
        let (winners, losers) = pairs_from_queries(queries, responses)?;
        self.fit_pairs(winners, losers)
    }

    /// Fit the model given (winners, losers) training pairs points
    pub fn fit_pairs(
        &self,
        winners: Array2<F>,
        losers: Array2<F>,
    ) -> Result<PairwiseVariationalGp<F, Corr>> {
        if winners.dim() != losers.dim() || winners.nrows() == 0 {
            return Err(GpError::InvalidValueError(
                "winners and losers should be non empty with same shape".to_string(),
            ));
        }
        let nx = winners.ncols();
        let hparams = HyperParams::new(self.theta_tuning(), self.variance_tuning(), nx)?;
        let (nodes, weights) = gauss_hermite(self.n_quadrature())?;
        let quadrature = (&nodes, &weights);
        let pairs = (&winners, &losers);

        let prior = |params: &Array1<F>| -> Array2<F> {
            let theta = params.slice(s![..nx]);
            let k = pair_kernel(&self.corr, pairs, pairs, &theta, params[nx]);
            add_jitter(k, self.jitter)
        };
        let objfn = |params: &Array1<F>| -> f64 {
            match cvi_posterior(&prior(params), self.likelihood, quadrature, self.damping) {
                Ok((_, elbo)) => -elbo,
                Err(_) => f64::INFINITY,
            }
        };
        let opt_params = optimize_hyperparams(objfn, &hparams, self.n_start(), self.max_eval());

        let (approx, elbo) =
            cvi_posterior(&prior(&opt_params), self.likelihood, quadrature, self.damping)?;
        let theta = opt_params.slice(s![..nx]).to_owned();
        let variance = opt_params[nx];
        debug!("Pairwise variational GP fitted: theta={theta}, variance={variance}, elbo={elbo}");
        Ok(PairwiseVariationalGp {
            theta,
            variance,
            elbo: F::cast(elbo),
            pair_mean: approx.mean,
            alpha: approx.alpha,
            lambda_sqrt: approx.lambda_sqrt,
            b_chol: approx.b_chol,
            training_pairs: (winners, losers),
            params: self.clone(),
        })
    }
}

impl<F: Float, Corr: CorrelationModel<F>> PairwiseVgpParams<F, Corr> {
    /// Check parameters and fit the model given query batches and responses,
    /// see [`PairwiseVgpValidParams::fit_queries`]
    pub fn fit_queries(
        &self,
        queries: &ArrayBase<impl Data<Elem = F>, Ix3>,
        responses: &ArrayBase<impl Data<Elem = usize>, Ix1>,
    ) -> Result<PairwiseVariationalGp<F, Corr>> {
        self.check_ref()?.fit_queries(queries, responses)
    }
}

impl<F: Float, Corr: CorrelationModel<F>, D: Data<Elem = F>, C: Data<Elem = usize>>
    Fit<ArrayBase<D, Ix2>, ArrayBase<C, Ix2>, GpError> for PairwiseVgpValidParams<F, Corr>
{
    type Object = PairwiseVariationalGp<F, Corr>;

    /// Fit given datapoints and (winner, loser) comparisons of datapoints indices
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<C, Ix2>>,
    ) -> Result<Self::Object> {
        let x = dataset.records();
        let comparisons = dataset.targets();
        check_comparisons(x.nrows(), comparisons)?;
        let winners = x.select(Axis(0), &comparisons.column(0).to_vec());
        let losers = x.select(Axis(0), &comparisons.column(1).to_vec());
        self.fit_pairs(winners, losers)
    }
}
