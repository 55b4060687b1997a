use crate::correlation_models::CorrelationModel;
use crate::errors::{GpError, Result};
use crate::likelihoods::Likelihood;
use crate::parameters::{check_tunings, ParamTuning, ThetaTuning};
use crate::{DEFAULT_JITTER, PGP_OPTIM_N_START, PGP_SLSQP_MAX_EVAL, PGP_SLSQP_MIN_EVAL};
use linfa::{Float, ParamGuard};
use ndarray::Array1;

/// Default number of Gauss-Hermite nodes used for likelihood expectations
pub const VGP_QUADRATURE_NODES: usize = 20;
/// Default damping factor of variational updates
pub const VGP_DAMPING: f64 = 0.5;

/// A set of validated pairwise variational GP parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct PairwiseVgpValidParams<F: Float, Corr: CorrelationModel<F>> {
    /// Parameter tuning hint of the autocorrelation model
    pub(crate) theta_tuning: ThetaTuning<F>,
    /// Kernel variance tuning
    pub(crate) variance_tuning: ParamTuning<F>,
    /// Correlation model of the utility
    pub(crate) corr: Corr,
    /// Link between utility differences and comparison outcomes
    pub(crate) likelihood: Likelihood,
    /// Number of Gauss-Hermite nodes
    pub(crate) n_quadrature: usize,
    /// Damping of the variational natural parameters updates in ]0, 1]
    pub(crate) damping: F,
    /// Number of internal ELBO optimization restart
    pub(crate) n_start: usize,
    /// Max number of internal ELBO evaluation during optimization
    pub(crate) max_eval: usize,
    /// Jitter added to the pair covariance diagonal
    pub(crate) jitter: F,
}

impl<F: Float, Corr: CorrelationModel<F>> Default for PairwiseVgpValidParams<F, Corr> {
    fn default() -> PairwiseVgpValidParams<F, Corr> {
        PairwiseVgpValidParams {
            theta_tuning: ThetaTuning::default(),
            variance_tuning: ParamTuning::default(),
            corr: Corr::default(),
            likelihood: Likelihood::Probit,
            n_quadrature: VGP_QUADRATURE_NODES,
            damping: F::cast(VGP_DAMPING),
            n_start: PGP_OPTIM_N_START,
            max_eval: PGP_SLSQP_MAX_EVAL,
            jitter: F::cast(DEFAULT_JITTER),
        }
    }
}

impl<F: Float, Corr: CorrelationModel<F>> PairwiseVgpValidParams<F, Corr> {
    /// Get correlation corr k(x, x')
    pub fn corr(&self) -> &Corr {
        &self.corr
    }

    /// Get theta tuning
    pub fn theta_tuning(&self) -> &ThetaTuning<F> {
        &self.theta_tuning
    }

    /// Get variance tuning
    pub fn variance_tuning(&self) -> &ParamTuning<F> {
        &self.variance_tuning
    }

    /// Get comparison likelihood
    pub fn likelihood(&self) -> Likelihood {
        self.likelihood
    }

    /// Get the number of Gauss-Hermite nodes
    pub fn n_quadrature(&self) -> usize {
        self.n_quadrature
    }

    /// Get the variational updates damping
    pub fn damping(&self) -> F {
        self.damping
    }

    /// Get the number of internal optimization restart
    pub fn n_start(&self) -> usize {
        self.n_start
    }

    /// Get the max number of internal ELBO evaluations during one optimization
    pub fn max_eval(&self) -> usize {
        self.max_eval
    }

    /// Get jitter
    pub fn jitter(&self) -> F {
        self.jitter
    }
}

#[derive(Clone, Debug)]
/// The set of hyperparameters that can be specified for the execution of
/// the [pairwise variational GP algorithm](struct.PairwiseVariationalGp.html).
pub struct PairwiseVgpParams<F: Float, Corr: CorrelationModel<F>>(
    PairwiseVgpValidParams<F, Corr>,
);

impl<F: Float, Corr: CorrelationModel<F>> PairwiseVgpParams<F, Corr> {
    /// A constructor for pairwise variational GP parameters given a correlation model
    pub fn new(corr: Corr) -> PairwiseVgpParams<F, Corr> {
        Self(PairwiseVgpValidParams {
            corr,
            ..Default::default()
        })
    }

    /// Set correlation model.
    pub fn corr(mut self, corr: Corr) -> Self {
        self.0.corr = corr;
        self
    }

    /// Set the comparison likelihood.
    pub fn likelihood(mut self, likelihood: Likelihood) -> Self {
        self.0.likelihood = likelihood;
        self
    }

    /// Set value for theta hyper parameter.
    pub fn theta_init(mut self, theta_init: Array1<F>) -> Self {
        self.0.theta_tuning = match self.0.theta_tuning {
            ThetaTuning::Full { init: _, bounds } => ThetaTuning::Full {
                init: theta_init,
                bounds,
            },
            ThetaTuning::Fixed(_) => ThetaTuning::Fixed(theta_init),
        };
        self
    }

    /// Set theta hyper parameter tuning
    pub fn theta_tuning(mut self, theta_tuning: ThetaTuning<F>) -> Self {
        self.0.theta_tuning = theta_tuning;
        self
    }

    /// Set variance hyper parameter tuning
    pub fn variance_tuning(mut self, variance_tuning: ParamTuning<F>) -> Self {
        self.0.variance_tuning = variance_tuning;
        self
    }

    /// Set the number of Gauss-Hermite nodes used to compute likelihood expectations
    pub fn n_quadrature(mut self, n_quadrature: usize) -> Self {
        self.0.n_quadrature = n_quadrature;
        self
    }

    /// Set the damping of variational updates, in ]0, 1]
    pub fn damping(mut self, damping: F) -> Self {
        self.0.damping = damping;
        self
    }

    /// Set the number of internal hyperparameters optimization restarts
    pub fn n_start(mut self, n_start: usize) -> Self {
        self.0.n_start = n_start;
        self
    }

    /// Set the max number of internal ELBO evaluations during one optimization
    pub fn max_eval(mut self, max_eval: usize) -> Self {
        self.0.max_eval = PGP_SLSQP_MIN_EVAL.max(max_eval);
        self
    }

    /// Set jitter
    pub fn jitter(mut self, jitter: F) -> Self {
        self.0.jitter = jitter;
        self
    }
}

impl<F: Float, Corr: CorrelationModel<F>> From<PairwiseVgpValidParams<F, Corr>>
    for PairwiseVgpParams<F, Corr>
{
    fn from(valid: PairwiseVgpValidParams<F, Corr>) -> Self {
        PairwiseVgpParams(valid)
    }
}

impl<F: Float, Corr: CorrelationModel<F>> ParamGuard for PairwiseVgpParams<F, Corr> {
    type Checked = PairwiseVgpValidParams<F, Corr>;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        check_tunings(&self.0.theta_tuning, &self.0.variance_tuning)?;
        if self.0.n_quadrature < 2 {
            return Err(GpError::InvalidValueError(
                "at least 2 quadrature nodes are required".to_string(),
            ));
        }
        if self.0.damping <= F::zero() || self.0.damping > F::one() {
            return Err(GpError::InvalidValueError(
                "damping should be in ]0, 1]".to_string(),
            ));
        }
        if self.0.jitter < F::zero() {
            return Err(GpError::InvalidValueError(
                "jitter should be non negative".to_string(),
            ));
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}
