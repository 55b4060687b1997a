use crate::correlation_models::CorrelationModel;
use crate::errors::{GpError, Result};
use crate::likelihoods::Likelihood;
use crate::{DEFAULT_JITTER, PGP_OPTIM_N_START, PGP_SLSQP_MAX_EVAL, PGP_SLSQP_MIN_EVAL};
use linfa::{Float, ParamGuard};
use ndarray::{array, Array1};

/// Tuning of the inverse length scales `theta`, one value per input component
/// (a single value being broadcast to every component)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ThetaTuning<F: Float> {
    /// Values are kept as given
    Fixed(Array1<F>),
    /// Values maximize the model evidence within bounds
    Full {
        /// Starting values of the optimization
        init: Array1<F>,
        /// (lower, upper) search intervals
        bounds: Array1<(F, F)>,
    },
}

impl<F: Float> Default for ThetaTuning<F> {
    fn default() -> Self {
        ThetaTuning::Full {
            init: array![F::cast(Self::DEFAULT_INIT)],
            bounds: array![(F::cast(Self::DEFAULT_BOUNDS.0), F::cast(Self::DEFAULT_BOUNDS.1))],
        }
    }
}

impl<F: Float> ThetaTuning<F> {
    /// Starting theta value used when none is given
    pub const DEFAULT_INIT: f64 = 1.;
    /// Search interval of theta used when none is given
    pub const DEFAULT_BOUNDS: (f64, f64) = (1e-2, 1e1);

    /// Starting (or fixed) theta values
    pub fn init(&self) -> &Array1<F> {
        match self {
            ThetaTuning::Full { init, bounds: _ } => init,
            ThetaTuning::Fixed(init) => init,
        }
    }

    /// Search intervals, `None` when theta is fixed
    pub fn bounds(&self) -> Option<&Array1<(F, F)>> {
        match self {
            ThetaTuning::Full { init: _, bounds } => Some(bounds),
            ThetaTuning::Fixed(_) => None,
        }
    }
}

/// A scalar hyper parameter tuning (used for the kernel variance)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamTuning<F: Float> {
    /// Value is kept as given
    Fixed(F),
    /// Value maximizes the model evidence within bounds
    Optimized {
        /// Starting value of the optimization
        init: F,
        /// (lower, upper) search interval
        bounds: (F, F),
    },
}

impl<F: Float> Default for ParamTuning<F> {
    fn default() -> ParamTuning<F> {
        Self::Optimized {
            init: F::one(),
            bounds: (F::cast(1e-2), F::cast(1e2)),
        }
    }
}

impl<F: Float> ParamTuning<F> {
    /// Get initial value
    pub fn init(&self) -> F {
        match self {
            ParamTuning::Fixed(init) | ParamTuning::Optimized { init, bounds: _ } => *init,
        }
    }
}

/// Check theta and variance tunings consistency
pub(crate) fn check_tunings<F: Float>(
    theta_tuning: &ThetaTuning<F>,
    variance_tuning: &ParamTuning<F>,
) -> Result<()> {
    let theta = theta_tuning.init();
    if theta.is_empty() || theta.iter().any(|v| *v <= F::zero()) {
        return Err(GpError::InvalidValueError(
            "theta initial values should be positive".to_string(),
        ));
    }
    if let Some(bounds) = theta_tuning.bounds() {
        if bounds.is_empty() || bounds.iter().any(|(lo, up)| *lo <= F::zero() || lo > up) {
            return Err(GpError::InvalidValueError(
                "theta bounds should be positive and ordered (lower, upper)".to_string(),
            ));
        }
    }
    match variance_tuning {
        ParamTuning::Fixed(v) if *v <= F::zero() => Err(GpError::InvalidValueError(
            "variance should be positive".to_string(),
        )),
        ParamTuning::Optimized { init, bounds }
            if *init <= F::zero() || bounds.0 <= F::zero() || bounds.0 > bounds.1 =>
        {
            Err(GpError::InvalidValueError(
                "variance initial value and bounds should be positive and ordered".to_string(),
            ))
        }
        _ => Ok(()),
    }
}

/// A set of validated pairwise GP parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct PairwiseGpValidParams<F: Float, Corr: CorrelationModel<F>> {
    /// Inverse length scales tuning
    pub(crate) theta_tuning: ThetaTuning<F>,
    /// Kernel variance (a.k.a. outputscale) tuning
    pub(crate) variance_tuning: ParamTuning<F>,
    /// Correlation model representing the utility correlation between f(x) and f(x')
    pub(crate) corr: Corr,
    /// Link between utility differences and comparison outcomes
    pub(crate) likelihood: Likelihood,
    /// Number of random restarts of the evidence maximization
    pub(crate) n_start: usize,
    /// Evidence evaluations budget of one local maximization
    pub(crate) max_eval: usize,
    /// Jitter added to the prior covariance diagonal
    pub(crate) jitter: F,
}

impl<F: Float, Corr: CorrelationModel<F>> Default for PairwiseGpValidParams<F, Corr> {
    fn default() -> PairwiseGpValidParams<F, Corr> {
        PairwiseGpValidParams {
            theta_tuning: ThetaTuning::default(),
            variance_tuning: ParamTuning::default(),
            corr: Corr::default(),
            likelihood: Likelihood::default(),
            n_start: PGP_OPTIM_N_START,
            max_eval: PGP_SLSQP_MAX_EVAL,
            jitter: F::cast(DEFAULT_JITTER),
        }
    }
}

impl<F: Float, Corr: CorrelationModel<F>> PairwiseGpValidParams<F, Corr> {
    /// Correlation model
    pub fn corr(&self) -> &Corr {
        &self.corr
    }

    /// Inverse length scales tuning
    pub fn theta_tuning(&self) -> &ThetaTuning<F> {
        &self.theta_tuning
    }

    /// Kernel variance tuning
    pub fn variance_tuning(&self) -> &ParamTuning<F> {
        &self.variance_tuning
    }

    /// Comparison likelihood
    pub fn likelihood(&self) -> Likelihood {
        self.likelihood
    }

    /// Number of random restarts
    pub fn n_start(&self) -> usize {
        self.n_start
    }

    /// Evidence evaluations budget of one local maximization
    pub fn max_eval(&self) -> usize {
        self.max_eval
    }

    /// Jitter added to the prior covariance diagonal
    pub fn jitter(&self) -> F {
        self.jitter
    }
}

#[derive(Clone, Debug)]
/// Builder of [`PairwiseGp`](crate::PairwiseGp) fitting parameters, checked when fitting
pub struct PairwiseGpParams<F: Float, Corr: CorrelationModel<F>>(PairwiseGpValidParams<F, Corr>);

impl<F: Float, Corr: CorrelationModel<F>> PairwiseGpParams<F, Corr> {
    /// A constructor for pairwise GP parameters given a correlation model
    pub fn new(corr: Corr) -> PairwiseGpParams<F, Corr> {
        Self(PairwiseGpValidParams {
            corr,
            ..Default::default()
        })
    }

    /// Use the given correlation model
    pub fn corr(mut self, corr: Corr) -> Self {
        self.0.corr = corr;
        self
    }

    /// Use the given comparison likelihood
    pub fn likelihood(mut self, likelihood: Likelihood) -> Self {
        self.0.likelihood = likelihood;
        self
    }

    /// Starting theta values, or the theta values themselves when theta is fixed
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

    /// Theta search intervals, ignored when theta is fixed
    pub fn theta_bounds(mut self, theta_bounds: Array1<(F, F)>) -> Self {
        self.0.theta_tuning = match self.0.theta_tuning {
            ThetaTuning::Full { init, bounds: _ } => ThetaTuning::Full {
                init,
                bounds: theta_bounds,
            },
            ThetaTuning::Fixed(f) => ThetaTuning::Fixed(f),
        };
        self
    }

    /// Replace the theta tuning
    pub fn theta_tuning(mut self, theta_tuning: ThetaTuning<F>) -> Self {
        self.0.theta_tuning = theta_tuning;
        self
    }

    /// Replace the kernel variance tuning
    pub fn variance_tuning(mut self, variance_tuning: ParamTuning<F>) -> Self {
        self.0.variance_tuning = variance_tuning;
        self
    }

    /// Number of random restarts of the evidence maximization
    pub fn n_start(mut self, n_start: usize) -> Self {
        self.0.n_start = n_start;
        self
    }

    /// Evidence evaluations budget of one local maximization,
    /// at least [`PGP_SLSQP_MIN_EVAL`](crate::PGP_SLSQP_MIN_EVAL)
    pub fn max_eval(mut self, max_eval: usize) -> Self {
        self.0.max_eval = PGP_SLSQP_MIN_EVAL.max(max_eval);
        self
    }

    /// Set jitter.
    ///
    /// Jitter is added to the prior covariance diagonal to improve numerical stability
    pub fn jitter(mut self, jitter: F) -> Self {
        self.0.jitter = jitter;
        self
    }
}

impl<F: Float, Corr: CorrelationModel<F>> From<PairwiseGpValidParams<F, Corr>>
    for PairwiseGpParams<F, Corr>
{
    fn from(valid: PairwiseGpValidParams<F, Corr>) -> Self {
        PairwiseGpParams(valid)
    }
}

impl<F: Float, Corr: CorrelationModel<F>> ParamGuard for PairwiseGpParams<F, Corr> {
    type Checked = PairwiseGpValidParams<F, Corr>;
    type Error = GpError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        check_tunings(&self.0.theta_tuning, &self.0.variance_tuning)?;
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
