//! This library implements [Gaussian Process](https://en.wikipedia.org/wiki/Gaussian_process) models
//! of a latent utility function learnt from pairwise preference comparisons:
//! each observation states that a *winner* point is preferred over a *loser* point.
//!
//! Two model families are available:
//!
//! * [PairwiseGp] parameterized by [PairwiseGpParams]: the utility posterior is approximated
//!   with a Laplace approximation around its mode, comparisons being linked to the utility
//!   difference through a [Likelihood] (probit or logit),
//! * [PairwiseVariationalGp] parameterized by [PairwiseVgpParams]: the preference function
//!   `g(a, b) = f(a) - f(b)` is modelled directly with a skew-symmetric kernel over
//!   (winner, loser) pairs and a Gaussian variational posterior.
//!
//! In both cases kernel hyperparameters (inverse length scales `theta` and `variance`)
//! are estimated by maximizing the approximate marginal likelihood with a multistart
//! SLSQP optimizer.
//!
//! Both models implement the [PreferenceSurrogate] trait giving posterior mean, variance
//! and joint covariance of the utility at new points.
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
pub mod correlation_models;
mod errors;
mod likelihoods;
pub mod metrics;
mod parameters;
mod surrogates;
mod utils;
mod vgp_algorithm;
mod vgp_parameters;

mod optimization;

pub use algorithm::*;
pub use errors::*;
pub use likelihoods::*;
pub use parameters::*;
pub use surrogates::*;
pub use utils::{norm_cdf, norm_pdf, robust_cholesky};
pub use vgp_algorithm::*;
pub use vgp_parameters::*;

/// Default number of multistart for hyperparameters optimization
pub const PGP_OPTIM_N_START: usize = 4;
/// Minimum number of evaluations of the approximate likelihood during one optimization
pub const PGP_SLSQP_MIN_EVAL: usize = 25;
/// Default max number of evaluations of the approximate likelihood during one optimization
pub const PGP_SLSQP_MAX_EVAL: usize = 100;
/// Default jitter added to the prior covariance diagonal
pub const DEFAULT_JITTER: f64 = 1e-4;
/// Max number of iterations of inner posterior approximation loops (Newton, CVI)
pub const PGP_MAX_INNER_ITERS: usize = 100;
