//! This library implements preference-based Bayesian optimization: a latent utility
//! function over a continuous design space is learnt from noisy pairwise comparisons
//! (queries of several candidate points, a response naming the preferred one), and
//! the learnt model is used to propose new queries by maximizing an acquisition function.
//!
//! The library provides:
//! * synthetic comparisons data generation: random queries, batched objective evaluation,
//!   responses of a decision maker corrupted by [noiseless, gaussian or Gumbel noise](NoiseType),
//! * encoding of queries and responses as pairwise GP training data,
//! * fitting of [preference models](FittedModel), either a Laplace approximated pairwise GP
//!   with a probit or logit comparison likelihood or a pairwise variational GP
//!   (see [`prefbo_gp`]),
//! * [acquisition functions](criteria) (qEUBO, posterior mean) and a multistart
//!   [candidate optimizer](CandidateOptimizer) suggesting the next query.
//!
//! # Example
//!
//! ```no_run
//! use ndarray::{array, Array1, ArrayView2, Axis};
//! use prefbo::criteria::QExpectedUtilityOfBestOption;
//! use prefbo::{fit_model, generate_initial_data, optimize_acqf_and_get_suggested_query};
//! use prefbo::{ModelSpec, NoiseType};
//!
//! // Utility to be learnt from comparisons, max at (0.3, 0.3)
//! fn utility(x: &ArrayView2<f64>) -> Array1<f64> {
//!     x.map_axis(Axis(1), |row| -row.mapv(|v| (v - 0.3) * (v - 0.3)).sum())
//! }
//!
//! let data = generate_initial_data(10, 2, 2, utility, NoiseType::Probit, 0.01, Some(42))
//!     .expect("initial data");
//! let spec = ModelSpec::from_names("pairwise_gp", Some("probit")).expect("valid model");
//! let model = fit_model(&data.queries, &data.responses, &spec).expect("model fitted");
//!
//! let acq = QExpectedUtilityOfBestOption::new(&model);
//! let bounds = array![[0., 0.], [1., 1.]];
//! let query = optimize_acqf_and_get_suggested_query(&acq, &bounds, 2, None, None)
//!     .expect("next query");
//! println!("Next query {query}");
//! ```
//!
//! Logs are emitted with the [`log`] facade, the environment variable [`PREFBO_LOG`]
//! sets the level of the logger set up with [`init_logger`] (default `info`).
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
pub mod criteria;

mod comparisons;
mod errors;
mod fit;
mod initial_data;
mod optimizers;
mod queries;
mod responses;
mod types;

pub use crate::comparisons::*;
pub use crate::errors::*;
pub use crate::fit::*;
pub use crate::initial_data::*;
pub use crate::optimizers::*;
pub use crate::queries::*;
pub use crate::responses::{corrupt_obj_vals, generate_responses};
pub use crate::types::*;

pub use prefbo_gp::{Likelihood, PreferenceSurrogate, DEFAULT_JITTER};

use env_logger::{Builder, Env};

/// Environment variable setting the log level
pub const PREFBO_LOG: &str = "PREFBO_LOG";
/// Default max number of local acquisition optimizations run together
pub const DEFAULT_BATCH_LIMIT: usize = 4;
/// Default max number of raw candidate batches scored together
pub const DEFAULT_INIT_BATCH_LIMIT: usize = 20;

/// Set up a logger writing to stdout at the level given by [`PREFBO_LOG`] (default `info`)
///
/// Calling it more than once is harmless.
pub fn init_logger() {
    let env = Env::new().filter_or(PREFBO_LOG, "info");
    let mut builder = Builder::from_env(env);
    let builder = builder.target(env_logger::Target::Stdout);
    builder.try_init().ok();
}
