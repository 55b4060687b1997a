//! Optimizers used to maximize acquisition functions
mod candidate_optimizer;

pub use candidate_optimizer::*;
