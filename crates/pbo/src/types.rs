use crate::errors::{PrefError, Result};
use linfa::Float;
use ndarray::{Array1, Array2, Array3, ArrayView2};
use prefbo_gp::Likelihood;
use std::fmt;
use std::str::FromStr;

/// An interface for the objective (utility) function to be learnt
///
/// The function is expected to evaluate the n points given as a (n, nx) matrix
/// at once and return the n values.
pub trait ObjFunc<F: Float>: Fn(&ArrayView2<F>) -> Array1<F> {}
impl<F: Float, T> ObjFunc<F> for T where T: Fn(&ArrayView2<F>) -> Array1<F> {}

/// Noise corrupting objective values before the preferred item of a query is picked
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NoiseType {
    /// Objective values are used as is
    #[default]
    Noiseless,
    /// Additive centered gaussian noise, `noise_level` being its standard deviation
    Probit,
    /// Additive Gumbel noise with location 0, `noise_level` being its scale
    Logit,
}

impl fmt::Display for NoiseType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            NoiseType::Noiseless => "noiseless",
            NoiseType::Probit => "probit",
            NoiseType::Logit => "logit",
        };
        write!(f, "{name}")
    }
}

impl FromStr for NoiseType {
    type Err = PrefError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "noiseless" => Ok(NoiseType::Noiseless),
            "probit" => Ok(NoiseType::Probit),
            "logit" => Ok(NoiseType::Logit),
            _ => Err(PrefError::InvalidArgument(format!(
                "unknown noise type '{s}', expected one of noiseless, probit, logit"
            ))),
        }
    }
}

/// Preference model family to be fitted on comparisons data
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelSpec {
    /// Laplace approximated pairwise GP with the given comparison likelihood
    PairwiseGp {
        /// Link between utility differences and comparison outcomes
        likelihood: Likelihood,
    },
    /// Pairwise variational GP (probit likelihood)
    PairwiseVariationalGp,
}

impl Default for ModelSpec {
    fn default() -> Self {
        ModelSpec::PairwiseGp {
            likelihood: Likelihood::Logit,
        }
    }
}

impl ModelSpec {
    /// Model specification from its name (`"pairwise_gp"` or `"pairwise_kernel_variational_gp"`)
    /// and an optional likelihood name (`"probit"` or `"logit"`, default `"logit"`).
    ///
    /// The likelihood name is only checked for `"pairwise_gp"`.
    pub fn from_names(model_type: &str, likelihood: Option<&str>) -> Result<Self> {
        match model_type {
            "pairwise_gp" => {
                let likelihood = likelihood
                    .unwrap_or("logit")
                    .parse::<Likelihood>()
                    .map_err(|err| PrefError::InvalidArgument(err.to_string()))?;
                Ok(ModelSpec::PairwiseGp { likelihood })
            }
            "pairwise_kernel_variational_gp" => Ok(ModelSpec::PairwiseVariationalGp),
            _ => Err(PrefError::InvalidArgument(format!(
                "unknown model type '{model_type}', expected pairwise_gp or pairwise_kernel_variational_gp"
            ))),
        }
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ModelSpec::PairwiseGp { likelihood } => write!(f, "pairwise_gp({likelihood})"),
            ModelSpec::PairwiseVariationalGp => write!(f, "pairwise_kernel_variational_gp"),
        }
    }
}

/// Synthetic comparisons data
#[derive(Clone, Debug)]
pub struct InitialData<F: Float> {
    /// Query batches (num_queries, batch_size, input_dim)
    pub queries: Array3<F>,
    /// True objective values of query items (num_queries, batch_size)
    pub obj_vals: Array2<F>,
    /// Index of the preferred item of each query (num_queries,)
    pub responses: Array1<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_type_from_str() {
        assert_eq!("probit".parse::<NoiseType>().unwrap(), NoiseType::Probit);
        assert_eq!("logit".parse::<NoiseType>().unwrap(), NoiseType::Logit);
        assert_eq!(
            "noiseless".parse::<NoiseType>().unwrap(),
            NoiseType::Noiseless
        );
        assert!(matches!(
            "gaussian".parse::<NoiseType>(),
            Err(PrefError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_model_spec_from_names() {
        assert_eq!(
            ModelSpec::from_names("pairwise_gp", None).unwrap(),
            ModelSpec::default()
        );
        assert_eq!(
            ModelSpec::from_names("pairwise_gp", Some("probit")).unwrap(),
            ModelSpec::PairwiseGp {
                likelihood: Likelihood::Probit
            }
        );
        assert!(matches!(
            ModelSpec::from_names("pairwise_gp", Some("cauchit")),
            Err(PrefError::InvalidArgument(_))
        ));
        // likelihood is not used by the variational model
        assert_eq!(
            ModelSpec::from_names("pairwise_kernel_variational_gp", Some("cauchit")).unwrap(),
            ModelSpec::PairwiseVariationalGp
        );
        assert!(matches!(
            ModelSpec::from_names("kriging", None),
            Err(PrefError::InvalidArgument(_))
        ));
    }
}
