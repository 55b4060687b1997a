use crate::errors::{PrefError, Result};
use crate::types::NoiseType;
use linfa::Float;
use log::debug;
use ndarray::{Array, Array1, Array2, ArrayBase, Data, Ix2};
use ndarray_rand::rand_distr::{Gumbel, Normal};
use ndarray_rand::RandomExt;
use ndarray_stats::QuantileExt;
use prefbo_doe::global_rng;

/// Corrupt objective values with the given noise
///
/// * `Noiseless`: values are returned unchanged, `noise_level` is ignored,
/// * `Probit`: i.i.d. `N(0, noise_level^2)` noise is added,
/// * `Logit`: i.i.d. `Gumbel(0, noise_level)` noise is added.
///
/// A zero `noise_level` leaves values unchanged. Noise is drawn from the process-wide generator.
pub fn corrupt_obj_vals<F: Float>(
    obj_vals: &ArrayBase<impl Data<Elem = F>, Ix2>,
    noise_type: NoiseType,
    noise_level: F,
) -> Result<Array2<F>> {
    if noise_type == NoiseType::Noiseless {
        return Ok(obj_vals.to_owned());
    }
    if !noise_level.is_finite() || noise_level < F::zero() {
        return Err(PrefError::InvalidArgument(format!(
            "noise level should be a non negative finite value, got {noise_level}"
        )));
    }
    if noise_level == F::zero() {
        return Ok(obj_vals.to_owned());
    }
    let level = noise_level.to_f64().unwrap_or(f64::NAN);
    let dim = obj_vals.raw_dim();
    let mut rng = global_rng();
    let noise = match noise_type {
        NoiseType::Probit => Normal::new(0., level)
            .map(|normal| Array::random_using(dim, normal, &mut *rng))
            .map_err(|err| PrefError::InvalidArgument(err.to_string()))?,
        NoiseType::Logit => Gumbel::new(0., level)
            .map(|gumbel| Array::random_using(dim, gumbel, &mut *rng))
            .map_err(|err| PrefError::InvalidArgument(err.to_string()))?,
        NoiseType::Noiseless => Array2::zeros(dim),
    };
    debug!("Corrupt objective values with {noise_type} noise (level={level})");
    Ok(obj_vals + &noise.mapv(F::cast))
}

/// Index of the preferred item of each query given objective values (num_queries, batch_size)
/// corrupted by the given noise, ie the arg max of the noisy values of each query.
/// Ties are resolved to the lowest index.
pub fn generate_responses<F: Float>(
    obj_vals: &ArrayBase<impl Data<Elem = F>, Ix2>,
    noise_type: NoiseType,
    noise_level: F,
) -> Result<Array1<usize>> {
    if obj_vals.ncols() == 0 {
        return Err(PrefError::InvalidArgument(
            "queries should contain at least one item".to_string(),
        ));
    }
    let noisy = corrupt_obj_vals(obj_vals, noise_type, noise_level)?;
    noisy
        .outer_iter()
        .enumerate()
        .map(|(i, row)| {
            row.argmax().map_err(|err| {
                PrefError::InvalidArgument(format!("no preferred item in query {i}: {err}"))
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(Array1::from_vec)
}

/// Index of the preferred item of each query given true objective values
pub(crate) fn true_responses<F: Float>(
    obj_vals: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Result<Array1<usize>> {
    generate_responses(obj_vals, NoiseType::Noiseless, F::zero())
}

/// Share of responses agreeing with the noiseless ones
pub(crate) fn agreement<F: Float>(
    obj_vals: &ArrayBase<impl Data<Elem = F>, Ix2>,
    responses: &Array1<usize>,
) -> Result<f64> {
    let truth = true_responses(obj_vals)?;
    let agreed = truth
        .iter()
        .zip(responses.iter())
        .filter(|(t, r)| t == r)
        .count();
    Ok(agreed as f64 / truth.len().max(1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use prefbo_doe::seed_global_rng;
    use serial_test::serial;

    #[test]
    fn test_noiseless_values_unchanged() {
        let vals = array![[0.1, -2.5, 3.], [f64::MAX, 0., 1e-300]];
        let corrupted = corrupt_obj_vals(&vals, NoiseType::Noiseless, 10.).unwrap();
        assert_eq!(vals, corrupted);
        // level is ignored, even when invalid
        let corrupted = corrupt_obj_vals(&vals, NoiseType::Noiseless, -1.).unwrap();
        assert_eq!(vals, corrupted);
    }

    #[test]
    fn test_bad_noise_level() {
        let vals = array![[0.1, 0.2]];
        assert!(matches!(
            corrupt_obj_vals(&vals, NoiseType::Probit, -1.),
            Err(PrefError::InvalidArgument(_))
        ));
        assert!(corrupt_obj_vals(&vals, NoiseType::Logit, f64::NAN).is_err());
        assert_eq!(
            corrupt_obj_vals(&vals, NoiseType::Logit, 0.).unwrap(),
            vals
        );
    }

    #[test]
    #[serial]
    fn test_noisy_values_differ() {
        seed_global_rng(42);
        let vals = Array2::<f64>::zeros((10, 3));
        for noise_type in [NoiseType::Probit, NoiseType::Logit] {
            let corrupted = corrupt_obj_vals(&vals, noise_type, 1.).unwrap();
            assert!(corrupted.iter().all(|v| *v != 0. && v.is_finite()));
        }
    }

    #[test]
    #[serial]
    fn test_small_noise_responses_equal_argmax() {
        seed_global_rng(0);
        let vals = array![[0.1, 0.5, 0.3], [0.9, 0.2, 0.4], [0.0, 0.1, 0.7]];
        for noise_type in [NoiseType::Probit, NoiseType::Logit] {
            let responses = generate_responses(&vals, noise_type, 1e-6).unwrap();
            assert_eq!(responses, array![1, 0, 2]);
        }
    }

    #[test]
    fn test_responses_ties_lowest_index() {
        let vals = array![[1., 1.], [0., 2.], [3., 3.]];
        let responses = generate_responses(&vals, NoiseType::Noiseless, 0.).unwrap();
        assert_eq!(responses, array![0, 1, 0]);
    }

    #[test]
    fn test_responses_nan() {
        let vals = array![[1., f64::NAN]];
        assert!(generate_responses(&vals, NoiseType::Noiseless, 0.).is_err());
    }

    #[test]
    #[serial]
    fn test_large_noise_disagreement() {
        seed_global_rng(1);
        let vals =
            Array2::from_shape_fn((200, 2), |(i, j)| (i % 7) as f64 * 1e-3 + j as f64 * 1e-3);
        let responses = generate_responses(&vals, NoiseType::Probit, 10.).unwrap();
        let rate = agreement(&vals, &responses).unwrap();
        assert!(rate > 0.2 && rate < 0.8);
    }
}
