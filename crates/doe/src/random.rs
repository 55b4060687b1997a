use crate::rng::global_rng;
use crate::SamplingMethod;
use linfa::Float;
use ndarray::{Array, Array2, ArrayBase, Data, Ix2};
use ndarray_rand::{rand::Rng, rand::SeedableRng, rand_distr::Uniform, RandomExt};
use rand_xoshiro::Xoshiro256Plus;
use std::sync::{Mutex, PoisonError};

/// Uniform random design: each component of a sample is drawn independently
/// and uniformly within its `[lower, upper[` interval.
#[derive(Debug)]
pub struct Random<F: Float, R: Rng> {
    /// Sample space as a (nx, 2) matrix, ith row being `[lower, upper]` of the ith component
    xlimits: Array2<F>,
    /// Generator of the design, locked while sampling
    rng: Mutex<R>,
}

impl<F: Float> Random<F, Xoshiro256Plus> {
    /// Uniform design within the (nx, 2) box `xlimits`
    ///
    /// The generator of the design is seeded from the process-wide generator
    /// (see [`crate::rng`]), hence reseeding the latter makes the design reproducible.
    ///
    /// Do not call it while holding the process-wide generator (eg. within a
    /// [`crate::SeededRngScope`]), use [`Random::new_with_rng`] instead.
    ///
    /// ```
    /// use prefbo_doe::{Random, SamplingMethod};
    /// use ndarray::arr2;
    ///
    /// let samples = Random::new(&arr2(&[[0.0, 1.0], [5.0, 10.0]])).sample(3);
    /// assert_eq!(samples.dim(), (3, 2));
    /// ```
    pub fn new(xlimits: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Self {
        let seed: u64 = global_rng().gen();
        Self::new_with_rng(xlimits, Xoshiro256Plus::seed_from_u64(seed))
    }
}

impl<F: Float, R: Rng> Random<F, R> {
    /// Uniform design within the (nx, 2) box `xlimits` drawn with the given generator
    ///
    /// **Panics** if xlimits does not have 2 columns.
    pub fn new_with_rng(xlimits: &ArrayBase<impl Data<Elem = F>, Ix2>, rng: R) -> Self {
        assert_eq!(
            xlimits.ncols(),
            2,
            "xlimits should be a (nx, 2) matrix of [lower, upper] bounds"
        );
        Random {
            xlimits: xlimits.to_owned(),
            rng: Mutex::new(rng),
        }
    }

    /// Replace the generator of the design
    pub fn with_rng<R2: Rng>(self, rng: R2) -> Random<F, R2> {
        Random {
            xlimits: self.xlimits,
            rng: Mutex::new(rng),
        }
    }
}

impl<F: Float, R: Rng> SamplingMethod<F> for Random<F, R> {
    fn sampling_space(&self) -> &Array2<F> {
        &self.xlimits
    }

    fn normalized_sample(&self, ns: usize) -> Array2<F> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let nx = self.xlimits.nrows();
        // rounding to a lower precision float may reach 1
        let upper = F::one() - F::epsilon();
        Array::random_using((ns, nx), Uniform::new(0., 1.), &mut *rng)
            .mapv(|v| F::cast(v).min(upper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::seed_global_rng;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr2, array};
    use serial_test::serial;

    #[test]
    fn test_random_seeded() {
        let xlimits = arr2(&[[-1., 1.], [0., 1.]]);
        let expected = array![
            [-0.8284888094090782, 0.31041139572710486],
            [-0.874860436873572, 0.306461322653673],
            [-0.9999140822815246, 0.3030653113049855],
        ];
        let actual = Random::new_with_rng(&xlimits, Xoshiro256Plus::seed_from_u64(42)).sample(3);
        assert_abs_diff_eq!(expected, actual, epsilon = 1e-6);
    }

    #[test]
    fn test_random_within_bounds() {
        let xlimits = arr2(&[[-3., -2.], [10., 20.], [0., 1e-3]]);
        let samples = Random::new_with_rng(&xlimits, Xoshiro256Plus::seed_from_u64(0)).sample(50);
        assert_eq!(samples.dim(), (50, 3));
        for row in samples.rows() {
            for (v, lim) in row.iter().zip(xlimits.rows()) {
                assert!(*v >= lim[0] && *v < lim[1]);
            }
        }
    }

    #[test]
    #[serial]
    fn test_random_follows_global_seed() {
        let xlimits = arr2(&[[0., 1.], [0., 1.]]);
        seed_global_rng(3);
        let a = Random::new(&xlimits).sample(4);
        seed_global_rng(3);
        let b = Random::new(&xlimits).sample(4);
        assert_eq!(a, b);
    }
}
