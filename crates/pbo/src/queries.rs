use crate::errors::{PrefError, Result};
use crate::types::ObjFunc;
use linfa::Float;
use ndarray::{Array2, Array3, ArrayBase, Data, Ix3};
use prefbo_doe::{with_global_rng, Random, SamplingMethod};

/// Generate `num_queries` random queries of `batch_size` items in `[0, 1[^input_dim`
///
/// Every coordinate is drawn independently and uniformly. When `seed` is given the
/// draws are reproducible and the process-wide generator state is left untouched,
/// otherwise draws come from the process-wide generator.
pub fn generate_random_queries<F: Float>(
    num_queries: usize,
    batch_size: usize,
    input_dim: usize,
    seed: Option<u64>,
) -> Result<Array3<F>> {
    if num_queries == 0 || batch_size == 0 || input_dim == 0 {
        return Err(PrefError::InvalidArgument(format!(
            "query sizes should be positive, got ({num_queries}, {batch_size}, {input_dim})"
        )));
    }
    let unit_box = Array2::from_shape_fn((input_dim, 2), |(_, j)| F::cast(j));
    let samples = with_global_rng(seed, |rng| {
        Random::new_with_rng(&unit_box, rng).sample(num_queries * batch_size)
    });
    Ok(samples.into_shape((num_queries, batch_size, input_dim))?)
}

/// Evaluate the objective on every item of the given queries (num_queries, batch_size, input_dim)
///
/// The objective is called once on the (num_queries * batch_size, input_dim) items matrix,
/// returned values are shaped as (num_queries, batch_size).
pub fn get_obj_vals<F: Float>(
    queries: &ArrayBase<impl Data<Elem = F>, Ix3>,
    obj: impl ObjFunc<F>,
) -> Result<Array2<F>> {
    let (n, b, d) = queries.dim();
    let items = queries.as_standard_layout();
    let items = items.view().into_shape((n * b, d))?;
    let vals = obj(&items);
    if vals.len() != n * b {
        return Err(PrefError::ShapeMismatch(format!(
            "objective should return {} values, got {}",
            n * b,
            vals.len()
        )));
    }
    Ok(vals.into_shape((n, b))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1, ArrayView2, Axis};
    use ndarray_rand::rand::Rng;
    use prefbo_doe::{global_rng, seed_global_rng};
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_random_queries_shape_and_range() {
        let queries = generate_random_queries::<f64>(7, 3, 2, None).unwrap();
        assert_eq!(queries.dim(), (7, 3, 2));
        assert!(queries.iter().all(|v| (0. ..1.).contains(v)));
        let queries = generate_random_queries::<f32>(4, 2, 5, Some(3)).unwrap();
        assert!(queries.iter().all(|v| (0. ..1.).contains(v)));
    }

    #[test]
    #[serial]
    fn test_seeded_queries_reproducible() {
        let q1 = generate_random_queries::<f64>(5, 2, 3, Some(42)).unwrap();
        let q2 = generate_random_queries::<f64>(5, 2, 3, Some(42)).unwrap();
        assert_eq!(q1, q2);
        let q3 = generate_random_queries::<f64>(5, 2, 3, Some(43)).unwrap();
        assert_ne!(q1, q3);
    }

    #[test]
    #[serial]
    fn test_seeded_queries_leave_global_rng_untouched() {
        seed_global_rng(0);
        let expected: f64 = global_rng().gen();

        seed_global_rng(0);
        let _ = generate_random_queries::<f64>(3, 2, 2, Some(123)).unwrap();
        let actual: f64 = global_rng().gen();
        assert_eq!(expected, actual);

        // unseeded calls do consume the process-wide generator
        seed_global_rng(0);
        let _ = generate_random_queries::<f64>(3, 2, 2, None).unwrap();
        let actual: f64 = global_rng().gen();
        assert_ne!(expected, actual);
    }

    #[test]
    fn test_random_queries_bad_sizes() {
        assert!(matches!(
            generate_random_queries::<f64>(0, 2, 2, Some(1)),
            Err(PrefError::InvalidArgument(_))
        ));
        assert!(matches!(
            generate_random_queries::<f64>(2, 0, 2, None),
            Err(PrefError::InvalidArgument(_))
        ));
        assert!(generate_random_queries::<f64>(2, 2, 0, Some(1)).is_err());
    }

    #[test]
    fn test_obj_vals_batched_equals_pointwise() {
        let obj = |x: &ArrayView2<f64>| x.map_axis(Axis(1), |row| row.sum() - row[0] * row[0]);
        let queries = generate_random_queries::<f64>(4, 3, 2, Some(7)).unwrap();
        let vals = get_obj_vals(&queries, obj).unwrap();
        assert_eq!(vals.dim(), (4, 3));
        for i in 0..4 {
            for j in 0..3 {
                let item = queries.slice(ndarray::s![i, j..j + 1, ..]);
                assert_abs_diff_eq!(vals[[i, j]], obj(&item)[0]);
            }
        }
    }

    #[test]
    fn test_obj_vals_non_contiguous_queries() {
        let queries = array![[[1.], [2.]], [[3.], [4.]]];
        let swapped = queries.slice(ndarray::s![.., ..;-1, ..]);
        let vals = get_obj_vals(&swapped, |x: &ArrayView2<f64>| x.column(0).to_owned()).unwrap();
        assert_eq!(vals, array![[2., 1.], [4., 3.]]);
    }

    #[test]
    fn test_obj_vals_bad_output() {
        let queries = array![[[1.], [2.]]];
        let res = get_obj_vals(&queries, |_: &ArrayView2<f64>| Array1::zeros(3));
        assert!(matches!(res, Err(PrefError::ShapeMismatch(_))));
    }
}
