use crate::errors::Result;
use crate::queries::{generate_random_queries, get_obj_vals};
use crate::responses::{agreement, generate_responses};
use crate::types::{InitialData, NoiseType, ObjFunc};
use linfa::Float;
use log::info;

/// Generate random queries, evaluate them with the objective and simulate the
/// responses of a decision maker whose judgement is corrupted by the given noise.
///
/// `seed` makes queries reproducible (see [`generate_random_queries`]), responses noise
/// is drawn from the process-wide generator.
pub fn generate_initial_data<F: Float>(
    num_queries: usize,
    batch_size: usize,
    input_dim: usize,
    obj: impl ObjFunc<F>,
    noise_type: NoiseType,
    noise_level: F,
    seed: Option<u64>,
) -> Result<InitialData<F>> {
    let queries = generate_random_queries(num_queries, batch_size, input_dim, seed)?;
    let obj_vals = get_obj_vals(&queries, obj)?;
    let responses = generate_responses(&obj_vals, noise_type, noise_level)?;
    let right = 100. * agreement(&obj_vals, &responses)?;
    info!(
        "Generated {num_queries} queries of {batch_size} items, \
         {right:.0}% of responses with {noise_type} noise are right"
    );
    Ok(InitialData {
        queries,
        obj_vals,
        responses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparisons::training_data_for_pairwise_gp;
    use crate::fit::fit_model;
    use crate::types::ModelSpec;
    use ndarray::{Array1, ArrayView2, Axis};
    use prefbo_gp::PreferenceSurrogate;

    fn identity(x: &ArrayView2<f64>) -> Array1<f64> {
        x.column(0).to_owned()
    }

    #[test]
    fn test_identity_noiseless_larger_wins() {
        let data = generate_initial_data(5, 2, 1, identity, NoiseType::Noiseless, 0., Some(7))
            .expect("initial data");
        assert_eq!(data.queries.dim(), (5, 2, 1));
        assert_eq!(data.obj_vals.dim(), (5, 2));
        for (query, r) in data.queries.outer_iter().zip(data.responses.iter()) {
            let other = 1 - r;
            assert!(query[[*r, 0]] >= query[[other, 0]]);
        }
    }

    #[test]
    fn test_fitted_probit_model_consistent_with_comparisons() {
        crate::init_logger();
        let data = generate_initial_data(5, 2, 1, identity, NoiseType::Noiseless, 0., Some(7))
            .expect("initial data");
        let spec = ModelSpec::from_names("pairwise_gp", Some("probit")).unwrap();
        let model = fit_model(&data.queries, &data.responses, &spec).expect("model fitted");

        let (x, comparisons) =
            training_data_for_pairwise_gp(&data.queries, &data.responses).unwrap();
        let mu = model.predict(&x.view()).unwrap();
        for pair in comparisons.outer_iter() {
            assert!(mu[pair[0]] >= mu[pair[1]] - 1e-6);
        }
        // utility increases with the coordinate
        let grid = Array1::linspace(0., 1., 5).insert_axis(Axis(1));
        let mu = model.predict(&grid.view()).unwrap();
        assert!(mu[4] > mu[0]);
    }
}
