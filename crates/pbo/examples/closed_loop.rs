use ndarray::{concatenate, Array1, ArrayView2, Axis};
use ndarray_stats::QuantileExt;
use prefbo::criteria::QExpectedUtilityOfBestOption;
use prefbo::{
    fit_model, generate_initial_data, generate_responses, get_obj_vals, init_logger,
    optimize_acqf_and_get_suggested_query, ModelSpec, NoiseType,
};

const INPUT_DIM: usize = 2;
const BATCH_SIZE: usize = 2;
const NUM_ROUNDS: usize = 5;

/// Negated 2D Branin function rescaled on the unit square, max ~ -0.397
fn neg_branin(x: &ArrayView2<f64>) -> Array1<f64> {
    x.map_axis(Axis(1), |row| {
        let x1 = 15. * row[0] - 5.;
        let x2 = 15. * row[1];
        let pi = std::f64::consts::PI;
        let a = x2 - 5.1 / (4. * pi * pi) * x1 * x1 + 5. / pi * x1 - 6.;
        -(a * a + 10. * (1. - 1. / (8. * pi)) * x1.cos() + 10.)
    })
}

fn main() -> prefbo::Result<()> {
    init_logger();
    let noise_type = NoiseType::Logit;
    let noise_level = 0.1;
    let spec = ModelSpec::from_names("pairwise_gp", Some("logit"))?;

    let data = generate_initial_data(
        4 * INPUT_DIM,
        BATCH_SIZE,
        INPUT_DIM,
        neg_branin,
        noise_type,
        noise_level,
        Some(0),
    )?;
    let (mut queries, mut obj_vals, mut responses) = (data.queries, data.obj_vals, data.responses);

    let bounds = ndarray::array![[0., 0.], [1., 1.]];
    for round in 0..NUM_ROUNDS {
        let model = fit_model(&queries, &responses, &spec)?;
        let acq = QExpectedUtilityOfBestOption::new(&model);
        let query = optimize_acqf_and_get_suggested_query(&acq, &bounds, BATCH_SIZE, None, None)?;

        let query = query.insert_axis(Axis(0));
        let vals = get_obj_vals(&query, neg_branin)?;
        let response = generate_responses(&vals, noise_type, noise_level)?;

        queries = concatenate(Axis(0), &[queries.view(), query.view()])?;
        obj_vals = concatenate(Axis(0), &[obj_vals.view(), vals.view()])?;
        responses = concatenate(Axis(0), &[responses.view(), response.view()])?;

        let best = obj_vals.max().copied().unwrap_or(f64::NEG_INFINITY);
        println!("Round {round}: best utility so far {best:.4} (max ~ -0.3979)");
    }
    Ok(())
}
