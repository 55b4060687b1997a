use crate::errors::{PrefError, Result};
use linfa::Float;
use ndarray::{Array2, ArrayBase, Data, Ix1, Ix3};

/// Check queries (num_queries, batch_size, input_dim) and responses (num_queries,) consistency
pub(crate) fn check_queries<F: Float>(
    queries: &ArrayBase<impl Data<Elem = F>, Ix3>,
    responses: &ArrayBase<impl Data<Elem = usize>, Ix1>,
) -> Result<()> {
    let (n, b, _) = queries.dim();
    if responses.len() != n {
        return Err(PrefError::ShapeMismatch(format!(
            "expected {n} responses (one per query), got {}",
            responses.len()
        )));
    }
    if b < 2 {
        return Err(PrefError::InvalidArgument(format!(
            "queries should contain at least 2 items to be compared, got {b}"
        )));
    }
    if let Some((i, r)) = responses.iter().enumerate().find(|(_, r)| **r >= b) {
        return Err(PrefError::InvalidArgument(format!(
            "response {r} of query {i} is not an item index (batch size {b})"
        )));
    }
    Ok(())
}

/// Convert queries and responses into pairwise GP training data
///
/// Returns `(datapoints, comparisons)` where datapoints is the
/// (num_queries * batch_size, input_dim) matrix of query items (query-major: item j of
/// query i is row `i * batch_size + j`) and comparisons the
/// (num_queries * (batch_size - 1), 2) matrix of (winner, loser) row indices:
/// the preferred item of each query wins over every other item of that query.
pub fn training_data_for_pairwise_gp<F: Float>(
    queries: &ArrayBase<impl Data<Elem = F>, Ix3>,
    responses: &ArrayBase<impl Data<Elem = usize>, Ix1>,
) -> Result<(Array2<F>, Array2<usize>)> {
    check_queries(queries, responses)?;
    let (n, b, d) = queries.dim();
    let datapoints = queries
        .as_standard_layout()
        .into_owned()
        .into_shape((n * b, d))?;
    let comparisons: Vec<usize> = responses
        .iter()
        .enumerate()
        .flat_map(|(i, &r)| {
            (0..b)
                .filter(move |j| *j != r)
                .flat_map(move |j| [i * b + r, i * b + j])
        })
        .collect();
    let comparisons = Array2::from_shape_vec((n * (b - 1), 2), comparisons)?;
    Ok((datapoints, comparisons))
}
