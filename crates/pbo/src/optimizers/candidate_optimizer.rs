use crate::criteria::AcquisitionFunction;
use crate::errors::{PrefError, Result};
use crate::{DEFAULT_BATCH_LIMIT, DEFAULT_INIT_BATCH_LIMIT};
use finitediff::FiniteDiff;
use log::{debug, info};
use ndarray::{s, Array1, Array2, Array3, ArrayBase, ArrayView2, Axis, Data, Ix2, Zip};
use prefbo_doe::{with_global_rng, Random, SamplingMethod};
use rayon::prelude::*;
use std::cell::RefCell;
use std::cmp::Ordering;

/// Max number of acquisition evaluations of one local optimization
pub const ACQF_MAX_EVAL: usize = 100;
/// Number of local optimizations per input dimension
pub const RESTARTS_PER_DIM: usize = 4;
/// Number of raw batches scored to select starting points per input dimension
pub const RAW_SAMPLES_PER_DIM: usize = 120;

/// Candidate batches found by [`CandidateOptimizer`], ranked by decreasing acquisition value
#[derive(Clone, Debug)]
pub struct Candidates {
    /// Batches of points (num_restarts, batch_size, input_dim)
    pub x: Array3<f64>,
    /// Acquisition values of batches (num_restarts,)
    pub values: Array1<f64>,
}

impl Candidates {
    /// Batch with the greatest acquisition value (batch_size, input_dim)
    pub fn best(&self) -> ArrayView2<f64> {
        self.x.index_axis(Axis(0), 0)
    }
}

/// Multistart maximizer of an acquisition function over batches of points within bounds
///
/// Raw batches are drawn uniformly within bounds and scored, the best ones are used as
/// starting points of bounded SLSQP local optimizations (gradients being approximated with
/// finite differences). Raw batches are scored by groups of `init_batch_limit` and local
/// optimizations are run by groups of `batch_limit`, each group being evaluated in parallel.
pub struct CandidateOptimizer<'a> {
    acq: &'a dyn AcquisitionFunction,
    /// Lower bounds (row 0) and upper bounds (row 1), (2, input_dim)
    bounds: Array2<f64>,
    batch_size: usize,
    batch_limit: usize,
    init_batch_limit: usize,
    max_eval: usize,
    num_restarts: usize,
    raw_samples: usize,
    seed: Option<u64>,
}

impl<'a> CandidateOptimizer<'a> {
    /// Constructor given the acquisition function and (2, input_dim) bounds,
    /// first row being lower bounds, second row upper bounds.
    pub fn new(
        acq: &'a dyn AcquisitionFunction,
        bounds: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    ) -> Result<Self> {
        if bounds.nrows() != 2 || bounds.ncols() == 0 {
            return Err(PrefError::ShapeMismatch(format!(
                "bounds should be a (2, input_dim) array, got {:?}",
                bounds.dim()
            )));
        }
        let valid = Zip::from(bounds.row(0))
            .and(bounds.row(1))
            .all(|lo, up| lo.is_finite() && up.is_finite() && lo <= up);
        if !valid {
            return Err(PrefError::InvalidArgument(format!(
                "bounds should be finite with lower <= upper, got {bounds}"
            )));
        }
        let dim = bounds.ncols();
        Ok(CandidateOptimizer {
            acq,
            bounds: bounds.to_owned(),
            batch_size: 2,
            batch_limit: DEFAULT_BATCH_LIMIT,
            init_batch_limit: DEFAULT_INIT_BATCH_LIMIT,
            max_eval: ACQF_MAX_EVAL,
            num_restarts: RESTARTS_PER_DIM * dim,
            raw_samples: RAW_SAMPLES_PER_DIM * dim,
            seed: None,
        })
    }

    /// Number of points of a candidate batch (aka q)
    pub fn batch_size(&mut self, batch_size: usize) -> &mut Self {
        self.batch_size = batch_size;
        self
    }

    /// Max number of local optimizations run together
    pub fn batch_limit(&mut self, batch_limit: usize) -> &mut Self {
        self.batch_limit = batch_limit;
        self
    }

    /// Max number of raw batches scored together
    pub fn init_batch_limit(&mut self, init_batch_limit: usize) -> &mut Self {
        self.init_batch_limit = init_batch_limit;
        self
    }

    /// Max number of acquisition evaluations of one local optimization
    pub fn max_eval(&mut self, max_eval: usize) -> &mut Self {
        self.max_eval = max_eval;
        self
    }

    /// Number of local optimizations
    pub fn num_restarts(&mut self, num_restarts: usize) -> &mut Self {
        self.num_restarts = num_restarts;
        self
    }

    /// Number of raw batches scored to select local optimizations starting points
    pub fn raw_samples(&mut self, raw_samples: usize) -> &mut Self {
        self.raw_samples = raw_samples;
        self
    }

    /// Seed of raw batches sampling, the process-wide generator is used otherwise
    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = Some(seed);
        self
    }

    fn check(&self) -> Result<()> {
        let sizes = [
            ("batch_size", self.batch_size),
            ("batch_limit", self.batch_limit),
            ("init_batch_limit", self.init_batch_limit),
            ("max_eval", self.max_eval),
            ("num_restarts", self.num_restarts),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, v)| *v == 0) {
            return Err(PrefError::InvalidArgument(format!(
                "{name} should be positive"
            )));
        }
        if self.raw_samples < self.num_restarts {
            return Err(PrefError::InvalidArgument(format!(
                "raw_samples ({}) should be greater than num_restarts ({})",
                self.raw_samples, self.num_restarts
            )));
        }
        Ok(())
    }

    fn dim(&self) -> usize {
        self.bounds.ncols()
    }

    /// Score batches (n, batch_size, input_dim) by groups of `limit`
    fn score(&self, batches: &Array3<f64>, limit: usize) -> Result<Array1<f64>> {
        let mut values = Vec::with_capacity(batches.len_of(Axis(0)));
        for group in batches.axis_chunks_iter(Axis(0), limit) {
            let group_values = (0..group.len_of(Axis(0)))
                .into_par_iter()
                .map(|i| self.acq.value(&group.index_axis(Axis(0), i)))
                .collect::<Result<Vec<_>>>()?;
            values.extend(group_values);
        }
        Ok(Array1::from_vec(values))
    }

    /// Draw `raw_samples` batches uniformly within bounds and keep the `num_restarts` best ones
    fn initial_batches(&self) -> Result<Array3<f64>> {
        let (q, d) = (self.batch_size, self.dim());
        let xlimits = self.bounds.t().to_owned();
        let raw = with_global_rng(self.seed, |rng| {
            Random::new_with_rng(&xlimits, rng).sample(self.raw_samples * q)
        });
        let raw = raw.into_shape((self.raw_samples, q, d))?;
        let values = self.score(&raw, self.init_batch_limit)?;
        let best = ranking(&values);
        debug!(
            "Raw batches acquisition values in [{}, {}]",
            values[best[best.len() - 1]],
            values[best[0]]
        );
        Ok(raw.select(Axis(0), &best[..self.num_restarts]))
    }

    /// Bounded SLSQP maximization of the acquisition function starting from the given batch
    fn local_search(&self, x0: ArrayView2<f64>) -> Result<Array2<f64>> {
        let (q, d) = (self.batch_size, self.dim());
        let failure: RefCell<Option<PrefError>> = RefCell::new(None);
        let negacq = |x: &[f64]| -> f64 {
            if x.iter().any(|v| v.is_nan()) {
                return f64::INFINITY;
            }
            let batch = match ArrayView2::from_shape((q, d), x) {
                Ok(batch) => batch,
                Err(err) => {
                    failure.borrow_mut().get_or_insert(err.into());
                    return f64::INFINITY;
                }
            };
            match self.acq.value(&batch) {
                Ok(v) if v.is_nan() => f64::INFINITY,
                Ok(v) => -v,
                Err(err) => {
                    failure.borrow_mut().get_or_insert(err);
                    f64::INFINITY
                }
            }
        };
        let obj = |x: &[f64], gradient: Option<&mut [f64]>, _params: &mut ()| -> f64 {
            if let Some(grad) = gradient {
                let f = |x: &Vec<f64>| -> f64 { negacq(x) };
                grad[..].copy_from_slice(&x.to_vec().central_diff(&f));
            }
            negacq(x)
        };

        let xinit = x0.iter().copied().collect::<Vec<_>>();
        let bounds: Vec<(f64, f64)> = (0..q)
            .flat_map(|_| {
                Zip::from(self.bounds.row(0))
                    .and(self.bounds.row(1))
                    .map_collect(|lo, up| (*lo, *up))
                    .to_vec()
            })
            .collect();
        let cons: Vec<&dyn slsqp::Func<()>> = vec![];
        let x_opt = match slsqp::minimize(
            obj,
            &xinit,
            &bounds,
            &cons,
            (),
            self.max_eval,
            None,
        ) {
            Ok((_, x_opt, _)) => x_opt,
            Err((status, x_opt, _)) => {
                debug!("SLSQP optimizer of acquisition status={status:?}");
                x_opt
            }
        };
        if let Some(err) = failure.into_inner() {
            return Err(err);
        }
        let x_opt = Array2::from_shape_vec((q, d), x_opt)?;
        Ok(self.clip(x_opt))
    }

    fn clip(&self, mut x: Array2<f64>) -> Array2<f64> {
        for mut row in x.rows_mut() {
            Zip::from(&mut row)
                .and(self.bounds.row(0))
                .and(self.bounds.row(1))
                .for_each(|v, lo, up| *v = v.clamp(*lo, *up));
        }
        x
    }

    /// Run the optimization, returning every local optimization result ranked by
    /// decreasing acquisition value.
    pub fn optimize(&self) -> Result<Candidates> {
        self.check()?;
        let (q, d) = (self.batch_size, self.dim());
        let starts = self.initial_batches()?;

        let mut results = Array3::zeros((self.num_restarts, q, d));
        for (group, mut res_group) in starts
            .axis_chunks_iter(Axis(0), self.batch_limit)
            .zip(results.axis_chunks_iter_mut(Axis(0), self.batch_limit))
        {
            let optimized = (0..group.len_of(Axis(0)))
                .into_par_iter()
                .map(|i| self.local_search(group.index_axis(Axis(0), i)))
                .collect::<Result<Vec<_>>>()?;
            for (i, x) in optimized.iter().enumerate() {
                res_group.slice_mut(s![i, .., ..]).assign(x);
            }
        }
        let values = self.score(&results, self.batch_limit)?;

        let order = ranking(&values);
        let candidates = Candidates {
            x: results.select(Axis(0), &order),
            values: values.select(Axis(0), &order),
        };
        info!(
            "{} acquisition values: {}",
            self.acq.name(),
            candidates.values
        );
        debug!("Candidates: {}", candidates.x);
        Ok(candidates)
    }
}

/// Indices sorting values in decreasing order, nan values last
fn ranking(values: &Array1<f64>) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..values.len()).collect();
    indices.sort_by(|a, b| match (values[*a].is_nan(), values[*b].is_nan()) {
        (false, false) => values[*b]
            .partial_cmp(&values[*a])
            .unwrap_or(Ordering::Equal),
        (an, bn) => an.cmp(&bn),
    });
    indices
}

/// Maximize the acquisition function over batches of `batch_size` points within
/// (2, input_dim) `bounds` and return the best batch (batch_size, input_dim).
///
/// `4 * input_dim` local optimizations are started from the best of `120 * input_dim`
/// raw batches. `batch_limit` (default [`DEFAULT_BATCH_LIMIT`]) and `init_batch_limit`
/// (default [`DEFAULT_INIT_BATCH_LIMIT`]) bound the number of local optimizations and of
/// raw batch scorings run together.
pub fn optimize_acqf_and_get_suggested_query(
    acq: &dyn AcquisitionFunction,
    bounds: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    batch_size: usize,
    batch_limit: Option<usize>,
    init_batch_limit: Option<usize>,
) -> Result<Array2<f64>> {
    let candidates = CandidateOptimizer::new(acq, bounds)?
        .batch_size(batch_size)
        .batch_limit(batch_limit.unwrap_or(DEFAULT_BATCH_LIMIT))
        .init_batch_limit(init_batch_limit.unwrap_or(DEFAULT_INIT_BATCH_LIMIT))
        .optimize()?;
    Ok(candidates.best().to_owned())
}
