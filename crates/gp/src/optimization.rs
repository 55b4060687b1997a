use crate::errors::{GpError, Result};
use crate::parameters::{ParamTuning, ThetaTuning};
use crate::utils::into_f64;
use finitediff::FiniteDiff;
use linfa::Float;
use log::{debug, warn};
use ndarray::{arr1, s, Array1, Array2, Zip};
use ndarray_rand::rand::SeedableRng;
use prefbo_doe::{Random, SamplingMethod};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use std::time::Instant;

pub(crate) struct SlsqpParams {
    pub ftol_rel: f64,
    pub max_eval: usize,
}

impl Default for SlsqpParams {
    fn default() -> Self {
        SlsqpParams {
            ftol_rel: 1e-4,
            max_eval: 100,
        }
    }
}

/// Kernel hyperparameters laid out as `[theta_1, ..., theta_nx, variance]`
/// with the indices of the ones to be optimized.
pub(crate) struct HyperParams<F: Float> {
    pub init: Array1<F>,
    pub bounds: Vec<(F, F)>,
    pub active: Vec<usize>,
}

impl<F: Float> HyperParams<F> {
    /// Expand tunings for a `dim`-dimensional input space
    pub fn new(
        theta_tuning: &ThetaTuning<F>,
        variance_tuning: &ParamTuning<F>,
        dim: usize,
    ) -> Result<Self> {
        let theta0 = expand(theta_tuning.init().as_slice_memory_order(), dim, "theta init")?;
        let mut init = theta0;
        let mut bounds = vec![(F::zero(), F::zero()); dim];
        let mut active = vec![];
        if let Some(theta_bounds) = theta_tuning.bounds() {
            let theta_bounds = expand(theta_bounds.as_slice_memory_order(), dim, "theta bounds")?;
            bounds = theta_bounds;
            active.extend(0..dim);
        }
        init.push(variance_tuning.init());
        match variance_tuning {
            ParamTuning::Fixed(_) => bounds.push((F::zero(), F::zero())),
            ParamTuning::Optimized { init: _, bounds: vb } => {
                bounds.push(*vb);
                active.push(dim);
            }
        }
        Ok(HyperParams {
            init: Array1::from_vec(init),
            bounds,
            active,
        })
    }

    /// Full hyperparameters vector given values of active ones
    pub fn with_active(&self, values: &[F]) -> Array1<F> {
        let mut params = self.init.to_owned();
        std::iter::zip(self.active.iter(), values).for_each(|(i, v)| params[*i] = *v);
        params
    }
}

fn expand<T: Copy>(values: Option<&[T]>, dim: usize, what: &str) -> Result<Vec<T>> {
    match values {
        Some([v]) => Ok(vec![*v; dim]),
        Some(vals) if vals.len() == dim => Ok(vals.to_vec()),
        Some(vals) => Err(GpError::InvalidValueError(format!(
            "{what} should be either 1-dim or dim of xtrain ({dim}), got {}",
            vals.len()
        ))),
        None => Err(GpError::InvalidValueError(format!("{what} not contiguous"))),
    }
}

pub(crate) fn prepare_multistart<F: Float>(
    n_start: usize,
    param0: &Array1<F>,
    bounds: &[(F, F)],
) -> (Array2<F>, Vec<(F, F)>) {
    // Use log10 params as optimization parameter
    let bounds: Vec<(F, F)> = bounds
        .iter()
        .map(|(lo, up)| (lo.log10(), up.log10()))
        .collect();

    // Multistart: user/default defined param0 + random values on log10 scale
    let mut params0 = Array2::zeros((n_start + 1, param0.len()));
    params0.row_mut(0).assign(&param0.mapv(|v| F::log10(v)));

    if n_start > 0 {
        let mut xlimits: Array2<F> = Array2::zeros((bounds.len(), 2));
        Zip::from(xlimits.rows_mut())
            .and(&bounds)
            .for_each(|mut row, limits| row.assign(&arr1(&[limits.0, limits.1])));
        // Seeded: starting points only have to be spread over the bounds
        let seeds =
            Random::new_with_rng(&xlimits, Xoshiro256Plus::seed_from_u64(42)).sample(n_start);
        params0.slice_mut(s![1.., ..]).assign(&seeds);
    }
    (params0, bounds)
}

/// Optimize hyper parameters given an initial guess and bounds with SLSQP
/// Objective function is evaluated on log10 scale and its gradient approximated
/// with central finite differences.
pub(crate) fn optimize_params<ObjF, F>(
    objfn: ObjF,
    param0: &Array1<F>,
    bounds: &[(F, F)],
    slsqp: SlsqpParams,
) -> (f64, Array1<f64>)
where
    ObjF: Fn(&[f64]) -> f64,
    F: Float,
{
    let obj = |x: &[f64], gradient: Option<&mut [f64]>, _params: &mut ()| -> f64 {
        if let Some(grad) = gradient {
            let f = |x: &Vec<f64>| -> f64 { objfn(x) };
            grad[..].copy_from_slice(&x.to_vec().central_diff(&f));
        }
        objfn(x)
    };

    let cons: Vec<&dyn slsqp::Func<()>> = vec![];
    let param0 = param0.map(|v| into_f64(*v)).into_raw_vec();
    let bounds: Vec<_> = bounds
        .iter()
        .map(|(lo, up)| (into_f64(*lo), into_f64(*up)))
        .collect();

    match slsqp::minimize(
        obj,
        &param0,
        &bounds,
        &cons,
        (),
        slsqp.max_eval,
        Some(slsqp::StopTols {
            ftol_rel: slsqp.ftol_rel,
            ..slsqp::StopTols::default()
        }),
    ) {
        Ok((_, x_opt, fval)) => {
            let fval = if f64::is_nan(fval) { f64::INFINITY } else { fval };
            (fval, arr1(&x_opt))
        }
        Err((status, x_opt, fval)) => {
            debug!("SLSQP optimizer in GP status={status:?}");
            let fval = if f64::is_nan(fval) { f64::INFINITY } else { fval };
            (fval, arr1(&x_opt))
        }
    }
}

/// Minimize `objfn` over the active hyperparameters with a multistart SLSQP
/// optimization run in parallel. Returns the full hyperparameters vector.
pub(crate) fn optimize_hyperparams<ObjF, F>(
    objfn: ObjF,
    hparams: &HyperParams<F>,
    n_start: usize,
    max_eval: usize,
) -> Array1<F>
where
    ObjF: Fn(&Array1<F>) -> f64 + Sync,
    F: Float,
{
    if hparams.active.is_empty() {
        return hparams.init.to_owned();
    }
    let base: f64 = 10.;
    let active_init = hparams.init.select(ndarray::Axis(0), &hparams.active);
    let active_bounds: Vec<_> = hparams.active.iter().map(|i| hparams.bounds[*i]).collect();
    let log_objfn = |x: &[f64]| -> f64 {
        // optimizer may return nan values
        if x.iter().any(|v| v.is_nan()) {
            return f64::INFINITY;
        }
        let values: Vec<F> = x.iter().map(|v| F::cast(base.powf(*v))).collect();
        objfn(&hparams.with_active(&values))
    };

    let (params0, bounds) = prepare_multistart(n_start, &active_init, &active_bounds);
    debug!("Optimize with multistart params = {params0:?} and bounds = {bounds:?}");
    let now = Instant::now();
    let (fmin, opt) = (0..params0.nrows())
        .into_par_iter()
        .map(|i| {
            optimize_params(
                log_objfn,
                &params0.row(i).to_owned(),
                &bounds,
                SlsqpParams {
                    max_eval,
                    ..SlsqpParams::default()
                },
            )
        })
        .reduce(
            || (f64::INFINITY, params0.row(0).mapv(into_f64)),
            |a, b| if b.0 < a.0 { b } else { a },
        );
    debug!("elapsed optim = {:?}", now.elapsed().as_millis());
    if fmin.is_infinite() {
        warn!("Hyperparameters optimization failed, keep initial values");
        return hparams.init.to_owned();
    }
    let values: Vec<F> = opt.iter().map(|v| F::cast(base.powf(*v))).collect();
    hparams.with_active(&values)
}
