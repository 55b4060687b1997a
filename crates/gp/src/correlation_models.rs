//! Stationary correlation models of the latent utility.
//!
//! Each model is a product over input components of a one-dimensional correlation
//! of the scaled distance `theta_j * |d_j|`, `theta` being the inverse length scales:
//! [squared exponential](SquaredExponentialCorr), [absolute exponential](AbsoluteExponentialCorr),
//! [Matérn 3/2](Matern32Corr) and [Matérn 5/2](Matern52Corr).

use linfa::Float;
use ndarray::{Array1, ArrayBase, Axis, Data, Ix1, Ix2};
use std::fmt;

/// A trait for using a correlation model in preference GP models
pub trait CorrelationModel<F: Float>: Clone + Copy + Default + fmt::Display + Sync + Send {
    /// Compute correlation values r(x, x') given differences `d` (n, nx) between x and x'
    /// and `theta` (nx,) parameters. Returns a (n,) array.
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array1<F>;
}

/// Gaussian (infinitely smooth) correlation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SquaredExponentialCorr();

impl<F: Float> CorrelationModel<F> for SquaredExponentialCorr {
    ///   d
    /// prod exp( - |theta_j * d_j|^2 / 2 )
    ///  j=1
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array1<F> {
        let theta2 = theta.mapv(|v| v * v);
        let r = d.mapv(|v| v * v).dot(&theta2);
        r.mapv(|v| (-v / F::cast(2.)).exp())
    }
}

impl fmt::Display for SquaredExponentialCorr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SquaredExponential")
    }
}

/// Exponential correlation, utility samples are continuous but not differentiable
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AbsoluteExponentialCorr();

impl<F: Float> CorrelationModel<F> for AbsoluteExponentialCorr {
    ///   d
    /// prod exp( - theta_j * |d_j| )
    ///  j=1
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array1<F> {
        let r = d.mapv(|v| v.abs()).dot(theta);
        r.mapv(|v| (-v).exp())
    }
}

impl fmt::Display for AbsoluteExponentialCorr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "AbsoluteExponential")
    }
}

/// Matérn correlation of smoothness 3/2
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Matern32Corr();

impl<F: Float> CorrelationModel<F> for Matern32Corr {
    ///   d
    /// prod (1 + sqrt(3) * theta_j * |d_j|) exp( - sqrt(3) * theta_j * |d_j| )
    ///  j=1
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array1<F> {
        let scaled = d.mapv(|v| v.abs()) * theta * F::cast(3.).sqrt();
        scaled.map_axis(Axis(1), |u| {
            u.fold(F::one(), |acc, v| acc * (F::one() + *v)) * (-u.sum()).exp()
        })
    }
}

impl fmt::Display for Matern32Corr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Matern32")
    }
}

/// Matérn correlation of smoothness 5/2
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Matern52Corr();

impl<F: Float> CorrelationModel<F> for Matern52Corr {
    ///   d
    /// prod (1 + sqrt(5) * theta_j * |d_j| + (5./3.) * theta_j^2 * |d_j|^2) exp( - sqrt(5) * theta_j * |d_j| )
    ///  j=1
    fn value(
        &self,
        d: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array1<F> {
        let scaled = d.mapv(|v| v.abs()) * theta * F::cast(5.).sqrt();
        let third = F::cast(1. / 3.);
        scaled.map_axis(Axis(1), |u| {
            u.fold(F::one(), |acc, v| acc * (F::one() + *v + third * *v * *v))
                * (-u.sum()).exp()
        })
    }
}

impl fmt::Display for Matern52Corr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Matern52")
    }
}
