use crate::correlation_models::CorrelationModel;
use crate::errors::Result;
use linfa::Float;
use linfa_linalg::{cholesky::*, eigh::*, triangular::*};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2};
use std::f64::consts::SQRT_2;

/// Cumulative distribution function of the standard normal distribution
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * libm::erfc(-x / SQRT_2)
}

/// Probability density function of the standard normal distribution
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2. * std::f64::consts::PI).sqrt()
}

#[inline(always)]
pub(crate) fn into_f64<F: Float>(v: F) -> f64 {
    v.to_f64().unwrap_or(f64::NAN)
}

/// Computes differences between each element of x and each element of y
/// resulting in a 2d array of shape (nrows(x) * nrows(y), ncols(x));
/// *Panics* if x and y have not the same column numbers
pub(crate) fn pairwise_differences<F: Float>(
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    y: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Array2<F> {
    assert!(x.ncols() == y.ncols());

    let nx = x.nrows();
    let ny = y.nrows();
    let ncols = x.ncols();
    let mut result = Array2::zeros((nx * ny, ncols));

    for (i, x_row) in x.rows().into_iter().enumerate() {
        for (j, y_row) in y.rows().into_iter().enumerate() {
            let mut row = result.row_mut(i * ny + j);
            row.assign(&(&x_row - &y_row));
        }
    }
    result
}

/// Covariance matrix `variance * r(x_i, y_j)` of shape (nrows(x), nrows(y))
pub(crate) fn kernel_matrix<F: Float, Corr: CorrelationModel<F>>(
    corr: &Corr,
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    y: &ArrayBase<impl Data<Elem = F>, Ix2>,
    theta: &ArrayBase<impl Data<Elem = F>, Ix1>,
    variance: F,
) -> Array2<F> {
    let d = pairwise_differences(x, y);
    let r = corr.value(&d, theta) * variance;
    Array2::from_shape_vec((x.nrows(), y.nrows()), r.to_vec())
        .expect("kernel values count matches x and y rows")
}

/// Add `jitter` to the diagonal of the given square matrix
pub(crate) fn add_jitter<F: Float>(mut k: Array2<F>, jitter: F) -> Array2<F> {
    k.diag_mut().mapv_inplace(|v| v + jitter);
    k
}

/// Solve `L L^T x = b` given the lower cholesky factor `L`
pub(crate) fn cholesky_solve<F: Float>(
    l: &Array2<F>,
    b: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Result<Array2<F>> {
    let y = l.solve_triangular(b, UPLO::Lower)?;
    let x = l.t().solve_triangular_into(y, UPLO::Upper)?;
    Ok(x)
}

/// Solve `L L^T x = b` for a vector `b` given the lower cholesky factor `L`
pub(crate) fn cholesky_solve_vec<F: Float>(
    l: &Array2<F>,
    b: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> Result<Array1<F>> {
    let b = b.to_owned().insert_axis(Axis(1));
    Ok(cholesky_solve(l, &b)?.remove_axis(Axis(1)))
}

/// Inverse of the symmetric positive definite matrix which lower cholesky factor is `L`
/// as well as the sum of the logarithms of `L` diagonal (half of log determinant).
pub(crate) fn cholesky_inverse<F: Float>(l: &Array2<F>) -> Result<(Array2<F>, F)> {
    let n = l.nrows();
    let linv = l.solve_triangular(&Array2::<F>::eye(n), UPLO::Lower)?;
    let half_logdet = l.diag().mapv(|v| v.ln()).sum();
    Ok((linv.t().dot(&linv), half_logdet))
}

/// Relative jitters tried in turn by [`robust_cholesky`]
const CHOLESKY_JITTERS: [f64; 3] = [1e-8, 1e-7, 1e-6];

/// Cholesky factorization of a symmetric matrix, growing jitter being added to
/// the diagonal while the matrix is not numerically positive definite.
pub fn robust_cholesky<F: Float>(a: &Array2<F>) -> Result<Array2<F>> {
    let scale = a.diag().fold(F::zero(), |acc, v| acc.max(v.abs())).max(F::one());
    let mut res = a.cholesky();
    for jitter in CHOLESKY_JITTERS {
        if res.is_ok() {
            break;
        }
        res = add_jitter(a.to_owned(), F::cast(jitter) * scale).cholesky();
    }
    Ok(res?)
}

/// Gauss-Hermite quadrature for expectations under a standard normal distribution
///
/// Returns `(nodes, weights)` such that `E[h(Z)] ~ sum_k weights[k] * h(nodes[k])`
/// with `Z ~ N(0, 1)`. Nodes are computed with the Golub-Welsch algorithm.
pub(crate) fn gauss_hermite(n: usize) -> Result<(Array1<f64>, Array1<f64>)> {
    // Jacobi matrix of the probabilists' Hermite polynomials
    let mut jacobi = Array2::<f64>::zeros((n, n));
    for k in 1..n {
        let b = (k as f64).sqrt();
        jacobi[[k - 1, k]] = b;
        jacobi[[k, k - 1]] = b;
    }
    let (nodes, vectors) = jacobi.eigh_into()?;
    let weights = vectors.row(0).mapv(|v| v * v);
    let total = weights.sum();
    Ok((nodes, weights / total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation_models::SquaredExponentialCorr;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_pairwise_differences() {
        let x = array![[-0.9486833], [-0.82219219]];
        let y = array![
            [-1.26491106],
            [-0.63245553],
            [0.],
            [0.63245553],
            [1.26491106]
        ];
        assert_abs_diff_eq!(
            &array![
                [0.31622776],
                [-0.31622777],
                [-0.9486833],
                [-1.58113883],
                [-2.21359436],
                [0.44271887],
                [-0.18973666],
                [-0.82219219],
                [-1.45464772],
                [-2.08710325]
            ],
            &pairwise_differences(&x, &y),
            epsilon = 1e-6
        )
    }

    #[test]
    fn test_kernel_matrix() {
        let x = array![[0.], [1.]];
        let y = array![[0.], [0.5], [2.]];
        let k = kernel_matrix(&SquaredExponentialCorr(), &x, &y, &array![1.], 2.);
        assert_eq!(k.dim(), (2, 3));
        assert_abs_diff_eq!(k[[0, 0]], 2., epsilon = 1e-12);
        assert_abs_diff_eq!(k[[1, 1]], 2. * f64::exp(-0.125), epsilon = 1e-12);
        assert_abs_diff_eq!(k[[1, 2]], 2. * f64::exp(-0.5), epsilon = 1e-12);
    }

    #[test]
    fn test_cholesky_solve_and_inverse() {
        let a = array![[4., 2., 0.6], [2., 5., 1.], [0.6, 1., 3.]];
        let l = a.cholesky().unwrap();
        let b = array![1., -2., 0.5];
        let x = cholesky_solve_vec(&l, &b).unwrap();
        assert_abs_diff_eq!(a.dot(&x), b, epsilon = 1e-10);

        let (inv, half_logdet) = cholesky_inverse(&l).unwrap();
        assert_abs_diff_eq!(a.dot(&inv), Array2::eye(3), epsilon = 1e-10);
        let det = 4. * (5. * 3. - 1.) - 2. * (2. * 3. - 0.6) + 0.6 * (2. - 5. * 0.6);
        assert_abs_diff_eq!(2. * half_logdet, f64::ln(det), epsilon = 1e-10);
    }

    #[test]
    fn test_robust_cholesky_of_singular_matrix() {
        // duplicated points give a singular covariance, jitter grows until the
        // factorization succeeds even in single precision
        let a = array![[1f32, 1.], [1., 1.]];
        let l = robust_cholesky(&a).unwrap();
        assert_abs_diff_eq!(l.dot(&l.t()), a, epsilon = 1e-5);

        let a = Array2::<f64>::ones((3, 3));
        let l = robust_cholesky(&a).unwrap();
        assert_abs_diff_eq!(l.dot(&l.t()), a, epsilon = 1e-6);

        assert!(robust_cholesky(&array![[1., 0.], [0., -1.]]).is_err());
    }

    #[test]
    fn test_gauss_hermite_moments() {
        let (x, w) = gauss_hermite(20).unwrap();
        assert_abs_diff_eq!(w.sum(), 1., epsilon = 1e-12);
        assert_abs_diff_eq!((&w * &x).sum(), 0., epsilon = 1e-10);
        assert_abs_diff_eq!((&w * &x.mapv(|v| v * v)).sum(), 1., epsilon = 1e-9);
        assert_abs_diff_eq!((&w * &x.mapv(|v| v.powi(4))).sum(), 3., epsilon = 1e-8);
        // E[Phi(Z)] = 1/2
        let e = (&w * &x.mapv(norm_cdf)).sum();
        assert_abs_diff_eq!(e, 0.5, epsilon = 1e-8);
    }

    #[test]
    fn test_norm_cdf_pdf() {
        assert_abs_diff_eq!(norm_cdf(0.), 0.5, epsilon = 1e-15);
        assert_abs_diff_eq!(norm_cdf(1.96), 0.9750021048517795, epsilon = 1e-9);
        assert_abs_diff_eq!(norm_pdf(0.), 0.3989422804014327, epsilon = 1e-15);
    }
}
