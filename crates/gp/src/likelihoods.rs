use crate::errors::{GpError, Result};
use crate::utils::{norm_cdf, norm_pdf};
use std::f64::consts::{LN_2, PI, SQRT_2};
use std::fmt;
use std::str::FromStr;

/// Below this standardized value the probit tail uses its asymptotic expansion
const PROBIT_TAIL: f64 = -30.;

/// Link between the utility difference `d = f(winner) - f(loser)` of a comparison
/// and the probability of the observed outcome.
///
/// * `Probit`: `P = Phi(d / sqrt(2))`, Gaussian noise on utilities,
/// * `Logit`: `P = sigmoid(d)`, Gumbel noise on utilities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Likelihood {
    /// Gaussian cumulative link
    Probit,
    /// Logistic link
    #[default]
    Logit,
}

impl Likelihood {
    /// Log probability `l(d)` of the comparison outcome
    pub fn log_prob(&self, d: f64) -> f64 {
        self.derivatives(d).0
    }

    /// Probability of the comparison outcome
    pub fn prob(&self, d: f64) -> f64 {
        match self {
            Likelihood::Probit => norm_cdf(d / SQRT_2),
            Likelihood::Logit => sigmoid(d),
        }
    }

    /// Returns `(l(d), l'(d), -l''(d))`, log probability and its derivatives
    /// with respect to the utility difference. `-l''(d)` is always positive.
    pub fn derivatives(&self, d: f64) -> (f64, f64, f64) {
        match self {
            Likelihood::Probit => {
                let z = d / SQRT_2;
                let (log_cdf, r) = log_cdf_and_mills(z);
                (log_cdf, r / SQRT_2, 0.5 * r * (z + r))
            }
            Likelihood::Logit => {
                let s = sigmoid(d);
                let sm = sigmoid(-d);
                (-softplus(-d), sm, s * sm)
            }
        }
    }
}

impl fmt::Display for Likelihood {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Likelihood::Probit => write!(f, "probit"),
            Likelihood::Logit => write!(f, "logit"),
        }
    }
}

impl FromStr for Likelihood {
    type Err = GpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "probit" => Ok(Likelihood::Probit),
            "logit" => Ok(Likelihood::Logit),
            _ => Err(GpError::InvalidValueError(format!(
                "Unknown likelihood '{s}', should be 'probit' or 'logit'"
            ))),
        }
    }
}

/// Returns `(log Phi(z), phi(z) / Phi(z))`
fn log_cdf_and_mills(z: f64) -> (f64, f64) {
    if z > PROBIT_TAIL {
        let cdf = norm_cdf(z);
        (cdf.ln(), norm_pdf(z) / cdf)
    } else {
        // Phi(z) ~ phi(z) / -z * (1 - 1/z^2 + 3/z^4)
        let z2 = z * z;
        let series = 1. - 1. / z2 + 3. / (z2 * z2);
        let log_cdf = -0.5 * z2 - 0.5 * (2. * PI).ln() - (-z).ln() + series.ln();
        (log_cdf, -z / series)
    }
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0. {
        1. / (1. + (-x).exp())
    } else {
        let e = x.exp();
        e / (1. + e)
    }
}

/// log(1 + exp(x))
fn softplus(x: f64) -> f64 {
    if x > 0. {
        x + (-x).exp().ln_1p()
    } else if x == 0. {
        LN_2
    } else {
        x.exp().ln_1p()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use paste::paste;

    #[test]
    fn test_parse_likelihood() {
        assert_eq!(Likelihood::from_str("probit").unwrap(), Likelihood::Probit);
        assert_eq!(Likelihood::from_str("logit").unwrap(), Likelihood::Logit);
        assert!(Likelihood::from_str("cauchit").is_err());
        assert_eq!(Likelihood::default(), Likelihood::Logit);
        assert_eq!(Likelihood::Probit.to_string(), "probit");
    }

    #[test]
    fn test_probit_at_zero() {
        let (l, g, h) = Likelihood::Probit.derivatives(0.);
        assert_abs_diff_eq!(l, 0.5f64.ln(), epsilon = 1e-12);
        let r = norm_pdf(0.) / 0.5;
        assert_abs_diff_eq!(g, r / SQRT_2, epsilon = 1e-12);
        assert_abs_diff_eq!(h, 0.5 * r * r, epsilon = 1e-12);
    }

    #[test]
    fn test_logit_at_zero() {
        let (l, g, h) = Likelihood::Logit.derivatives(0.);
        assert_abs_diff_eq!(l, -LN_2, epsilon = 1e-12);
        assert_abs_diff_eq!(g, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(h, 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_probit_tail_is_finite() {
        for d in [-50., -43., -42., -100., -1e3] {
            let (l, g, h) = Likelihood::Probit.derivatives(d);
            assert!(l.is_finite() && g.is_finite() && h.is_finite());
            assert!(g > 0. && h > 0.);
        }
        // continuity around the switch to the asymptotic expansion
        let eps = 1e-9;
        let d0 = PROBIT_TAIL * SQRT_2;
        let (l1, g1, _) = Likelihood::Probit.derivatives(d0 + eps);
        let (l2, g2, _) = Likelihood::Probit.derivatives(d0 - eps);
        assert_abs_diff_eq!(l1, l2, epsilon = 1e-3);
        assert_abs_diff_eq!(g1, g2, epsilon = 1e-3);
    }

    #[test]
    fn test_logit_large_values() {
        let (l, g, h) = Likelihood::Logit.derivatives(-800.);
        assert_abs_diff_eq!(l, -800., epsilon = 1e-9);
        assert_abs_diff_eq!(g, 1., epsilon = 1e-12);
        assert!(h >= 0.);
        let (l, g, _) = Likelihood::Logit.derivatives(800.);
        assert_abs_diff_eq!(l, 0., epsilon = 1e-12);
        assert_abs_diff_eq!(g, 0., epsilon = 1e-12);
    }

    macro_rules! test_derivatives {
        ($lkh:ident) => {
            paste! {
                #[test]
                fn [<test_ $lkh:snake _derivatives_vs_finite_differences>]() {
                    let h = 1e-5;
                    for d in [-3., -0.7, 0.2, 1.5, 4.] {
                        let (_, g, nh) = Likelihood::$lkh.derivatives(d);
                        let fd_g = (Likelihood::$lkh.log_prob(d + h)
                            - Likelihood::$lkh.log_prob(d - h))
                            / (2. * h);
                        let fd_nh = -(Likelihood::$lkh.derivatives(d + h).1
                            - Likelihood::$lkh.derivatives(d - h).1)
                            / (2. * h);
                        assert_abs_diff_eq!(g, fd_g, epsilon = 1e-6);
                        assert_abs_diff_eq!(nh, fd_nh, epsilon = 1e-6);
                        assert_abs_diff_eq!(
                            Likelihood::$lkh.prob(d).ln(),
                            Likelihood::$lkh.log_prob(d),
                            epsilon = 1e-9
                        );
                    }
                }
            }
        };
    }

    test_derivatives!(Probit);
    test_derivatives!(Logit);
}
