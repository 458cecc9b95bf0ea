//! Linear noise schedule for the VP-SDE.
//!
//! The instantaneous noise rate grows linearly in time:
//!
//! ```text
//! β(t) = β_min + t (β_max − β_min)
//! ```
//!
//! and its integral has the closed form
//!
//! ```text
//! B(t) = ∫₀ᵗ β(s) ds = t β_min + ½ t² (β_max − β_min)
//! ```
//!
//! Every quantity of the forward marginal p(x_t | x_0) is a function of B(t)
//! alone: the mean coefficient exp(−B/2), the conditional variance
//! 1 − exp(−B) and the score scaling 1/√(1 − exp(−B)). They are all derived
//! here so that a different β(t) only has to supply a new B(t).

use ndarray::{Array, ArrayBase, Data, Dimension};
use serde::{Deserialize, Serialize};

use crate::config::DiffuserConfig;
use crate::error::{Error, Result};

/// Check that a diffusion time lies in [0, 1].
pub fn check_time(t: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&t) {
        Ok(t)
    } else {
        Err(Error::InvalidTime { t })
    }
}

/// Linear β(t) schedule between `min_b` and `max_b`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearSchedule {
    min_b: f64,
    max_b: f64,
}

impl LinearSchedule {
    /// Create a schedule. Requires `0 < min_b < max_b`.
    pub fn new(min_b: f64, max_b: f64) -> Result<Self> {
        if !(min_b > 0.0 && min_b < max_b && max_b.is_finite()) {
            return Err(Error::ConfigError(format!(
                "expected 0 < min_b < max_b, got min_b={}, max_b={}",
                min_b, max_b
            )));
        }
        Ok(Self { min_b, max_b })
    }

    /// Schedule described by a validated configuration.
    pub fn from_config(config: &DiffuserConfig) -> Result<Self> {
        Self::new(config.min_b, config.max_b)
    }

    pub fn min_b(&self) -> f64 {
        self.min_b
    }

    pub fn max_b(&self) -> f64 {
        self.max_b
    }

    /// Instantaneous noise rate β(t).
    pub fn beta(&self, t: f64) -> Result<f64> {
        let t = check_time(t)?;
        Ok(self.min_b + t * (self.max_b - self.min_b))
    }

    /// Diffusion coefficient g(t) = √β(t).
    pub fn diffusion_coef(&self, t: f64) -> Result<f64> {
        Ok(self.beta(t)?.sqrt())
    }

    /// Drift f(x, t) = −½ β(t) x.
    pub fn drift_coef<S, D>(&self, x: &ArrayBase<S, D>, t: f64) -> Result<Array<f64, D>>
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let beta = self.beta(t)?;
        Ok(x * (-0.5 * beta))
    }

    /// Integrated noise B(t) = t β_min + ½ t² (β_max − β_min).
    pub fn marginal_b_t(&self, t: f64) -> Result<f64> {
        let t = check_time(t)?;
        Ok(t * self.min_b + 0.5 * t * t * (self.max_b - self.min_b))
    }

    /// Log of the forward marginal mean coefficient, −½ B(t).
    pub fn log_mean_coeff(&self, t: f64) -> Result<f64> {
        Ok(-0.5 * self.marginal_b_t(t)?)
    }

    /// Forward marginal mean coefficient exp(−½ B(t)).
    pub fn mean_coeff(&self, t: f64) -> Result<f64> {
        Ok(self.log_mean_coeff(t)?.exp())
    }

    /// Var[x_t | x_0] = 1 − exp(−B(t)), per coordinate.
    pub fn conditional_var(&self, t: f64) -> Result<f64> {
        let b = self.marginal_b_t(t)?;
        Ok(-(-b).exp_m1())
    }

    /// Conditional variance, rejecting the t = 0 point where it vanishes.
    pub fn nonzero_conditional_var(&self, t: f64) -> Result<f64> {
        let var = self.conditional_var(t)?;
        if var > 0.0 {
            Ok(var)
        } else {
            Err(Error::ZeroVariance { t })
        }
    }

    /// Loss weight 1/√(1 − exp(−B(t))), keeping target scores O(1).
    pub fn score_scaling(&self, t: f64) -> Result<f64> {
        Ok(self.nonzero_conditional_var(t)?.sqrt().recip())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::array;

    fn schedule() -> LinearSchedule {
        LinearSchedule::new(0.1, 20.0).unwrap()
    }

    #[test]
    fn test_beta_endpoints() {
        let s = schedule();
        assert_abs_diff_eq!(s.beta(0.0).unwrap(), 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(s.beta(1.0).unwrap(), 20.0, epsilon = 1e-12);
        assert_abs_diff_eq!(s.beta(0.5).unwrap(), 10.05, epsilon = 1e-12);
        assert_abs_diff_eq!(
            s.diffusion_coef(0.5).unwrap(),
            10.05_f64.sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_out_of_range_time() {
        let s = schedule();
        for t in [-0.1, 1.5, f64::NAN] {
            assert!(matches!(s.beta(t), Err(Error::InvalidTime { .. })));
            assert!(s.marginal_b_t(t).is_err());
            assert!(s.conditional_var(t).is_err());
        }
    }

    #[test]
    fn test_marginal_b_t_monotone() {
        let s = schedule();
        let mut prev = s.marginal_b_t(0.0).unwrap();
        assert_eq!(prev, 0.0);
        for i in 1..=100 {
            let b = s.marginal_b_t(i as f64 / 100.0).unwrap();
            assert!(b >= 0.0);
            assert!(b >= prev);
            prev = b;
        }
        assert_abs_diff_eq!(prev, 10.05, epsilon = 1e-12);
    }

    #[test]
    fn test_marginal_b_t_is_integral_of_beta() {
        let s = schedule();
        let h = 1e-6;
        for t in [0.1, 0.3, 0.5, 0.9] {
            let derivative =
                (s.marginal_b_t(t + h).unwrap() - s.marginal_b_t(t - h).unwrap()) / (2.0 * h);
            assert_relative_eq!(derivative, s.beta(t).unwrap(), max_relative = 1e-6);
        }
    }

    #[test]
    fn test_conditional_var_bounds() {
        let s = schedule();
        assert_eq!(s.conditional_var(0.0).unwrap(), 0.0);
        for i in 1..=20 {
            let var = s.conditional_var(i as f64 / 20.0).unwrap();
            assert!(var > 0.0 && var < 1.0);
        }
        assert_relative_eq!(
            s.conditional_var(1.0).unwrap(),
            1.0 - (-10.05_f64).exp(),
            max_relative = 1e-12
        );
        assert!(s.conditional_var(1e-6).unwrap() < 1e-6);
    }

    #[test]
    fn test_mean_and_variance_preserve_unit_variance() {
        let s = schedule();
        for t in [0.01, 0.2, 0.7, 1.0] {
            let m = s.mean_coeff(t).unwrap();
            let var = s.conditional_var(t).unwrap();
            assert_abs_diff_eq!(m * m + var, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_score_scaling() {
        let s = schedule();
        let t = 0.5;
        let expected = 1.0 / s.conditional_var(t).unwrap().sqrt();
        assert_relative_eq!(s.score_scaling(t).unwrap(), expected, max_relative = 1e-12);
        assert!(matches!(s.score_scaling(0.0), Err(Error::ZeroVariance { .. })));
    }

    #[test]
    fn test_drift_coef() {
        let s = schedule();
        let x = array![[1.0, -2.0, 0.5]];
        let drift = s.drift_coef(&x, 1.0).unwrap();
        assert_eq!(drift, array![[-10.0, 20.0, -5.0]]);
    }

    #[test]
    fn test_invalid_bounds() {
        assert!(LinearSchedule::new(0.0, 1.0).is_err());
        assert!(LinearSchedule::new(2.0, 1.0).is_err());
        assert!(LinearSchedule::new(0.1, f64::NAN).is_err());
    }
}
