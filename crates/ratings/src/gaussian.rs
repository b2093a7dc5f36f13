//! Standard normal helpers and the natural-parameter Gaussian used by the factor graph.

use std::ops::{Div, Mul};

use statrs::distribution::{Continuous, ContinuousCDF, Normal};

pub fn cdf(x: f64) -> f64 {
    Normal::standard().cdf(x)
}

pub fn pdf(x: f64) -> f64 {
    Normal::standard().pdf(x)
}

/// Quantile function of the standard normal distribution.
pub fn ppf(p: f64) -> f64 {
    Normal::standard().inverse_cdf(p)
}

/// A Gaussian stored as precision (`pi`) and precision-adjusted mean (`tau`).
///
/// Products and quotients of Gaussians are additions and subtractions in this form,
/// which is what every factor message needs.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Gaussian {
    pub pi: f64,
    pub tau: f64,
}

impl Gaussian {
    pub const fn with_precision(pi: f64, tau: f64) -> Self {
        Self { pi, tau }
    }

    pub fn with_mu_sigma(mu: f64, sigma: f64) -> Self {
        let pi = sigma.powi(-2);
        Self { pi, tau: pi * mu }
    }

    pub fn mu(self) -> f64 {
        if self.pi == 0.0 { 0.0 } else { self.tau / self.pi }
    }

    pub fn sigma(self) -> f64 {
        if self.pi == 0.0 {
            f64::INFINITY
        } else {
            (1.0 / self.pi).sqrt()
        }
    }
}

impl Mul for Gaussian {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self {
            pi: self.pi + rhs.pi,
            tau: self.tau + rhs.tau,
        }
    }
}

impl Div for Gaussian {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        Self {
            pi: self.pi - rhs.pi,
            tau: self.tau - rhs.tau,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_normal() {
        assert!((cdf(0.0) - 0.5).abs() < 1e-12);
        assert!((cdf(1.96) - 0.975_002_104_851_780).abs() < 1e-9);
        assert!((cdf(-1.0) - 0.158_655_253_931_457).abs() < 1e-9);
        assert!((pdf(0.0) - 0.398_942_280_401_433).abs() < 1e-12);
        assert!(ppf(0.5).abs() < 1e-9);
        assert!((ppf(0.975) - 1.959_963_984_540_054).abs() < 1e-9);
        assert!((cdf(ppf(0.55)) - 0.55).abs() < 1e-9);
    }

    #[test]
    fn natural_parameters() {
        let g = Gaussian::with_mu_sigma(25.0, 25.0 / 3.0);
        assert!((g.mu() - 25.0).abs() < 1e-12);
        assert!((g.sigma() - 25.0 / 3.0).abs() < 1e-12);

        let empty = Gaussian::default();
        assert_eq!(empty.mu(), 0.0);
        assert!(empty.sigma().is_infinite());

        let product = g * g;
        assert!((product.mu() - 25.0).abs() < 1e-12);
        assert_eq!(product / g, g);
    }
}
