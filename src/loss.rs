//! Per-example loss computation.
//!
//! The selector is kept as the configured string and resolved at evaluation
//! time, so a bad selector surfaces with the first prediction rather than at
//! construction.

use std::fmt;
use std::str::FromStr;

use crate::constants::engine::DEFAULT_QUANTILE_TAU;
use crate::error::{Error, Result};

/// Loss functions the engine and the evaluator both understand.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LossFunction {
    Squared,
    /// Same formula as `Squared`; the engine skips its importance-aware update
    Classic,
    Hinge,
    Logistic,
    Quantile { tau: f64 },
}

impl LossFunction {
    /// Resolve a selector, using `tau` (or 0.5) for the quantile loss.
    pub fn parse(selector: &str, tau: Option<f64>) -> Result<Self> {
        match selector {
            "squared" => Ok(LossFunction::Squared),
            "classic" => Ok(LossFunction::Classic),
            "hinge" => Ok(LossFunction::Hinge),
            "logistic" => Ok(LossFunction::Logistic),
            "quantile" => Ok(LossFunction::Quantile {
                tau: tau.unwrap_or(DEFAULT_QUANTILE_TAU),
            }),
            other => Err(Error::UnknownLossFunction(other.to_string())),
        }
    }

    /// Name passed to the engine's `--loss_function`.
    pub fn name(&self) -> &'static str {
        match self {
            LossFunction::Squared => "squared",
            LossFunction::Classic => "classic",
            LossFunction::Hinge => "hinge",
            LossFunction::Logistic => "logistic",
            LossFunction::Quantile { .. } => "quantile",
        }
    }

    pub fn loss(&self, target: f64, prediction: f64) -> f64 {
        match *self {
            LossFunction::Squared | LossFunction::Classic => {
                let diff = target - prediction;
                diff * diff
            }
            LossFunction::Hinge => (1.0 - target * prediction).max(0.0),
            LossFunction::Logistic => (1.0 + (-target * prediction).exp()).ln(),
            LossFunction::Quantile { tau } => {
                let resid = target - prediction;
                if resid > 0.0 {
                    tau * resid
                } else {
                    -(1.0 - tau) * resid
                }
            }
        }
    }
}

impl FromStr for LossFunction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        LossFunction::parse(s, None)
    }
}

impl fmt::Display for LossFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Loss for one prediction under the configured selector.
pub fn loss(selector: &str, target: f64, prediction: f64, quantile_tau: Option<f64>) -> Result<f64> {
    Ok(LossFunction::parse(selector, quantile_tau)?.loss(target, prediction))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn test_squared_and_classic() {
        assert!((loss("squared", 5.0, 3.0, None).unwrap() - 4.0).abs() < EPS);
        assert!((loss("classic", 5.0, 3.0, None).unwrap() - 4.0).abs() < EPS);
        assert!((loss("squared", 3.0, 5.0, None).unwrap() - 4.0).abs() < EPS);
    }

    #[test]
    fn test_hinge() {
        assert!((loss("hinge", 1.0, 0.5, None).unwrap() - 0.5).abs() < EPS);
        assert_eq!(loss("hinge", 1.0, 2.0, None).unwrap(), 0.0);
        assert!((loss("hinge", -1.0, 0.5, None).unwrap() - 1.5).abs() < EPS);
    }

    #[test]
    fn test_logistic() {
        let got = loss("logistic", 1.0, 0.0, None).unwrap();
        assert!((got - 2f64.ln()).abs() < EPS);

        let got = loss("logistic", -1.0, 2.0, None).unwrap();
        assert!((got - (1.0 + 2f64.exp()).ln()).abs() < EPS);
    }

    #[test]
    fn test_quantile() {
        assert!((loss("quantile", 10.0, 7.0, Some(0.5)).unwrap() - 1.5).abs() < EPS);
        assert!((loss("quantile", 10.0, 7.0, Some(0.9)).unwrap() - 2.7).abs() < 1e-9);
        // Over-prediction is weighted by 1 - tau
        assert!((loss("quantile", 7.0, 10.0, Some(0.9)).unwrap() - 0.3).abs() < 1e-9);
        // Tau defaults to 0.5
        assert!((loss("quantile", 10.0, 7.0, None).unwrap() - 1.5).abs() < EPS);
    }

    #[test]
    fn test_unknown_selector() {
        let err = loss("poisson", 1.0, 1.0, None).unwrap_err();
        assert!(matches!(err, Error::UnknownLossFunction(ref name) if name == "poisson"));
        assert!("".parse::<LossFunction>().is_err());
    }

    #[test]
    fn test_names_round_trip() {
        for name in ["squared", "classic", "hinge", "logistic", "quantile"] {
            let lf: LossFunction = name.parse().unwrap();
            assert_eq!(lf.to_string(), name);
        }
    }
}
