//! Confidence scoring for transcription log-probabilities.
//!
//! Transcription engines report a segment's average per-token
//! log-likelihood. These helpers turn that into a 0-100 percentage and a
//! coarse quality label. The mapping is an empirical UX heuristic, not a
//! probability transform: -0.1 maps to 96%, -0.5 to 80%, -1.0 to 60%.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Convert a raw log-probability into a confidence percentage.
///
/// Non-negative inputs are the "perfect" case and map to exactly 100.0.
/// Everything else is `100 * (1 + lp / 2.5)`, clamped to `[0, 100]` and
/// rounded to one decimal.
pub fn to_percentage(log_prob: f64) -> f64 {
    if log_prob.is_nan() {
        return 0.0;
    }
    if log_prob >= 0.0 {
        return 100.0;
    }
    let percentage = (100.0 * (1.0 + log_prob / 2.5)).clamp(0.0, 100.0);
    round_to(percentage, 1)
}

/// Unweighted mean of segment log-probabilities, or 0 when there are none.
pub fn overall_log_prob(log_probs: &[f64]) -> f64 {
    if log_probs.is_empty() {
        return 0.0;
    }
    log_probs.iter().sum::<f64>() / log_probs.len() as f64
}

/// Round to a fixed number of decimals.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Discrete confidence quality label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ConfidenceQuality {
    #[serde(rename = "Excellent")]
    Excellent,
    #[serde(rename = "Good")]
    Good,
    #[serde(rename = "Fair")]
    Fair,
    #[serde(rename = "Poor")]
    Poor,
    #[serde(rename = "Very Poor")]
    VeryPoor,
}

impl ConfidenceQuality {
    /// Classify a raw log-probability. Thresholds are checked from the most
    /// lenient down and the first match wins.
    pub fn from_log_prob(log_prob: f64) -> Self {
        if log_prob >= -0.1 {
            ConfidenceQuality::Excellent
        } else if log_prob >= -0.3 {
            ConfidenceQuality::Good
        } else if log_prob >= -0.5 {
            ConfidenceQuality::Fair
        } else if log_prob >= -1.0 {
            ConfidenceQuality::Poor
        } else {
            ConfidenceQuality::VeryPoor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceQuality::Excellent => "Excellent",
            ConfidenceQuality::Good => "Good",
            ConfidenceQuality::Fair => "Fair",
            ConfidenceQuality::Poor => "Poor",
            ConfidenceQuality::VeryPoor => "Very Poor",
        }
    }
}

impl fmt::Display for ConfidenceQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_perfect_and_positive() {
        assert_eq!(to_percentage(0.0), 100.0);
        assert_eq!(to_percentage(0.3), 100.0);
    }

    #[test]
    fn test_percentage_known_points() {
        assert_eq!(to_percentage(-0.1), 96.0);
        assert_eq!(to_percentage(-0.5), 80.0);
        assert_eq!(to_percentage(-1.0), 60.0);
        assert_eq!(to_percentage(-2.5), 0.0);
        assert_eq!(to_percentage(-10.0), 0.0);
        assert_eq!(to_percentage(-0.45), 82.0);
    }

    #[test]
    fn test_percentage_bounded_and_monotone() {
        let mut previous = to_percentage(0.0);
        let mut lp = 0.0;
        while lp > -5.0 {
            lp -= 0.01;
            let p = to_percentage(lp);
            assert!((0.0..=100.0).contains(&p), "{} out of range for {}", p, lp);
            assert!(p <= previous, "not monotone at {}", lp);
            previous = p;
        }
    }

    #[test]
    fn test_percentage_nan_is_zero() {
        assert_eq!(to_percentage(f64::NAN), 0.0);
    }

    #[test]
    fn test_quality_thresholds() {
        assert_eq!(ConfidenceQuality::from_log_prob(0.0), ConfidenceQuality::Excellent);
        assert_eq!(ConfidenceQuality::from_log_prob(-0.1), ConfidenceQuality::Excellent);
        assert_eq!(ConfidenceQuality::from_log_prob(-0.11), ConfidenceQuality::Good);
        assert_eq!(ConfidenceQuality::from_log_prob(-0.3), ConfidenceQuality::Good);
        assert_eq!(ConfidenceQuality::from_log_prob(-0.45), ConfidenceQuality::Fair);
        assert_eq!(ConfidenceQuality::from_log_prob(-0.5), ConfidenceQuality::Fair);
        assert_eq!(ConfidenceQuality::from_log_prob(-1.0), ConfidenceQuality::Poor);
        assert_eq!(ConfidenceQuality::from_log_prob(-1.01), ConfidenceQuality::VeryPoor);
    }

    #[test]
    fn test_quality_serializes_as_label() {
        let json = serde_json::to_string(&ConfidenceQuality::VeryPoor).unwrap();
        assert_eq!(json, "\"Very Poor\"");
        let back: ConfidenceQuality = serde_json::from_str("\"Fair\"").unwrap();
        assert_eq!(back, ConfidenceQuality::Fair);
    }

    #[test]
    fn test_overall_log_prob() {
        assert_eq!(overall_log_prob(&[]), 0.0);
        let mean = overall_log_prob(&[-0.05, -0.4, -0.9]);
        assert!((mean - -0.45).abs() < 1e-9);
        assert_eq!(ConfidenceQuality::from_log_prob(mean), ConfidenceQuality::Fair);
        assert_eq!(to_percentage(mean), 82.0);
    }
}
