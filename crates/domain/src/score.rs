//! Score results produced by scorers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Diagnostics attached to a score.
///
/// `scoring_error` is set only when the scorer itself could not produce a
/// verdict (judge call failed, malformed judge response, scorer panicked).
/// A legitimately poor answer has `scoring_error == false` even at score 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreDiagnostics {
    #[serde(default)]
    pub scoring_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, serde_json::Value>,
}

/// One scorer's verdict for one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub scorer: String,
    /// Always within [0, 1]
    pub score: f64,
    #[serde(default)]
    pub metadata: ScoreDiagnostics,
}

impl ScoreResult {
    /// Create a verdict, clamping into [0, 1]. Non-finite scores become 0.
    pub fn new(scorer: impl Into<String>, score: f64) -> Self {
        Self {
            scorer: scorer.into(),
            score: clamp_unit(score),
            metadata: ScoreDiagnostics::default(),
        }
    }

    /// A score of 0 caused by the scorer failing to run
    pub fn scoring_error(scorer: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            scorer: scorer.into(),
            score: 0.0,
            metadata: ScoreDiagnostics {
                scoring_error: true,
                reason: Some(cause.into()),
                details: BTreeMap::new(),
            },
        }
    }

    /// A score of 0 with an explanation that is not a scorer failure
    pub fn zero_with_reason(scorer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(scorer, 0.0).with_reason(reason)
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.metadata.reason = Some(reason.into());
        self
    }

    /// Attach a diagnostic detail; values that fail to serialize are skipped
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.metadata.details.insert(key.into(), v);
        }
        self
    }

    pub fn is_scoring_error(&self) -> bool {
        self.metadata.scoring_error
    }
}

/// Clamp a value into [0, 1], mapping NaN and infinities to 0
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_scoring_error_flag_serialized_camel_case() {
        let result = ScoreResult::scoring_error("judge", "judge timed out");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["metadata"]["scoringError"], true);
        assert_eq!(json["score"], 0.0);
    }

    #[test]
    fn test_low_score_is_not_an_error() {
        let result = ScoreResult::zero_with_reason("exact", "mismatch");
        assert!(!result.is_scoring_error());
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), None);
        let m = mean(&[0.9, 0.7, 0.5]).unwrap();
        assert!((m - 0.7).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_score_always_in_unit_range(raw in proptest::num::f64::ANY) {
            let result = ScoreResult::new("any", raw);
            prop_assert!((0.0..=1.0).contains(&result.score));
        }
    }
}
