//! Suites: the per-(evaluation, model) partial result of a run.

use crate::identifiers::{EvaluationId, ModelId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a suite. Two suites with equal keys describe the same
/// (evaluation, model) pair and must never both appear in a merged index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SuiteKey {
    pub evaluation: EvaluationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub model: ModelId,
}

impl fmt::Display for SuiteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "({}[{}], {})", self.evaluation, variant, self.model),
            None => write!(f, "({}, {})", self.evaluation, self.model),
        }
    }
}

/// Outcome of the run that produced a suite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteStatus {
    /// Every test case produced output
    Success,
    /// Some test cases failed to generate and were scored 0
    Partial,
    /// No test case produced output
    Error,
}

impl SuiteStatus {
    pub fn from_counts(test_cases: usize, generation_failures: usize) -> Self {
        if test_cases == 0 || generation_failures >= test_cases {
            Self::Error
        } else if generation_failures > 0 {
            Self::Partial
        } else {
            Self::Success
        }
    }
}

/// One run's contribution to a suite's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteSnapshot {
    pub run_id: RunId,
    pub recorded_at: DateTime<Utc>,
    pub score: f64,
    pub test_cases: usize,
    #[serde(default)]
    pub generation_failures: usize,
    #[serde(default)]
    pub scoring_errors: usize,
}

impl SuiteSnapshot {
    pub fn status(&self) -> SuiteStatus {
        SuiteStatus::from_counts(self.test_cases, self.generation_failures)
    }
}

/// Accumulated record for one (evaluation, model) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suite {
    pub evaluation_id: EvaluationId,
    pub evaluation_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub model_id: ModelId,
    pub model_name: String,
    /// Score of the most recent snapshot
    pub score: f64,
    pub status: SuiteStatus,
    /// Append-only, ordered by the time each run completed
    pub history: Vec<SuiteSnapshot>,
}

impl Suite {
    /// Start a suite from the first snapshot
    pub fn new(
        key: SuiteKey,
        evaluation_name: impl Into<String>,
        model_name: impl Into<String>,
        snapshot: SuiteSnapshot,
    ) -> Self {
        Self {
            evaluation_id: key.evaluation,
            evaluation_name: evaluation_name.into(),
            variant: key.variant,
            model_id: key.model,
            model_name: model_name.into(),
            score: snapshot.score,
            status: snapshot.status(),
            history: vec![snapshot],
        }
    }

    pub fn key(&self) -> SuiteKey {
        SuiteKey {
            evaluation: self.evaluation_id.clone(),
            variant: self.variant.clone(),
            model: self.model_id.clone(),
        }
    }

    /// Append a run's snapshot and make it current
    pub fn record(&mut self, snapshot: SuiteSnapshot) {
        self.score = snapshot.score;
        self.status = snapshot.status();
        self.history.push(snapshot);
    }

    pub fn latest_snapshot(&self) -> Option<&SuiteSnapshot> {
        self.history.iter().max_by(|a, b| {
            a.recorded_at
                .cmp(&b.recorded_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        })
    }

    pub fn latest_recorded_at(&self) -> Option<DateTime<Utc>> {
        self.latest_snapshot().map(|s| s.recorded_at)
    }
}
