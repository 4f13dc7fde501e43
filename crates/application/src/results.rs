//! Per-run accumulation of test case outcomes into suite snapshots.

use chrono::{DateTime, Utc};
use llm_leaderboard_domain::{
    score::mean, EvaluationDefinition, ModelVariant, RunId, SuiteKey, SuiteSnapshot,
};

use crate::scoring::TestCaseOutcome;

/// Collects the outcomes of one (evaluation, model) pair during a run
#[derive(Debug, Clone)]
pub struct SuiteAccumulator {
    key: SuiteKey,
    evaluation_name: String,
    model_name: String,
    outcomes: Vec<TestCaseOutcome>,
}

impl SuiteAccumulator {
    pub fn new(evaluation: &EvaluationDefinition, model: &ModelVariant) -> Self {
        Self {
            key: SuiteKey {
                evaluation: evaluation.id.clone(),
                variant: evaluation.variant.clone(),
                model: model.id.clone(),
            },
            evaluation_name: evaluation.name.clone(),
            model_name: model.display_name.clone(),
            outcomes: Vec::new(),
        }
    }

    pub fn key(&self) -> &SuiteKey {
        &self.key
    }

    pub fn evaluation_name(&self) -> &str {
        &self.evaluation_name
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn push(&mut self, outcome: TestCaseOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Mean of the per-test-case scores seen so far
    pub fn score(&self) -> f64 {
        let scores: Vec<f64> = self.outcomes.iter().map(|o| o.score).collect();
        mean(&scores).unwrap_or(0.0)
    }

    pub fn snapshot(&self, run_id: RunId, recorded_at: DateTime<Utc>) -> SuiteSnapshot {
        SuiteSnapshot {
            run_id,
            recorded_at,
            score: self.score(),
            test_cases: self.outcomes.len(),
            generation_failures: self.outcomes.iter().filter(|o| o.generation_failed()).count(),
            scoring_errors: self.outcomes.iter().map(|o| o.scoring_errors()).sum(),
        }
    }

    /// Snapshot stamped with the current time
    pub fn finish(&self, run_id: RunId) -> SuiteSnapshot {
        self.snapshot(run_id, Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_leaderboard_domain::{FailureKind, GenerationFailure, ScoreResult, SuiteStatus};
    use llm_leaderboard_testing::{create_test_evaluation, create_test_model};

    fn outcome(score: f64, failed: bool, scoring_errors: usize) -> TestCaseOutcome {
        let mut results = vec![ScoreResult::new("exact", score)];
        results.extend((0..scoring_errors).map(|_| ScoreResult::scoring_error("judge", "timeout")));
        TestCaseOutcome {
            test_case_id: "t".into(),
            score,
            results,
            generation_failure: failed
                .then(|| GenerationFailure::new(FailureKind::Timeout, "slow")),
        }
    }

    #[test]
    fn test_score_is_mean_of_test_cases() {
        let mut acc = SuiteAccumulator::new(&create_test_evaluation("e", 3), &create_test_model("m"));
        acc.push(outcome(1.0, false, 0));
        acc.push(outcome(0.5, false, 1));
        acc.push(outcome(0.0, true, 0));

        let snapshot = acc.finish(RunId::new());

        assert!((snapshot.score - 0.5).abs() < 1e-12);
        assert_eq!(snapshot.test_cases, 3);
        assert_eq!(snapshot.generation_failures, 1);
        assert_eq!(snapshot.scoring_errors, 1);
        assert_eq!(snapshot.status(), SuiteStatus::Partial);
    }

    #[test]
    fn test_key_carries_variant() {
        let mut evaluation = create_test_evaluation("persona", 1);
        evaluation.variant = Some("pirate".into());
        let acc = SuiteAccumulator::new(&evaluation, &create_test_model("m"));

        assert_eq!(acc.key().variant.as_deref(), Some("pirate"));
        assert_eq!(acc.model_name(), "Model m");
        assert_eq!(acc.score(), 0.0);
    }
}
