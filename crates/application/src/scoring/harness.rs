//! Scorer harness - runs every scorer of an evaluation against one output
//!
//! Scorers run concurrently and in isolation: a panic or a judge failure
//! affects only the result of the scorer it happened in.

use futures::future::join_all;
use futures::FutureExt;
use llm_leaderboard_domain::{
    score::mean, Generation, GenerationFailure, ScoreResult, ScorerDefinition, ScorerKind,
    TestCase,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::evaluators::{deterministic_scorer, Scorer, ScoringInput};
use super::judge::{JudgeBackend, JudgeScorer};
use crate::{ApplicationError, ApplicationResult};

/// What the gateway produced for a test case
pub type GenerationOutput = Result<Generation, GenerationFailure>;

/// Scores for one test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCaseOutcome {
    pub test_case_id: String,
    /// Mean of the scorer results
    pub score: f64,
    pub results: Vec<ScoreResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_failure: Option<GenerationFailure>,
}

impl TestCaseOutcome {
    pub fn generation_failed(&self) -> bool {
        self.generation_failure.is_some()
    }

    pub fn scoring_errors(&self) -> usize {
        self.results.iter().filter(|r| r.is_scoring_error()).count()
    }
}

struct RegisteredScorer {
    definition: ScorerDefinition,
    scorer: Arc<dyn Scorer>,
}

/// Runs a fixed set of scorers per test case
pub struct ScorerHarness {
    scorers: Vec<RegisteredScorer>,
}

impl ScorerHarness {
    pub fn new() -> Self {
        Self {
            scorers: Vec::new(),
        }
    }

    /// Build scorers for `definitions`; judge kinds need a `judge` backend
    pub fn from_definitions(
        definitions: &[ScorerDefinition],
        judge: Option<Arc<JudgeBackend>>,
    ) -> ApplicationResult<Self> {
        let mut harness = Self::new();

        for definition in definitions {
            let scorer = match &definition.kind {
                ScorerKind::Judge { rubric, criteria } => {
                    let backend = judge.clone().ok_or_else(|| {
                        ApplicationError::Configuration(format!(
                            "scorer '{}' needs a judge model",
                            definition.name
                        ))
                    })?;
                    Arc::new(JudgeScorer::new(
                        definition.name.clone(),
                        rubric.clone(),
                        criteria.clone(),
                        backend,
                    )) as Arc<dyn Scorer>
                }
                _ => deterministic_scorer(definition).ok_or_else(|| {
                    ApplicationError::Internal(format!("no scorer for '{}'", definition.name))
                })?,
            };
            harness.register(definition.clone(), scorer);
        }

        Ok(harness)
    }

    /// Add a scorer; its results are reported under `definition.name`
    pub fn register(&mut self, definition: ScorerDefinition, scorer: Arc<dyn Scorer>) {
        self.scorers.push(RegisteredScorer { definition, scorer });
    }

    pub fn len(&self) -> usize {
        self.scorers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scorers.is_empty()
    }

    /// Score `output` for `test_case`: one result per registered scorer
    #[instrument(skip(self, test_case, output), fields(test_case = %test_case.id))]
    pub async fn score(&self, test_case: &TestCase, output: &GenerationOutput) -> TestCaseOutcome {
        let results = match output {
            Ok(generation) => {
                let input = ScoringInput::new(test_case, &generation.text);
                join_all(self.scorers.iter().map(|s| Self::run_one(s, &input))).await
            }
            Err(failure) => self
                .scorers
                .iter()
                .map(|s| {
                    ScoreResult::zero_with_reason(
                        &s.definition.name,
                        format!("generation failed: {}", failure.kind),
                    )
                    .with_detail("generation_failure", &failure.message)
                })
                .collect(),
        };

        let scores: Vec<f64> = results.iter().map(|r| r.score).collect();
        let outcome = TestCaseOutcome {
            test_case_id: test_case.id.clone(),
            score: mean(&scores).unwrap_or(0.0),
            results,
            generation_failure: output.as_ref().err().cloned(),
        };

        debug!(
            score = outcome.score,
            scoring_errors = outcome.scoring_errors(),
            "Test case scored"
        );
        outcome
    }

    async fn run_one(registered: &RegisteredScorer, input: &ScoringInput<'_>) -> ScoreResult {
        let name = &registered.definition.name;

        if let Some(violation) = input
            .test_case
            .metadata
            .contract_violation(&registered.definition.kind)
        {
            return ScoreResult::zero_with_reason(name, violation);
        }

        match AssertUnwindSafe(registered.scorer.score(input))
            .catch_unwind()
            .await
        {
            Ok(mut result) => {
                result.scorer = name.clone();
                if result.is_scoring_error() {
                    warn!(
                        scorer = %name,
                        reason = result.metadata.reason.as_deref().unwrap_or(""),
                        "Scorer reported an error"
                    );
                }
                result
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(scorer = %name, panic = %message, "Scorer panicked");
                ScoreResult::scoring_error(name, format!("scorer panicked: {}", message))
            }
        }
    }
}

impl Default for ScorerHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
