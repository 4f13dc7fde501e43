//! Judge scorer: delegates grading to a reasoning model with a structured reply.

use async_trait::async_trait;
use llm_leaderboard_common::retry::{retry_with_predicate, RetryConfig};
use llm_leaderboard_domain::{
    score::mean, CallPurpose, GenerationFailure, GenerationRequest, ModelVariant, ResponseFormat,
    ScoreResult,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::evaluators::{strip_code_fence, Scorer, ScoringInput};
use crate::dispatch::{CachePolicy, GenerationGateway};

const JUDGE_SYSTEM_PROMPT: &str = "You are a strict, impartial grader. \
Score the candidate response against the rubric. Reply only with JSON matching the schema; \
every score is a number between 0 and 1.";

/// Criterion used when a judge definition lists none
const DEFAULT_CRITERION: &str = "overall";

/// Shared judge model and retry budget
pub struct JudgeBackend {
    gateway: Arc<GenerationGateway>,
    model: ModelVariant,
    retry: RetryConfig,
}

impl JudgeBackend {
    pub fn new(gateway: Arc<GenerationGateway>, model: ModelVariant, retry: RetryConfig) -> Self {
        Self {
            gateway,
            model,
            retry,
        }
    }

    pub fn model(&self) -> &ModelVariant {
        &self.model
    }
}

/// Why a judge attempt produced no verdict
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("judge call failed: {0}")]
    Generation(GenerationFailure),

    #[error("judge returned an invalid verdict: {0}")]
    Malformed(String),
}

impl JudgeError {
    /// Invalid verdicts are retried here; provider failures were already
    /// retried by the gateway.
    pub fn is_retryable(&self) -> bool {
        matches!(self, JudgeError::Malformed(_))
    }
}

/// A validated judge reply
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeVerdict {
    pub scores: BTreeMap<String, f64>,
    pub rationale: String,
}

impl JudgeVerdict {
    pub fn score(&self) -> f64 {
        let values: Vec<f64> = self.scores.values().copied().collect();
        mean(&values).unwrap_or(0.0)
    }
}

/// Validate a raw judge reply against the requested criteria
pub fn parse_verdict(text: &str, criteria: &[String]) -> Result<JudgeVerdict, String> {
    let value: Value =
        serde_json::from_str(strip_code_fence(text)).map_err(|e| format!("not JSON: {}", e))?;

    let scores = value
        .get("scores")
        .and_then(Value::as_object)
        .ok_or("missing \"scores\" object")?;

    let mut validated = BTreeMap::new();
    for criterion in criteria {
        let score = scores
            .get(criterion)
            .ok_or_else(|| format!("criterion '{}' missing", criterion))?
            .as_f64()
            .ok_or_else(|| format!("criterion '{}' is not a number", criterion))?;
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(format!("criterion '{}' out of range: {}", criterion, score));
        }
        validated.insert(criterion.clone(), score);
    }

    let rationale = value
        .get("rationale")
        .and_then(Value::as_str)
        .ok_or("missing \"rationale\" string")?
        .to_string();

    Ok(JudgeVerdict {
        scores: validated,
        rationale,
    })
}

fn verdict_schema(criteria: &[String]) -> Value {
    let properties: serde_json::Map<String, Value> = criteria
        .iter()
        .map(|c| {
            (
                c.clone(),
                json!({"type": "number", "minimum": 0, "maximum": 1}),
            )
        })
        .collect();

    json!({
        "type": "object",
        "properties": {
            "scores": {
                "type": "object",
                "properties": properties,
                "required": criteria,
                "additionalProperties": false
            },
            "rationale": {"type": "string"}
        },
        "required": ["scores", "rationale"],
        "additionalProperties": false
    })
}

/// Scorer backed by a judge model
pub struct JudgeScorer {
    name: String,
    rubric: String,
    criteria: Vec<String>,
    backend: Arc<JudgeBackend>,
}

impl JudgeScorer {
    pub fn new(
        name: impl Into<String>,
        rubric: impl Into<String>,
        criteria: Vec<String>,
        backend: Arc<JudgeBackend>,
    ) -> Self {
        let criteria = if criteria.is_empty() {
            vec![DEFAULT_CRITERION.to_string()]
        } else {
            criteria
        };
        Self {
            name: name.into(),
            rubric: rubric.into(),
            criteria,
            backend,
        }
    }

    fn prompt(&self, input: &ScoringInput<'_>) -> String {
        let mut prompt = format!("## Rubric\n{}\n\n## Criteria\n", self.rubric);
        for criterion in &self.criteria {
            prompt.push_str("- ");
            prompt.push_str(criterion);
            prompt.push('\n');
        }
        if let Some(persona) = &input.test_case.metadata.persona {
            prompt.push_str(&format!(
                "\nThe response was asked to stay in character as: {}\n",
                persona
            ));
        }
        prompt.push_str(&format!("\n## Task\n{}\n", input.test_case.input));
        if !input.expected().trim().is_empty() {
            prompt.push_str(&format!("\n## Reference answer\n{}\n", input.expected()));
        }
        prompt.push_str(&format!("\n## Candidate response\n{}\n", input.output));
        prompt
    }

    fn request(&self, input: &ScoringInput<'_>) -> GenerationRequest {
        let model = self.backend.model();
        GenerationRequest::for_model(model, self.prompt(input))
            .with_system(Some(JUDGE_SYSTEM_PROMPT.to_string()))
            .with_response_format(ResponseFormat::JsonSchema {
                name: "judge_verdict".to_string(),
                schema: verdict_schema(&self.criteria),
            })
    }

    async fn attempt(
        &self,
        request: &GenerationRequest,
        attempt: u32,
    ) -> Result<JudgeVerdict, JudgeError> {
        // a malformed verdict may have been cached by the previous attempt
        let policy = if attempt <= 1 {
            CachePolicy::Use
        } else {
            CachePolicy::Refresh
        };

        let generation = self
            .backend
            .gateway
            .execute(self.backend.model(), request.clone(), CallPurpose::Judge, policy)
            .await
            .map_err(JudgeError::Generation)?;

        parse_verdict(&generation.text, &self.criteria).map_err(|reason| {
            warn!(scorer = %self.name, attempt, reason = %reason, "Judge returned an invalid verdict");
            JudgeError::Malformed(reason)
        })
    }
}

#[async_trait]
impl Scorer for JudgeScorer {
    #[instrument(skip_all, fields(scorer = %self.name, judge = %self.backend.model().slug))]
    async fn score(&self, input: &ScoringInput<'_>) -> ScoreResult {
        let request = self.request(input);
        let request = &request;

        let verdict = retry_with_predicate(
            self.backend.retry.clone(),
            move |attempt| self.attempt(request, attempt),
            JudgeError::is_retryable,
        )
        .await;

        match verdict {
            Ok(verdict) => {
                debug!(score = verdict.score(), "Judge verdict");
                ScoreResult::new(&self.name, verdict.score())
                    .with_detail("sub_scores", &verdict.scores)
                    .with_detail("rationale", &verdict.rationale)
                    .with_detail("judge", &self.backend.model().slug)
            }
            Err(error) => {
                warn!(error = %error, "Judge scorer gave up");
                ScoreResult::scoring_error(&self.name, error.to_string())
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchScheduler;
    use llm_leaderboard_domain::{FailureKind, TestCase};
    use llm_leaderboard_infrastructure::InMemoryTraceSink;
    use llm_leaderboard_testing::{create_test_model, failure, ok_response, ScriptedGenerator};
    use std::time::Duration;

    fn criteria() -> Vec<String> {
        vec!["accuracy".to_string(), "clarity".to_string()]
    }

    fn judge(generator: Arc<ScriptedGenerator>) -> JudgeScorer {
        let gateway = GenerationGateway::new(
            generator,
            Arc::new(DispatchScheduler::unthrottled()),
            Arc::new(InMemoryTraceSink::new()),
        )
        .with_retry(RetryConfig::new(2, Duration::from_millis(10)));
        let backend = JudgeBackend::new(
            Arc::new(gateway),
            create_test_model("judge"),
            RetryConfig::new(3, Duration::from_millis(10)),
        );
        JudgeScorer::new("judge", "Is it right?", criteria(), Arc::new(backend))
    }

    #[test]
    fn test_parse_valid_verdict() {
        let verdict = parse_verdict(
            r#"{"scores": {"accuracy": 1.0, "clarity": 0.5, "extra": 0.1}, "rationale": "fine"}"#,
            &criteria(),
        )
        .unwrap();
        assert_eq!(verdict.scores.len(), 2);
        assert!((verdict.score() - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_parse_rejects_invalid_verdicts() {
        let c = criteria();
        assert!(parse_verdict("The answer looks good", &c).is_err());
        assert!(parse_verdict(r#"{"scores": {"accuracy": 1.0}, "rationale": "x"}"#, &c).is_err());
        assert!(parse_verdict(
            r#"{"scores": {"accuracy": 1.5, "clarity": 0.5}, "rationale": "x"}"#,
            &c
        )
        .is_err());
        assert!(parse_verdict(
            r#"{"scores": {"accuracy": "high", "clarity": 0.5}, "rationale": "x"}"#,
            &c
        )
        .is_err());
        assert!(parse_verdict(r#"{"scores": {"accuracy": 1, "clarity": 0}}"#, &c).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_valid_verdict_scores_mean() {
        let generator = Arc::new(ScriptedGenerator::new().with_fallback(ok_response(
            r#"{"scores": {"accuracy": 0.8, "clarity": 0.6}, "rationale": "mostly right"}"#,
        )));
        let scorer = judge(generator.clone());
        let case = TestCase::new("t", "2+2?", "4");

        let result = scorer.score(&ScoringInput::new(&case, "4")).await;

        assert!((result.score - 0.7).abs() < 1e-9);
        assert!(!result.is_scoring_error());
        assert_eq!(result.metadata.details["rationale"], "mostly right");

        let request = &generator.requests()[0];
        assert!(matches!(request.response_format, Some(ResponseFormat::JsonSchema { .. })));
        assert!(request.prompt.contains("## Candidate response\n4"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_verdict_is_retried() {
        let generator = Arc::new(ScriptedGenerator::new().with_fallback(ok_response(
            r#"{"scores": {"accuracy": 1, "clarity": 1}, "rationale": "ok"}"#,
        )));
        generator.push(ok_response("I think it is good."));
        let scorer = judge(generator.clone());
        let case = TestCase::new("t", "q", "a");

        let result = scorer.score(&ScoringInput::new(&case, "a")).await;

        assert_eq!(result.score, 1.0);
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_judge_is_a_scoring_error() {
        let generator = Arc::new(ScriptedGenerator::new().with_fallback(ok_response("nope")));
        let scorer = judge(generator.clone());
        let case = TestCase::new("t", "q", "a");

        let result = scorer.score(&ScoringInput::new(&case, "a")).await;

        assert_eq!(result.score, 0.0);
        assert!(result.is_scoring_error());
        assert!(result
            .metadata
            .reason
            .unwrap()
            .starts_with("judge returned an invalid verdict"));
        assert_eq!(generator.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_judge_failure_is_a_scoring_error() {
        let generator =
            Arc::new(ScriptedGenerator::new().with_fallback(failure(FailureKind::ContentPolicy)));
        let scorer = judge(generator.clone());
        let case = TestCase::new("t", "q", "a");

        let result = scorer.score(&ScoringInput::new(&case, "a")).await;

        assert!(result.is_scoring_error());
        assert_eq!(generator.calls(), 1);
    }
}
