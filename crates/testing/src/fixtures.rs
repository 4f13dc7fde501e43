//! Test fixtures for domain types with realistic data.

use chrono::{DateTime, TimeZone, Utc};
use fake::{faker::lorem::en::Sentence, Fake};
use llm_leaderboard_domain::{
    CallOutcome, CallPurpose, EvaluationDefinition, EvaluationId, ModelId, ModelVariant,
    PricingEntry, PricingTable, ProviderTier, RunId, ScorerDefinition, ScorerKind, SuiteKey,
    SuiteSnapshot, TestCase, TokenUsage, TraceRecord,
};

/// Fixed reference time; snapshots are placed `minute` minutes after it
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

pub fn at_minute(minute: u32) -> DateTime<Utc> {
    base_time() + chrono::Duration::minutes(i64::from(minute))
}

/// Create an unconstrained model whose slug is `vendor/{id}`
pub fn create_test_model(id: &str) -> ModelVariant {
    ModelVariant::new(
        id,
        format!("Model {}", id),
        format!("vendor/{}", id),
        ProviderTier::Unconstrained,
    )
}

/// Create a model on the rate-constrained tier
pub fn create_rate_constrained_model(id: &str) -> ModelVariant {
    ModelVariant {
        tier: ProviderTier::RateConstrained,
        ..create_test_model(id)
    }
}

/// Create a test case with a generated prompt
pub fn create_test_case(id: &str, expected: &str) -> TestCase {
    let input: String = Sentence(4..10).fake();
    TestCase::new(id, input, expected)
}

pub fn exact_match_scorer(name: &str) -> ScorerDefinition {
    ScorerDefinition::new(name, ScorerKind::ExactMatch { case_sensitive: false })
}

pub fn judge_scorer(name: &str, criteria: &[&str]) -> ScorerDefinition {
    ScorerDefinition::new(
        name,
        ScorerKind::Judge {
            rubric: "Grade the answer for factual accuracy.".to_string(),
            criteria: criteria.iter().map(|c| c.to_string()).collect(),
        },
    )
}

/// An evaluation with `cases` exact-match test cases expecting "ok"
pub fn create_test_evaluation(id: &str, cases: usize) -> EvaluationDefinition {
    EvaluationDefinition {
        id: EvaluationId::new(id),
        name: format!("Evaluation {}", id),
        variant: None,
        system_prompt: None,
        test_cases: (0..cases)
            .map(|i| create_test_case(&format!("{}-{}", id, i), "ok"))
            .collect(),
        scorers: vec![exact_match_scorer("exact")],
    }
}

pub fn suite_key(evaluation: &str, model: &str) -> SuiteKey {
    SuiteKey {
        evaluation: EvaluationId::new(evaluation),
        variant: None,
        model: ModelId::new(model),
    }
}

/// A clean snapshot recorded `minute` minutes after [`base_time`]
pub fn create_snapshot(score: f64, minute: u32) -> SuiteSnapshot {
    SuiteSnapshot {
        run_id: RunId::new(),
        recorded_at: at_minute(minute),
        score,
        test_cases: 4,
        generation_failures: 0,
        scoring_errors: 0,
    }
}

/// A successful trace record for `model`
pub fn create_trace(
    model: &str,
    slug: &str,
    purpose: CallPurpose,
    input_tokens: u64,
    output_tokens: u64,
) -> TraceRecord {
    TraceRecord {
        run_id: None,
        model_id: ModelId::new(model),
        slug: slug.to_string(),
        purpose,
        attempt: 1,
        outcome: CallOutcome::Success,
        usage: TokenUsage::new(input_tokens, output_tokens),
        recorded_at: base_time(),
    }
}

/// A failed attempt; failures never carry tokens
pub fn create_failed_trace(model: &str, slug: &str, attempt: u32) -> TraceRecord {
    TraceRecord {
        attempt,
        outcome: CallOutcome::Failure,
        usage: TokenUsage::default(),
        ..create_trace(model, slug, CallPurpose::Generation, 0, 0)
    }
}

/// Pricing for `vendor/{id}` slugs: `paid` at 1e-6/2e-6, `free` zero-rated
pub fn create_pricing_table() -> PricingTable {
    [
        PricingEntry::new("vendor/paid", 0.000001, 0.000002),
        PricingEntry::free("vendor/free"),
    ]
    .into_iter()
    .collect()
}
