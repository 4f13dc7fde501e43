//! LLM Leaderboard Domain Types
//!
//! Core data model for the evaluation engine: what gets evaluated (test
//! cases, scorers, model variants), what a run produces (score results,
//! suites, trace records) and what the offline steps produce (merged index,
//! aggregate and usage reports).
//!
//! ## Architecture
//!
//! - **identifiers**: structured evaluation/model keys and run ids
//! - **model**: model variants and provider tiers
//! - **test_case**: test cases, scorer metadata contract, evaluation definitions
//! - **score**: score results with the `scoringError` flag
//! - **suite**: per-(evaluation, model) partial results and their history
//! - **generation**: provider requests and successful generations
//! - **trace**: per-call token accounting
//! - **pricing**: pricing entries, costs and the value metric
//! - **report**: merged index, aggregate report, usage report
//! - **errors**: provider failure classification
//!
//! ## Usage
//!
//! ```rust
//! use llm_leaderboard_domain::{PricingEntry, TokenUsage, ValueMetric};
//!
//! let cost = PricingEntry::new("vendor/model", 0.000002, 0.000004)
//!     .cost(&TokenUsage::new(1000, 500));
//! assert!(matches!(ValueMetric::compute(Some(0.8), &cost), ValueMetric::Finite(_)));
//! ```

#![warn(clippy::all)]

pub mod errors;
pub mod generation;
pub mod identifiers;
pub mod model;
pub mod pricing;
pub mod report;
pub mod score;
pub mod suite;
pub mod test_case;
pub mod trace;

pub use errors::{FailureKind, GenerationFailure};
pub use generation::{Generation, GenerationRequest, ResponseFormat};
pub use identifiers::*;
pub use model::{GenerationParameters, ModelVariant, ProviderTier};
pub use pricing::{PricingEntry, PricingTable, UsageCost, ValueMetric};
pub use report::{
    AggregateReport, EvaluationGroup, MergedIndex, ModelAggregate, ModelUsage, ResultDocument,
    UsageEntry, UsageReport,
};
pub use score::{ScoreDiagnostics, ScoreResult};
pub use suite::{Suite, SuiteKey, SuiteSnapshot, SuiteStatus};
pub use test_case::{
    EvaluationDefinition, MetadataField, ScorerDefinition, ScorerKind, ScorerMetadata, TestCase,
};
pub use trace::{CallOutcome, CallPurpose, TokenUsage, TraceRecord};
