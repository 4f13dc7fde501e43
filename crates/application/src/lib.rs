//! Application layer for the LLM leaderboard
//!
//! This crate holds the evaluation engine itself and coordinates the domain
//! and infrastructure layers.
//!
//! ## Modules
//!
//! - `dispatch` - Dispatch scheduler and generation gateway
//! - `scoring` - Deterministic scorers, judge scorer and the scorer harness
//! - `results` - Per-run accumulation of test case outcomes into suites
//! - `merge` - Idempotent merge of suite files into a merged index
//! - `aggregation` - Category, overall, cost and value aggregation with ranking

pub mod aggregation;
pub mod dispatch;
pub mod merge;
pub mod results;
pub mod scoring;

// Re-export commonly used types
pub use aggregation::{AggregationEngine, AggregationError, AggregationOutput, TIE_BREAK_RULE};
pub use dispatch::{CachePolicy, DispatchScheduler, GenerationGateway};
pub use merge::{MergeConflict, MergeEngine, MergeError, MergeOutcome, SkippedInput};
pub use results::SuiteAccumulator;
pub use scoring::{
    GenerationOutput, JudgeBackend, JudgeScorer, Scorer, ScorerHarness, ScoringInput,
    TestCaseOutcome,
};

use thiserror::Error;

/// Application-level errors
#[derive(Error, Debug, Clone)]
pub enum ApplicationError {
    /// Missing or inconsistent configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Storage, cache or catalog failure
    #[error("Infrastructure error: {0}")]
    Infrastructure(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApplicationError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApplicationError::Infrastructure(_))
    }

    /// Get error code for reporting
    pub fn error_code(&self) -> &'static str {
        match self {
            ApplicationError::Configuration(_) => "CONFIGURATION_ERROR",
            ApplicationError::Infrastructure(_) => "INFRASTRUCTURE_ERROR",
            ApplicationError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<llm_leaderboard_infrastructure::Error> for ApplicationError {
    fn from(err: llm_leaderboard_infrastructure::Error) -> Self {
        ApplicationError::Infrastructure(err.to_string())
    }
}

pub type ApplicationResult<T> = Result<T, ApplicationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ApplicationError::Configuration("x".to_string()).error_code(),
            "CONFIGURATION_ERROR"
        );
        assert_eq!(ApplicationError::Internal("x".to_string()).error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_error_retryable() {
        assert!(ApplicationError::Infrastructure("redis down".to_string()).is_retryable());
        assert!(!ApplicationError::Configuration("no judge".to_string()).is_retryable());
    }

    #[test]
    fn test_from_infrastructure_error() {
        let err: ApplicationError = llm_leaderboard_infrastructure::Error::Configuration(
            "missing url".to_string(),
        )
        .into();
        assert_eq!(err.to_string(), "Infrastructure error: Configuration error: missing url");
    }
}
