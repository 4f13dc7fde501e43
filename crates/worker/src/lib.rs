//! Run orchestration for the LLM leaderboard
//!
//! This crate provides:
//! - Selection of the evaluations and models a run covers
//! - Bounded-concurrency dispatch of (test case × model) units
//! - Suite persistence as each (evaluation, model) pair completes
//! - Run metrics
//!
//! ```rust,ignore
//! let run_id = RunId::new();
//! let plan = load_plan(&config, run_id, &Selection::all())?;
//! let context = RunContext::from_config(&config, run_id).await?;
//! let summary = context.runner.run(&plan).await?;
//! ```

pub mod config;
pub mod metrics;
pub mod runner;
pub mod selection;

pub use config::{judge_model, load_plan, RunContext};
pub use metrics::{MetricsSnapshot, RunMetrics};
pub use runner::{EvaluationRunner, RunSummary, SuiteReport};
pub use selection::{RunPlan, Selection, SelectionTarget};

use llm_leaderboard_application::ApplicationError;
use thiserror::Error;

/// Errors that stop a run before or while it starts
#[derive(Error, Debug)]
pub enum RunError {
    /// A filter (or an empty catalog) left nothing to run
    #[error("selection matched no {target} (filter: {filter:?})")]
    EmptySelection {
        target: SelectionTarget,
        filter: Vec<String>,
    },

    /// Catalog, provider client, cache or trace log setup failed
    #[error(transparent)]
    Infrastructure(#[from] llm_leaderboard_infrastructure::Error),

    /// Scorer configuration rejected by the harness
    #[error(transparent)]
    Application(#[from] ApplicationError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RunError {
    pub fn error_code(&self) -> &'static str {
        match self {
            RunError::EmptySelection { .. } => "EMPTY_SELECTION",
            RunError::Infrastructure(_) => "INFRASTRUCTURE_ERROR",
            RunError::Application(e) => e.error_code(),
            RunError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_selection_message() {
        let err = RunError::EmptySelection {
            target: SelectionTarget::Evaluations,
            filter: vec!["nope".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "selection matched no evaluations (filter: [\"nope\"])"
        );
        assert_eq!(err.error_code(), "EMPTY_SELECTION");
    }

    #[test]
    fn test_application_error_code_passes_through() {
        let err = RunError::from(ApplicationError::Configuration("judge".into()));
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }
}
