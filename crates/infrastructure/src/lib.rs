//! Infrastructure layer for the LLM leaderboard
//!
//! This crate provides implementations for:
//! - The provider HTTP client (OpenAI-compatible chat completions)
//! - Generation caching (in-memory and Redis)
//! - The JSONL trace log
//! - Suite file storage
//! - Pricing catalog, model registry and evaluation catalog loaders
//!
//! ## Usage
//!
//! ```rust,ignore
//! use llm_leaderboard_infrastructure::{
//!     provider::{OpenAiCompatibleClient, ProviderClientConfig},
//!     suite_store::SuiteStore,
//! };
//!
//! let client = OpenAiCompatibleClient::new(ProviderClientConfig::new("https://openrouter.ai/api/v1"))?;
//! let store = SuiteStore::new("results/suites");
//! ```

pub mod cache;
pub mod catalog;
pub mod pricing_catalog;
pub mod provider;
pub mod suite_store;
pub mod trace_log;

use llm_leaderboard_common::io::FileError;
use std::path::{Path, PathBuf};

// Re-export commonly used types
pub use cache::{
    CacheKey, CachedGeneration, GenerationCache, InMemoryGenerationCache, RedisGenerationCache,
};
pub use catalog::{load_evaluations, load_model_registry};
pub use pricing_catalog::{load_pricing_catalog, parse_pricing_catalog};
pub use provider::{OpenAiCompatibleClient, ProviderClientConfig, ProviderResponse, TextGenerator};
pub use suite_store::{read_result_document, SuiteStore};
pub use trace_log::{read_trace_dir, InMemoryTraceSink, JsonlTraceLog, TraceSink};

pub type Result<T> = std::result::Result<T, Error>;

/// Infrastructure-level errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Cache errors from Redis
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// File read/write errors
    #[error(transparent)]
    File(#[from] FileError),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A file was readable but its content is not acceptable
    #[error("Invalid content in {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::File(FileError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Cache(_))
    }
}
