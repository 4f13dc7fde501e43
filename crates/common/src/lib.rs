//! Common utilities shared by the leaderboard crates.
//!
//! - Configuration management
//! - Retry logic with backoff
//! - Telemetry (tracing subscriber setup)
//! - Atomic JSON file I/O

pub mod config;
pub mod io;
pub mod retry;
pub mod telemetry;

// Re-export commonly used types
pub use config::{AppConfig, CacheBackend};
pub use io::{read_json, read_jsonl, write_json_atomic, FileError, JsonlRead};
pub use retry::{retry_with_backoff, retry_with_predicate, ExponentialBackoff, RetryConfig};
pub use telemetry::init_tracing;

/// Common error type used throughout the crate
pub type Result<T> = std::result::Result<T, anyhow::Error>;
