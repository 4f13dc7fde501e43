//! Testing utilities for the LLM leaderboard
//!
//! This crate provides:
//! - Fixtures for domain types (models, test cases, suites, traces)
//! - Builders for evaluations and suites with custom histories
//! - A scripted provider that stands in for the HTTP client
//!
//! # Examples
//!
//! ```
//! use llm_leaderboard_testing::{builders::*, fixtures::*};
//!
//! let model = create_test_model("acme-7b");
//! let suite = SuiteBuilder::new("capitals", "acme-7b")
//!     .with_snapshot(0.75, 10)
//!     .build();
//! assert_eq!(suite.score, 0.75);
//! ```

pub mod builders;
pub mod fixtures;
pub mod mocks;

// Re-export commonly used types
pub use builders::*;
pub use fixtures::*;
pub use mocks::*;

// Re-export testing dependencies for convenience
pub use fake;
pub use proptest;
pub use wiremock;
