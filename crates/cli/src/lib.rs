//! LLM Leaderboard CLI Library
//!
//! Command implementations and output formatting for the `llm-leaderboard` binary.

pub mod commands;
pub mod output;

pub use commands::CommandContext;
pub use output::{JsonFormatter, OutputFormat, Render, TableFormatter};

/// Re-export common types
pub use anyhow::{Context, Result};
