//! CLI commands

pub mod aggregate;
pub mod config;
pub mod leaderboard;
pub mod merge;
pub mod run;

use crate::output::{OutputFormat, Render};
use anyhow::Result;
use llm_leaderboard_common::config::AppConfig;

/// Context passed to all commands
pub struct CommandContext {
    pub config: AppConfig,
    pub format: OutputFormat,
}

impl CommandContext {
    pub fn new(config: AppConfig, format: OutputFormat) -> Self {
        Self { config, format }
    }

    /// Print `value` to stdout in the selected format
    pub fn print<T: Render + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", value.render(self.format)?);
        Ok(())
    }
}
