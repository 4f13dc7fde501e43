//! Configuration display

use anyhow::{Context, Result};
use llm_leaderboard_common::config::AppConfig;

use crate::commands::CommandContext;
use crate::output::{colors, JsonFormatter, OutputFormat};

/// Effective configuration as TOML
pub fn render_toml(config: &AppConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to render configuration")
}

pub fn show(ctx: &CommandContext) -> Result<()> {
    match ctx.format {
        OutputFormat::Json => println!("{}", JsonFormatter::format(&ctx.config)?),
        OutputFormat::Table => {
            println!("{}", colors::bold("Current configuration:"));
            println!("{}", render_toml(&ctx.config)?);
            let key_state = if std::env::var(&ctx.config.provider.api_key_env).is_ok() {
                colors::success("set")
            } else {
                colors::warning("not set")
            };
            println!(
                "{} {} ({})",
                colors::dim("API key:"),
                ctx.config.provider.api_key_env,
                key_state
            );
        }
    }
    Ok(())
}
