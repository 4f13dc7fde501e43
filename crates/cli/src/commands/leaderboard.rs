//! Leaderboard display

use anyhow::{Context, Result};
use llm_leaderboard_common::io::read_json;
use llm_leaderboard_domain::AggregateReport;
use std::path::{Path, PathBuf};

use crate::commands::CommandContext;
use crate::output::{colors, OutputFormat};

pub fn load_report(path: &Path) -> Result<AggregateReport> {
    read_json(path).with_context(|| {
        format!(
            "Failed to read aggregate report {} (run `aggregate` first)",
            path.display()
        )
    })
}

/// Show the ranked leaderboard from an aggregate report
pub fn show(ctx: &CommandContext, report: Option<PathBuf>) -> Result<()> {
    let path = report.unwrap_or_else(|| ctx.config.paths.aggregate_report.clone());
    let report = load_report(&path)?;

    if ctx.format == OutputFormat::Table {
        println!("{}", colors::bold("Leaderboard"));
        println!();
        if report.models.is_empty() {
            println!("{}", colors::warning("No models in report."));
            return Ok(());
        }
    }

    ctx.print(&report)?;

    if ctx.format == OutputFormat::Table {
        println!(
            "{} {}",
            colors::dim("Generated:"),
            report.generated_at.format("%Y-%m-%d %H:%M UTC")
        );
        println!("{} {}", colors::dim("Ties:"), report.tie_break);
        if !report.descriptive_only.is_empty() {
            let names: Vec<&str> = report.descriptive_only.iter().map(|e| e.as_str()).collect();
            println!(
                "{} {}",
                colors::dim("Not ranked (descriptive only):"),
                names.join(", ")
            );
        }
    }
    Ok(())
}
