//! Run evaluations against the selected models

use anyhow::{Context, Result};
use colored::Colorize;
use llm_leaderboard_domain::RunId;
use llm_leaderboard_worker::{load_plan, RunContext, Selection};
use tracing::info;

use crate::commands::CommandContext;
use crate::output::{colors, spinner, OutputFormat};

/// Split `a,b , c` style lists; empty entries are dropped
pub fn parse_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

pub fn selection(models: Option<Vec<String>>, evaluations: Option<Vec<String>>) -> Selection {
    Selection {
        models: models.map(|m| parse_list(&m)),
        evaluations: evaluations.map(|e| parse_list(&e)),
    }
}

/// Run every selected evaluation against every selected model.
///
/// Returns the number of suites that could not be written.
pub async fn run(
    ctx: &CommandContext,
    models: Option<Vec<String>>,
    evaluations: Option<Vec<String>>,
) -> Result<usize> {
    let run_id = RunId::new();
    let plan = load_plan(&ctx.config, run_id, &selection(models, evaluations))
        .context("Failed to plan run")?;

    let context = RunContext::from_config(&ctx.config, run_id)
        .await
        .context("Failed to set up run")?;

    let sp = (ctx.format == OutputFormat::Table).then(|| {
        spinner(&format!(
            "Running {} units across {} suites...",
            plan.unit_count(),
            plan.suite_count()
        ))
    });
    let summary = context.runner.run(&plan).await?;
    if let Some(sp) = sp {
        sp.finish_and_clear();
    }

    info!(run_id = %run_id, traces = %context.trace_path.display(), "Run finished");

    ctx.print(summary.suites.as_slice())?;
    if ctx.format == OutputFormat::Table {
        println!();
        println!("{}", summary.metrics.format());
        println!("{} {}", colors::dim("Run:"), run_id);
        println!("{} {}", colors::dim("Traces:"), context.trace_path.display());

        let failures = summary.write_failures();
        if failures > 0 {
            println!(
                "{}",
                format!("{} suite(s) could not be written", failures).red().bold()
            );
        } else {
            println!("{}", colors::success("All suites written"));
        }
    }

    Ok(summary.write_failures())
}
