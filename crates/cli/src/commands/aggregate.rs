//! Aggregate a merged index with traces and pricing into the reports

use anyhow::{bail, Context, Result};
use llm_leaderboard_application::{AggregationEngine, AggregationOutput};
use llm_leaderboard_common::config::AggregationConfig;
use llm_leaderboard_common::io::write_json_atomic;
use llm_leaderboard_domain::ResultDocument;
use llm_leaderboard_infrastructure::{load_pricing_catalog, read_result_document, read_trace_dir};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::commands::CommandContext;
use crate::output::{colors, OutputFormat};

/// Inputs and outputs of one aggregation
#[derive(Debug, Clone)]
pub struct AggregatePaths {
    pub index: PathBuf,
    pub traces: PathBuf,
    pub pricing: PathBuf,
    pub report: PathBuf,
    pub usage: PathBuf,
}

/// Read the inputs, aggregate, and write both reports atomically
pub fn aggregate_files(config: &AggregationConfig, paths: &AggregatePaths) -> Result<AggregationOutput> {
    let index = match read_result_document(&paths.index)
        .with_context(|| format!("Failed to read merged index {}", paths.index.display()))?
    {
        ResultDocument::MergedIndex(index) => index,
        ResultDocument::Suite(_) => bail!(
            "{} is a suite file; run `merge` first",
            paths.index.display()
        ),
    };

    // traces are required: an unreadable trace directory is fatal
    let traces = read_trace_dir(&paths.traces)
        .with_context(|| format!("Failed to read traces from {}", paths.traces.display()))?;
    let pricing = load_pricing_catalog(&paths.pricing)
        .with_context(|| format!("Failed to load pricing from {}", paths.pricing.display()))?;

    let output = AggregationEngine::new(config)?.aggregate(&index, &traces, &pricing)?;

    write_report(&paths.report, &output.report)?;
    write_report(&paths.usage, &output.usage)?;
    info!(
        models = output.report.models.len(),
        report = %paths.report.display(),
        usage = %paths.usage.display(),
        "Reports written"
    );
    Ok(output)
}

fn write_report<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    write_json_atomic(path, value).with_context(|| format!("Failed to write {}", path.display()))
}

pub fn aggregate(
    ctx: &CommandContext,
    index: Option<PathBuf>,
    traces: Option<PathBuf>,
    pricing: Option<PathBuf>,
) -> Result<()> {
    let paths = &ctx.config.paths;
    let paths = AggregatePaths {
        index: index.unwrap_or_else(|| paths.merged_index.clone()),
        traces: traces.unwrap_or_else(|| paths.traces_dir.clone()),
        pricing: pricing.unwrap_or_else(|| paths.pricing_catalog.clone()),
        report: paths.aggregate_report.clone(),
        usage: paths.usage_report.clone(),
    };

    let output = aggregate_files(&ctx.config.aggregation, &paths)?;

    ctx.print(&output.report)?;
    if ctx.format == OutputFormat::Table {
        println!();
        ctx.print(&output.usage)?;
        if !output.usage.unpriced_slugs.is_empty() {
            println!(
                "{} {}",
                colors::warning("Unpriced:"),
                output.usage.unpriced_slugs.join(", ")
            );
        }
        println!("{} {}", colors::dim("Report:"), paths.report.display());
        println!("{} {}", colors::dim("Usage:"), paths.usage.display());
    }
    Ok(())
}
