//! LLM Leaderboard CLI
//!
//! Runs evaluations, merges partial results, aggregates reports, and shows the leaderboard.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use llm_leaderboard_cli::commands::{aggregate, config, leaderboard, merge, run, CommandContext};
use llm_leaderboard_cli::output::OutputFormat;
use llm_leaderboard_common::config::AppConfig;
use llm_leaderboard_common::init_tracing;

/// Output format for CLI commands
#[derive(Copy, Clone, Debug, Default, ValueEnum)]
pub enum CliOutputFormat {
    /// JSON output
    Json,
    /// Table output (default)
    #[default]
    Table,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(f: CliOutputFormat) -> Self {
        match f {
            CliOutputFormat::Json => OutputFormat::Json,
            CliOutputFormat::Table => OutputFormat::Table,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "llm-leaderboard")]
#[command(author, version, about = "LLM evaluation leaderboard")]
#[command(long_about = "Run evaluation suites against language models, merge partial results \
    from many runs, and aggregate them into a ranked, cost-aware leaderboard.")]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(short = 'o', long, global = true, value_enum, default_value = "table")]
    format: CliOutputFormat,

    /// Configuration file (layered over config/default and LEADERBOARD__* variables)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run evaluations against models and record suite results
    Run {
        /// Models to run (ids or provider slugs, comma separated)
        #[arg(long, value_delimiter = ',')]
        models: Option<Vec<String>>,

        /// Evaluations to run (comma separated)
        #[arg(long, value_delimiter = ',')]
        evaluations: Option<Vec<String>>,
    },

    /// Merge suite files and merged indexes into one index
    Merge {
        /// Files or directories to merge (defaults to the suites directory)
        #[arg(value_name = "FILES|DIRS")]
        inputs: Vec<PathBuf>,

        /// Where to write the merged index
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Aggregate a merged index with traces and pricing
    Aggregate {
        /// Merged index to aggregate
        #[arg(long)]
        index: Option<PathBuf>,

        /// Trace directory
        #[arg(long)]
        traces: Option<PathBuf>,

        /// Pricing catalog
        #[arg(long)]
        pricing: Option<PathBuf>,
    },

    /// Show the ranked leaderboard
    #[command(alias = "lb")]
    Leaderboard {
        /// Aggregate report to show
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let result = execute(&cli).await;

    match result {
        Ok(0) => Ok(()),
        Ok(failures) => {
            use colored::Colorize;
            eprintln!(
                "{} {} suite(s) could not be written",
                "Error:".red().bold(),
                failures
            );
            std::process::exit(1);
        }
        Err(e) => {
            use colored::Colorize;
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            if cli.verbose {
                eprintln!("\n{}", "Backtrace:".dimmed());
                eprintln!("{:?}", e);
            }
            std::process::exit(1);
        }
    }
}

/// Returns the number of suites a run failed to write
async fn execute(cli: &Cli) -> Result<usize> {
    let config = AppConfig::load(cli.config.as_deref())?;

    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        config.telemetry.log_level.clone()
    };
    init_tracing(cli.json_logs || config.telemetry.json_logging, &log_level)?;

    let ctx = CommandContext::new(config, cli.format.into());

    match &cli.command {
        Commands::Run {
            models,
            evaluations,
        } => run::run(&ctx, models.clone(), evaluations.clone()).await,
        Commands::Merge { inputs, output } => {
            merge::merge(&ctx, inputs.clone(), output.clone()).map(|_| 0)
        }
        Commands::Aggregate {
            index,
            traces,
            pricing,
        } => aggregate::aggregate(&ctx, index.clone(), traces.clone(), pricing.clone()).map(|_| 0),
        Commands::Leaderboard { report } => leaderboard::show(&ctx, report.clone()).map(|_| 0),
        Commands::Config { command } => match command {
            Some(ConfigCommands::Show) | None => config::show(&ctx).map(|_| 0),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_lists_split_on_commas() {
        let cli = Cli::parse_from([
            "llm-leaderboard",
            "run",
            "--models",
            "a,b",
            "--evaluations",
            "math",
        ]);
        match cli.command {
            Commands::Run {
                models,
                evaluations,
            } => {
                assert_eq!(models, Some(vec!["a".to_string(), "b".to_string()]));
                assert_eq!(evaluations, Some(vec!["math".to_string()]));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["llm-leaderboard", "leaderboard", "-o", "json", "--verbose"]);
        assert!(matches!(cli.format, CliOutputFormat::Json));
        assert!(cli.verbose);
    }
}
