//! Output formatting for CLI

use anyhow::Result;
use serde::{Deserialize, Serialize};

mod formatters;
mod table;

pub use formatters::JsonFormatter;
pub use table::TableFormatter;

/// Output format enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Table output (default)
    #[default]
    Table,
}

impl OutputFormat {
    /// Parse output format from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "table" => Some(Self::Table),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Table => write!(f, "table"),
        }
    }
}

/// Something a command prints, either as a table or as JSON
pub trait Render: Serialize {
    fn render_table(&self) -> Result<String>;

    fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => JsonFormatter::format(self),
            OutputFormat::Table => self.render_table(),
        }
    }
}

/// Color helpers
pub mod colors {
    use colored::*;

    pub fn success(s: &str) -> ColoredString {
        s.green()
    }

    pub fn error(s: &str) -> ColoredString {
        s.red()
    }

    pub fn warning(s: &str) -> ColoredString {
        s.yellow()
    }

    pub fn dim(s: &str) -> ColoredString {
        s.dimmed()
    }

    pub fn bold(s: &str) -> ColoredString {
        s.bold()
    }
}

/// Spinner on stderr while a long step runs
pub fn spinner(message: &str) -> indicatif::ProgressBar {
    let pb = indicatif::ProgressBar::new_spinner();
    if let Ok(style) = indicatif::ProgressStyle::default_spinner().template("{spinner:.green} {msg}")
    {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
