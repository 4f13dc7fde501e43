//! Output formatters

use anyhow::Result;
use serde::Serialize;

/// JSON formatter
pub struct JsonFormatter;

impl JsonFormatter {
    /// Format a value as pretty JSON
    pub fn format<T: Serialize + ?Sized>(value: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(value)?)
    }
}
