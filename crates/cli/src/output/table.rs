//! Table formatting utilities

use anyhow::Result;
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, *};
use llm_leaderboard_domain::{AggregateReport, UsageCost, UsageReport, ValueMetric};
use llm_leaderboard_worker::SuiteReport;

use super::Render;

/// Table formatter
pub struct TableFormatter;

impl TableFormatter {
    /// Create a new table with default styling
    pub fn new() -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table
    }

    /// Create a simple table with headers and rows
    pub fn simple(headers: Vec<&str>, rows: Vec<Vec<String>>) -> Result<String> {
        let mut table = Self::new();
        table.set_header(headers);

        for row in rows {
            table.add_row(row);
        }

        Ok(table.to_string())
    }

    /// Create a key-value table
    pub fn key_value(items: Vec<(&str, String)>) -> Result<String> {
        let mut table = Self::new();

        for (key, value) in items {
            table.add_row(vec![key, &value]);
        }

        Ok(table.to_string())
    }
}

fn score_cell(score: Option<f64>) -> String {
    score.map(|s| format!("{:.4}", s)).unwrap_or_else(|| "-".to_string())
}

fn cost_cell(cost: &UsageCost) -> String {
    if cost.unpriced {
        "unpriced".to_string()
    } else if cost.free {
        "free".to_string()
    } else {
        format!("${:.4}", cost.total_cost)
    }
}

fn value_cell(value: &ValueMetric) -> String {
    match value {
        ValueMetric::Finite(v) => format!("{:.2}", v),
        ValueMetric::Unbounded => "∞".to_string(),
        ValueMetric::Unknown => "-".to_string(),
    }
}

impl Render for AggregateReport {
    fn render_table(&self) -> Result<String> {
        // category columns in first-seen order
        let mut categories: Vec<&str> = Vec::new();
        for model in &self.models {
            for name in model.category_scores.keys() {
                if !categories.contains(&name.as_str()) {
                    categories.push(name);
                }
            }
        }

        let mut headers = vec!["Rank", "Model", "Overall"];
        headers.extend(categories.iter().copied());
        headers.extend(["Tokens", "Cost", "Value"]);

        let rows = self
            .models
            .iter()
            .map(|model| {
                let mut row = vec![
                    format!("#{}", model.rank),
                    model.display_name.clone(),
                    score_cell(model.overall_score),
                ];
                row.extend(
                    categories
                        .iter()
                        .map(|c| score_cell(model.category_scores.get(*c).copied())),
                );
                row.push(model.usage.tokens.total_tokens.to_string());
                row.push(cost_cell(&model.usage.cost));
                row.push(value_cell(&model.value));
                row
            })
            .collect();

        TableFormatter::simple(headers, rows)
    }
}

impl Render for UsageReport {
    fn render_table(&self) -> Result<String> {
        let headers = vec!["Slug", "Calls", "Failed", "Input", "Output", "Cost"];
        let mut rows: Vec<Vec<String>> = self
            .entries
            .iter()
            .map(|entry| {
                vec![
                    entry.slug.clone(),
                    entry.calls.to_string(),
                    entry.failed_calls.to_string(),
                    entry.tokens.input_tokens.to_string(),
                    entry.tokens.output_tokens.to_string(),
                    cost_cell(&entry.cost),
                ]
            })
            .collect();
        rows.push(vec![
            "total (priced)".to_string(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            format!("${:.4}", self.total_cost),
        ]);

        TableFormatter::simple(headers, rows)
    }
}

impl Render for [SuiteReport] {
    fn render_table(&self) -> Result<String> {
        let headers = vec!["Evaluation", "Model", "Score", "Status", "File"];
        let rows = self
            .iter()
            .map(|suite| {
                let file = match (&suite.path, &suite.write_error) {
                    (Some(path), _) => path.display().to_string(),
                    (None, Some(error)) => format!("write failed: {}", error),
                    (None, None) => "-".to_string(),
                };
                vec![
                    suite.evaluation_name.clone(),
                    suite.model_name.clone(),
                    format!("{:.4}", suite.score),
                    format!("{:?}", suite.status).to_lowercase(),
                    file,
                ]
            })
            .collect();

        TableFormatter::simple(headers, rows)
    }
}
