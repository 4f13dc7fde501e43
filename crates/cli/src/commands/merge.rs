//! Merge suite files and merged indexes into one index

use anyhow::{Context, Result};
use llm_leaderboard_application::{MergeConflict, MergeEngine, SkippedInput};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::commands::CommandContext;
use crate::output::{Render, TableFormatter};

/// What `merge` reports
#[derive(Debug, Serialize)]
pub struct MergeSummary {
    pub output: PathBuf,
    pub inputs: usize,
    pub evaluations: usize,
    pub suites: usize,
    pub overall_score: Option<f64>,
    pub conflicts: Vec<MergeConflict>,
    pub skipped: Vec<SkippedInput>,
}

impl Render for MergeSummary {
    fn render_table(&self) -> Result<String> {
        let mut out = TableFormatter::key_value(vec![
            ("Output", self.output.display().to_string()),
            ("Inputs read", self.inputs.to_string()),
            ("Evaluations", self.evaluations.to_string()),
            ("Suites", self.suites.to_string()),
            (
                "Overall score",
                self.overall_score
                    .map(|s| format!("{:.4}", s))
                    .unwrap_or_else(|| "-".to_string()),
            ),
            ("Conflicts", self.conflicts.len().to_string()),
            ("Skipped", self.skipped.len().to_string()),
        ])?;

        if !self.conflicts.is_empty() {
            let rows = self
                .conflicts
                .iter()
                .map(|c| {
                    vec![
                        c.key.to_string(),
                        c.kept_from.display().to_string(),
                        c.discarded_from.display().to_string(),
                        format!("{:?}", c.rule),
                    ]
                })
                .collect();
            out.push('\n');
            out.push_str(&TableFormatter::simple(
                vec!["Key", "Kept", "Discarded", "Rule"],
                rows,
            )?);
        }

        if !self.skipped.is_empty() {
            let rows = self
                .skipped
                .iter()
                .map(|s| vec![s.path.display().to_string(), s.reason.clone()])
                .collect();
            out.push('\n');
            out.push_str(&TableFormatter::simple(vec!["Skipped", "Reason"], rows)?);
        }

        Ok(out)
    }
}

/// Merge `inputs` (files or directories) and write the index to `output`
pub fn merge_to(inputs: &[PathBuf], output: &Path) -> Result<MergeSummary> {
    let engine = MergeEngine::new();
    let outcome = engine
        .merge_paths(inputs)
        .context("Merge produced no index")?;
    engine
        .write(&outcome.index, output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    Ok(MergeSummary {
        output: output.to_path_buf(),
        inputs: outcome.inputs,
        evaluations: outcome.index.evaluations.len(),
        suites: outcome.index.suite_count(),
        overall_score: outcome.index.overall_score,
        conflicts: outcome.conflicts,
        skipped: outcome.skipped,
    })
}

pub fn merge(ctx: &CommandContext, inputs: Vec<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    let inputs = if inputs.is_empty() {
        vec![ctx.config.paths.suites_dir.clone()]
    } else {
        inputs
    };
    let output = output.unwrap_or_else(|| ctx.config.paths.merged_index.clone());

    let summary = merge_to(&inputs, &output)?;
    ctx.print(&summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_leaderboard_domain::ResultDocument;
    use llm_leaderboard_infrastructure::{read_result_document, SuiteStore};
    use llm_leaderboard_testing::{create_snapshot, suite_key};

    #[test]
    fn test_merge_writes_index_that_merges_again() {
        let dir = tempfile::tempdir().unwrap();
        let store = SuiteStore::new(dir.path().join("suites"));
        store
            .record(&suite_key("e", "a"), "E", "A", create_snapshot(0.4, 1))
            .unwrap();
        store
            .record(&suite_key("e", "b"), "E", "B", create_snapshot(0.6, 2))
            .unwrap();
        let output = dir.path().join("merged.json");

        let summary = merge_to(&[store.dir().to_path_buf()], &output).unwrap();
        assert_eq!(summary.suites, 2);
        assert!(summary.conflicts.is_empty());
        assert!(matches!(
            read_result_document(&output).unwrap(),
            ResultDocument::MergedIndex(_)
        ));

        let again = merge_to(&[output.clone()], &dir.path().join("again.json")).unwrap();
        assert_eq!(again.suites, 2);
        assert_eq!(again.overall_score, summary.overall_score);
    }

    #[test]
    fn test_merge_without_valid_inputs_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("merged.json");

        let result = merge_to(&[dir.path().join("missing")], &output);

        assert!(result.is_err());
        assert!(!output.exists());
    }
}
