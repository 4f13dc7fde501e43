//! Merge engine - consolidates suite files and merged indexes
//!
//! The merge is a pure fold over suites keyed by [`SuiteKey`]: the winner of
//! a duplicate key is chosen by a total order and histories are unioned, so
//! the result depends neither on input order nor on how often an input was
//! merged before.

use chrono::Utc;
use llm_leaderboard_common::io::{list_files, write_json_atomic, FileError};
use llm_leaderboard_domain::{
    score::mean, EvaluationGroup, EvaluationId, MergedIndex, ResultDocument, Suite, SuiteKey,
    SuiteSnapshot,
};
use llm_leaderboard_infrastructure::read_result_document;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Which comparison decided a duplicate key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictRule {
    LatestSnapshot,
    LatestRunId,
    HigherScore,
    /// Same snapshot time, run and score
    Tie,
}

/// A duplicate key and how it was resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeConflict {
    pub key: SuiteKey,
    pub kept_from: PathBuf,
    pub discarded_from: PathBuf,
    pub kept_score: f64,
    pub discarded_score: f64,
    pub rule: ConflictRule,
}

/// An input that contributed nothing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedInput {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub index: MergedIndex,
    pub conflicts: Vec<MergeConflict>,
    pub skipped: Vec<SkippedInput>,
    /// Files that were read successfully
    pub inputs: usize,
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("no valid input files ({skipped} skipped)")]
    NoValidInput { skipped: usize },

    #[error(transparent)]
    Write(#[from] FileError),
}

pub type MergeResult<T> = Result<T, MergeError>;

/// Merge engine
#[derive(Debug, Clone, Default)]
pub struct MergeEngine;

impl MergeEngine {
    pub fn new() -> Self {
        Self
    }

    /// Read and merge `inputs`; directories contribute their `*.json` files.
    ///
    /// Unreadable inputs are skipped with a diagnostic. Nothing is written.
    #[instrument(skip(self, inputs), fields(inputs = inputs.len()))]
    pub fn merge_paths(&self, inputs: &[PathBuf]) -> MergeResult<MergeOutcome> {
        let (files, mut skipped) = collect_inputs(inputs);

        let mut documents = Vec::with_capacity(files.len());
        for path in files {
            match read_result_document(&path) {
                Ok(document) => documents.push((path, document)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable input");
                    skipped.push(SkippedInput {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if documents.is_empty() {
            return Err(MergeError::NoValidInput {
                skipped: skipped.len(),
            });
        }

        let inputs = documents.len();
        let (index, conflicts) = self.merge_documents(documents);

        info!(
            inputs,
            suites = index.suite_count(),
            conflicts = conflicts.len(),
            skipped = skipped.len(),
            "Merge complete"
        );

        Ok(MergeOutcome {
            index,
            conflicts,
            skipped,
            inputs,
        })
    }

    /// Merge already-parsed documents
    pub fn merge_documents(
        &self,
        documents: Vec<(PathBuf, ResultDocument)>,
    ) -> (MergedIndex, Vec<MergeConflict>) {
        let mut slots: BTreeMap<SuiteKey, (Suite, PathBuf)> = BTreeMap::new();
        let mut conflicts = Vec::new();

        for (path, document) in documents {
            for suite in document.into_suites() {
                let suite = normalized(suite);
                match slots.entry(suite.key()) {
                    Entry::Vacant(slot) => {
                        slot.insert((suite, path.clone()));
                    }
                    Entry::Occupied(mut slot) => {
                        let (current, current_path) = slot.get_mut();
                        let conflict = resolve(current, current_path, suite, &path);
                        log_conflict(&conflict);
                        conflicts.push(conflict);
                    }
                }
            }
        }

        conflicts.sort_by(|a, b| a.key.cmp(&b.key));
        (build_index(slots.into_values().map(|(suite, _)| suite)), conflicts)
    }

    /// Write the index atomically as a `merged_index` document
    pub fn write(&self, index: &MergedIndex, path: &Path) -> MergeResult<()> {
        write_json_atomic(path, &ResultDocument::MergedIndex(index.clone()))?;
        debug!(path = %path.display(), "Merged index written");
        Ok(())
    }
}

/// Expand directories and drop missing paths
pub fn collect_inputs(inputs: &[PathBuf]) -> (Vec<PathBuf>, Vec<SkippedInput>) {
    let mut files = Vec::new();
    let mut skipped = Vec::new();

    for input in inputs {
        if input.is_dir() {
            match list_files(input, "json") {
                Ok(found) => files.extend(found),
                Err(e) => skipped.push(SkippedInput {
                    path: input.clone(),
                    reason: e.to_string(),
                }),
            }
        } else if input.is_file() {
            files.push(input.clone());
        } else {
            warn!(path = %input.display(), "Skipping missing input");
            skipped.push(SkippedInput {
                path: input.clone(),
                reason: "not found".to_string(),
            });
        }
    }

    files.sort();
    files.dedup();
    (files, skipped)
}

/// Precedence of `a` over `b` and the rule that decided it
fn precedence(a: &Suite, b: &Suite) -> (Ordering, ConflictRule) {
    let (latest_a, latest_b) = (a.latest_snapshot(), b.latest_snapshot());

    let by_time = latest_a
        .map(|s| s.recorded_at)
        .cmp(&latest_b.map(|s| s.recorded_at));
    if by_time != Ordering::Equal {
        return (by_time, ConflictRule::LatestSnapshot);
    }

    let by_run = latest_a.map(|s| s.run_id).cmp(&latest_b.map(|s| s.run_id));
    if by_run != Ordering::Equal {
        return (by_run, ConflictRule::LatestRunId);
    }

    let by_score = a.score.total_cmp(&b.score);
    if by_score != Ordering::Equal {
        return (by_score, ConflictRule::HigherScore);
    }

    // display fields only, so the winner does not depend on input order
    let rest = a
        .evaluation_name
        .cmp(&b.evaluation_name)
        .then_with(|| a.model_name.cmp(&b.model_name))
        .then_with(|| format!("{:?}", a.status).cmp(&format!("{:?}", b.status)));
    (rest, ConflictRule::Tie)
}

fn resolve(
    current: &mut Suite,
    current_path: &mut PathBuf,
    incoming: Suite,
    incoming_path: &Path,
) -> MergeConflict {
    let (ordering, rule) = precedence(&incoming, current);
    let incoming_wins = ordering == Ordering::Greater;

    let conflict = MergeConflict {
        key: current.key(),
        kept_from: if incoming_wins {
            incoming_path.to_path_buf()
        } else {
            current_path.clone()
        },
        discarded_from: if incoming_wins {
            current_path.clone()
        } else {
            incoming_path.to_path_buf()
        },
        kept_score: if incoming_wins { incoming.score } else { current.score },
        discarded_score: if incoming_wins { current.score } else { incoming.score },
        rule,
    };

    let loser_history = if incoming_wins {
        let previous = std::mem::replace(current, incoming);
        *current_path = incoming_path.to_path_buf();
        previous.history
    } else {
        incoming.history
    };

    let mut history = std::mem::take(&mut current.history);
    history.extend(loser_history);
    current.history = normalize_history(history);

    conflict
}

fn log_conflict(conflict: &MergeConflict) {
    if conflict.rule == ConflictRule::Tie && conflict.kept_score == conflict.discarded_score {
        debug!(key = %conflict.key, "Duplicate suite with identical result");
    } else {
        warn!(
            key = %conflict.key,
            rule = ?conflict.rule,
            kept = %conflict.kept_from.display(),
            discarded = %conflict.discarded_from.display(),
            kept_score = conflict.kept_score,
            discarded_score = conflict.discarded_score,
            "Duplicate suite resolved"
        );
    }
}

fn normalized(mut suite: Suite) -> Suite {
    suite.history = normalize_history(std::mem::take(&mut suite.history));
    suite
}

/// One snapshot per run, oldest first
fn normalize_history(mut history: Vec<SuiteSnapshot>) -> Vec<SuiteSnapshot> {
    // within a run id, prefer the later and then the higher-scoring copy
    history.sort_by(|a, b| {
        a.run_id
            .cmp(&b.run_id)
            .then_with(|| b.recorded_at.cmp(&a.recorded_at))
            .then_with(|| b.score.total_cmp(&a.score))
            .then_with(|| b.test_cases.cmp(&a.test_cases))
            .then_with(|| b.generation_failures.cmp(&a.generation_failures))
            .then_with(|| b.scoring_errors.cmp(&a.scoring_errors))
    });
    history.dedup_by(|later, earlier| later.run_id == earlier.run_id);
    history.sort_by(|a, b| {
        a.recorded_at
            .cmp(&b.recorded_at)
            .then_with(|| a.run_id.cmp(&b.run_id))
    });
    history
}

fn build_index(suites: impl Iterator<Item = Suite>) -> MergedIndex {
    let mut groups: BTreeMap<EvaluationId, Vec<Suite>> = BTreeMap::new();
    for suite in suites {
        groups
            .entry(suite.evaluation_id.clone())
            .or_default()
            .push(suite);
    }

    let mut evaluations: Vec<EvaluationGroup> = groups
        .into_iter()
        .map(|(evaluation_id, mut suites)| {
            suites.sort_by(|a, b| {
                a.model_name
                    .cmp(&b.model_name)
                    .then_with(|| a.model_id.cmp(&b.model_id))
                    .then_with(|| a.variant.cmp(&b.variant))
            });
            // the most recently recorded suite names the group
            let evaluation_name = suites
                .iter()
                .max_by(|a, b| {
                    a.latest_recorded_at()
                        .cmp(&b.latest_recorded_at())
                        .then_with(|| b.evaluation_name.cmp(&a.evaluation_name))
                })
                .map(|s| s.evaluation_name.clone())
                .unwrap_or_else(|| evaluation_id.to_string());
            EvaluationGroup {
                evaluation_id,
                evaluation_name,
                suites,
            }
        })
        .collect();

    evaluations.sort_by(|a, b| {
        a.evaluation_name
            .cmp(&b.evaluation_name)
            .then_with(|| a.evaluation_id.cmp(&b.evaluation_id))
    });

    let scores: Vec<f64> = evaluations
        .iter()
        .flat_map(|g| g.suites.iter().map(|s| s.score))
        .collect();

    MergedIndex {
        generated_at: Utc::now(),
        evaluations,
        overall_score: mean(&scores),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_leaderboard_domain::RunId;
    use llm_leaderboard_testing::{create_snapshot, SuiteBuilder};
    use proptest::prelude::*;

    fn doc(name: &str, suite: Suite) -> (PathBuf, ResultDocument) {
        (PathBuf::from(name), ResultDocument::Suite(suite))
    }

    #[test]
    fn test_groups_sorted_by_evaluation_then_model_name() {
        let engine = MergeEngine::new();
        let (index, conflicts) = engine.merge_documents(vec![
            doc("1.json", SuiteBuilder::new("z", "m1").with_names("Alpha", "Zed").with_snapshot(0.2, 1).build()),
            doc("2.json", SuiteBuilder::new("a", "m2").with_names("Beta", "Ann").with_snapshot(0.4, 1).build()),
            doc("3.json", SuiteBuilder::new("z", "m3").with_names("Alpha", "Bob").with_snapshot(0.6, 1).build()),
        ]);

        assert!(conflicts.is_empty());
        let names: Vec<&str> = index.evaluations.iter().map(|g| g.evaluation_name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);
        let models: Vec<&str> = index.evaluations[0].suites.iter().map(|s| s.model_name.as_str()).collect();
        assert_eq!(models, vec!["Bob", "Zed"]);
        assert!((index.overall_score.unwrap() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_most_recent_snapshot_wins_and_history_is_kept() {
        let engine = MergeEngine::new();
        let old = SuiteBuilder::new("e", "m").with_snapshot(0.9, 5).build();
        let new = SuiteBuilder::new("e", "m").with_snapshot(0.3, 30).build();

        let (index, conflicts) = engine.merge_documents(vec![doc("new.json", new), doc("old.json", old)]);

        assert_eq!(index.suite_count(), 1);
        let suite = index.suites().next().unwrap();
        assert_eq!(suite.score, 0.3);
        assert_eq!(suite.history.len(), 2);
        assert!(suite.history[0].recorded_at < suite.history[1].recorded_at);

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].rule, ConflictRule::LatestSnapshot);
        assert_eq!(conflicts[0].kept_from, PathBuf::from("new.json"));
        assert_eq!(conflicts[0].discarded_score, 0.9);
    }

    #[test]
    fn test_same_run_is_not_duplicated_in_history() {
        let engine = MergeEngine::new();
        let run = RunId::new();
        let a = SuiteBuilder::new("e", "m").with_run(run, 0.5, 10).build();

        let (index, conflicts) = engine.merge_documents(vec![doc("a.json", a.clone()), doc("b.json", a)]);

        assert_eq!(index.suites().next().unwrap().history.len(), 1);
        assert_eq!(conflicts[0].rule, ConflictRule::Tie);
    }

    #[test]
    fn test_variants_are_distinct_keys() {
        let engine = MergeEngine::new();
        let (index, conflicts) = engine.merge_documents(vec![
            doc("a.json", SuiteBuilder::new("persona", "m").with_variant("pirate").with_snapshot(0.5, 1).build()),
            doc("b.json", SuiteBuilder::new("persona", "m").with_variant("poet").with_snapshot(0.7, 1).build()),
        ]);

        assert!(conflicts.is_empty());
        assert_eq!(index.evaluations.len(), 1);
        assert_eq!(index.suite_count(), 2);
    }

    #[test]
    fn test_unreadable_inputs_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        let bad = dir.path().join("bad.json");
        let engine = MergeEngine::new();

        let suite = SuiteBuilder::new("e", "m").with_snapshot(0.5, 1).build();
        write_json_atomic(&good, &ResultDocument::Suite(suite)).unwrap();
        std::fs::write(&bad, "{ not json").unwrap();

        let outcome = engine
            .merge_paths(&[dir.path().to_path_buf(), dir.path().join("missing.json")])
            .unwrap();

        assert_eq!(outcome.inputs, 1);
        assert_eq!(outcome.index.suite_count(), 1);
        assert_eq!(outcome.skipped.len(), 2);
    }

    #[test]
    fn test_no_valid_input_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "[]").unwrap();

        let err = MergeEngine::new().merge_paths(&[bad]).unwrap_err();
        assert!(matches!(err, MergeError::NoValidInput { skipped: 1 }));
    }

    #[test]
    fn test_merged_index_round_trips_through_merge() {
        let dir = tempfile::tempdir().unwrap();
        let engine = MergeEngine::new();
        let (index, _) = engine.merge_documents(vec![
            doc("a.json", SuiteBuilder::new("e", "m").with_snapshot(0.5, 1).build()),
            doc("b.json", SuiteBuilder::new("f", "m").with_snapshot(0.25, 2).build()),
        ]);
        let path = dir.path().join("merged.json");
        engine.write(&index, &path).unwrap();

        let again = engine.merge_paths(&[path]).unwrap();
        assert_eq!(again.index.evaluations, index.evaluations);
        assert_eq!(again.index.overall_score, index.overall_score);
    }

    #[derive(Debug, Clone)]
    struct SuiteSpec {
        evaluation: u8,
        model: u8,
        score_quarters: u8,
        minute: u32,
        run: u8,
    }

    fn suite_spec() -> impl Strategy<Value = SuiteSpec> {
        (0u8..3, 0u8..3, 0u8..=4, 0u32..5, 0u8..4).prop_map(
            |(evaluation, model, score_quarters, minute, run)| SuiteSpec {
                evaluation,
                model,
                score_quarters,
                minute,
                run,
            },
        )
    }

    fn build(spec: &SuiteSpec) -> Suite {
        let run_id: RunId = format!("01900000-0000-7000-8000-{:012x}", spec.run).parse().unwrap();
        let mut snapshot = create_snapshot(f64::from(spec.score_quarters) / 4.0, spec.minute);
        snapshot.run_id = run_id;
        let key = llm_leaderboard_testing::suite_key(
            &format!("e{}", spec.evaluation),
            &format!("m{}", spec.model),
        );
        Suite::new(
            key,
            format!("Eval {}", spec.evaluation),
            format!("Model {}", spec.model),
            snapshot,
        )
    }

    fn files() -> impl Strategy<Value = Vec<Vec<SuiteSpec>>> {
        prop::collection::vec(prop::collection::vec(suite_spec(), 1..5), 1..5)
    }

    fn documents(files: &[Vec<SuiteSpec>]) -> Vec<(PathBuf, ResultDocument)> {
        files
            .iter()
            .enumerate()
            .flat_map(|(i, specs)| {
                specs
                    .iter()
                    .map(move |spec| (PathBuf::from(format!("f{}.json", i)), ResultDocument::Suite(build(spec))))
            })
            .collect()
    }

    proptest! {
        #[test]
        fn prop_merge_is_order_independent(
            (files, shuffled) in files().prop_flat_map(|f| (Just(f.clone()), Just(f).prop_shuffle()))
        ) {
            let engine = MergeEngine::new();
            let (a, _) = engine.merge_documents(documents(&files));
            let (b, _) = engine.merge_documents(documents(&shuffled));

            prop_assert_eq!(a.evaluations, b.evaluations);
            prop_assert_eq!(a.overall_score, b.overall_score);
        }

        #[test]
        fn prop_merge_is_idempotent(files in files()) {
            let engine = MergeEngine::new();
            let (once, _) = engine.merge_documents(documents(&files));
            let (twice, _) = engine.merge_documents(vec![
                (PathBuf::from("merged.json"), ResultDocument::MergedIndex(once.clone())),
            ]);

            prop_assert_eq!(once.evaluations, twice.evaluations);
            prop_assert_eq!(once.overall_score, twice.overall_score);
        }

        #[test]
        fn prop_keys_are_unique(files in files()) {
            let (index, _) = MergeEngine::new().merge_documents(documents(&files));
            let mut keys: Vec<SuiteKey> = index.suites().map(Suite::key).collect();
            let total = keys.len();
            keys.sort();
            keys.dedup();
            prop_assert_eq!(keys.len(), total);
        }
    }
}
