//! Suite store - one JSON file per (evaluation, model) key
//!
//! File names are derived from the structured key, never from display names,
//! and carry a short digest of the key so that two keys whose sanitised forms
//! coincide still land in different files.

use llm_leaderboard_common::io::{list_files, read_json, write_json_atomic};
use llm_leaderboard_domain::{ResultDocument, Suite, SuiteKey, SuiteSnapshot};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::{Error, Result};

const MAX_COMPONENT_LEN: usize = 48;

/// Directory of suite files
#[derive(Debug, Clone)]
pub struct SuiteStore {
    dir: PathBuf,
}

impl SuiteStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{evaluation}[__{variant}]__{model}-{hash8}.json`
    pub fn file_name(key: &SuiteKey) -> String {
        let mut stem = sanitize(key.evaluation.as_str());
        if let Some(variant) = &key.variant {
            stem.push_str("__");
            stem.push_str(&sanitize(variant));
        }
        stem.push_str("__");
        stem.push_str(&sanitize(key.model.as_str()));
        format!("{}-{}.json", stem, key_digest(key))
    }

    pub fn path_for(&self, key: &SuiteKey) -> PathBuf {
        self.dir.join(Self::file_name(key))
    }

    /// Existing suite for `key`, if one was written before
    pub fn load(&self, key: &SuiteKey) -> Result<Option<Suite>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        match read_result_document(&path)? {
            ResultDocument::Suite(suite) if &suite.key() == key => Ok(Some(suite)),
            _ => Err(Error::Invalid {
                path,
                reason: format!("file does not hold the suite {}", key),
            }),
        }
    }

    /// Append a run's snapshot to the suite for `key` and persist it.
    ///
    /// The previous history is kept; the file is replaced atomically.
    #[instrument(skip(self, evaluation_name, model_name, snapshot), fields(key = %key))]
    pub fn record(
        &self,
        key: &SuiteKey,
        evaluation_name: &str,
        model_name: &str,
        snapshot: SuiteSnapshot,
    ) -> Result<(Suite, PathBuf)> {
        let suite = match self.load(key)? {
            Some(mut existing) => {
                existing.evaluation_name = evaluation_name.to_string();
                existing.model_name = model_name.to_string();
                existing.record(snapshot);
                existing
            }
            None => Suite::new(key.clone(), evaluation_name, model_name, snapshot),
        };

        let path = self.write(&suite)?;
        debug!(path = %path.display(), history = suite.history.len(), "Suite recorded");
        Ok((suite, path))
    }

    /// Persist `suite` as a suite document
    pub fn write(&self, suite: &Suite) -> Result<PathBuf> {
        let path = self.path_for(&suite.key());
        write_json_atomic(&path, &ResultDocument::Suite(suite.clone()))?;
        Ok(path)
    }

    /// All suite files currently in the directory
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        Ok(list_files(&self.dir, "json")?)
    }
}

/// Read a suite or merged index file.
///
/// Files without a `kind` field are read as suites.
pub fn read_result_document(path: &Path) -> Result<ResultDocument> {
    let mut value: serde_json::Value = read_json(path)?;

    if let Some(object) = value.as_object_mut() {
        object
            .entry("kind")
            .or_insert_with(|| serde_json::Value::String("suite".to_string()));
    }

    serde_json::from_value(value).map_err(|e| Error::Invalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_COMPONENT_LEN)
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

fn key_digest(key: &SuiteKey) -> String {
    let canonical = serde_json::to_vec(key).unwrap_or_default();
    hex::encode(&Sha256::digest(&canonical)[..4])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use llm_leaderboard_domain::{EvaluationId, ModelId, RunId};

    fn key(eval: &str, model: &str) -> SuiteKey {
        SuiteKey {
            evaluation: EvaluationId::new(eval),
            variant: None,
            model: ModelId::new(model),
        }
    }

    fn snapshot(score: f64, minute: u32) -> SuiteSnapshot {
        SuiteSnapshot {
            run_id: RunId::new(),
            recorded_at: Utc.with_ymd_and_hms(2025, 6, 1, 9, minute, 0).unwrap(),
            score,
            test_cases: 2,
            generation_failures: 0,
            scoring_errors: 0,
        }
    }

    #[test]
    fn test_sanitisation_collisions_get_distinct_files() {
        let a = SuiteStore::file_name(&key("eval", "vendor/model"));
        let b = SuiteStore::file_name(&key("eval", "vendor:model"));
        assert!(a.starts_with("eval__vendor_model-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_variant_in_file_name() {
        let mut k = key("persona", "m");
        k.variant = Some("pirate captain".into());
        let name = SuiteStore::file_name(&k);
        assert!(name.starts_with("persona__pirate_captain__m-"));
        assert!(name.ends_with(".json"));
    }

    #[test]
    fn test_record_appends_history_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let store = SuiteStore::new(dir.path());
        let k = key("eval", "model");

        store.record(&k, "Eval", "Model", snapshot(0.4, 0)).unwrap();
        let (suite, path) = store.record(&k, "Eval", "Model", snapshot(0.6, 5)).unwrap();

        assert_eq!(suite.history.len(), 2);
        assert_eq!(suite.score, 0.6);
        assert_eq!(store.list().unwrap(), vec![path.clone()]);

        let reread = store.load(&k).unwrap().unwrap();
        assert_eq!(reread, suite);
    }

    #[test]
    fn test_untagged_file_is_read_as_suite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        std::fs::write(
            &path,
            r#"{"evaluation_id":"e","evaluation_name":"E","model_id":"m","model_name":"M",
                "score":0.5,"status":"success","history":[]}"#,
        )
        .unwrap();

        let doc = read_result_document(&path).unwrap();
        assert!(matches!(doc, ResultDocument::Suite(_)));
    }
}
