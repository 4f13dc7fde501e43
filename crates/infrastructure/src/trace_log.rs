//! Trace log - append-only JSONL record of every provider attempt

use async_trait::async_trait;
use llm_leaderboard_common::io::{list_files, read_jsonl};
use llm_leaderboard_domain::{RunId, TraceRecord};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::Result;

/// Destination for trace records.
#[async_trait]
pub trait TraceSink: Send + Sync {
    async fn record(&self, record: &TraceRecord) -> Result<()>;
}

/// One JSON object per line, appended as attempts complete
pub struct JsonlTraceLog {
    path: PathBuf,
    file: tokio::sync::Mutex<tokio::fs::File>,
}

impl JsonlTraceLog {
    /// Open (or create) `path` for appending
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| crate::Error::io(parent, e))?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| crate::Error::io(&path, e))?;

        info!(path = %path.display(), "Trace log opened");
        Ok(Self {
            path,
            file: tokio::sync::Mutex::new(file),
        })
    }

    /// Open the trace log of one run inside `dir`
    pub async fn for_run(dir: &Path, run_id: RunId) -> Result<Self> {
        Self::open(dir.join(format!("traces-{}.jsonl", run_id))).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TraceSink for JsonlTraceLog {
    async fn record(&self, record: &TraceRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        // one write per line keeps concurrent records from interleaving
        let mut file = self.file.lock().await;
        file.write_all(&line)
            .await
            .map_err(|e| crate::Error::io(&self.path, e))?;
        file.flush()
            .await
            .map_err(|e| crate::Error::io(&self.path, e))?;
        Ok(())
    }
}

/// Keeps records in memory, for tests and dry runs
#[derive(Default)]
pub struct InMemoryTraceSink {
    records: Mutex<Vec<TraceRecord>>,
}

impl InMemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TraceRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl TraceSink for InMemoryTraceSink {
    async fn record(&self, record: &TraceRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Read every `*.jsonl` trace file in `dir`.
///
/// Any unreadable file or line fails the whole read, except the unterminated
/// last line left by a run killed mid-append, which is skipped.
pub fn read_trace_dir(dir: &Path) -> Result<Vec<TraceRecord>> {
    let files = list_files(dir, "jsonl")?;
    let mut records = Vec::new();

    for file in &files {
        let mut batch = read_jsonl::<TraceRecord>(file)?;
        if let Some(line) = batch.torn_line {
            warn!(path = %file.display(), line, "Skipping torn trace record");
        }
        debug!(path = %file.display(), records = batch.records.len(), "Read trace file");
        records.append(&mut batch.records);
    }

    info!(files = files.len(), records = records.len(), "Loaded trace records");
    Ok(records)
}
