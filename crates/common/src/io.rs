//! JSON file I/O with atomic replacement.
//!
//! Every output file is written to a temporary file in the destination
//! directory and then renamed over the target, so readers see either the old
//! content or the new content, never a partial write.

use serde::{de::DeserializeOwned, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File I/O failure, always carrying the offending path
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid JSON in {path} at line {line}: {source}")]
    JsonLine {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl FileError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Io { path, .. } | Self::Json { path, .. } | Self::JsonLine { path, .. } => path,
        }
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path`
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), FileError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| FileError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    write_atomic(path, &bytes)
}

/// Atomically replace `path` with `bytes`, creating parent directories
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), FileError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| FileError::io(&parent, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(|e| FileError::io(path, e))?;
    tmp.write_all(bytes).map_err(|e| FileError::io(path, e))?;
    tmp.write_all(b"\n").map_err(|e| FileError::io(path, e))?;
    tmp.as_file().sync_all().map_err(|e| FileError::io(path, e))?;
    tmp.persist(path).map_err(|e| FileError::io(path, e.error))?;

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "Wrote file");
    Ok(())
}

/// Read and deserialize a JSON file
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, FileError> {
    let content = fs::read_to_string(path).map_err(|e| FileError::io(path, e))?;
    serde_json::from_str(&content).map_err(|source| FileError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Records read from an append-only JSON Lines file
#[derive(Debug)]
pub struct JsonlRead<T> {
    pub records: Vec<T>,
    /// 1-based line number of an unterminated, unparseable last line
    pub torn_line: Option<usize>,
}

/// Read a JSON Lines file.
///
/// Blank lines are ignored. A bad line is an error, except a final line that
/// lacks its newline: that is an interrupted append and is reported in
/// [`JsonlRead::torn_line`] instead.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<JsonlRead<T>, FileError> {
    let content = fs::read_to_string(path).map_err(|e| FileError::io(path, e))?;
    let terminated = content.is_empty() || content.ends_with('\n');
    let last = content.lines().count();
    let mut records = Vec::new();

    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(_) if !terminated && index + 1 == last => {
                return Ok(JsonlRead {
                    records,
                    torn_line: Some(index + 1),
                });
            }
            Err(source) => {
                return Err(FileError::JsonLine {
                    path: path.to_path_buf(),
                    line: index + 1,
                    source,
                })
            }
        }
    }

    Ok(JsonlRead {
        records,
        torn_line: None,
    })
}

/// Files with the given extension directly inside `dir`, sorted by path
pub fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, FileError> {
    let entries = fs::read_dir(dir).map_err(|e| FileError::io(dir, e))?;
    let mut files = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| FileError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == extension) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        name: String,
        value: u32,
    }

    #[test]
    fn test_atomic_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.json");
        let record = Record {
            name: "a".into(),
            value: 1,
        };

        write_json_atomic(&path, &record).unwrap();
        let read: Record = read_json(&path).unwrap();
        assert_eq!(read, record);

        // No temporary files left behind
        let leftovers = list_files(path.parent().unwrap(), "json").unwrap();
        assert_eq!(leftovers, vec![path]);
    }

    #[test]
    fn test_read_jsonl_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.jsonl");
        fs::write(
            &path,
            "{\"name\":\"a\",\"value\":1}\n\n{\"name\":\"b\"}\n",
        )
        .unwrap();

        match read_jsonl::<Record>(&path) {
            Err(FileError::JsonLine { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected line error, got {:?}", other),
        }
    }

    #[test]
    fn test_unterminated_bad_last_line_is_torn() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.jsonl");
        fs::write(&path, "{\"name\":\"a\",\"value\":1}\n{\"name\":\"b\",\"va").unwrap();

        let read = read_jsonl::<Record>(&path).unwrap();
        assert_eq!(read.records.len(), 1);
        assert_eq!(read.torn_line, Some(2));
    }

    #[test]
    fn test_bad_line_before_the_tail_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.jsonl");
        fs::write(&path, "{\"name\":\"a\",\"va\n{\"name\":\"b\",\"value\":2}").unwrap();

        assert!(matches!(
            read_jsonl::<Record>(&path),
            Err(FileError::JsonLine { line: 1, .. })
        ));
    }

    #[test]
    fn test_missing_file_error_carries_path() {
        let path = Path::new("/definitely/not/here.json");
        let err = read_json::<Record>(path).unwrap_err();
        assert_eq!(err.path(), path);
    }
}
