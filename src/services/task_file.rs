//! JSON Lines files: the durable queue between dump, worker and ingest.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};

use crate::domain::errors::DomainError;

#[derive(Debug, Error)]
pub enum TaskFileError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl TaskFileError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<TaskFileError> for DomainError {
    fn from(err: TaskFileError) -> Self {
        match err {
            TaskFileError::Io { path, source } => DomainError::io(path, &source),
            TaskFileError::Serialize(err) => err.into(),
        }
    }
}

/// One line of a JSONL file that did not decode.
#[derive(Debug)]
pub struct MalformedLine {
    pub line: usize,
    pub error: String,
}

/// Writes one JSON document per line.
pub struct JsonlWriter<T> {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
    _record: PhantomData<fn(&T)>,
}

impl<T: Serialize> JsonlWriter<T> {
    /// Create (truncating) `path`, creating parent directories as needed.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, TaskFileError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TaskFileError::io(parent, e))?;
        }
        let file = File::create(path).await.map_err(|e| TaskFileError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            written: 0,
            _record: PhantomData,
        })
    }

    pub async fn write(&mut self, record: &T) -> Result<(), TaskFileError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .await
            .map_err(|e| TaskFileError::io(&self.path, e))?;
        self.written += 1;
        Ok(())
    }

    /// Push buffered lines to the file without closing it.
    pub async fn flush(&mut self) -> Result<(), TaskFileError> {
        self.writer.flush().await.map_err(|e| TaskFileError::io(&self.path, e))
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and sync to disk. Returns the number of records written.
    pub async fn finish(mut self) -> Result<u64, TaskFileError> {
        self.writer
            .flush()
            .await
            .map_err(|e| TaskFileError::io(&self.path, e))?;
        self.writer
            .get_ref()
            .sync_all()
            .await
            .map_err(|e| TaskFileError::io(&self.path, e))?;
        Ok(self.written)
    }
}

/// Reads one JSON document per line, reporting undecodable lines (invalid
/// UTF-8 included) instead of failing. Blank lines are ignored.
pub struct JsonlReader<T> {
    path: PathBuf,
    reader: BufReader<File>,
    buf: Vec<u8>,
    line_no: usize,
    _record: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> JsonlReader<T> {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, TaskFileError> {
        let path = path.as_ref();
        let file = File::open(path).await.map_err(|e| TaskFileError::io(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            buf: Vec::new(),
            line_no: 0,
            _record: PhantomData,
        })
    }

    pub async fn next(&mut self) -> Result<Option<Result<T, MalformedLine>>, TaskFileError> {
        loop {
            self.buf.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut self.buf)
                .await
                .map_err(|e| TaskFileError::io(&self.path, e))?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            if self.buf.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return Ok(Some(serde_json::from_slice(&self.buf).map_err(|e| MalformedLine {
                line: self.line_no,
                error: e.to_string(),
            })));
        }
    }
}

/// Read response ids, one per line. A line may be a JSON object with an
/// `id` field, a JSON string, or the bare id. Duplicates are dropped.
pub async fn read_id_list(path: impl AsRef<Path>) -> Result<Vec<String>, TaskFileError> {
    let path = path.as_ref();
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| TaskFileError::io(path, e))?;

    let mut seen = std::collections::HashSet::new();
    let mut ids = Vec::new();
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let id = match serde_json::from_str::<serde_json::Value>(line) {
            Ok(serde_json::Value::Object(obj)) => match obj.get("id") {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => {
                    tracing::warn!(line, "id list entry without an 'id' field");
                    continue;
                }
            },
            Ok(serde_json::Value::String(s)) => s,
            _ => line.to_string(),
        };
        if seen.insert(id.clone()) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Default result file name for one shard of an offline worker run.
pub fn shard_result_name(rank: u32, world_size: u32) -> String {
    format!("results-{rank:06}-{world_size:06}.jsonl")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Line {
        id: String,
    }

    #[tokio::test]
    async fn test_write_then_read_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/tasks.jsonl");

        let mut writer = JsonlWriter::create(&path).await.unwrap();
        writer.write(&Line { id: "a".into() }).await.unwrap();
        writer.write(&Line { id: "b".into() }).await.unwrap();
        assert_eq!(writer.finish().await.unwrap(), 2);

        let mut content = tokio::fs::read_to_string(&path).await.unwrap();
        content.push_str("\n{not json\n");
        tokio::fs::write(&path, content).await.unwrap();

        let mut reader = JsonlReader::<Line>::open(&path).await.unwrap();
        assert_eq!(reader.next().await.unwrap().unwrap().unwrap(), Line { id: "a".into() });
        assert_eq!(reader.next().await.unwrap().unwrap().unwrap(), Line { id: "b".into() });
        let bad = reader.next().await.unwrap().unwrap().unwrap_err();
        assert_eq!(bad.line, 4);
        assert!(reader.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_malformed_and_reading_continues() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.jsonl");
        let mut bytes = b"{\"id\": \"a\"}\n".to_vec();
        bytes.extend_from_slice(b"{\"id\": \"\xff\"}\n");
        bytes.extend_from_slice(b"{\"id\": \"c\"}");
        tokio::fs::write(&path, bytes).await.unwrap();

        let mut reader = JsonlReader::<Line>::open(&path).await.unwrap();
        assert_eq!(reader.next().await.unwrap().unwrap().unwrap(), Line { id: "a".into() });
        let bad = reader.next().await.unwrap().unwrap().unwrap_err();
        assert_eq!(bad.line, 2);
        assert_eq!(reader.next().await.unwrap().unwrap().unwrap(), Line { id: "c".into() });
        assert!(reader.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let err = JsonlReader::<Line>::open("/nonexistent/results.jsonl").await;
        assert!(matches!(err, Err(TaskFileError::Io { .. })));
    }

    #[tokio::test]
    async fn test_read_id_list_formats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.txt");
        tokio::fs::write(&path, "{\"id\": \"r1\"}\n\"r2\"\nr3\n\nr1\n{\"other\": 1}\n")
            .await
            .unwrap();

        let ids = read_id_list(&path).await.unwrap();
        assert_eq!(ids, vec!["r1", "r2", "r3"]);
    }

    #[test]
    fn test_shard_result_name() {
        assert_eq!(shard_result_name(3, 16), "results-000003-000016.jsonl");
    }
}
