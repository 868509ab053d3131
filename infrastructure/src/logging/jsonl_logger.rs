//! JSONL file writer for conversation events.
//!
//! Each [`ConversationEvent`] is serialized as a single JSON line with
//! `type`, `project` and `timestamp` fields, appended to the project's
//! transcript so sessions accumulate across restarts.

use avakin_application::{ConversationEvent, ConversationLogger};
use avakin_domain::ProjectId;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

const TRANSCRIPT_FILE: &str = "conversation.jsonl";

/// JSONL conversation logger that writes one JSON object per line.
///
/// Thread-safe via `Mutex<BufWriter<File>>`. Flushes on `Drop`.
pub struct JsonlConversationLogger {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
    project: ProjectId,
}

impl JsonlConversationLogger {
    /// Open (append) the log at `path`, creating parent directories.
    /// Returns `None` if the file cannot be opened.
    pub fn new(path: impl AsRef<Path>, project: ProjectId) -> Option<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && let Err(e) = std::fs::create_dir_all(parent)
        {
            warn!(
                "Could not create conversation log directory {}: {}",
                parent.display(),
                e
            );
            return None;
        }

        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => f,
            Err(e) => {
                warn!(
                    "Could not open conversation log file {}: {}",
                    path.display(),
                    e
                );
                return None;
            }
        };

        Some(Self {
            writer: Mutex::new(BufWriter::new(file)),
            path: path.to_path_buf(),
            project,
        })
    }

    /// Transcript under the project's state directory
    pub fn for_project(project_root: &Path, project: ProjectId) -> Option<Self> {
        Self::new(
            project_root.join(".avakin").join("logs").join(TRANSCRIPT_FILE),
            project,
        )
    }

    /// Get the path to the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConversationLogger for JsonlConversationLogger {
    fn log(&self, event: ConversationEvent) {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

        // Merge payload with type, project and timestamp
        let mut record = match event.payload {
            serde_json::Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        record.insert("type".to_string(), event.event_type.into());
        record.insert("project".to_string(), self.project.as_str().into());
        record.insert("timestamp".to_string(), timestamp.into());

        let Ok(line) = serde_json::to_string(&record) else {
            return;
        };

        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{}", line);
            let _ = writer.flush();
        }
    }
}

impl Drop for JsonlConversationLogger {
    fn drop(&mut self) {
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_writes_one_record_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let logger = JsonlConversationLogger::for_project(dir.path(), "todo".into()).unwrap();

        logger.log(ConversationEvent::new(
            "model_response",
            serde_json::json!({"role": "coder", "backend": "ollama/llama3.1", "bytes": 42}),
        ));
        logger.log(ConversationEvent::new(
            "files_committed",
            serde_json::json!({"files": ["main.py"]}),
        ));
        let path = logger.path().to_path_buf();
        drop(logger);

        let records = read_lines(&path);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["type"], "model_response");
        assert_eq!(records[0]["project"], "todo");
        assert_eq!(records[0]["bytes"], 42);
        assert!(records[0].get("timestamp").is_some());
        assert_eq!(records[1]["files"][0], "main.py");
        assert!(path.ends_with(".avakin/logs/conversation.jsonl"));
    }

    #[test]
    fn test_appends_across_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");

        for turn in ["first", "second"] {
            let logger = JsonlConversationLogger::new(&path, "p".into()).unwrap();
            logger.log(ConversationEvent::new(
                "user_turn",
                serde_json::json!({"content": turn}),
            ));
        }

        let records = read_lines(&path);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["content"], "second");
    }

    #[test]
    fn test_non_object_payload_is_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let logger = JsonlConversationLogger::new(&path, "p".into()).unwrap();

        logger.log(ConversationEvent::new(
            "simple_event",
            serde_json::json!("just a string"),
        ));
        drop(logger);

        let records = read_lines(&path);
        assert_eq!(records[0]["type"], "simple_event");
        assert_eq!(records[0]["data"], "just a string");
    }
}
