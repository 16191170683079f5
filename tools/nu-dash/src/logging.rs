use crate::errors::DashError;
use crate::log_retention::{prune_segments, rotate_if_oversized};
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const DEFAULT_DISK_BUDGET_BYTES: u64 = 20 * 1024 * 1024;
pub const DEFAULT_SEGMENT_BYTES: u64 = 2 * 1024 * 1024;

/// Append-only JSONL debug log. Diagnostic only; callers ignore its failures.
#[derive(Debug, Clone)]
pub struct JsonlLogger {
    pub path: PathBuf,
    pub max_payload_bytes: usize,
    pub segment_bytes: u64,
    pub budget_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub level: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

impl JsonlLogger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_payload_bytes: 16 * 1024,
            segment_bytes: DEFAULT_SEGMENT_BYTES,
            budget_bytes: DEFAULT_DISK_BUDGET_BYTES,
        }
    }

    /// Writes one event as a single line so concurrent appends never interleave.
    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), DashError> {
        let io = |e: std::io::Error| DashError::Io(format!("{}: {e}", self.path.display()));
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io)?;
        }
        let mut line = serde_json::to_string(&LogEvent {
            level: event.level,
            event_type: event.event_type,
            payload: truncate_json(event.payload.clone(), self.max_payload_bytes),
        })
        .map_err(|e| DashError::Io(e.to_string()))?;
        line.push('\n');

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .map_err(io)?;

        if rotate_if_oversized(&self.path, self.segment_bytes)?.is_some() {
            prune_segments(&self.path, self.budget_bytes)?;
        }
        Ok(())
    }

    /// Fire-and-forget variant for call sites where a logging failure must not
    /// change the outcome.
    pub fn record(&self, level: &str, event_type: &str, payload: Value) {
        let _ = self.append(&LogEvent {
            level,
            event_type,
            payload,
        });
    }
}

/// One line per task for non-interactive runs.
pub fn structured_fallback_line(task: &str, level: &str, message: &str) -> String {
    format!(
        "task={task} level={level} message={}",
        message.trim_end().replace('\n', "\\n")
    )
}

fn truncate_json(value: Value, max_bytes: usize) -> Value {
    let rendered = serde_json::to_string(&value).unwrap_or_default();
    if rendered.len() <= max_bytes {
        return value;
    }
    let mut cut = max_bytes.saturating_sub(3);
    while cut > 0 && !rendered.is_char_boundary(cut) {
        cut -= 1;
    }
    Value::String(format!("{}...", &rendered[..cut]))
}
