//! Structured event logger: an append-only JSON-per-line sink for the
//! domain events enumerated in the executor's design (`executor.live.*`,
//! `safety_halt`, `order.confirmed`, `order.rejected`, …).
//!
//! Independent of `tracing`/[`crate::utils::logger`], which covers
//! operator-facing diagnostic output. This sink is the replayable
//! artifact consumed by offline tooling; errors writing to it are
//! swallowed and surfaced once via a `handler_error` event rather than
//! propagated, since a logging failure must never interrupt the order
//! path.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::error;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Append-only JSONL event sink.
pub struct EventLogger {
    path: PathBuf,
    file: Mutex<std::fs::File>,
    warned_once: AtomicBool,
}

impl EventLogger {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
            warned_once: AtomicBool::new(false),
        })
    }

    /// Emit `{event, ts, ...fields}`. `fields` must serialize to a JSON object;
    /// anything else is dropped with a `handler_error` event.
    pub fn emit(&self, event: &str, fields: impl Serialize) {
        let mut record = Map::new();
        record.insert("event".to_string(), Value::String(event.to_string()));
        record.insert("ts".to_string(), Value::from(now_ms()));

        match serde_json::to_value(&fields) {
            Ok(Value::Object(map)) => {
                for (k, v) in map {
                    record.insert(k, v);
                }
            }
            Ok(Value::Null) => {}
            Ok(_) => {
                self.emit_handler_error("event fields did not serialize to an object");
                return;
            }
            Err(e) => {
                self.emit_handler_error(&format!("failed to serialize event fields: {}", e));
                return;
            }
        }

        self.write_line(&Value::Object(record));
    }

    fn emit_handler_error(&self, reason: &str) {
        if self.warned_once.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut record = Map::new();
        record.insert("event".to_string(), Value::String("handler_error".to_string()));
        record.insert("ts".to_string(), Value::from(now_ms()));
        record.insert("reason".to_string(), Value::String(reason.to_string()));
        self.write_line(&Value::Object(record));
    }

    fn write_line(&self, value: &Value) {
        let line = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                error!("event logger: failed to encode record: {}", e);
                return;
            }
        };
        let mut guard = self.file.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = writeln!(guard, "{}", line) {
            error!("event logger: write to {:?} failed: {}", self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::NamedTempFile;

    #[test]
    fn emits_one_json_line_per_event() {
        let file = NamedTempFile::new().unwrap();
        let logger = EventLogger::open(file.path()).unwrap();
        logger.emit("executor.live.sign_request.created", json!({"order_id": "O1"}));
        logger.emit("executor.live.safety_halt", json!({"reason": "hl_reject"}));

        let contents = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "executor.live.sign_request.created");
        assert_eq!(first["order_id"], "O1");
        assert!(first["ts"].is_number());
    }

    #[test]
    fn non_object_fields_emit_handler_error_once() {
        let file = NamedTempFile::new().unwrap();
        let logger = EventLogger::open(file.path()).unwrap();
        logger.emit("bad.event", json!("not an object"));
        logger.emit("bad.event", json!("not an object"));

        let contents = std::fs::read_to_string(file.path()).unwrap();
        let handler_errors = contents.lines().filter(|l| l.contains("handler_error")).count();
        assert_eq!(handler_errors, 1);
    }
}
