//! Attendance egress - writes confirmed events to file
//!
//! Events are written in JSONL format (one JSON object per line) to the file
//! specified in config. The downstream attendance store tails this file and
//! applies rows idempotently, so replays after a crash are harmless.

use crate::domain::types::PresenceEvent;
use crate::services::presence::{EventSink, SinkError};
use chrono::{TimeZone, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// One egress line per emitted event
#[derive(Debug, Serialize)]
struct EgressRecord<'a> {
    #[serde(flatten)]
    event: &'a PresenceEvent,
    /// RFC 3339 rendering of `at_ms` for human inspection
    at: String,
}

/// Egress writer for attendance events
pub struct AttendanceEgress {
    file_path: String,
}

impl AttendanceEgress {
    pub fn new(file_path: &str) -> Self {
        info!(file_path = %file_path, "egress_initialized");
        Self { file_path: file_path.to_string() }
    }

    /// Append one event to the egress file
    pub fn write_event(&self, event: &PresenceEvent) -> std::io::Result<()> {
        let record = EgressRecord { event, at: format_at(event.at_ms) };
        let json = serde_json::to_string(&record)?;
        self.append_line(&json)?;

        info!(
            kind = %event.kind,
            subject = %event.subject,
            at_ms = %event.at_ms,
            "event_egressed"
        );
        Ok(())
    }

    /// Append a line to the egress file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "egress_written");

        Ok(())
    }
}

impl EventSink for AttendanceEgress {
    fn deliver(&mut self, event: &PresenceEvent) -> Result<(), SinkError> {
        self.write_event(event).map_err(SinkError::from)
    }
}

fn format_at(at_ms: u64) -> String {
    match Utc.timestamp_millis_opt(at_ms as i64).single() {
        Some(dt) => dt.to_rfc3339(),
        None => String::from("invalid"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{EventKind, SubjectId};
    use std::fs;
    use tempfile::tempdir;

    fn event(raw: i64, kind: EventKind, at_ms: u64) -> PresenceEvent {
        PresenceEvent::new(kind, SubjectId::new(raw).unwrap(), at_ms)
    }

    #[test]
    fn test_write_event() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("asistencia.jsonl");
        let egress = AttendanceEgress::new(file_path.to_str().unwrap());

        egress.write_event(&event(100, EventKind::Entered, 1_700_000_000_000)).unwrap();

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.ends_with('\n'));

        let parsed: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(parsed["kind"], "entrada");
        assert_eq!(parsed["subject"], 100);
        assert_eq!(parsed["at_ms"], 1_700_000_000_000u64);
        assert!(parsed["at"].as_str().unwrap().starts_with("2023-11-14T"));
    }

    #[test]
    fn test_append_mode_preserves_existing_lines() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("asistencia.jsonl");
        fs::write(&file_path, "{\"existing\":\"data\"}\n").unwrap();

        let egress = AttendanceEgress::new(file_path.to_str().unwrap());
        egress.write_event(&event(1, EventKind::Left, 1_000)).unwrap();

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("existing"));
        assert!(lines[1].contains("salida"));
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested").join("dir").join("asistencia.jsonl");
        let egress = AttendanceEgress::new(nested.to_str().unwrap());

        egress.write_event(&event(2, EventKind::Entered, 500)).unwrap();

        assert!(nested.exists());
    }

    #[test]
    fn test_one_line_per_event() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("asistencia.jsonl");
        let egress = AttendanceEgress::new(file_path.to_str().unwrap());

        egress.write_event(&event(1, EventKind::Entered, 1_000)).unwrap();
        egress.write_event(&event(1, EventKind::Left, 20_000)).unwrap();
        egress.write_event(&event(2, EventKind::Entered, 21_000)).unwrap();

        let content = fs::read_to_string(&file_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in lines {
            let _parsed: serde_json::Value = serde_json::from_str(line).unwrap();
        }
    }
}
