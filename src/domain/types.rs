//! Shared types for the attendance pipeline

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Rejected subject identifier (non-positive raw value)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid subject id {0}: must be a positive integer")]
pub struct InvalidSubjectId(pub i64);

/// Validated newtype for subject (employee) identifiers.
///
/// The recognizer resolves faces to numeric personnel ids; anything
/// non-positive is a resolution failure and must never reach the engine,
/// so construction is fallible and the raw value is private.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct SubjectId(i64);

impl SubjectId {
    pub fn new(raw: i64) -> Result<Self, InvalidSubjectId> {
        if raw > 0 {
            Ok(Self(raw))
        } else {
            Err(InvalidSubjectId(raw))
        }
    }

    #[inline]
    pub fn raw(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for SubjectId {
    type Error = InvalidSubjectId;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<SubjectId> for i64 {
    fn from(id: SubjectId) -> i64 {
        id.0
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two confirmed transition outputs of the engine.
///
/// Wire names keep the vocabulary of the attendance records downstream
/// ("entrada" = check-in, "salida" = check-out).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "entrada")]
    Entered,
    #[serde(rename = "salida")]
    Left,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Entered => "entrada",
            EventKind::Left => "salida",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A confirmed state transition, emitted at most once per flip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub kind: EventKind,
    pub subject: SubjectId,
    /// Logical time of the transition (epoch milliseconds, caller-supplied)
    pub at_ms: u64,
}

impl PresenceEvent {
    pub fn new(kind: EventKind, subject: SubjectId, at_ms: u64) -> Self {
        Self { kind, subject, at_ms }
    }
}

/// A single "subject was seen" observation from the recognizer
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DetectionPulse {
    pub subject: SubjectId,
    /// Observation time; pulses without one are stamped on receipt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_id_rejects_non_positive() {
        assert!(SubjectId::new(0).is_err());
        assert!(SubjectId::new(-7).is_err());
        assert_eq!(SubjectId::new(100).unwrap().raw(), 100);
    }

    #[test]
    fn test_subject_id_deserialize_validates() {
        let ok: SubjectId = serde_json::from_str("42").unwrap();
        assert_eq!(ok.raw(), 42);

        assert!(serde_json::from_str::<SubjectId>("0").is_err());
        assert!(serde_json::from_str::<SubjectId>("-3").is_err());
    }

    #[test]
    fn test_event_kind_wire_names() {
        assert_eq!(EventKind::Entered.as_str(), "entrada");
        assert_eq!(EventKind::Left.as_str(), "salida");
        assert_eq!(serde_json::to_string(&EventKind::Left).unwrap(), "\"salida\"");
    }

    #[test]
    fn test_pulse_without_timestamp() {
        let pulse: DetectionPulse = serde_json::from_str(r#"{"subject": 5}"#).unwrap();
        assert_eq!(pulse.subject.raw(), 5);
        assert_eq!(pulse.at_ms, None);
    }
}
