//! Domain models - core attendance types
//!
//! This module contains the canonical data types used throughout the system:
//! - `SubjectId` - validated personnel identifier
//! - `DetectionPulse` - a single recognizer observation
//! - `PresenceEvent` / `EventKind` - confirmed entrada/salida transitions

pub mod types;

pub use types::{
    epoch_ms, DetectionPulse, EventKind, InvalidSubjectId, PresenceEvent, SubjectId,
};
