//! Services - presence state machine and its driver
//!
//! This module contains the core business logic:
//! - `presence` - per-subject debouncing engine (entrada/salida decisions)
//! - `worker` - async loop feeding the engine from a pulse channel

pub mod presence;
pub mod worker;

// Re-export commonly used types
pub use presence::{
    EntryPolicy, EventSink, PresenceEngine, PresenceError, PresenceSettings, SinkError,
    TrackSnapshot,
};
pub use worker::PresenceWorker;
