//! Presencia library
//!
//! Debounces noisy recognizer detections into clean entrada/salida attendance
//! events. Exposes modules for integration testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
