//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `pulse_source` - JSONL detection pulse reader (file or stdin)
//! - `egress` - confirmed event output to file (JSONL format)

pub mod egress;
pub mod pulse_source;

// Re-export commonly used types
pub use egress::AttendanceEgress;
pub use pulse_source::run_pulse_source;
