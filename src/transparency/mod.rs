//! Transparency module for the gaze sample agent.
//!
//! This module tracks what the agent collects and uploads, supporting
//! user trust and regulatory compliance for biometric data.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, SharedTransparencyLog, TransparencyLog,
    TransparencyStats,
};
