//! Background chunk delivery.
//!
//! This module contains:
//! - The command and status messages exchanged with the upload task
//! - The HTTP client posting chunks as multipart form data
//! - The sequential upload task with retry and requeue

pub mod client;
pub mod protocol;
pub mod task;

// Re-export commonly used types
pub use client::{UploadClient, UploadError, CHUNK_FIELD};
pub use protocol::{
    command_channel, status_channel, CommandRx, CommandTx, StatusRx, StatusTx, UploadCommand,
    UploadItem, UploadStatus,
};
pub use task::{RetryPolicy, TaskState, UploadHandle, UploadTask};
