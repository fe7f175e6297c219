//! Messages exchanged with the upload task.
//!
//! The producer side and the upload task share no state: chunks cross the
//! boundary as immutable [`Bytes`] inside an [`UploadCommand`], and progress
//! comes back as [`UploadStatus`] records.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One serialized chunk waiting to be uploaded.
#[derive(Debug, Clone)]
pub struct UploadItem {
    /// Serialized chunk payload
    pub samples: Bytes,
    /// Destination URL
    pub endpoint: String,
    /// User the chunk belongs to
    pub user_id: String,
    /// Place the chunk was captured at
    pub place_id: String,
    /// Number of samples in the chunk
    pub count: usize,
}

/// Command sent to the upload task.
#[derive(Debug)]
pub enum UploadCommand {
    /// Append a chunk to the tail of the queue
    Enqueue(UploadItem),
    /// Tear the task down, abandoning in-flight work
    Stop,
}

/// Status reported by the upload task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UploadStatus {
    /// Emitted before each queue item is processed and when the queue drains
    Start { in_queue: usize },
    /// A chunk was accepted by the endpoint
    Ok { in_queue: usize, duration_ms: u64 },
    /// A chunk exhausted its attempts
    Error { message: String, code: Option<u16> },
}

pub type CommandTx = mpsc::UnboundedSender<UploadCommand>;
pub type CommandRx = mpsc::UnboundedReceiver<UploadCommand>;
pub type StatusTx = mpsc::UnboundedSender<UploadStatus>;
pub type StatusRx = mpsc::UnboundedReceiver<UploadStatus>;

/// Create a command channel.
pub fn command_channel() -> (CommandTx, CommandRx) {
    mpsc::unbounded_channel()
}

/// Create a status channel.
pub fn status_channel() -> (StatusTx, StatusRx) {
    mpsc::unbounded_channel()
}
