//! Splits sample lists into upload-sized batches and hands them to the
//! upload task.

use crate::core::serialization::{serialize, SerializationError};
use crate::sample::Sample;
use crate::uploader::protocol::{CommandTx, UploadCommand, UploadItem};
use thiserror::Error;
use tracing::{debug, error, warn};

/// A batch could not be dispatched.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The batch was rejected by the encoder and dropped
    #[error("Batch of {count} samples rejected: {source}")]
    Serialization {
        count: usize,
        #[source]
        source: SerializationError,
    },

    /// The upload task is gone; the batch was dropped
    #[error("Upload task is not running, {count} samples dropped")]
    TaskClosed { count: usize },
}

impl QueueError {
    /// Number of samples lost with the batch.
    pub fn count(&self) -> usize {
        match self {
            QueueError::Serialization { count, .. } | QueueError::TaskClosed { count } => *count,
        }
    }
}

/// Result of [`SampleUploadQueue::enqueue_for_upload`].
#[derive(Debug, Default)]
pub struct EnqueueOutcome {
    /// Short trailing batch held back for a later attempt
    pub remainder: Vec<Sample>,
    /// Chunks handed to the upload task
    pub chunks_dispatched: usize,
    /// Samples inside those chunks
    pub samples_dispatched: usize,
    /// Batches that could not be dispatched
    pub errors: Vec<QueueError>,
}

/// Chunks sample lists and sends them to the upload task.
#[derive(Debug, Clone)]
pub struct SampleUploadQueue {
    max_samples_per_batch: usize,
    endpoint: String,
    commands: CommandTx,
}

impl SampleUploadQueue {
    pub fn new(max_samples_per_batch: usize, endpoint: impl Into<String>, commands: CommandTx) -> Self {
        Self {
            max_samples_per_batch: max_samples_per_batch.max(1),
            endpoint: endpoint.into(),
            commands,
        }
    }

    pub fn max_samples_per_batch(&self) -> usize {
        self.max_samples_per_batch
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Split `samples` into batches of at most `max_samples_per_batch`.
    ///
    /// Complete batches are always dispatched. The final short batch is
    /// dispatched only when `sent_all` is set; otherwise it is returned as
    /// the remainder.
    pub fn enqueue_for_upload(&self, mut samples: Vec<Sample>, sent_all: bool) -> EnqueueOutcome {
        let mut outcome = EnqueueOutcome::default();
        if samples.is_empty() {
            return outcome;
        }

        let per_batch = self.max_samples_per_batch;
        let complete = samples.len() / per_batch * per_batch;
        let tail = samples.split_off(complete);

        for batch in samples.chunks(per_batch) {
            self.dispatch(batch, &mut outcome);
        }

        if !tail.is_empty() {
            if sent_all {
                self.dispatch(&tail, &mut outcome);
            } else {
                debug!(count = tail.len(), "Holding back incomplete batch");
                outcome.remainder = tail;
            }
        }

        outcome
    }

    fn dispatch(&self, batch: &[Sample], outcome: &mut EnqueueOutcome) {
        let count = batch.len();
        let chunk = match serialize(batch) {
            Ok(chunk) => chunk,
            Err(source) => {
                warn!(count, "Rejecting batch: {source}");
                outcome
                    .errors
                    .push(QueueError::Serialization { count, source });
                return;
            }
        };

        // serialize() guarantees a non-empty, single-identity batch
        let identity = batch[0].identity();
        let item = UploadItem {
            samples: chunk,
            endpoint: self.endpoint.clone(),
            user_id: identity.user_id.clone(),
            place_id: identity.place_id.clone(),
            count,
        };
        let bytes = item.samples.len();

        if self.commands.send(UploadCommand::Enqueue(item)).is_err() {
            error!(count, "Upload task is not running");
            outcome.errors.push(QueueError::TaskClosed { count });
            return;
        }

        debug!(count, bytes, "Chunk enqueued for upload");
        outcome.chunks_dispatched += 1;
        outcome.samples_dispatched += count;
    }
}
