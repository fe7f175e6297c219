//! Sample manager: the producer-side entry point.
//!
//! The manager owns one [`SampleBuffer`] and one [`SampleUploadQueue`]. It is
//! meant to be driven from a single thread on every capture tick; it never
//! blocks and never shares its buffer with the upload task.
//!
//! # Example
//!
//! ```no_run
//! use gaze_sample_agent::core::{ManagerConfig, SampleManager, TimeWindow};
//! use gaze_sample_agent::uploader::command_channel;
//!
//! let (commands, _rx) = command_channel();
//! let mut manager = SampleManager::new(
//!     ManagerConfig::new("https://collect.example.com/samples"),
//!     commands,
//! );
//! # let sample: gaze_sample_agent::Sample = unimplemented!();
//! let window = TimeWindow::new(0, u64::MAX);
//! if let Err(e) = manager.store(sample, window) {
//!     eprintln!("sample rejected: {e}");
//! }
//! manager.flush_and_clear(window);
//! ```

use crate::core::buffer::SampleBuffer;
use crate::core::queue::SampleUploadQueue;
use crate::core::serialization::SAMPLE_RECORD_LEN;
use crate::sample::{validate_sample, Sample, ValidationError};
use crate::transparency::{create_shared_log, SharedTransparencyLog};
use crate::uploader::protocol::{CommandTx, StatusRx, UploadStatus};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default upper bound for one chunk, in bytes.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Default stale-sample horizon.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(300);

/// Buffer capacity or persistence failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StorageError {
    #[error("Sample buffer is full ({total} of {capacity} samples)")]
    CapacityExceeded { total: usize, capacity: usize },
}

/// Why [`SampleManager::store`] refused a sample.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Category of error a handler can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Storage,
}

/// Callback invoked when a sample is refused.
pub type ErrorHandler = Box<dyn FnMut(&StoreError) + Send>;

/// One handler slot per error kind; registering again replaces the slot.
#[derive(Default)]
struct ErrorHandlers {
    validation: Option<ErrorHandler>,
    storage: Option<ErrorHandler>,
}

impl ErrorHandlers {
    fn slot(&mut self, kind: ErrorKind) -> &mut Option<ErrorHandler> {
        match kind {
            ErrorKind::Validation => &mut self.validation,
            ErrorKind::Storage => &mut self.storage,
        }
    }

    fn notify(&mut self, kind: ErrorKind, err: &StoreError) {
        if let Some(handler) = self.slot(kind) {
            handler(err);
        }
    }
}

/// Half-open time window `[min_time, max_time)` in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub min_time: u64,
    pub max_time: u64,
}

impl TimeWindow {
    pub fn new(min_time: u64, max_time: u64) -> Self {
        Self { min_time, max_time }
    }

    /// Window covering every representable timestamp.
    pub fn all() -> Self {
        Self::new(0, u64::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.min_time >= self.max_time
    }
}

/// Manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Upper bound for one chunk, in bytes
    pub max_chunk_size: usize,
    /// Buffer occupancy that triggers a flush from `store`
    pub auto_flush_threshold: Option<usize>,
    /// Denominator of `buffer_utilization`
    pub capacity_hint: Option<usize>,
    /// Buffer occupancy at which `store` refuses samples
    pub hard_capacity: Option<usize>,
    /// Destination for every chunk
    pub upload_endpoint: String,
    /// Samples older than this are pruned by `prune_stale`
    pub retention: Duration,
}

impl ManagerConfig {
    pub fn new(upload_endpoint: impl Into<String>) -> Self {
        Self {
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            auto_flush_threshold: None,
            capacity_hint: None,
            hard_capacity: None,
            upload_endpoint: upload_endpoint.into(),
            retention: DEFAULT_RETENTION,
        }
    }

    pub fn with_max_chunk_size(mut self, bytes: usize) -> Self {
        self.max_chunk_size = bytes;
        self
    }

    pub fn with_auto_flush_threshold(mut self, samples: usize) -> Self {
        self.auto_flush_threshold = Some(samples);
        self
    }

    pub fn with_capacity_hint(mut self, samples: usize) -> Self {
        self.capacity_hint = Some(samples);
        self
    }

    pub fn with_hard_capacity(mut self, samples: usize) -> Self {
        self.hard_capacity = Some(samples);
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Samples per chunk: `floor(max_chunk_size / SAMPLE_RECORD_LEN)`,
    /// never less than one.
    pub fn max_samples_per_batch(&self) -> usize {
        (self.max_chunk_size / SAMPLE_RECORD_LEN).max(1)
    }

    /// Effective auto-flush threshold (default twice the batch size).
    pub fn effective_auto_flush_threshold(&self) -> usize {
        self.auto_flush_threshold
            .unwrap_or_else(|| 2 * self.max_samples_per_batch())
    }

    /// Effective utilization denominator (default the auto-flush threshold).
    pub fn effective_capacity_hint(&self) -> usize {
        self.capacity_hint
            .unwrap_or_else(|| self.effective_auto_flush_threshold())
    }
}

/// Aggregate upload progress reported by the upload task.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadStats {
    pub in_queue: usize,
    pub chunks_uploaded: u64,
    pub upload_failures: u64,
    pub last_duration_ms: Option<u64>,
    pub last_error: Option<String>,
    pub last_error_code: Option<u16>,
}

/// Point-in-time manager statistics. Each call returns an independent copy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManagerStats {
    pub total_samples: usize,
    pub bucket_count: usize,
    /// Percentage of the capacity hint currently buffered
    pub buffer_utilization: f64,
    pub upload: UploadStats,
}

/// Orchestrates validation, buffering, flushing and upload bookkeeping.
pub struct SampleManager {
    config: ManagerConfig,
    buffer: SampleBuffer,
    queue: SampleUploadQueue,
    handlers: ErrorHandlers,
    status: Option<StatusRx>,
    upload_stats: UploadStats,
    transparency: SharedTransparencyLog,
}

impl SampleManager {
    /// Create a manager sending chunks over `commands`.
    pub fn new(config: ManagerConfig, commands: CommandTx) -> Self {
        let queue = SampleUploadQueue::new(
            config.max_samples_per_batch(),
            config.upload_endpoint.clone(),
            commands,
        );

        info!(
            max_samples_per_batch = queue.max_samples_per_batch(),
            auto_flush_threshold = config.effective_auto_flush_threshold(),
            endpoint = %config.upload_endpoint,
            "Sample manager initialized"
        );

        Self {
            config,
            buffer: SampleBuffer::new(),
            queue,
            handlers: ErrorHandlers::default(),
            status: None,
            upload_stats: UploadStats::default(),
            transparency: create_shared_log(),
        }
    }

    /// Fold status messages from the upload task into [`UploadStats`].
    pub fn with_status(mut self, status: StatusRx) -> Self {
        self.status = Some(status);
        self
    }

    /// Record into a shared transparency log instead of a private one.
    pub fn with_transparency_log(mut self, log: SharedTransparencyLog) -> Self {
        self.transparency = log;
        self
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn max_samples_per_batch(&self) -> usize {
        self.queue.max_samples_per_batch()
    }

    /// Validate and buffer a sample.
    ///
    /// Invalid samples are reported to the `validation` handler and never
    /// buffered. Reaching the auto-flush threshold triggers [`Self::flush`]
    /// with the same window.
    pub fn store(&mut self, sample: Sample, window: TimeWindow) -> Result<(), StoreError> {
        if let Err(e) = validate_sample(&sample) {
            let err = StoreError::from(e);
            debug!(time = sample.time(), "Sample rejected: {err}");
            self.transparency.record_sample_rejected();
            self.handlers.notify(ErrorKind::Validation, &err);
            return Err(err);
        }

        if let Some(capacity) = self.config.hard_capacity {
            if self.buffer.total_sample_count() >= capacity {
                self.flush(window);
            }
            let total = self.buffer.total_sample_count();
            if total >= capacity {
                let err = StoreError::from(StorageError::CapacityExceeded { total, capacity });
                warn!("Sample rejected: {err}");
                self.transparency.record_sample_rejected();
                self.handlers.notify(ErrorKind::Storage, &err);
                return Err(err);
            }
        }

        self.buffer.add_sample(sample);
        self.transparency.record_sample_stored();

        if self.buffer.total_sample_count() >= self.config.effective_auto_flush_threshold() {
            debug!(
                total = self.buffer.total_sample_count(),
                "Auto-flush threshold reached"
            );
            self.flush(window);
        }

        Ok(())
    }

    /// Send every complete batch of in-window samples; short remainders stay
    /// buffered. Returns the number of samples dispatched.
    pub fn flush(&mut self, window: TimeWindow) -> usize {
        self.extract_and_enqueue(window, false)
    }

    /// Send every in-window sample, including short batches, then clear the
    /// whole buffer. Samples outside the window are discarded.
    pub fn flush_and_clear(&mut self, window: TimeWindow) -> usize {
        let dispatched = self.extract_and_enqueue(window, true);

        let discarded = self.buffer.total_sample_count();
        if discarded > 0 {
            info!(discarded, "Discarding samples outside the flush window");
            self.transparency.record_samples_dropped(discarded as u64);
        }
        self.buffer.clear();

        dispatched
    }

    fn extract_and_enqueue(&mut self, window: TimeWindow, sent_all: bool) -> usize {
        if window.is_empty() {
            return 0;
        }

        let mut dispatched = 0;
        for key in self.buffer.bucket_keys() {
            let extraction =
                self.buffer
                    .extract_from_bucket(&key, window.min_time, window.max_time, usize::MAX);
            if extraction.sent.is_empty() {
                continue;
            }

            let outcome = self.queue.enqueue_for_upload(extraction.sent, sent_all);
            dispatched += outcome.samples_dispatched;
            self.transparency
                .record_chunks_enqueued(outcome.chunks_dispatched as u64);

            for err in &outcome.errors {
                warn!(bucket = %key, "Batch not uploaded: {err}");
                self.transparency.record_samples_dropped(err.count() as u64);
            }

            self.buffer.restore(&key, outcome.remainder);
        }

        if dispatched > 0 {
            debug!(dispatched, sent_all, "Flushed samples");
        }
        dispatched
    }

    /// Drop samples older than `min_time` without uploading them.
    pub fn drop_samples_before_time(&mut self, min_time: u64) -> usize {
        let dropped = self.buffer.drop_samples_before_time(min_time);
        if dropped > 0 {
            info!(dropped, "Dropped stale samples");
            self.transparency.record_samples_dropped(dropped as u64);
        }
        dropped
    }

    /// Drop samples older than the configured retention, relative to `now_ms`.
    pub fn prune_stale(&mut self, now_ms: u64) -> usize {
        let horizon = now_ms.saturating_sub(self.config.retention.as_millis() as u64);
        self.drop_samples_before_time(horizon)
    }

    /// Register the handler for `kind`, replacing any previous one.
    pub fn on_error<F>(&mut self, kind: ErrorKind, handler: F)
    where
        F: FnMut(&StoreError) + Send + 'static,
    {
        *self.handlers.slot(kind) = Some(Box::new(handler));
    }

    /// Drain pending status messages without blocking. Returns how many
    /// were processed.
    pub fn poll_upload_status(&mut self) -> usize {
        let Some(ref mut rx) = self.status else {
            return 0;
        };

        let mut processed = 0;
        while let Ok(status) = rx.try_recv() {
            processed += 1;
            match status {
                UploadStatus::Start { in_queue } => {
                    self.upload_stats.in_queue = in_queue;
                }
                UploadStatus::Ok {
                    in_queue,
                    duration_ms,
                } => {
                    self.upload_stats.in_queue = in_queue;
                    self.upload_stats.chunks_uploaded += 1;
                    self.upload_stats.last_duration_ms = Some(duration_ms);
                    self.transparency.record_chunk_uploaded();
                }
                UploadStatus::Error { message, code } => {
                    self.upload_stats.upload_failures += 1;
                    self.upload_stats.last_error = Some(message);
                    self.upload_stats.last_error_code = code;
                    self.transparency.record_upload_failure();
                }
            }
        }
        processed
    }

    /// Snapshot of buffer and upload statistics.
    pub fn stats(&self) -> ManagerStats {
        let total = self.buffer.total_sample_count();
        let capacity = self.config.effective_capacity_hint();
        let buffer_utilization = if capacity == 0 {
            0.0
        } else {
            total as f64 / capacity as f64 * 100.0
        };

        ManagerStats {
            total_samples: total,
            bucket_count: self.buffer.bucket_count(),
            buffer_utilization,
            upload: self.upload_stats.clone(),
        }
    }

    /// Empty the buffer without uploading anything.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Read-only access to the buffer.
    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    pub fn transparency(&self) -> &SharedTransparencyLog {
        &self.transparency
    }
}
