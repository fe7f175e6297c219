//! Core functionality for the gaze sample agent.
//!
//! This module contains:
//! - Per-identity sample buckets and the buffer that owns them
//! - The version 4 chunk encoder and decoder
//! - Batch splitting and hand-off to the upload task
//! - The sample manager tying everything together

pub mod bucket;
pub mod buffer;
pub mod manager;
pub mod queue;
pub mod serialization;

// Re-export commonly used types
pub use bucket::{in_window, CameraSampleBucket, Extraction};
pub use buffer::SampleBuffer;
pub use manager::{
    ErrorHandler, ErrorKind, ManagerConfig, ManagerStats, SampleManager, StorageError, StoreError,
    TimeWindow, UploadStats, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_RETENTION,
};
pub use queue::{EnqueueOutcome, QueueError, SampleUploadQueue};
pub use serialization::{
    chunk_len, decode_chunk, serialize, DecodedChunk, Eye, SerializationError, FORMAT_VERSION,
    HEADER_LEN, SAMPLE_RECORD_LEN,
};
