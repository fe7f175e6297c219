//! Transparency log for biometric sample collection.
//!
//! Tracks how many samples were captured, rejected, discarded and uploaded
//! so the user can see exactly what left the machine. Only counts are kept;
//! no sample content is ever written here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Collection and upload counters for the current session.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Samples accepted into the buffer
    samples_stored: AtomicU64,
    /// Samples rejected by validation or capacity checks
    samples_rejected: AtomicU64,
    /// Samples discarded without upload (stale, cleared, unserializable)
    samples_dropped: AtomicU64,
    /// Chunks handed to the upload task
    chunks_enqueued: AtomicU64,
    /// Chunks acknowledged by the endpoint
    chunks_uploaded: AtomicU64,
    /// Chunks that exhausted their upload attempts
    upload_failures: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    /// Create a new transparency log.
    pub fn new() -> Self {
        Self {
            samples_stored: AtomicU64::new(0),
            samples_rejected: AtomicU64::new(0),
            samples_dropped: AtomicU64::new(0),
            chunks_enqueued: AtomicU64::new(0),
            chunks_uploaded: AtomicU64::new(0),
            upload_failures: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a transparency log with persistence.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            warn!("Could not load previous transparency stats: {e}");
        }

        log
    }

    pub fn record_sample_stored(&self) {
        self.samples_stored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sample_rejected(&self) {
        self.samples_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_samples_dropped(&self, count: u64) {
        self.samples_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_chunks_enqueued(&self, count: u64) {
        self.chunks_enqueued.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_chunk_uploaded(&self) {
        self.chunks_uploaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upload_failure(&self) {
        self.upload_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            samples_stored: self.samples_stored.load(Ordering::Relaxed),
            samples_rejected: self.samples_rejected.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            chunks_enqueued: self.chunks_enqueued.load(Ordering::Relaxed),
            chunks_uploaded: self.chunks_uploaded.load(Ordering::Relaxed),
            upload_failures: self.upload_failures.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Samples stored: {}\n\
             - Samples rejected: {}\n\
             - Samples discarded: {}\n\
             - Chunks enqueued: {}\n\
             - Chunks uploaded: {}\n\
             - Upload failures: {}\n\
             - Session duration: {} seconds\n\
             \n\
             Privacy Guarantee:\n\
             - No camera frames leave this machine, only 48x48 eye crops\n\
             - Samples are held in memory only until uploaded\n\
             - Pausing discards every buffered sample",
            stats.samples_stored,
            stats.samples_rejected,
            stats.samples_dropped,
            stats.chunks_enqueued,
            stats.chunks_uploaded,
            stats.upload_failures,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                samples_stored: stats.samples_stored,
                samples_rejected: stats.samples_rejected,
                samples_dropped: stats.samples_dropped,
                chunks_enqueued: stats.chunks_enqueued,
                chunks_uploaded: stats.chunks_uploaded,
                upload_failures: stats.upload_failures,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.samples_stored
                    .store(persisted.samples_stored, Ordering::Relaxed);
                self.samples_rejected
                    .store(persisted.samples_rejected, Ordering::Relaxed);
                self.samples_dropped
                    .store(persisted.samples_dropped, Ordering::Relaxed);
                self.chunks_enqueued
                    .store(persisted.chunks_enqueued, Ordering::Relaxed);
                self.chunks_uploaded
                    .store(persisted.chunks_uploaded, Ordering::Relaxed);
                self.upload_failures
                    .store(persisted.upload_failures, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.samples_stored.store(0, Ordering::Relaxed);
        self.samples_rejected.store(0, Ordering::Relaxed);
        self.samples_dropped.store(0, Ordering::Relaxed);
        self.chunks_enqueued.store(0, Ordering::Relaxed);
        self.chunks_uploaded.store(0, Ordering::Relaxed);
        self.upload_failures.store(0, Ordering::Relaxed);
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub samples_stored: u64,
    pub samples_rejected: u64,
    pub samples_dropped: u64,
    pub chunks_enqueued: u64,
    pub chunks_uploaded: u64,
    pub upload_failures: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    samples_stored: u64,
    samples_rejected: u64,
    samples_dropped: u64,
    chunks_enqueued: u64,
    chunks_uploaded: u64,
    upload_failures: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

/// Create a new shared transparency log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparency_log_counting() {
        let log = TransparencyLog::new();

        log.record_sample_stored();
        log.record_sample_stored();
        log.record_sample_rejected();
        log.record_chunks_enqueued(3);
        log.record_chunk_uploaded();

        let stats = log.stats();
        assert_eq!(stats.samples_stored, 2);
        assert_eq!(stats.samples_rejected, 1);
        assert_eq!(stats.chunks_enqueued, 3);
        assert_eq!(stats.chunks_uploaded, 1);
    }

    #[test]
    fn test_transparency_log_reset() {
        let log = TransparencyLog::new();

        log.record_samples_dropped(100);
        log.record_upload_failure();
        log.reset();

        let stats = log.stats();
        assert_eq!(stats.samples_dropped, 0);
        assert_eq!(stats.upload_failures, 0);
    }

    #[test]
    fn test_persistence_round_trip() {
        let path = std::env::temp_dir()
            .join(format!("gaze-transparency-{}", uuid::Uuid::new_v4()))
            .join("transparency.json");

        let log = TransparencyLog::with_persistence(path.clone());
        log.record_sample_stored();
        log.record_chunk_uploaded();
        log.save().unwrap();

        let reloaded = TransparencyLog::with_persistence(path.clone());
        let stats = reloaded.stats();
        assert_eq!(stats.samples_stored, 1);
        assert_eq!(stats.chunks_uploaded, 1);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_summary_format() {
        let log = TransparencyLog::new();
        let summary = log.summary();

        assert!(summary.contains("Samples stored"));
        assert!(summary.contains("Chunks uploaded"));
        assert!(summary.contains("Privacy Guarantee"));
    }
}
