//! Synthetic sample source.
//!
//! Stands in for the camera pipeline: a background thread emits valid
//! samples for one identity at a fixed rate, sweeping the gaze target
//! across the screen. Used to exercise the full capture and upload path
//! without a camera.

use crate::sample::{Goal, Identity, Sample, ValidationError, EYE_CROP_LEN, POINTS_LEN};
use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Capacity of the sample channel.
const CHANNEL_CAPACITY: usize = 1_024;

/// Errors that can occur when starting a source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Source is already running")]
    AlreadyRunning,

    #[error("Could not spawn source thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Source configuration.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Identity stamped on every sample
    pub identity: Identity,
    /// Interval between samples
    pub interval: Duration,
    /// Attach synthetic eye crops
    pub with_eyes: bool,
}

impl SourceConfig {
    pub fn new(identity: Identity) -> Self {
        Self {
            identity,
            interval: Duration::from_millis(33), // ~30 fps
            with_eyes: true,
        }
    }
}

/// Background generator of synthetic samples.
pub struct SyntheticSource {
    config: SourceConfig,
    sender: Sender<Sample>,
    receiver: Receiver<Sample>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SyntheticSource {
    /// Create a new source. Nothing is produced until [`Self::start`].
    pub fn new(config: SourceConfig) -> Self {
        let (sender, receiver) = bounded(CHANNEL_CAPACITY);
        Self {
            config,
            sender,
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Start producing samples on a background thread.
    pub fn start(&mut self) -> Result<(), SourceError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(SourceError::AlreadyRunning);
        }
        self.running.store(true, Ordering::SeqCst);

        let config = self.config.clone();
        let sender = self.sender.clone();
        let running = self.running.clone();

        let spawned = std::thread::Builder::new()
            .name("synthetic-source".to_string())
            .spawn(move || generate(config, sender, running));

        match spawned {
            Ok(handle) => {
                self.thread = Some(handle);
                info!(
                    interval_ms = self.config.interval.as_millis() as u64,
                    "Synthetic source started"
                );
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Stop producing samples and wait for the thread to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
            info!("Synthetic source stopped");
        }
    }

    /// Check if the source is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for samples.
    pub fn receiver(&self) -> &Receiver<Sample> {
        &self.receiver
    }

    /// Try to receive a sample without blocking.
    pub fn try_recv(&self) -> Option<Sample> {
        self.receiver.try_recv().ok()
    }

    /// Wait up to `timeout` for a sample.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Sample> {
        match self.receiver.recv_timeout(timeout) {
            Ok(sample) => Some(sample),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn generate(config: SourceConfig, sender: Sender<Sample>, running: Arc<AtomicBool>) {
    let mut tick: u64 = 0;

    while running.load(Ordering::SeqCst) {
        let now = Utc::now().timestamp_millis().max(0) as u64;
        match synthetic_sample(&config, tick, now).map(|sample| sender.try_send(sample)) {
            Ok(Ok(())) => {}
            Ok(Err(TrySendError::Full(_))) => debug!("Sample channel full, dropping sample"),
            Ok(Err(TrySendError::Disconnected(_))) => break,
            Err(e) => warn!("Skipping synthetic sample: {e}"),
        }

        tick = tick.wrapping_add(1);
        std::thread::sleep(config.interval);
    }
}

/// Build one deterministic sample for `tick`.
pub fn synthetic_sample(
    config: &SourceConfig,
    tick: u64,
    time: u64,
) -> Result<Sample, ValidationError> {
    // Lissajous sweep within [-1, 1]
    let phase = tick as f32 * 0.05;
    let goal = Goal::new(phase.sin(), (phase * 0.7).cos());

    let points: Vec<f32> = (0..POINTS_LEN)
        .map(|i| ((i as f32 + phase) * 0.01).fract())
        .collect();

    let sample = Sample::new(time, config.identity.clone(), points, Some(goal))?;

    if !config.with_eyes {
        return Ok(sample);
    }

    let shade = (tick % 256) as u8;
    Ok(sample.with_eyes(
        Some(vec![shade; EYE_CROP_LEN]),
        Some(vec![shade.wrapping_add(128); EYE_CROP_LEN]),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::validate_sample;

    fn config() -> SourceConfig {
        SourceConfig::new(Identity::new(
            "u".repeat(36),
            "p".repeat(36),
            "s".repeat(36),
            "c".repeat(36),
            "m".repeat(36),
        ))
    }

    #[test]
    fn test_synthetic_samples_are_valid() {
        let config = config();
        for tick in 0..500 {
            let sample = synthetic_sample(&config, tick, 1_000 + tick).unwrap();
            assert!(validate_sample(&sample).is_ok());
            assert_eq!(sample.points().len(), POINTS_LEN);
            assert_eq!(sample.left_eye().map(<[u8]>::len), Some(EYE_CROP_LEN));
        }
    }

    #[test]
    fn test_without_eyes() {
        let mut config = config();
        config.with_eyes = false;
        let sample = synthetic_sample(&config, 3, 42).unwrap();
        assert!(sample.left_eye().is_none());
        assert!(sample.right_eye().is_none());
        assert_eq!(sample.time(), 42);
    }

    #[test]
    fn test_start_stop() {
        let mut config = config();
        config.interval = Duration::from_millis(1);
        let mut source = SyntheticSource::new(config);

        source.start().unwrap();
        assert!(source.is_running());
        assert!(matches!(source.start(), Err(SourceError::AlreadyRunning)));

        assert!(source.recv_timeout(Duration::from_secs(2)).is_some());

        source.stop();
        assert!(!source.is_running());
    }
}
