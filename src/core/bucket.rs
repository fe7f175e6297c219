//! Ordered storage of samples sharing one identity tuple.
//!
//! Samples may arrive out of order; extraction sorts the in-range slice so
//! delivery within a bucket is always oldest first.

use crate::sample::Sample;

/// Result of extracting samples from a bucket.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Samples to deliver, ascending by time
    pub sent: Vec<Sample>,
    /// Number of samples left behind in the bucket
    pub remaining: usize,
}

/// Mutable collection of samples for one bucket key.
#[derive(Debug, Default)]
pub struct CameraSampleBucket {
    samples: Vec<Sample>,
}

/// True if `time` falls in the half-open window `[min_time, max_time)`.
pub fn in_window(time: u64, min_time: u64, max_time: u64) -> bool {
    time >= min_time && time < max_time
}

impl CameraSampleBucket {
    /// Create an empty bucket.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample.
    pub fn add(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// Get the number of samples held.
    pub fn count(&self) -> usize {
        self.samples.len()
    }

    /// Check if the bucket holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Check if the bucket holds at least `max_size` samples.
    pub fn is_full(&self, max_size: usize) -> bool {
        self.count() >= max_size
    }

    /// Read-only view of the held samples, in insertion order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Take up to `max_size` of the oldest samples with
    /// `min_time <= time < max_time`.
    ///
    /// Leftover in-range samples come first in the new contents, followed by
    /// the out-of-range ones.
    pub fn extract_by_timestamp(
        &mut self,
        min_time: u64,
        max_time: u64,
        max_size: usize,
    ) -> Extraction {
        let (mut in_range, out_of_range): (Vec<Sample>, Vec<Sample>) =
            std::mem::take(&mut self.samples)
                .into_iter()
                .partition(|s| in_window(s.time(), min_time, max_time));

        // Stable, so equal timestamps keep arrival order
        in_range.sort_by_key(|s| s.time());

        let leftover = in_range.split_off(max_size.min(in_range.len()));
        let sent = in_range;

        self.samples = leftover;
        self.samples.extend(out_of_range);

        Extraction {
            sent,
            remaining: self.samples.len(),
        }
    }

    /// Remove samples older than `min_time` without delivering them.
    ///
    /// Returns the number of samples dropped.
    pub fn drop_samples_before_time(&mut self, min_time: u64) -> usize {
        let before = self.samples.len();
        self.samples.retain(|s| s.time() >= min_time);
        before - self.samples.len()
    }

    /// Put extracted samples back into the bucket.
    pub(crate) fn restore(&mut self, samples: Vec<Sample>) {
        self.samples.extend(samples);
    }

    /// Remove every sample.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
