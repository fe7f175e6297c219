//! Registry of sample buckets keyed by identity tuple.

use crate::core::bucket::{CameraSampleBucket, Extraction};
use crate::sample::{BucketKey, Sample};
use std::collections::HashMap;

/// Owns every bucket plus an aggregate sample count.
///
/// Every operation that adds or removes samples updates `total` in the same
/// step, so it always equals the sum of bucket counts.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    buckets: HashMap<BucketKey, CameraSampleBucket>,
    total: usize,
}

impl SampleBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Route a sample to its bucket, creating the bucket if needed.
    pub fn add_sample(&mut self, sample: Sample) {
        self.buckets.entry(sample.bucket()).or_default().add(sample);
        self.total += 1;
    }

    /// Get a bucket by key.
    pub fn bucket(&self, key: &str) -> Option<&CameraSampleBucket> {
        self.buckets.get(key)
    }

    /// Iterate over every bucket and its key.
    pub fn buckets(&self) -> impl Iterator<Item = (&BucketKey, &CameraSampleBucket)> {
        self.buckets.iter()
    }

    /// Keys of every bucket currently registered.
    pub fn bucket_keys(&self) -> Vec<BucketKey> {
        self.buckets.keys().cloned().collect()
    }

    pub fn total_sample_count(&self) -> usize {
        self.total
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Extract from one bucket by time window.
    ///
    /// The total is adjusted by the bucket's before/after difference rather
    /// than by `sent.len()`. Returns an empty extraction for unknown keys.
    pub fn extract_from_bucket(
        &mut self,
        key: &str,
        min_time: u64,
        max_time: u64,
        max_size: usize,
    ) -> Extraction {
        let Some(bucket) = self.buckets.get_mut(key) else {
            return Extraction::default();
        };

        let before = bucket.count();
        let extraction = bucket.extract_by_timestamp(min_time, max_time, max_size);
        let after = bucket.count();

        self.total = self.total + after - before;
        extraction
    }

    /// Return samples to the bucket they were extracted from.
    pub fn restore(&mut self, key: &str, samples: Vec<Sample>) {
        if samples.is_empty() {
            return;
        }
        let added = samples.len();
        self.buckets
            .entry(key.to_string())
            .or_default()
            .restore(samples);
        self.total += added;
    }

    /// Drop samples older than `min_time` from every bucket.
    pub fn drop_samples_before_time(&mut self, min_time: u64) -> usize {
        let dropped: usize = self
            .buckets
            .values_mut()
            .map(|b| b.drop_samples_before_time(min_time))
            .sum();
        self.total -= dropped;
        dropped
    }

    /// Check whether any bucket holds at least `threshold` samples.
    pub fn has_full_buckets(&self, threshold: usize) -> bool {
        self.buckets.values().any(|b| b.is_full(threshold))
    }

    /// Empty every bucket and reset the total.
    pub fn clear(&mut self) {
        for bucket in self.buckets.values_mut() {
            bucket.clear();
        }
        self.total = 0;
    }
}
