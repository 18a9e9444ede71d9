// zcl-core: fixed-bound latency histogram
// Bucket bounds span 5us..5s in microseconds, matching the event-loop and
// task run-queue latency accounting.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bucket upper bounds, in microseconds. The last bucket is unbounded.
pub const LATENCY_BOUNDS_US: [u64; 19] = [
    5,
    10,
    25,
    75,
    250,
    500,
    750,
    1_000,
    5_000,
    10_000,
    25_000,
    75_000,
    250_000,
    500_000,
    750_000,
    1_000_000,
    2_000_000,
    5_000_000,
    u64::MAX,
];

/// Concurrent fixed-bucket histogram. `add` is lock-free; `snapshot` is a
/// relaxed read and may tear under concurrent writes, which is acceptable
/// for monitoring output.
#[derive(Debug)]
pub struct Histogram {
    buckets: [AtomicU64; LATENCY_BOUNDS_US.len()],
    count: AtomicU64,
    sum: AtomicU64,
    max: AtomicU64,
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            count: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            max: AtomicU64::new(0),
        }
    }

    /// Record one event of `micros` microseconds.
    pub fn add(&self, micros: u64) {
        let idx = LATENCY_BOUNDS_US
            .iter()
            .position(|&b| micros <= b)
            .unwrap_or(LATENCY_BOUNDS_US.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(micros, Ordering::Relaxed);
        self.max.fetch_max(micros, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn max(&self) -> u64 {
        self.max.load(Ordering::Relaxed)
    }

    /// Upper bound of the bucket containing the p-th percentile event
    /// (0.0..=1.0).
    pub fn percentile(&self, p: f64) -> u64 {
        let total = self.count();
        if total == 0 {
            return 0;
        }
        let target = ((total as f64) * p).ceil() as u64;
        let mut seen = 0u64;
        for (i, bucket) in self.buckets.iter().enumerate() {
            seen += bucket.load(Ordering::Relaxed);
            if seen >= target {
                return LATENCY_BOUNDS_US[i];
            }
        }
        self.max()
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot {
            counts: std::array::from_fn(|i| self.buckets[i].load(Ordering::Relaxed)),
            count: self.count(),
            sum: self.sum.load(Ordering::Relaxed),
            max: self.max(),
        }
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of a [`Histogram`], serialisable for stats output.
#[derive(Debug, Clone, Serialize)]
pub struct HistogramSnapshot {
    pub counts: [u64; LATENCY_BOUNDS_US.len()],
    pub count: u64,
    pub sum: u64,
    pub max: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_assignment() {
        let h = Histogram::new();
        h.add(3); // <= 5us
        h.add(5);
        h.add(6); // <= 10us
        h.add(10_000_000); // beyond the last bound
        let snap = h.snapshot();
        assert_eq!(snap.counts[0], 2);
        assert_eq!(snap.counts[1], 1);
        assert_eq!(snap.counts[LATENCY_BOUNDS_US.len() - 1], 1);
        assert_eq!(snap.count, 4);
        assert_eq!(snap.max, 10_000_000);
    }

    #[test]
    fn test_percentile_monotone() {
        let h = Histogram::new();
        for v in [1u64, 8, 30, 100, 300, 900, 2_000, 800_000] {
            h.add(v);
        }
        assert!(h.percentile(0.5) <= h.percentile(0.95));
        assert!(h.percentile(0.95) <= h.percentile(1.0));
    }
}
