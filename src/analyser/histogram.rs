//! Fixed-boundary histograms for message sizes and turn timings.
use serde::Serialize;

/// Upper (exclusive) bounds of the size buckets in bytes. One extra bucket catches >= 10000.
pub const SIZE_BOUNDS: [u32; 21] = [
    50, 100, 150, 200, 300, 400, 500, 600, 700, 800, 900, 1000, 1200, 1400, 1600, 1800, 2000,
    3000, 4000, 5000, 10000,
];
pub const SIZE_BUCKETS: usize = SIZE_BOUNDS.len() + 1;

/// Upper (exclusive) bounds of the timing buckets in milliseconds. There is no overflow bucket.
pub const TIME_BOUNDS_MS: [u32; 8] = [10, 50, 100, 200, 500, 1000, 2500, 5000];
pub const TIME_BUCKETS: usize = TIME_BOUNDS_MS.len();

/// Message sizes of one direction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SizeHistogram {
    counts: [u32; SIZE_BUCKETS],
}

impl SizeHistogram {
    /// Index of the right-open bucket `length` falls into.
    pub fn bucket_of(length: u32) -> usize {
        SIZE_BOUNDS
            .iter()
            .position(|&bound| length < bound)
            .unwrap_or(SIZE_BUCKETS - 1)
    }

    pub fn register(&mut self, length: u32) {
        self.counts[Self::bucket_of(length)] += 1;
    }

    pub fn counts(&self) -> &[u32; SIZE_BUCKETS] {
        &self.counts
    }
}

/// Query spacing (upload side) or response latency (download side).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimeHistogram {
    counts: [u32; TIME_BUCKETS],
}

impl TimeHistogram {
    /// Bucket for a value in seconds, or None if it is at or above the last bound.
    ///
    /// Bounds are compared in seconds, so 0.2 s is exactly the 200 ms bound and lands above it.
    pub fn bucket_of(seconds: f64) -> Option<usize> {
        TIME_BOUNDS_MS
            .iter()
            .position(|&bound| seconds < f64::from(bound) / 1000.0)
    }

    /// Counts `seconds`; values past the last bound are dropped.
    pub fn register(&mut self, seconds: f64) {
        if let Some(index) = Self::bucket_of(seconds) {
            self.counts[index] += 1;
        }
    }

    pub fn counts(&self) -> &[u32; TIME_BUCKETS] {
        &self.counts
    }
}

/// Relative frequencies of one direction, as emitted at flow end.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Frequencies {
    pub size: [f64; SIZE_BUCKETS],
    pub time: [f64; TIME_BUCKETS],
}

impl Frequencies {
    /// Divides every counter by `messages`. No messages means all zeros.
    pub fn normalise(sizes: &SizeHistogram, times: &TimeHistogram, messages: u32) -> Self {
        let mut freq = Frequencies {
            size: [0.0; SIZE_BUCKETS],
            time: [0.0; TIME_BUCKETS],
        };

        if messages == 0 {
            return freq;
        }

        let total = f64::from(messages);
        for (out, &count) in freq.size.iter_mut().zip(sizes.counts()) {
            *out = f64::from(count) / total;
        }
        for (out, &count) in freq.time.iter_mut().zip(times.counts()) {
            *out = f64::from(count) / total;
        }

        freq
    }
}
