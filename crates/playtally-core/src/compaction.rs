//! Gap filter: compacts a dense raw history to a bounded cadence for export.
//!
//! One deterministic pass over the samples sorted by time. The first sample is
//! always kept, a later one only if it is at least `threshold - tolerance`
//! after the last kept sample, and the newest input sample is appended at the
//! end if the scan dropped it. Applying the filter to its own output returns
//! the output unchanged.

use chrono::TimeDelta;

use crate::sample::Sample;

/// Default minimum spacing between kept samples, in minutes.
pub const DEFAULT_THRESHOLD_MINUTES: i64 = 60;
/// Default slack subtracted from the threshold, in minutes.
pub const DEFAULT_TOLERANCE_MINUTES: i64 = 5;

/// Minimum-spacing downsampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapFilter {
    threshold: TimeDelta,
    tolerance: TimeDelta,
}

impl Default for GapFilter {
    fn default() -> Self {
        Self {
            threshold: TimeDelta::minutes(DEFAULT_THRESHOLD_MINUTES),
            tolerance: TimeDelta::minutes(DEFAULT_TOLERANCE_MINUTES),
        }
    }
}

impl GapFilter {
    pub fn new(threshold: TimeDelta, tolerance: TimeDelta) -> Self {
        Self {
            threshold,
            tolerance,
        }
    }

    /// Smallest gap a kept sample may have to its predecessor.
    pub fn min_spacing(&self) -> TimeDelta {
        self.threshold - self.tolerance
    }

    /// Compact `samples`. Input order does not matter; equal timestamps keep
    /// their relative order.
    pub fn apply(&self, samples: &[Sample]) -> Vec<Sample> {
        let mut sorted = samples.to_vec();
        sorted.sort_by_key(|s| s.timestamp);

        if sorted.is_empty() {
            return Vec::new();
        }
        let last_index = sorted.len() - 1;

        let min_spacing = self.min_spacing();
        let mut kept: Vec<Sample> = Vec::with_capacity(sorted.len());
        let mut last_kept_index = 0;
        for (i, sample) in sorted.iter().enumerate() {
            let keep = match kept.last() {
                None => true,
                Some(prev) => sample.timestamp - prev.timestamp >= min_spacing,
            };
            if keep {
                kept.push(*sample);
                last_kept_index = i;
            }
        }

        if last_kept_index != last_index {
            kept.push(sorted[last_index]);
        }
        kept
    }
}
