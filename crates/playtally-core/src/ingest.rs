//! The single gate between a raw fetch result and durable history.
//!
//! Rules, evaluated in order:
//! 1. no observed value → [`Rejection::FetchFailed`]
//! 2. value below the last stored value → [`Rejection::DecreasingValue`]
//! 3. empty series → accept (bootstrap sample)
//! 4. same calendar hour as the last sample → [`Rejection::SameBucketSkipped`]
//! 5. clock earlier than the last sample → [`Rejection::ClockSkew`]
//! 6. otherwise accept `{ now, value }`
//!
//! A rejected reading is dropped, never corrected or averaged. The next
//! reading is judged on its own.

use std::fmt;

use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;

use crate::sample::{HourBucket, Sample, TimeSeries};

/// Why a reading was not appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The fetch produced no value.
    FetchFailed,
    /// The reading is lower than the last stored value.
    DecreasingValue { last: u64, observed: u64 },
    /// The last sample already falls in this hour. Normal cadence control.
    SameBucketSkipped { bucket: HourBucket },
    /// The clock reads earlier than the last stored sample.
    ClockSkew {
        last: DateTime<Tz>,
        now: DateTime<Tz>,
    },
}

impl Rejection {
    /// Short machine-friendly name.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FetchFailed => "fetch_failed",
            Self::DecreasingValue { .. } => "decreasing_value_rejected",
            Self::SameBucketSkipped { .. } => "same_bucket_skipped",
            Self::ClockSkew { .. } => "clock_skew",
        }
    }

    /// True for outcomes that indicate something went wrong.
    pub fn is_anomaly(&self) -> bool {
        !matches!(self, Self::SameBucketSkipped { .. })
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FetchFailed => write!(f, "fetch failed"),
            Self::DecreasingValue { last, observed } => {
                write!(f, "decreasing value {observed} < last stored {last}")
            }
            Self::SameBucketSkipped { bucket } => write!(f, "hour {bucket} already sampled"),
            Self::ClockSkew { last, now } => write!(
                f,
                "clock {} is behind last sample {}",
                now.format("%Y-%m-%d %H:%M:%S"),
                last.format("%Y-%m-%d %H:%M:%S")
            ),
        }
    }
}

impl Serialize for Rejection {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.kind())
    }
}

/// Result of evaluating one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept(Sample),
    Reject(Rejection),
}

/// Hour-bucketed, monotonic acceptance policy.
#[derive(Debug, Clone, Copy)]
pub struct IngestionPolicy {
    tz: Tz,
}

impl IngestionPolicy {
    /// Buckets are computed in the reporting zone `tz`.
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    pub fn time_zone(&self) -> Tz {
        self.tz
    }

    /// Decide whether `observed` at `now` should be appended to `series`.
    pub fn evaluate(&self, series: &TimeSeries, observed: Option<u64>, now: DateTime<Tz>) -> Decision {
        let Some(value) = observed else {
            return Decision::Reject(Rejection::FetchFailed);
        };

        let Some(last) = series.last() else {
            return Decision::Accept(self.sample_at(now, value));
        };

        if value < last.value {
            return Decision::Reject(Rejection::DecreasingValue {
                last: last.value,
                observed: value,
            });
        }

        let bucket = HourBucket::of(&now, self.tz);
        if HourBucket::of(&last.timestamp, self.tz) == bucket {
            return Decision::Reject(Rejection::SameBucketSkipped { bucket });
        }

        if now < last.timestamp {
            return Decision::Reject(Rejection::ClockSkew {
                last: last.timestamp,
                now: now.with_timezone(&self.tz),
            });
        }

        Decision::Accept(self.sample_at(now, value))
    }

    fn sample_at(&self, now: DateTime<Tz>, value: u64) -> Sample {
        Sample::new(now.with_timezone(&self.tz), value)
    }
}
