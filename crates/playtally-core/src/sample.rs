//! Samples, persisted records and the ordered per-item series.
//!
//! A [`Sample`] is one observation of the play count, stamped with a civil
//! time in the fixed reporting zone. On disk it becomes a [`SampleRecord`]:
//! the timestamp as `YYYY-MM-DD HH:MM:SS <ZONE>` and the value as decimal
//! text, so large counts never pass through a float.

use std::fmt;

use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, SubsecRound, TimeZone, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SampleError;

/// `strftime` pattern of the civil part of a persisted timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Length of a formatted civil timestamp (`2024-01-01 10:00:00`).
const CIVIL_LEN: usize = 19;

// ---------------------------------------------------------------------------
// Sample
// ---------------------------------------------------------------------------

/// One timestamped observation. Immutable once written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    pub timestamp: DateTime<Tz>,
    pub value: u64,
}

impl Sample {
    /// Build a sample, dropping sub-second precision the record format can't hold.
    pub fn new(timestamp: DateTime<Tz>, value: u64) -> Self {
        Self {
            timestamp: timestamp.trunc_subsecs(0),
            value,
        }
    }

    /// Convert to the persisted representation.
    pub fn to_record(&self) -> SampleRecord {
        SampleRecord {
            timestamp: format_timestamp(&self.timestamp),
            value: self.value.to_string(),
        }
    }

    /// Parse a persisted record, interpreting the civil time in `tz`.
    pub fn from_record(record: &SampleRecord, tz: Tz) -> Result<Self, SampleError> {
        let timestamp = parse_timestamp(&record.timestamp, tz)?;
        let value = record
            .value
            .trim()
            .parse::<u64>()
            .map_err(|_| SampleError::MalformedValue {
                raw: record.value.clone(),
            })?;
        Ok(Self { timestamp, value })
    }
}

impl Serialize for Sample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("Sample", 2)?;
        s.serialize_field("timestamp", &format_timestamp(&self.timestamp))?;
        s.serialize_field("value", &self.value)?;
        s.end()
    }
}

/// Format a timestamp as `YYYY-MM-DD HH:MM:SS <ZONE>`, e.g. `2024-01-01 10:00:00 IST`.
pub fn format_timestamp(ts: &DateTime<Tz>) -> String {
    format!("{} {}", ts.format(TIMESTAMP_FORMAT), ts.format("%Z"))
}

/// Current wall-clock time in `tz`, truncated to whole seconds.
pub fn now_in(tz: Tz) -> DateTime<Tz> {
    chrono::Utc::now().with_timezone(&tz).trunc_subsecs(0)
}

/// Parse a persisted timestamp. The civil time is always interpreted in the
/// reporting zone `tz`. The optional zone suffix only picks between the two
/// instants of a repeated local time (e.g. `EDT` vs `EST` at a DST fall-back);
/// without a matching suffix the earlier instant is used.
pub fn parse_timestamp(raw: &str, tz: Tz) -> Result<DateTime<Tz>, SampleError> {
    let malformed = || SampleError::MalformedTimestamp {
        raw: raw.to_string(),
    };

    let trimmed = raw.trim();
    let civil = trimmed.get(..CIVIL_LEN).ok_or_else(malformed)?;
    let rest = &trimmed[CIVIL_LEN..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return Err(malformed());
    }
    if rest.trim().contains(char::is_whitespace) {
        return Err(malformed());
    }

    let naive = NaiveDateTime::parse_from_str(civil, TIMESTAMP_FORMAT).map_err(|_| malformed())?;
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(ts) => Ok(ts),
        LocalResult::Ambiguous(earlier, later) => {
            let suffix = rest.trim();
            let names_later = !suffix.is_empty()
                && later.format("%Z").to_string() == suffix
                && earlier.format("%Z").to_string() != suffix;
            Ok(if names_later { later } else { earlier })
        }
        LocalResult::None => Err(SampleError::NonexistentLocalTime {
            raw: raw.to_string(),
            zone: tz.name().to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Persisted record
// ---------------------------------------------------------------------------

/// On-disk form of a sample.
///
/// Older history files call the value field `play_count` and may store it as
/// a JSON number; both are accepted on read, only the canonical form is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub timestamp: String,
    #[serde(alias = "play_count", deserialize_with = "value_text")]
    pub value: String,
}

fn value_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Hour bucket
// ---------------------------------------------------------------------------

/// Calendar hour in the reporting zone; at most one sample is accepted per bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HourBucket {
    pub date: NaiveDate,
    pub hour: u32,
}

impl HourBucket {
    /// Bucket of `ts`, evaluated in `tz`.
    pub fn of(ts: &DateTime<Tz>, tz: Tz) -> Self {
        let local = ts.with_timezone(&tz).naive_local();
        Self {
            date: local.date(),
            hour: local.hour(),
        }
    }
}

impl fmt::Display for HourBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:02}:00", self.date.format("%Y-%m-%d"), self.hour)
    }
}

// ---------------------------------------------------------------------------
// Time series
// ---------------------------------------------------------------------------

/// Samples of one tracked item, ascending by timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeSeries {
    samples: Vec<Sample>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a series from samples in any order. Equal timestamps keep their
    /// relative order.
    pub fn from_samples(mut samples: Vec<Sample>) -> Self {
        samples.sort_by_key(|s| s.timestamp);
        Self { samples }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Add a sample, keeping timestamp order. Samples are never removed.
    pub fn push(&mut self, sample: Sample) {
        let at = self
            .samples
            .partition_point(|s| s.timestamp <= sample.timestamp);
        self.samples.insert(at, sample);
    }

    /// Persisted representation, oldest first.
    pub fn to_records(&self) -> Vec<SampleRecord> {
        self.samples.iter().map(Sample::to_record).collect()
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}
