//! Window aggregation: look-back deltas and average rate over a series.
//!
//! For a horizon `h` the reference sample is the stored sample closest in
//! time to `now - h` (absolute distance, ties go to the earlier-stored
//! sample). Series are a few thousand points at most, so this is a linear
//! scan.
//!
//! Anything derived from fewer than two samples is reported as unavailable
//! rather than as zero. The one exception is [`average_rate`], which is `0.0`
//! by definition when the span between the two samples is not positive.

use chrono::{DateTime, TimeDelta};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::AggregateError;
use crate::sample::Sample;

/// Fixed look-back horizons shown for every item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Horizon {
    Hour,
    Day,
}

impl Horizon {
    pub const ALL: [Horizon; 2] = [Horizon::Hour, Horizon::Day];

    pub fn duration(self) -> TimeDelta {
        match self {
            Self::Hour => TimeDelta::hours(1),
            Self::Day => TimeDelta::hours(24),
        }
    }
}

/// Change against the reference sample of one horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowDelta {
    pub horizon_minutes: i64,
    pub reference: Sample,
    pub delta: i64,
}

/// Everything the read path shows for one item. Recomputed on every read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateView {
    pub sample_count: usize,
    pub latest: Option<Sample>,
    pub oldest: Option<Sample>,
    pub total_increase: Option<i64>,
    pub span_minutes: Option<f64>,
    /// Value units per minute over the whole retained span.
    pub average_rate: Option<f64>,
    pub hour: Option<WindowDelta>,
    pub day: Option<WindowDelta>,
}

/// One history row with its difference to the previous (older) sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SampleChange {
    #[serde(flatten)]
    pub sample: Sample,
    pub change: Option<i64>,
}

/// Sample closest in time to `target`; the first one wins ties.
pub fn nearest_reference(samples: &[Sample], target: DateTime<Tz>) -> Option<&Sample> {
    let mut best: Option<(&Sample, TimeDelta)> = None;
    for sample in samples {
        let distance = (sample.timestamp - target).abs();
        match best {
            Some((_, d)) if distance >= d => {}
            _ => best = Some((sample, distance)),
        }
    }
    best.map(|(s, _)| s)
}

/// Delta between the newest sample and the reference `lookback` before `now`.
///
/// `samples` must be ascending by timestamp.
pub fn window_delta(
    samples: &[Sample],
    lookback: TimeDelta,
    now: DateTime<Tz>,
) -> Result<WindowDelta, AggregateError> {
    let insufficient = AggregateError::InsufficientSamples {
        have: samples.len(),
    };
    if samples.len() < 2 {
        return Err(insufficient);
    }
    let (Some(latest), Some(reference)) = (samples.last(), nearest_reference(samples, now - lookback))
    else {
        return Err(insufficient);
    };
    Ok(WindowDelta {
        horizon_minutes: lookback.num_minutes(),
        reference: *reference,
        delta: value_delta(reference, latest),
    })
}

/// Minutes between two samples, fractional.
pub fn minutes_between(oldest: &Sample, newest: &Sample) -> f64 {
    (newest.timestamp - oldest.timestamp).num_seconds() as f64 / 60.0
}

/// `(newest - oldest) / minutes`, or `0.0` when the span is zero or negative.
pub fn average_rate(oldest: &Sample, newest: &Sample) -> f64 {
    let minutes = minutes_between(oldest, newest);
    if minutes <= 0.0 {
        return 0.0;
    }
    value_delta(oldest, newest) as f64 / minutes
}

/// Build the full view for an ascending series at time `now`.
pub fn aggregate(samples: &[Sample], now: DateTime<Tz>) -> AggregateView {
    let latest = samples.last().copied();
    let oldest = samples.first().copied();

    if samples.len() < 2 {
        return AggregateView {
            sample_count: samples.len(),
            latest,
            oldest,
            total_increase: None,
            span_minutes: None,
            average_rate: None,
            hour: None,
            day: None,
        };
    }

    let (first, last) = (&samples[0], &samples[samples.len() - 1]);
    AggregateView {
        sample_count: samples.len(),
        latest,
        oldest,
        total_increase: Some(value_delta(first, last)),
        span_minutes: Some(minutes_between(first, last)),
        average_rate: Some(average_rate(first, last)),
        hour: window_delta(samples, Horizon::Hour.duration(), now).ok(),
        day: window_delta(samples, Horizon::Day.duration(), now).ok(),
    }
}

/// Per-row changes, newest first, as shown in the history table.
pub fn consecutive_changes(samples: &[Sample]) -> Vec<SampleChange> {
    let mut rows: Vec<SampleChange> = samples
        .iter()
        .enumerate()
        .map(|(i, sample)| SampleChange {
            sample: *sample,
            change: i
                .checked_sub(1)
                .map(|prev| value_delta(&samples[prev], sample)),
        })
        .collect();
    rows.reverse();
    rows
}

/// Signed change between two counter readings, saturating at the `i64` bounds.
fn value_delta(from: &Sample, to: &Sample) -> i64 {
    let delta = i128::from(to.value) - i128::from(from.value);
    i64::try_from(delta).unwrap_or(if delta > 0 { i64::MAX } else { i64::MIN })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Asia::Kolkata;

    fn t0() -> DateTime<Tz> {
        Kolkata.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn series(points: &[(i64, u64)]) -> Vec<Sample> {
        points
            .iter()
            .map(|&(m, v)| Sample::new(t0() + TimeDelta::minutes(m), v))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Nearest reference
    // -----------------------------------------------------------------------

    #[test]
    fn test_nearest_reference_picks_closest() {
        let s = series(&[(0, 10), (30, 20), (65, 30), (130, 40)]);
        let latest = s.last().unwrap().timestamp;
        let target = latest - TimeDelta::minutes(60);

        let by_65 = (s[2].timestamp - target).abs();
        let by_30 = (s[1].timestamp - target).abs();
        assert!(by_65 < by_30);

        let reference = nearest_reference(&s, target).unwrap();
        assert_eq!(reference, &s[2]);
    }

    #[test]
    fn test_nearest_reference_tie_goes_to_first() {
        let s = series(&[(0, 1), (20, 2)]);
        let reference = nearest_reference(&s, t0() + TimeDelta::minutes(10)).unwrap();
        assert_eq!(reference.value, 1);
    }

    #[test]
    fn test_nearest_reference_target_outside_range() {
        let s = series(&[(0, 1), (60, 2), (120, 3)]);
        assert_eq!(
            nearest_reference(&s, t0() - TimeDelta::hours(24)).unwrap().value,
            1
        );
        assert_eq!(
            nearest_reference(&s, t0() + TimeDelta::hours(24)).unwrap().value,
            3
        );
        assert!(nearest_reference(&[], t0()).is_none());
    }

    // -----------------------------------------------------------------------
    // Window delta
    // -----------------------------------------------------------------------

    #[test]
    fn test_window_delta_against_reference() {
        let s = series(&[(0, 100), (30, 150), (65, 170), (130, 260)]);
        let now = s.last().unwrap().timestamp;
        let w = window_delta(&s, TimeDelta::hours(1), now).unwrap();
        assert_eq!(w.reference.value, 170);
        assert_eq!(w.delta, 90);
        assert_eq!(w.horizon_minutes, 60);
    }

    #[test]
    fn test_value_delta_saturates_on_huge_counters() {
        let low = Sample::new(t0(), 0);
        let high = Sample::new(t0() + TimeDelta::minutes(60), u64::MAX);
        assert_eq!(value_delta(&low, &high), i64::MAX);
        assert_eq!(value_delta(&high, &low), i64::MIN);

        let near = Sample::new(t0(), u64::MAX - 5);
        assert_eq!(value_delta(&near, &high), 5);
    }

    #[test]
    fn test_window_delta_needs_two_samples() {
        assert_eq!(
            window_delta(&[], TimeDelta::hours(1), t0()),
            Err(AggregateError::InsufficientSamples { have: 0 })
        );
        let one = series(&[(0, 5)]);
        assert_eq!(
            window_delta(&one, TimeDelta::hours(1), t0()),
            Err(AggregateError::InsufficientSamples { have: 1 })
        );
    }

    // -----------------------------------------------------------------------
    // Rate
    // -----------------------------------------------------------------------

    #[test]
    fn test_average_rate() {
        let s = series(&[(0, 1000), (100, 1500)]);
        assert_eq!(average_rate(&s[0], &s[1]), 5.0);
    }

    #[test]
    fn test_average_rate_zero_span() {
        let s = series(&[(10, 1000), (10, 1500)]);
        assert_eq!(average_rate(&s[0], &s[1]), 0.0);
        // Reversed arguments give a negative span, also defined as zero.
        let s = series(&[(0, 1000), (10, 1500)]);
        assert_eq!(average_rate(&s[1], &s[0]), 0.0);
    }

    // -----------------------------------------------------------------------
    // Aggregate view
    // -----------------------------------------------------------------------

    #[test]
    fn test_aggregate_empty_and_single() {
        let view = aggregate(&[], t0());
        assert_eq!(view.sample_count, 0);
        assert!(view.latest.is_none());
        assert!(view.average_rate.is_none());

        let one = series(&[(0, 7)]);
        let view = aggregate(&one, t0());
        assert_eq!(view.latest.unwrap().value, 7);
        assert!(view.total_increase.is_none());
        assert!(view.average_rate.is_none());
        assert!(view.hour.is_none());
        assert!(view.day.is_none());
    }

    #[test]
    fn test_aggregate_full_view() {
        // One sample per hour for 30 hours, +10 each hour.
        let points: Vec<(i64, u64)> = (0..30).map(|h| (h * 60, 1000 + 10 * h as u64)).collect();
        let s = series(&points);
        let now = s.last().unwrap().timestamp;
        let view = aggregate(&s, now);

        assert_eq!(view.sample_count, 30);
        assert_eq!(view.total_increase, Some(290));
        assert_eq!(view.span_minutes, Some(29.0 * 60.0));
        assert!((view.average_rate.unwrap() - 290.0 / 1740.0).abs() < 1e-9);
        assert_eq!(view.hour.unwrap().delta, 10);
        assert_eq!(view.day.unwrap().delta, 240);
    }

    #[test]
    fn test_aggregate_serializes_missing_as_null() {
        let view = aggregate(&series(&[(0, 7)]), t0());
        let json = serde_json::to_value(&view).unwrap();
        assert!(json["hour"].is_null());
        assert!(json["average_rate"].is_null());
        assert_eq!(json["latest"]["value"], 7);
    }

    // -----------------------------------------------------------------------
    // Consecutive changes
    // -----------------------------------------------------------------------

    #[test]
    fn test_consecutive_changes_newest_first() {
        let s = series(&[(0, 100), (60, 130), (120, 130)]);
        let rows = consecutive_changes(&s);
        let got: Vec<(u64, Option<i64>)> = rows.iter().map(|r| (r.sample.value, r.change)).collect();
        assert_eq!(got, vec![(130, Some(0)), (130, Some(30)), (100, None)]);
    }

    #[test]
    fn test_consecutive_changes_empty() {
        assert!(consecutive_changes(&[]).is_empty());
    }
}
