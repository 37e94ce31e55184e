/// Time-bucketing plans for trend series.
///
/// A coarse range token is anchored to the latest pickup in the store, not
/// to wall-clock time, so results only change when the data does. Relative
/// ranges also pick the bucket granularity themselves; the caller's
/// granularity is only honored for `all`.
use crate::query::{FilterSet, FilterValue, Predicate, TripField};
use chrono::{Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse time range token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeRange {
    /// `7d`
    #[serde(rename = "7d")]
    Last7Days,
    /// `30d`
    #[serde(rename = "30d")]
    Last30Days,
    /// `3m` (90 days)
    #[serde(rename = "3m")]
    Last3Months,
    /// `all`, or no token
    #[default]
    #[serde(rename = "all")]
    All,
}

impl TimeRange {
    /// Parse a range token. Absent or unrecognized tokens mean `All`.
    pub fn parse(token: Option<&str>) -> Self {
        match token.map(str::trim) {
            Some("7d") => TimeRange::Last7Days,
            Some("30d") => TimeRange::Last30Days,
            Some("3m") => TimeRange::Last3Months,
            Some("all") | None => TimeRange::All,
            Some(other) => {
                tracing::debug!("Unknown time range '{}', using all time", other);
                TimeRange::All
            }
        }
    }

    /// Look-back window, if this range is relative to the anchor.
    pub fn lookback(&self) -> Option<Duration> {
        match self {
            TimeRange::Last7Days => Some(Duration::days(7)),
            TimeRange::Last30Days => Some(Duration::days(30)),
            TimeRange::Last3Months => Some(Duration::days(90)),
            TimeRange::All => None,
        }
    }

    /// Granularity forced by this range, if any.
    pub fn forced_granularity(&self) -> Option<Granularity> {
        match self {
            TimeRange::Last7Days => Some(Granularity::Hour),
            TimeRange::Last30Days | TimeRange::Last3Months => Some(Granularity::Day),
            TimeRange::All => None,
        }
    }

    /// Whether resolving this range needs the store's anchor timestamp.
    pub fn needs_anchor(&self) -> bool {
        self.lookback().is_some()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Last7Days => "7d",
            TimeRange::Last30Days => "30d",
            TimeRange::Last3Months => "3m",
            TimeRange::All => "all",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    #[default]
    Day,
}

impl Granularity {
    /// Parse an interval token. Absent or unrecognized tokens mean `Day`.
    pub fn parse(token: Option<&str>) -> Self {
        match token.map(str::trim) {
            Some("hour") => Granularity::Hour,
            Some("day") | None => Granularity::Day,
            Some(other) => {
                tracing::debug!("Unknown interval '{}', using day", other);
                Granularity::Day
            }
        }
    }

    /// SQLite `strftime` pattern that truncates a timestamp to this width.
    pub fn strftime_pattern(&self) -> &'static str {
        match self {
            Granularity::Hour => "%Y-%m-%d %H:00:00",
            Granularity::Day => "%Y-%m-%d 00:00:00",
        }
    }

    /// Truncate `ts` to the start of its bucket.
    pub fn truncate(&self, ts: NaiveDateTime) -> NaiveDateTime {
        let hour = match self {
            Granularity::Hour => ts.hour(),
            Granularity::Day => 0,
        };
        ts.date().and_hms_opt(hour, 0, 0).unwrap_or(ts)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved bucketing plan: where the series starts and how wide buckets are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketPlan {
    /// Inclusive lower bound on pickup time; `None` means unbounded.
    pub lower_bound: Option<NaiveDateTime>,
    pub granularity: Granularity,
}

impl BucketPlan {
    /// Resolve a plan from a range token, the requested granularity and the
    /// store's latest pickup timestamp.
    ///
    /// Relative ranges override the requested granularity even when the store
    /// is empty; an empty store (`anchor == None`) only drops the lower bound.
    pub fn resolve(
        range: TimeRange,
        requested: Granularity,
        anchor: Option<NaiveDateTime>,
    ) -> Self {
        let lower_bound = match (range.lookback(), anchor) {
            (Some(window), Some(anchor)) => Some(anchor - window),
            _ => None,
        };
        Self {
            lower_bound,
            granularity: range.forced_granularity().unwrap_or(requested),
        }
    }

    /// The plan's only predicate: `pickup_datetime >= lower_bound`, if any.
    pub fn filter_set(&self) -> FilterSet {
        let mut filters = FilterSet::new();
        if let Some(bound) = self.lower_bound {
            filters.push(Predicate::gte(
                TripField::PickupDatetime,
                FilterValue::Timestamp(bound),
            ));
        }
        filters
    }
}
