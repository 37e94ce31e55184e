/// Common types used throughout Mobility Explorer.
///
/// Trip records are immutable once stored: this crate never writes through
/// its API, it only reads what the bulk loader put into the store.
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ExplorerError, ExplorerResult};

/// Timestamp layout used for storage and bound query parameters.
///
/// Text in this layout sorts lexicographically in chronological order, which
/// is what lets range predicates run as plain string comparisons in SQLite.
pub const STORE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Whether a trip record was held in vehicle memory before being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoreFlag {
    /// Store and forward trip (`Y`).
    #[serde(rename = "Y")]
    Yes,
    /// Not a store and forward trip (`N`).
    #[serde(rename = "N")]
    No,
}

impl StoreFlag {
    /// The single-letter symbol kept in the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreFlag::Yes => "Y",
            StoreFlag::No => "N",
        }
    }
}

impl fmt::Display for StoreFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreFlag {
    type Err = ExplorerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Y" | "y" => Ok(StoreFlag::Yes),
            "N" | "n" => Ok(StoreFlag::No),
            other => Err(ExplorerError::validation(format!(
                "store_and_fwd_flag must be 'Y' or 'N', got '{}'",
                other
            ))),
        }
    }
}

/// A single taxi trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// Unique identifier for the trip
    pub id: String,
    /// Vendor/provider ID
    pub vendor_id: i64,
    /// When the passenger was picked up
    pub pickup_datetime: NaiveDateTime,
    /// When the passenger was dropped off
    pub dropoff_datetime: NaiveDateTime,
    /// Number of passengers in the trip
    pub passenger_count: u32,
    pub pickup_longitude: f64,
    pub pickup_latitude: f64,
    pub dropoff_longitude: f64,
    pub dropoff_latitude: f64,
    /// Whether the record was held in vehicle memory before sending
    pub store_and_fwd_flag: StoreFlag,
    /// Duration of the trip in seconds
    pub trip_duration: u32,
}

/// Statistical summary of the trips matching a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripStats {
    /// Total number of trips
    pub total_trips: u64,
    /// Sum of all trip durations in seconds.
    ///
    /// This is a total, not an average, even though older API documentation
    /// described it as one.
    pub total_duration: f64,
    /// Total number of passengers transported
    pub total_passengers: u64,
}

/// Single point of a time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    /// Start of the bucket
    pub timestamp: NaiveDateTime,
    /// Number of trips picked up within the bucket
    pub trip_count: u64,
    /// Average duration in seconds
    pub avg_duration: f64,
}

/// Render a timestamp in the store's text layout.
pub fn format_store_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(STORE_TIMESTAMP_FORMAT).to_string()
}

/// Parse a user-supplied timestamp.
///
/// Accepts RFC 3339 (converted to UTC), ISO 8601 with a `T` or space
/// separator and optional fractional seconds, or a bare date (midnight).
pub fn parse_timestamp(input: &str) -> ExplorerResult<NaiveDateTime> {
    let input = input.trim();

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(input) {
        return Ok(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(input, fmt) {
            return Ok(ts);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        if let Some(ts) = date.and_hms_opt(0, 0, 0) {
            return Ok(ts);
        }
    }

    Err(ExplorerError::validation(format!(
        "invalid timestamp '{}': expected ISO 8601 (e.g. 2016-03-14T17:24:55)",
        input
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = ts("2016-03-14 17:24:55");
        assert_eq!(parse_timestamp("2016-03-14T17:24:55").unwrap(), expected);
        assert_eq!(parse_timestamp("2016-03-14 17:24:55").unwrap(), expected);
        assert_eq!(parse_timestamp("2016-03-14T17:24:55Z").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2016-03-14T19:24:55+02:00").unwrap(),
            expected
        );
        assert_eq!(
            parse_timestamp("2016-03-14").unwrap(),
            ts("2016-03-14 00:00:00")
        );
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        let err = parse_timestamp("yesterday").unwrap_err();
        assert!(matches!(err, ExplorerError::Validation { .. }));
    }

    #[test]
    fn test_store_timestamp_sorts_chronologically() {
        let earlier = format_store_timestamp(&ts("2016-01-09 23:59:59"));
        let later = format_store_timestamp(&ts("2016-01-10 00:00:00"));
        assert_eq!(earlier, "2016-01-09 23:59:59");
        assert!(earlier < later);
    }

    #[test]
    fn test_store_flag_round_trip() {
        assert_eq!("Y".parse::<StoreFlag>().unwrap(), StoreFlag::Yes);
        assert_eq!("n".parse::<StoreFlag>().unwrap(), StoreFlag::No);
        assert!("maybe".parse::<StoreFlag>().is_err());
        assert_eq!(serde_json::to_string(&StoreFlag::No).unwrap(), "\"N\"");
    }
}
