/// Query construction for trip listings.
///
/// This module turns a sparse set of optional request parameters into a
/// conjunctive filter set and a deterministic sort order:
///
/// - **Filtering**: one range/equality predicate per present parameter
/// - **Sorting**: a closed set of sortable fields with a safe default
/// - **Rendering**: predicates render to a parameterised SQL `WHERE` clause
///
/// A parameter is present when it is `Some`, whatever its value. Zero is a
/// real bound (`min_passengers = 0` still produces a predicate).
///
/// # Example
///
/// ```ignore
/// use mobility_explorer::query::{SortSpec, TripFilterParams};
///
/// let params = TripFilterParams {
///     min_passengers: Some(0),
///     max_passengers: Some(0),
///     ..Default::default()
/// };
/// let filters = params.to_filter_set();
/// assert_eq!(filters.len(), 2);
///
/// let sort = SortSpec::resolve(Some("trip_duration"), Some("asc"));
/// ```
use crate::types::{StoreFlag, Trip, format_store_timestamp};
use chrono::NaiveDateTime;
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Columns of the trip table that can be filtered or sorted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripField {
    PickupDatetime,
    DropoffDatetime,
    TripDuration,
    PassengerCount,
    VendorId,
    PickupLatitude,
    PickupLongitude,
    DropoffLatitude,
    DropoffLongitude,
    StoreAndFwdFlag,
}

impl TripField {
    /// Column name in the store.
    pub fn column(&self) -> &'static str {
        match self {
            TripField::PickupDatetime => "pickup_datetime",
            TripField::DropoffDatetime => "dropoff_datetime",
            TripField::TripDuration => "trip_duration",
            TripField::PassengerCount => "passenger_count",
            TripField::VendorId => "vendor_id",
            TripField::PickupLatitude => "pickup_latitude",
            TripField::PickupLongitude => "pickup_longitude",
            TripField::DropoffLatitude => "dropoff_latitude",
            TripField::DropoffLongitude => "dropoff_longitude",
            TripField::StoreAndFwdFlag => "store_and_fwd_flag",
        }
    }

    fn value_of(&self, trip: &Trip) -> FilterValue {
        match self {
            TripField::PickupDatetime => FilterValue::Timestamp(trip.pickup_datetime),
            TripField::DropoffDatetime => FilterValue::Timestamp(trip.dropoff_datetime),
            TripField::TripDuration => FilterValue::Integer(trip.trip_duration.into()),
            TripField::PassengerCount => FilterValue::Integer(trip.passenger_count.into()),
            TripField::VendorId => FilterValue::Integer(trip.vendor_id),
            TripField::PickupLatitude => FilterValue::Real(trip.pickup_latitude),
            TripField::PickupLongitude => FilterValue::Real(trip.pickup_longitude),
            TripField::DropoffLatitude => FilterValue::Real(trip.dropoff_latitude),
            TripField::DropoffLongitude => FilterValue::Real(trip.dropoff_longitude),
            TripField::StoreAndFwdFlag => FilterValue::Flag(trip.store_and_fwd_flag),
        }
    }
}

impl fmt::Display for TripField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Comparison operator of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    /// Field greater than or equal to value.
    Gte,
    /// Field less than or equal to value.
    Lte,
    /// Field equals value.
    Eq,
}

impl Comparison {
    /// SQL operator token.
    pub fn sql(&self) -> &'static str {
        match self {
            Comparison::Gte => ">=",
            Comparison::Lte => "<=",
            Comparison::Eq => "=",
        }
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Comparison::Gte => ordering != Ordering::Less,
            Comparison::Lte => ordering != Ordering::Greater,
            Comparison::Eq => ordering == Ordering::Equal,
        }
    }
}

/// A typed predicate operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterValue {
    Timestamp(NaiveDateTime),
    Integer(i64),
    Real(f64),
    Flag(StoreFlag),
}

impl FilterValue {
    /// Convert into a bindable SQL value.
    pub fn to_sql(&self) -> SqlValue {
        match self {
            FilterValue::Timestamp(ts) => SqlValue::Text(format_store_timestamp(ts)),
            FilterValue::Integer(n) => SqlValue::Integer(*n),
            FilterValue::Real(x) => SqlValue::Real(*x),
            FilterValue::Flag(flag) => SqlValue::Text(flag.as_str().to_string()),
        }
    }

    fn compare(&self, other: &FilterValue) -> Option<Ordering> {
        match (self, other) {
            (FilterValue::Timestamp(a), FilterValue::Timestamp(b)) => Some(a.cmp(b)),
            (FilterValue::Integer(a), FilterValue::Integer(b)) => Some(a.cmp(b)),
            (FilterValue::Real(a), FilterValue::Real(b)) => a.partial_cmp(b),
            (FilterValue::Integer(a), FilterValue::Real(b)) => (*a as f64).partial_cmp(b),
            (FilterValue::Real(a), FilterValue::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (FilterValue::Flag(a), FilterValue::Flag(b)) => Some(a.as_str().cmp(b.as_str())),
            _ => None,
        }
    }
}

/// A single `(field, operator, value)` constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: TripField,
    pub op: Comparison,
    pub value: FilterValue,
}

impl Predicate {
    /// Create a greater-than-or-equal predicate.
    pub fn gte(field: TripField, value: FilterValue) -> Self {
        Self {
            field,
            op: Comparison::Gte,
            value,
        }
    }

    /// Create a less-than-or-equal predicate.
    pub fn lte(field: TripField, value: FilterValue) -> Self {
        Self {
            field,
            op: Comparison::Lte,
            value,
        }
    }

    /// Create an equality predicate.
    pub fn eq(field: TripField, value: FilterValue) -> Self {
        Self {
            field,
            op: Comparison::Eq,
            value,
        }
    }

    /// Evaluate this predicate against a trip held in memory.
    pub fn matches(&self, trip: &Trip) -> bool {
        self.field
            .value_of(trip)
            .compare(&self.value)
            .is_some_and(|ordering| self.op.accepts(ordering))
    }
}

/// A conjunction of predicates. Empty means no restriction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    predicates: Vec<Predicate>,
}

impl FilterSet {
    /// Create an empty filter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a predicate.
    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Add a predicate in place.
    pub fn push(&mut self, predicate: Predicate) {
        self.predicates.push(predicate);
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Check whether a trip satisfies every predicate.
    pub fn matches(&self, trip: &Trip) -> bool {
        self.predicates.iter().all(|p| p.matches(trip))
    }

    /// Render as a SQL `WHERE` clause plus its bound values.
    ///
    /// Returns an empty clause when there are no predicates. Values are always
    /// bound as parameters, never spliced into the SQL text.
    pub fn to_where_clause(&self) -> (String, Vec<SqlValue>) {
        if self.predicates.is_empty() {
            return (String::new(), Vec::new());
        }

        let conditions: Vec<String> = self
            .predicates
            .iter()
            .map(|p| format!("{} {} ?", p.field.column(), p.op.sql()))
            .collect();
        let binds = self.predicates.iter().map(|p| p.value.to_sql()).collect();

        (format!(" WHERE {}", conditions.join(" AND ")), binds)
    }
}

/// Optional filter parameters accepted by the trip listing.
///
/// Every field is independently optional; `Some(0)` is a present bound.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripFilterParams {
    pub pickup_start: Option<NaiveDateTime>,
    pub pickup_end: Option<NaiveDateTime>,
    pub dropoff_start: Option<NaiveDateTime>,
    pub dropoff_end: Option<NaiveDateTime>,
    pub min_duration: Option<u32>,
    pub max_duration: Option<u32>,
    pub min_passengers: Option<u32>,
    pub max_passengers: Option<u32>,
    pub vendor_id: Option<i64>,
    pub pickup_lat_min: Option<f64>,
    pub pickup_lat_max: Option<f64>,
    pub pickup_lon_min: Option<f64>,
    pub pickup_lon_max: Option<f64>,
    pub dropoff_lat_min: Option<f64>,
    pub dropoff_lat_max: Option<f64>,
    pub dropoff_lon_min: Option<f64>,
    pub dropoff_lon_max: Option<f64>,
    pub store_and_fwd_flag: Option<StoreFlag>,
}

impl TripFilterParams {
    /// Parameters restricted to a pickup time window.
    pub fn pickup_window(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        Self {
            pickup_start: start,
            pickup_end: end,
            ..Default::default()
        }
    }

    /// Build the filter set: one predicate per present parameter.
    pub fn to_filter_set(&self) -> FilterSet {
        use FilterValue::{Flag, Integer, Real, Timestamp};
        use TripField::*;

        let mut filters = FilterSet::new();
        let mut add = |value: Option<FilterValue>, field: TripField, op: Comparison| {
            if let Some(value) = value {
                filters.push(Predicate { field, op, value });
            }
        };

        add(self.pickup_start.map(Timestamp), PickupDatetime, Comparison::Gte);
        add(self.pickup_end.map(Timestamp), PickupDatetime, Comparison::Lte);
        add(self.dropoff_start.map(Timestamp), DropoffDatetime, Comparison::Gte);
        add(self.dropoff_end.map(Timestamp), DropoffDatetime, Comparison::Lte);
        add(self.min_duration.map(|v| Integer(v.into())), TripDuration, Comparison::Gte);
        add(self.max_duration.map(|v| Integer(v.into())), TripDuration, Comparison::Lte);
        add(self.min_passengers.map(|v| Integer(v.into())), PassengerCount, Comparison::Gte);
        add(self.max_passengers.map(|v| Integer(v.into())), PassengerCount, Comparison::Lte);
        add(self.vendor_id.map(Integer), VendorId, Comparison::Eq);
        add(self.pickup_lat_min.map(Real), PickupLatitude, Comparison::Gte);
        add(self.pickup_lat_max.map(Real), PickupLatitude, Comparison::Lte);
        add(self.pickup_lon_min.map(Real), PickupLongitude, Comparison::Gte);
        add(self.pickup_lon_max.map(Real), PickupLongitude, Comparison::Lte);
        add(self.dropoff_lat_min.map(Real), DropoffLatitude, Comparison::Gte);
        add(self.dropoff_lat_max.map(Real), DropoffLatitude, Comparison::Lte);
        add(self.dropoff_lon_min.map(Real), DropoffLongitude, Comparison::Gte);
        add(self.dropoff_lon_max.map(Real), DropoffLongitude, Comparison::Lte);
        add(self.store_and_fwd_flag.map(Flag), StoreAndFwdFlag, Comparison::Eq);

        filters
    }
}

/// Fields a listing can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    PickupDatetime,
    DropoffDatetime,
    TripDuration,
    PassengerCount,
    VendorId,
}

impl SortField {
    /// Parse a sort token; unknown tokens yield `None`.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim() {
            "pickup_datetime" => Some(SortField::PickupDatetime),
            "dropoff_datetime" => Some(SortField::DropoffDatetime),
            "trip_duration" => Some(SortField::TripDuration),
            "passenger_count" => Some(SortField::PassengerCount),
            "vendor_id" => Some(SortField::VendorId),
            _ => None,
        }
    }

    pub fn field(&self) -> TripField {
        match self {
            SortField::PickupDatetime => TripField::PickupDatetime,
            SortField::DropoffDatetime => TripField::DropoffDatetime,
            SortField::TripDuration => TripField::TripDuration,
            SortField::PassengerCount => TripField::PassengerCount,
            SortField::VendorId => TripField::VendorId,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending order (smallest first).
    Asc,
    /// Descending order (largest first).
    #[default]
    Desc,
}

impl SortOrder {
    /// Descending unless the token explicitly asks for ascending.
    pub fn parse(token: Option<&str>) -> Self {
        match token {
            Some(t) if t.trim().eq_ignore_ascii_case("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Sort specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortSpec {
    /// Field to sort by.
    pub field: SortField,
    /// Sort order.
    pub order: SortOrder,
}

impl SortSpec {
    /// Create a new sort specification.
    pub fn new(field: SortField, order: SortOrder) -> Self {
        Self { field, order }
    }

    /// Resolve raw request tokens.
    ///
    /// An unknown or absent field falls back to the pickup timestamp; the
    /// direction is descending unless `asc` is given.
    pub fn resolve(field: Option<&str>, order: Option<&str>) -> Self {
        let resolved = field.and_then(SortField::parse);
        if resolved.is_none() {
            if let Some(token) = field {
                tracing::debug!("Unknown sort field '{}', using pickup_datetime", token);
            }
        }
        Self::new(resolved.unwrap_or_default(), SortOrder::parse(order))
    }

    /// Render as a SQL `ORDER BY` clause.
    ///
    /// `id` is the secondary key so rows with equal sort keys keep the same
    /// relative order on every execution and across page boundaries.
    pub fn to_order_clause(&self) -> String {
        format!(
            " ORDER BY {} {}, id ASC",
            self.field.field().column(),
            self.order.sql()
        )
    }
}
