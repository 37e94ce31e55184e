/// Record store for trip data.
///
/// The store is the only component that touches rows. Everything it exposes
/// runs as a single SQL statement inside SQLite (counts, sums, grouping and
/// bucketing included), so no query ever pulls the table into process memory.
///
/// - [`TripStore`] is the seam the explorer is written against
/// - [`SqliteStore`] implements it over one shared `rusqlite` connection
///
/// Timestamps are stored as text in `STORE_TIMESTAMP_FORMAT`, which sorts
/// chronologically, so range predicates and `MAX()` work on the raw column.
use crate::error::{ExplorerError, ExplorerResult};
use crate::pagination::PageRequest;
use crate::query::{FilterSet, SortSpec};
use crate::timeseries::BucketPlan;
use crate::types::{StoreFlag, TimeSeriesPoint, Trip, TripStats, format_store_timestamp};
use chrono::NaiveDateTime;
use rusqlite::types::{
    FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Value as SqlValue, ValueRef,
};
use rusqlite::{Connection, OpenFlags, OptionalExtension, ToSql, params, params_from_iter};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS trips (
    id                 TEXT PRIMARY KEY,
    vendor_id          INTEGER NOT NULL,
    pickup_datetime    TEXT NOT NULL,
    dropoff_datetime   TEXT NOT NULL,
    passenger_count    INTEGER NOT NULL,
    pickup_longitude   REAL NOT NULL,
    pickup_latitude    REAL NOT NULL,
    dropoff_longitude  REAL NOT NULL,
    dropoff_latitude   REAL NOT NULL,
    store_and_fwd_flag TEXT NOT NULL,
    trip_duration      INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_trips_pickup_datetime ON trips(pickup_datetime);
CREATE INDEX IF NOT EXISTS idx_trips_dropoff_datetime ON trips(dropoff_datetime);
";

const TRIP_COLUMNS: &str = "id, vendor_id, pickup_datetime, dropoff_datetime, passenger_count, \
     pickup_longitude, pickup_latitude, dropoff_longitude, dropoff_latitude, \
     store_and_fwd_flag, trip_duration";

/// Read access to trip records.
///
/// Every method is a pure read. Implementations must evaluate filters,
/// aggregates and buckets inside the store rather than in process memory.
pub trait TripStore: Send + Sync {
    /// Number of trips matching `filters`.
    fn count(&self, filters: &FilterSet) -> ExplorerResult<u64>;

    /// One sorted page of trips matching `filters`.
    fn fetch_page(
        &self,
        filters: &FilterSet,
        sort: SortSpec,
        page: PageRequest,
    ) -> ExplorerResult<Vec<Trip>>;

    /// A page plus the total match count, both against the same filter set.
    ///
    /// The default issues two independent reads; stores that can run both in
    /// one snapshot should override it.
    fn page(
        &self,
        filters: &FilterSet,
        sort: SortSpec,
        page: PageRequest,
    ) -> ExplorerResult<(Vec<Trip>, u64)> {
        let total = self.count(filters)?;
        let trips = self.fetch_page(filters, sort, page)?;
        Ok((trips, total))
    }

    /// Fetch a trip by identifier.
    fn get(&self, id: &str) -> ExplorerResult<Option<Trip>>;

    /// Latest pickup timestamp in the store, `None` when empty.
    fn max_pickup(&self) -> ExplorerResult<Option<NaiveDateTime>>;

    /// Count, duration sum and passenger sum over `filters`.
    fn aggregate(&self, filters: &FilterSet) -> ExplorerResult<TripStats>;

    /// Truncate, group and aggregate pickups according to `plan`, ascending
    /// by bucket.
    fn time_buckets(&self, plan: &BucketPlan) -> ExplorerResult<Vec<TimeSeriesPoint>>;
}

impl ToSql for StoreFlag {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for StoreFlag {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: ExplorerError| FromSqlError::Other(Box::new(e)))
    }
}

/// SQLite-backed trip store.
///
/// Holds a single connection for the lifetime of the process. Each call takes
/// the connection lock for the duration of one query (or one read
/// transaction, for [`TripStore::page`]) and releases it on return.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> ExplorerResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::from_connection(conn))
    }

    /// Open an existing database file without write access.
    ///
    /// Fails if the file or its `trips` table is missing.
    pub fn open_read_only(path: impl AsRef<Path>) -> ExplorerResult<Self> {
        let path = path.as_ref();
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(|e| {
            ExplorerError::Store(format!("cannot open {}: {}", path.display(), e))
        })?;

        let has_table: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'trips')",
            [],
            |row| row.get(0),
        )?;
        if !has_table {
            return Err(ExplorerError::Store(format!(
                "{} has no trips table",
                path.display()
            )));
        }

        Ok(Self::from_connection(conn))
    }

    /// Create an in-memory store with an empty schema.
    pub fn in_memory() -> ExplorerResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> ExplorerResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ExplorerError::Store("store connection lock poisoned".to_string()))
    }

    /// Bulk-insert trips in one transaction.
    ///
    /// This is the loading seam used by the external bulk loader, tests and
    /// benches; the explorer itself never writes.
    pub fn insert_trips(&self, trips: &[Trip]) -> ExplorerResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO trips ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                TRIP_COLUMNS
            ))?;
            for trip in trips {
                stmt.execute(params![
                    trip.id,
                    trip.vendor_id,
                    format_store_timestamp(&trip.pickup_datetime),
                    format_store_timestamp(&trip.dropoff_datetime),
                    trip.passenger_count,
                    trip.pickup_longitude,
                    trip.pickup_latitude,
                    trip.dropoff_longitude,
                    trip.dropoff_latitude,
                    trip.store_and_fwd_flag,
                    trip.trip_duration,
                ])?;
            }
        }
        tx.commit()?;
        debug!("Inserted {} trips", trips.len());
        Ok(trips.len())
    }
}

fn map_trip_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Trip> {
    Ok(Trip {
        id: row.get(0)?,
        vendor_id: row.get(1)?,
        pickup_datetime: row.get(2)?,
        dropoff_datetime: row.get(3)?,
        passenger_count: row.get(4)?,
        pickup_longitude: row.get(5)?,
        pickup_latitude: row.get(6)?,
        dropoff_longitude: row.get(7)?,
        dropoff_latitude: row.get(8)?,
        store_and_fwd_flag: row.get(9)?,
        trip_duration: row.get(10)?,
    })
}

fn to_u64(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn count_with(conn: &Connection, filters: &FilterSet) -> ExplorerResult<u64> {
    let (where_clause, binds) = filters.to_where_clause();
    let sql = format!("SELECT COUNT(*) FROM trips{}", where_clause);
    debug!(%sql, "count");

    let count: i64 = conn.query_row(&sql, params_from_iter(binds.iter()), |row| row.get(0))?;
    Ok(to_u64(count))
}

fn fetch_page_with(
    conn: &Connection,
    filters: &FilterSet,
    sort: SortSpec,
    page: PageRequest,
) -> ExplorerResult<Vec<Trip>> {
    let (where_clause, mut binds) = filters.to_where_clause();
    let sql = format!(
        "SELECT {} FROM trips{}{} LIMIT ? OFFSET ?",
        TRIP_COLUMNS,
        where_clause,
        sort.to_order_clause()
    );
    binds.push(SqlValue::Integer(to_i64(page.limit())));
    binds.push(SqlValue::Integer(to_i64(page.skip())));
    debug!(%sql, skip = page.skip(), limit = page.limit(), "fetch page");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(binds.iter()), map_trip_row)?;
    let mut trips = Vec::new();
    for row in rows {
        trips.push(row?);
    }
    Ok(trips)
}

impl TripStore for SqliteStore {
    fn count(&self, filters: &FilterSet) -> ExplorerResult<u64> {
        let conn = self.lock()?;
        count_with(&conn, filters)
    }

    fn fetch_page(
        &self,
        filters: &FilterSet,
        sort: SortSpec,
        page: PageRequest,
    ) -> ExplorerResult<Vec<Trip>> {
        let conn = self.lock()?;
        fetch_page_with(&conn, filters, sort, page)
    }

    /// Count and fetch inside one read transaction so both see one snapshot.
    fn page(
        &self,
        filters: &FilterSet,
        sort: SortSpec,
        page: PageRequest,
    ) -> ExplorerResult<(Vec<Trip>, u64)> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let total = count_with(&tx, filters)?;
        let trips = fetch_page_with(&tx, filters, sort, page)?;
        tx.commit()?;
        Ok((trips, total))
    }

    fn get(&self, id: &str) -> ExplorerResult<Option<Trip>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM trips WHERE id = ?1", TRIP_COLUMNS);
        let trip = conn.query_row(&sql, [id], map_trip_row).optional()?;
        Ok(trip)
    }

    fn max_pickup(&self) -> ExplorerResult<Option<NaiveDateTime>> {
        let conn = self.lock()?;
        let max: Option<NaiveDateTime> =
            conn.query_row("SELECT MAX(pickup_datetime) FROM trips", [], |row| {
                row.get(0)
            })?;
        Ok(max)
    }

    fn aggregate(&self, filters: &FilterSet) -> ExplorerResult<TripStats> {
        let conn = self.lock()?;
        let (where_clause, binds) = filters.to_where_clause();
        let sql = format!(
            "SELECT COUNT(*), COALESCE(SUM(trip_duration), 0), COALESCE(SUM(passenger_count), 0) \
             FROM trips{}",
            where_clause
        );
        debug!(%sql, "aggregate");

        let (count, duration, passengers): (i64, i64, i64) =
            conn.query_row(&sql, params_from_iter(binds.iter()), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;

        Ok(TripStats {
            total_trips: to_u64(count),
            total_duration: duration as f64,
            total_passengers: to_u64(passengers),
        })
    }

    fn time_buckets(&self, plan: &BucketPlan) -> ExplorerResult<Vec<TimeSeriesPoint>> {
        let conn = self.lock()?;
        let (where_clause, filter_binds) = plan.filter_set().to_where_clause();
        let sql = format!(
            "SELECT strftime(?, pickup_datetime) AS bucket, COUNT(*), AVG(trip_duration) \
             FROM trips{} GROUP BY bucket ORDER BY bucket ASC",
            where_clause
        );
        let mut binds = vec![SqlValue::Text(plan.granularity.strftime_pattern().to_string())];
        binds.extend(filter_binds);
        debug!(%sql, granularity = %plan.granularity, "time buckets");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(binds.iter()), |row| {
            Ok(TimeSeriesPoint {
                timestamp: row.get(0)?,
                trip_count: to_u64(row.get(1)?),
                avg_duration: row.get(2)?,
            })
        })?;
        let mut points = Vec::new();
        for row in rows {
            points.push(row?);
        }
        Ok(points)
    }
}
