/// Core Mobility Explorer implementation.
///
/// This module provides the user-facing query API. It wraps a [`TripStore`]
/// with the four read operations the service exposes and applies the shared
/// absence convention: lookup, statistics and time series report zero
/// matches as [`ExplorerError::NotFound`], while listings return an empty
/// page.
///
/// # Design Philosophy
///
/// - **Stateless**: every call builds its plan from its own arguments
/// - **Store-side work**: counting, summing and bucketing run in the store
/// - **Thread-safe**: clone an `Explorer` freely and share it across tasks
use crate::error::{ExplorerError, ExplorerResult};
use crate::pagination::{PageInfo, PageRequest};
use crate::query::{SortSpec, TripFilterParams};
use crate::storage::TripStore;
use crate::timeseries::{BucketPlan, Granularity, TimeRange};
use crate::types::{TimeSeriesPoint, Trip, TripStats};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// A page of trips with its pagination metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripPage {
    pub trips: Vec<Trip>,
    pub pagination: PageInfo,
}

/// The main query entry point.
///
/// # Thread Safety
///
/// `Explorer` holds its store behind an `Arc`; clones share the same
/// process-wide store handle. Store calls are blocking and run on tokio's
/// blocking pool so they never stall the async runtime.
///
/// # Example
///
/// ```ignore
/// use mobility_explorer::{Explorer, SqliteStore};
///
/// let explorer = Explorer::new(SqliteStore::open_read_only("trips.db")?);
/// let stats = explorer.stats(None, None).await?;
/// println!("{} trips", stats.total_trips);
/// ```
#[derive(Clone)]
pub struct Explorer {
    store: Arc<dyn TripStore>,
}

impl std::fmt::Debug for Explorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Explorer").finish_non_exhaustive()
    }
}

impl Explorer {
    /// Wrap a store.
    pub fn new(store: impl TripStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// Wrap an already shared store.
    pub fn with_store(store: Arc<dyn TripStore>) -> Self {
        Self { store }
    }

    /// Run a blocking store call off the async runtime.
    async fn run<T, F>(&self, f: F) -> ExplorerResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn TripStore) -> ExplorerResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(store.as_ref())).await?
    }

    /// List trips matching `params`, sorted and paginated.
    ///
    /// An empty result is a successful empty page, never `NotFound`.
    pub async fn list_trips(
        &self,
        params: &TripFilterParams,
        sort: SortSpec,
        page: PageRequest,
    ) -> ExplorerResult<TripPage> {
        let filters = params.to_filter_set();
        debug!(
            predicates = filters.len(),
            ?sort,
            skip = page.skip(),
            limit = page.limit(),
            "list trips"
        );

        let (trips, total) = self
            .run(move |store| store.page(&filters, sort, page))
            .await?;

        Ok(TripPage {
            trips,
            pagination: PageInfo::compute(page, total),
        })
    }

    /// Fetch a single trip by identifier.
    pub async fn get_trip(&self, id: &str) -> ExplorerResult<Trip> {
        let key = id.to_string();
        self.run(move |store| store.get(&key))
            .await?
            .ok_or_else(|| ExplorerError::not_found(format!("Trip with id {} not found", id)))
    }

    /// Totals over trips picked up within an optional window.
    ///
    /// `total_duration` is the sum of durations, not an average.
    pub async fn stats(
        &self,
        pickup_start: Option<NaiveDateTime>,
        pickup_end: Option<NaiveDateTime>,
    ) -> ExplorerResult<TripStats> {
        self.stats_for(&TripFilterParams::pickup_window(pickup_start, pickup_end))
            .await
    }

    /// Totals over trips matching arbitrary filter parameters.
    pub async fn stats_for(&self, params: &TripFilterParams) -> ExplorerResult<TripStats> {
        let filters = params.to_filter_set();
        let stats = self.run(move |store| store.aggregate(&filters)).await?;

        if stats.total_trips == 0 {
            return Err(ExplorerError::not_found("No trips found matching criteria"));
        }
        Ok(stats)
    }

    /// Resolve the bucketing plan for a range token and requested granularity.
    ///
    /// Relative ranges are anchored to the latest pickup in the store.
    pub async fn bucket_plan(
        &self,
        range: TimeRange,
        granularity: Granularity,
    ) -> ExplorerResult<BucketPlan> {
        let anchor = if range.needs_anchor() {
            self.run(|store| store.max_pickup()).await?
        } else {
            None
        };
        let plan = BucketPlan::resolve(range, granularity, anchor);
        debug!(%range, ?anchor, ?plan, "resolved bucket plan");
        Ok(plan)
    }

    /// Trip counts and average durations per time bucket, ascending.
    pub async fn time_series(
        &self,
        range: TimeRange,
        granularity: Granularity,
    ) -> ExplorerResult<Vec<TimeSeriesPoint>> {
        let plan = self.bucket_plan(range, granularity).await?;
        let points = self.run(move |store| store.time_buckets(&plan)).await?;

        if points.is_empty() {
            return Err(ExplorerError::not_found("No trips found"));
        }
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStore;
    use crate::types::StoreFlag;

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn trip(id: &str, pickup: &str, passengers: u32) -> Trip {
        let pickup = ts(pickup);
        Trip {
            id: id.to_string(),
            vendor_id: 1,
            pickup_datetime: pickup,
            dropoff_datetime: pickup + chrono::Duration::minutes(10),
            passenger_count: passengers,
            pickup_longitude: -73.98,
            pickup_latitude: 40.75,
            dropoff_longitude: -73.95,
            dropoff_latitude: 40.78,
            store_and_fwd_flag: StoreFlag::No,
            trip_duration: 600,
        }
    }

    fn explorer(trips: &[Trip]) -> Explorer {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_trips(trips).unwrap();
        Explorer::new(store)
    }

    #[tokio::test]
    async fn test_empty_listing_is_success() {
        let explorer = explorer(&[]);
        let page = explorer
            .list_trips(
                &TripFilterParams::default(),
                SortSpec::default(),
                PageRequest::default(),
            )
            .await
            .unwrap();
        assert!(page.trips.is_empty());
        assert_eq!(page.pagination.total, 0);
        assert_eq!(page.pagination.total_pages, 0);
    }

    #[tokio::test]
    async fn test_missing_trip_is_not_found() {
        let explorer = explorer(&[trip("a", "2016-01-01 00:00:00", 1)]);
        assert_eq!(explorer.get_trip("a").await.unwrap().id, "a");
        let err = explorer.get_trip("b").await.unwrap_err();
        assert!(matches!(err, ExplorerError::NotFound(_)));
        assert_eq!(err.to_string(), "Trip with id b not found");
    }

    #[tokio::test]
    async fn test_stats_window() {
        let explorer = explorer(&[
            trip("a", "2016-01-01 00:00:00", 1),
            trip("b", "2016-01-05 00:00:00", 3),
        ]);
        let stats = explorer
            .stats(Some(ts("2016-01-02 00:00:00")), None)
            .await
            .unwrap();
        assert_eq!(stats.total_trips, 1);
        assert_eq!(stats.total_passengers, 3);
        assert_eq!(stats.total_duration, 600.0);

        let err = explorer
            .stats(Some(ts("2017-01-01 00:00:00")), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExplorerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_series_on_empty_store_is_not_found() {
        let explorer = explorer(&[]);
        let err = explorer
            .time_series(TimeRange::Last7Days, Granularity::Day)
            .await
            .unwrap_err();
        assert!(matches!(err, ExplorerError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_bucket_plan_skips_anchor_for_all() {
        let explorer = explorer(&[trip("a", "2016-01-01 00:00:00", 1)]);
        let plan = explorer
            .bucket_plan(TimeRange::All, Granularity::Hour)
            .await
            .unwrap();
        assert_eq!(plan.lower_bound, None);
        assert_eq!(plan.granularity, Granularity::Hour);

        let plan = explorer
            .bucket_plan(TimeRange::Last30Days, Granularity::Hour)
            .await
            .unwrap();
        assert_eq!(plan.lower_bound, Some(ts("2015-12-02 00:00:00")));
        assert_eq!(plan.granularity, Granularity::Day);
    }
}
