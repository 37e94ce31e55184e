/// Integration tests for Mobility Explorer.
///
/// These tests drive the explorer end to end against SQLite stores seeded
/// with synthetic trips, covering listings, lookups, statistics and trend
/// series.
use chrono::{Duration, NaiveDate, NaiveDateTime};
use mobility_explorer::prelude::*;
use mobility_explorer::{BucketPlan, TripField};

/// Noon on day `n`, where day 1 is 2016-01-01.
fn day(n: i64) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2016, 1, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        + Duration::days(n - 1)
}

fn trip(id: String, pickup: NaiveDateTime, passengers: u32, duration: u32) -> Trip {
    Trip {
        id,
        vendor_id: if passengers % 2 == 0 { 1 } else { 2 },
        pickup_datetime: pickup,
        dropoff_datetime: pickup + Duration::seconds(duration.into()),
        passenger_count: passengers,
        pickup_longitude: -73.982,
        pickup_latitude: 40.767,
        dropoff_longitude: -73.964,
        dropoff_latitude: 40.765,
        store_and_fwd_flag: StoreFlag::No,
        trip_duration: duration,
    }
}

/// Two trips per day for days 1..=100, at 12:00 and 12:30.
///
/// Day `d` carries `d % 3` passengers and durations `10d` and `10d + 20`.
fn hundred_days() -> Vec<Trip> {
    (1..=100)
        .flat_map(|d| {
            let passengers = (d % 3) as u32;
            let base = (d * 10) as u32;
            [
                trip(format!("d{:03}a", d), day(d), passengers, base),
                trip(
                    format!("d{:03}b", d),
                    day(d) + Duration::minutes(30),
                    passengers,
                    base + 20,
                ),
            ]
        })
        .collect()
}

fn explorer_with(trips: &[Trip]) -> Explorer {
    let store = SqliteStore::in_memory().unwrap();
    store.insert_trips(trips).unwrap();
    Explorer::new(store)
}

#[tokio::test]
async fn test_seven_day_series_is_hourly_and_anchored_to_data() {
    let explorer = explorer_with(&hundred_days());

    // Ask for daily buckets; 7d must still bucket by hour
    let series = explorer
        .time_series(TimeRange::Last7Days, Granularity::Day)
        .await
        .unwrap();

    // Anchor is day 100 12:30, so the window opens at day 93 12:30
    assert_eq!(series.len(), 8);
    assert_eq!(series[0].timestamp, day(93));
    assert_eq!(series[0].trip_count, 1);
    assert_eq!(series[0].avg_duration, 950.0);

    for (i, point) in series.iter().enumerate().skip(1) {
        let d = 93 + i as i64;
        assert_eq!(point.timestamp, day(d));
        assert_eq!(point.trip_count, 2);
        assert_eq!(point.avg_duration, (d * 10 + 10) as f64);
    }

    assert!(series.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    assert!(series.iter().all(|p| p.timestamp >= day(93)));
}

#[tokio::test]
async fn test_series_repeats_for_unchanged_data() {
    let explorer = explorer_with(&hundred_days());

    let first = explorer
        .time_series(TimeRange::Last30Days, Granularity::Hour)
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let second = explorer
        .time_series(TimeRange::Last30Days, Granularity::Hour)
        .await
        .unwrap();

    assert_eq!(first, second);
    // 30d forces daily buckets: day 70 12:30 through day 100
    assert_eq!(first.len(), 31);
    assert_eq!(first[0].timestamp, day(70) - Duration::hours(12));
}

#[tokio::test]
async fn test_all_time_series_honors_requested_granularity() {
    let explorer = explorer_with(&hundred_days());

    let daily = explorer
        .time_series(TimeRange::All, Granularity::Day)
        .await
        .unwrap();
    assert_eq!(daily.len(), 100);
    assert_eq!(daily.iter().map(|p| p.trip_count).sum::<u64>(), 200);

    let hourly = explorer
        .time_series(TimeRange::parse(Some("bogus")), Granularity::Hour)
        .await
        .unwrap();
    assert_eq!(hourly.len(), 100);
    assert_eq!(hourly[0].timestamp, day(1));
}

#[tokio::test]
async fn test_three_month_plan() {
    let explorer = explorer_with(&hundred_days());
    let plan = explorer
        .bucket_plan(TimeRange::Last3Months, Granularity::Hour)
        .await
        .unwrap();
    assert_eq!(
        plan,
        BucketPlan {
            lower_bound: Some(day(10) + Duration::minutes(30)),
            granularity: Granularity::Day,
        }
    );
}

#[tokio::test]
async fn test_zero_passenger_bounds_are_applied() {
    let explorer = explorer_with(&hundred_days());
    let params = TripFilterParams {
        min_passengers: Some(0),
        max_passengers: Some(0),
        ..Default::default()
    };

    let page = explorer
        .list_trips(
            &params,
            SortSpec::default(),
            PageRequest::new(0, 1000, MAX_PAGE_SIZE).unwrap(),
        )
        .await
        .unwrap();

    // Days 3, 6, ..., 99
    assert_eq!(page.pagination.total, 66);
    assert_eq!(page.trips.len(), 66);
    assert!(page.trips.iter().all(|t| t.passenger_count == 0));
}

#[tokio::test]
async fn test_stats_with_no_matches_is_not_found() {
    let explorer = explorer_with(&hundred_days());

    let err = explorer
        .stats(Some(day(200)), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ExplorerError::NotFound(_)));
    assert_eq!(err.to_string(), "No trips found matching criteria");
}

#[tokio::test]
async fn test_stats_totals() {
    let explorer = explorer_with(&hundred_days());

    let stats = explorer.stats(Some(day(99)), Some(day(100))).await.unwrap();
    // day 99 12:00, day 99 12:30, day 100 12:00
    assert_eq!(stats.total_trips, 3);
    assert_eq!(stats.total_duration, (990 + 1010 + 1000) as f64);
    assert_eq!(stats.total_passengers, 1);

    let all = explorer.stats(None, None).await.unwrap();
    assert_eq!(all.total_trips, 200);
}

#[tokio::test]
async fn test_pagination_metadata_for_last_page() {
    let trips: Vec<Trip> = (1..=45)
        .map(|d| trip(format!("p{:02}", d), day(d), 1, 60))
        .collect();
    let explorer = explorer_with(&trips);

    let page = explorer
        .list_trips(
            &TripFilterParams::default(),
            SortSpec::default(),
            PageRequest::new(40, 20, MAX_PAGE_SIZE).unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(page.trips.len(), 5);
    let info = page.pagination;
    assert_eq!(info.total, 45);
    assert_eq!(info.page, 3);
    assert_eq!(info.total_pages, 3);
    assert!(!info.has_next);
    assert!(info.has_prev);

    // Default order is newest pickup first, so the last page holds the oldest
    let ids: Vec<&str> = page.trips.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, ["p05", "p04", "p03", "p02", "p01"]);
}

#[tokio::test]
async fn test_unknown_sort_field_falls_back_to_pickup() {
    let explorer = explorer_with(&hundred_days());

    let sort = SortSpec::resolve(Some("fare_amount"), Some("ASC"));
    assert_eq!(sort.field, SortField::PickupDatetime);
    assert_eq!(sort.order, SortOrder::Asc);

    let page = explorer
        .list_trips(&TripFilterParams::default(), sort, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.trips[0].id, "d001a");

    let sort = SortSpec::resolve(None, Some("sideways"));
    let page = explorer
        .list_trips(&TripFilterParams::default(), sort, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(page.trips[0].id, "d100b");
}

#[tokio::test]
async fn test_sort_by_duration_with_window() {
    let explorer = explorer_with(&hundred_days());
    let params = TripFilterParams {
        pickup_start: Some(day(10)),
        pickup_end: Some(day(12)),
        ..Default::default()
    };

    let page = explorer
        .list_trips(
            &params,
            SortSpec::resolve(Some("trip_duration"), Some("desc")),
            PageRequest::default(),
        )
        .await
        .unwrap();

    let durations: Vec<u32> = page.trips.iter().map(|t| t.trip_duration).collect();
    assert_eq!(durations, [130, 120, 120, 110, 100]);
    assert_eq!(page.trips[0].id, "d011b");
}

#[tokio::test]
async fn test_empty_listing_is_successful() {
    let explorer = explorer_with(&hundred_days());
    let params = TripFilterParams {
        vendor_id: Some(99),
        ..Default::default()
    };

    let page = explorer
        .list_trips(&params, SortSpec::default(), PageRequest::default())
        .await
        .unwrap();
    assert!(page.trips.is_empty());
    assert_eq!(page.pagination.total, 0);
    assert_eq!(page.pagination.total_pages, 0);
    assert!(!page.pagination.has_next);
}

#[tokio::test]
async fn test_lookup() {
    let explorer = explorer_with(&hundred_days());

    let found = explorer.get_trip("d042b").await.unwrap();
    assert_eq!(found.pickup_datetime, day(42) + Duration::minutes(30));
    assert_eq!(found.trip_duration, 440);

    let err = explorer.get_trip("d420a").await.unwrap_err();
    assert!(matches!(err, ExplorerError::NotFound(_)));
}

#[tokio::test]
async fn test_read_only_store_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trips.db");

    {
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.insert_trips(&hundred_days()).unwrap(), 200);
    }

    let explorer = Explorer::new(SqliteStore::open_read_only(&path).unwrap());
    let stats = explorer.stats(None, None).await.unwrap();
    assert_eq!(stats.total_trips, 200);

    // A missing file is refused rather than created
    assert!(SqliteStore::open_read_only(dir.path().join("absent.db")).is_err());
}

#[tokio::test]
async fn test_concurrent_queries_share_one_store() {
    let explorer = explorer_with(&hundred_days());

    let mut handles = Vec::new();
    for d in 1..=20 {
        let explorer = explorer.clone();
        handles.push(tokio::spawn(async move {
            explorer.get_trip(&format!("d{:03}a", d)).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
}

#[test]
fn test_bucket_plan_filters_on_pickup() {
    let plan = BucketPlan::resolve(TimeRange::Last7Days, Granularity::Day, Some(day(100)));
    let filters = plan.filter_set();
    assert_eq!(filters.predicates()[0].field, TripField::PickupDatetime);
}

#[tokio::test]
async fn test_buckets_match_truncated_pickups() {
    let trips = hundred_days();
    let store: std::sync::Arc<dyn TripStore> = {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_trips(&trips).unwrap();
        std::sync::Arc::new(store)
    };
    let explorer = Explorer::with_store(store.clone());

    let series = explorer
        .time_series(TimeRange::All, Granularity::Hour)
        .await
        .unwrap();
    for point in &series {
        let expected = trips
            .iter()
            .filter(|t| Granularity::Hour.truncate(t.pickup_datetime) == point.timestamp)
            .count() as u64;
        assert_eq!(point.trip_count, expected);
    }

    // A second explorer over the same handle sees the same data
    let other = Explorer::with_store(store);
    assert_eq!(other.stats(None, None).await.unwrap().total_trips, 200);
}
