#![cfg(feature = "http")]

/// End-to-end tests for the `mobex` binary against a seeded database file.
use assert_cmd::Command;
use chrono::{Duration, NaiveDateTime};
use mobility_explorer::{SqliteStore, StoreFlag, Trip};
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn trip(id: &str, pickup: &str, passengers: u32, duration: u32) -> Trip {
    let pickup = NaiveDateTime::parse_from_str(pickup, "%Y-%m-%d %H:%M:%S").unwrap();
    Trip {
        id: id.to_string(),
        vendor_id: 1,
        pickup_datetime: pickup,
        dropoff_datetime: pickup + Duration::seconds(duration.into()),
        passenger_count: passengers,
        pickup_longitude: -73.98,
        pickup_latitude: 40.75,
        dropoff_longitude: -73.95,
        dropoff_latitude: 40.78,
        store_and_fwd_flag: StoreFlag::No,
        trip_duration: duration,
    }
}

fn seeded_db() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("trips.db")).unwrap();
    store
        .insert_trips(&[
            trip("id1", "2016-06-01 09:00:00", 2, 300),
            trip("id2", "2016-06-01 09:30:00", 1, 500),
            trip("id3", "2016-06-02 18:00:00", 0, 1000),
        ])
        .unwrap();
    dir
}

fn mobex(db: &Path) -> Command {
    let mut cmd = Command::cargo_bin("mobex").unwrap();
    cmd.env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("MOBEX_DB_PATH")
        .arg("--db-path")
        .arg(db.join("trips.db"));
    cmd
}

#[test]
fn test_stats_command() {
    let dir = seeded_db();
    mobex(dir.path())
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("Total trips: 3"))
        .stdout(predicate::str::contains("Total passengers: 3"));
}

#[test]
fn test_stats_json_window() {
    let dir = seeded_db();
    mobex(dir.path())
        .args(["--json", "stats", "--pickup-start", "2016-06-02"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total_trips\": 1"))
        .stdout(predicate::str::contains("\"total_duration\": 1000.0"));
}

#[test]
fn test_trip_command() {
    let dir = seeded_db();
    mobex(dir.path())
        .args(["trip", "id2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("id2"))
        .stdout(predicate::str::contains("500s"));

    mobex(dir.path())
        .args(["trip", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Trip with id nope not found"));
}

#[test]
fn test_trips_command() {
    let dir = seeded_db();
    mobex(dir.path())
        .args(["--json", "trips", "--min-passengers", "0", "--max-passengers", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\": \"id3\""))
        .stdout(predicate::str::contains("\"id\": \"id1\"").not());

    mobex(dir.path())
        .args(["trips", "--sort-by", "trip_duration", "--sort-order", "asc", "--limit", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("id1"))
        .stdout(predicate::str::contains("Page 1 of 3 (3 trips total)"));

    mobex(dir.path())
        .args(["trips", "--limit", "1001"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("limit must be at most 1000"));
}

#[test]
fn test_series_command() {
    let dir = seeded_db();
    mobex(dir.path())
        .args(["series", "--range", "7d"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2016-06-01 09:00:00"))
        .stdout(predicate::str::contains("2016-06-02 18:00:00"));
}

#[test]
fn test_missing_database() {
    let dir = tempfile::tempdir().unwrap();
    mobex(dir.path())
        .arg("stats")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to open"));
}
