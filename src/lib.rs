//! # Mobility Explorer
//!
//! A read-only analytics engine over historical taxi trips.
//!
//! Mobility Explorer answers four kinds of question against a store of trip
//! records:
//! - **Listings** - filtered, sorted, paginated trips with page metadata
//! - **Lookup** - a single trip by identifier
//! - **Statistics** - totals over an optional pickup window
//! - **Trends** - trip counts and average durations per hour or day
//!
//! ## Quick Start
//!
//! ```ignore
//! use mobility_explorer::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let explorer = Explorer::new(SqliteStore::open_read_only("trips.db")?);
//!
//!     // Busy trips, longest first
//!     let params = TripFilterParams {
//!         min_passengers: Some(4),
//!         ..Default::default()
//!     };
//!     let sort = SortSpec::resolve(Some("trip_duration"), Some("desc"));
//!     let page = explorer
//!         .list_trips(&params, sort, PageRequest::new(0, 20, MAX_PAGE_SIZE)?)
//!         .await?;
//!     println!("{} of {} trips", page.trips.len(), page.pagination.total);
//!
//!     // Hourly trend over the last week of data
//!     let series = explorer
//!         .time_series(TimeRange::Last7Days, Granularity::Hour)
//!         .await?;
//!     for point in series {
//!         println!("{} {} {:.1}", point.timestamp, point.trip_count, point.avg_duration);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! 1. **Explorer API** (`core`) - async entry point and absence handling
//! 2. **Planning** (`query`, `pagination`, `timeseries`) - pure translation of
//!    request parameters into predicates, orderings, pages and bucket plans
//! 3. **Store** (`storage`) - SQLite-backed [`TripStore`] that evaluates plans
//! 4. **HTTP API** (`http`, feature `http`) - axum router and response envelope
//!
//! Relative time ranges are anchored to the latest pickup in the store, so
//! the same data always yields the same series.

// Internal modules
mod core;
mod error;

// Record types and timestamp helpers
pub mod types;

// Request planning
pub mod pagination;
pub mod query;
pub mod timeseries;

// Record store
pub mod storage;

// Runtime configuration
pub mod config;

// HTTP API (requires http feature)
#[cfg(feature = "http")]
pub mod http;

// Public API exports
pub use core::{Explorer, TripPage};
pub use error::{ExplorerError, ExplorerResult};
pub use types::{StoreFlag, TimeSeriesPoint, Trip, TripStats};

// Planning exports
pub use pagination::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, PageInfo, PageRequest};
pub use query::{
    Comparison, FilterSet, FilterValue, Predicate, SortField, SortOrder, SortSpec, TripField,
    TripFilterParams,
};
pub use timeseries::{BucketPlan, Granularity, TimeRange};

// Store exports
pub use storage::{SqliteStore, TripStore};

pub use config::ExplorerConfig;

// Re-export commonly used external types for convenience
pub use chrono::NaiveDateTime;

/// Prelude module for convenient imports.
///
/// Import everything you need with:
/// ```ignore
/// use mobility_explorer::prelude::*;
/// ```
pub mod prelude {
    pub use crate::core::{Explorer, TripPage};
    pub use crate::error::{ExplorerError, ExplorerResult};
    pub use crate::types::{StoreFlag, TimeSeriesPoint, Trip, TripStats};
    pub use chrono::NaiveDateTime;

    pub use crate::pagination::{MAX_PAGE_SIZE, PageInfo, PageRequest};
    pub use crate::query::{SortField, SortOrder, SortSpec, TripFilterParams};
    pub use crate::timeseries::{Granularity, TimeRange};

    pub use crate::storage::{SqliteStore, TripStore};
}
