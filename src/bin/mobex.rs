/// Mobility Explorer CLI - query taxi trips from the terminal
///
/// Every query command runs against a local SQLite database, or against a
/// running server when `--url` is given.
///
/// Usage:
///   mobex serve [--bind <addr>] [--port <port>]  - Start the HTTP API
///   mobex trips [filters] [--sort-by <field>]     - List trips
///   mobex trip <id>                               - Show one trip
///   mobex stats [--pickup-start <ts>]             - Totals
///   mobex series [--range 7d] [--interval hour]   - Trend series
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use mobility_explorer::http::{ApiResponse, HttpServer};
use mobility_explorer::prelude::*;
use mobility_explorer::types::parse_timestamp;
use mobility_explorer::{DEFAULT_PAGE_SIZE, ExplorerConfig};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use tokio::signal;

// ============================================================================
// HTTP Client for Remote Operations
// ============================================================================

/// HTTP client for a running Mobility Explorer server.
struct HttpClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpClient {
    fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// GET an endpoint and unwrap its response envelope.
    async fn fetch<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<ApiResponse<T>> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let envelope: ApiResponse<JsonValue> = response
                .json()
                .await
                .with_context(|| format!("Server returned {}", status))?;
            anyhow::bail!("{} ({})", envelope.message, status);
        }

        response
            .json()
            .await
            .with_context(|| format!("Malformed response from {}", url))
    }

    async fn trips(&self, args: &TripArgs) -> Result<TripPage> {
        let envelope: ApiResponse<Vec<Trip>> = self.fetch("/api/trips", &args.query_pairs()).await?;
        let pagination = envelope
            .pagination
            .context("Server response is missing pagination")?;
        Ok(TripPage {
            trips: envelope.data,
            pagination,
        })
    }

    async fn trip(&self, id: &str) -> Result<Trip> {
        Ok(self.fetch(&format!("/api/trips/{}", id), &[]).await?.data)
    }

    async fn stats(&self, start: Option<&str>, end: Option<&str>) -> Result<TripStats> {
        let mut query = Vec::new();
        push_opt(&mut query, "pickup_start", start);
        push_opt(&mut query, "pickup_end", end);
        Ok(self.fetch("/api/analytics/stats", &query).await?.data)
    }

    async fn series(
        &self,
        range: Option<&str>,
        interval: Option<&str>,
    ) -> Result<Vec<TimeSeriesPoint>> {
        let mut query = Vec::new();
        push_opt(&mut query, "time_range", range);
        push_opt(&mut query, "interval", interval);
        Ok(self.fetch("/api/analytics/time-series", &query).await?.data)
    }
}

fn push_opt<T: ToString>(
    query: &mut Vec<(&'static str, String)>,
    key: &'static str,
    value: Option<T>,
) {
    if let Some(value) = value {
        query.push((key, value.to_string()));
    }
}

/// Mobility Explorer - read-only analytics over taxi trips
#[derive(Parser)]
#[command(name = "mobex")]
#[command(version, about, long_about = None)]
struct Cli {
    /// SQLite database path (default: $MOBEX_DB_PATH or the platform data dir)
    #[arg(short, long, global = true)]
    db_path: Option<PathBuf>,

    /// Server URL for remote queries (e.g., http://localhost:8080)
    #[arg(short, long, global = true)]
    url: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    ///
    /// Examples:
    ///   mobex serve                     # Listen on 0.0.0.0:8080
    ///   mobex serve --port 3000         # Use a custom port
    ///   mobex serve --bind 127.0.0.1    # Localhost only
    Serve {
        /// Port to listen on (default: $MOBEX_PORT or 8080)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind to (default: $MOBEX_BIND or 0.0.0.0)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// List trips with filtering, sorting and pagination
    ///
    /// Examples:
    ///   mobex trips --min-passengers 4 --sort-by trip_duration
    ///   mobex trips --pickup-start 2016-03-01 --pickup-end 2016-03-02 --limit 50
    ///   mobex trips --store-and-fwd-flag Y --sort-order asc
    Trips(TripArgs),

    /// Show a single trip
    ///
    /// Example:
    ///   mobex trip id2875421
    Trip {
        /// Trip identifier
        id: String,
    },

    /// Show totals over an optional pickup window
    ///
    /// Examples:
    ///   mobex stats
    ///   mobex stats --pickup-start 2016-01-01 --pickup-end 2016-01-31T23:59:59
    Stats {
        #[arg(long)]
        pickup_start: Option<String>,
        #[arg(long)]
        pickup_end: Option<String>,
    },

    /// Show trip counts and average durations over time
    ///
    /// Relative ranges end at the latest pickup in the data and choose their
    /// own bucket width: 7d is hourly, 30d and 3m are daily.
    ///
    /// Examples:
    ///   mobex series                    # All time, daily
    ///   mobex series --interval hour    # All time, hourly
    ///   mobex series --range 7d         # Last week of data, hourly
    Series {
        /// 7d, 30d, 3m or all
        #[arg(short, long)]
        range: Option<String>,

        /// hour or day
        #[arg(short, long)]
        interval: Option<String>,
    },
}

/// Filters, ordering and page selection for `mobex trips`.
#[derive(Args, Debug)]
struct TripArgs {
    #[arg(long)]
    pickup_start: Option<String>,
    #[arg(long)]
    pickup_end: Option<String>,
    #[arg(long)]
    dropoff_start: Option<String>,
    #[arg(long)]
    dropoff_end: Option<String>,

    /// Minimum duration in seconds
    #[arg(long)]
    min_duration: Option<u32>,
    /// Maximum duration in seconds
    #[arg(long)]
    max_duration: Option<u32>,
    #[arg(long)]
    min_passengers: Option<u32>,
    #[arg(long)]
    max_passengers: Option<u32>,
    #[arg(long)]
    vendor_id: Option<i64>,

    #[arg(long, allow_negative_numbers = true)]
    pickup_lat_min: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pickup_lat_max: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pickup_lon_min: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    pickup_lon_max: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    dropoff_lat_min: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    dropoff_lat_max: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    dropoff_lon_min: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    dropoff_lon_max: Option<f64>,

    /// Y or N
    #[arg(long)]
    store_and_fwd_flag: Option<String>,

    /// Field to sort by (default: pickup_datetime)
    #[arg(long)]
    sort_by: Option<String>,
    /// asc or desc (default: desc)
    #[arg(long)]
    sort_order: Option<String>,

    /// Records to skip
    #[arg(long, default_value_t = 0)]
    skip: u64,
    /// Records per page
    #[arg(short, long, default_value_t = DEFAULT_PAGE_SIZE)]
    limit: u64,
}

impl TripArgs {
    fn filter_params(&self) -> Result<TripFilterParams> {
        let ts = |raw: &Option<String>| -> Result<Option<NaiveDateTime>> {
            raw.as_deref()
                .map(parse_timestamp)
                .transpose()
                .map_err(Into::into)
        };
        Ok(TripFilterParams {
            pickup_start: ts(&self.pickup_start)?,
            pickup_end: ts(&self.pickup_end)?,
            dropoff_start: ts(&self.dropoff_start)?,
            dropoff_end: ts(&self.dropoff_end)?,
            min_duration: self.min_duration,
            max_duration: self.max_duration,
            min_passengers: self.min_passengers,
            max_passengers: self.max_passengers,
            vendor_id: self.vendor_id,
            pickup_lat_min: self.pickup_lat_min,
            pickup_lat_max: self.pickup_lat_max,
            pickup_lon_min: self.pickup_lon_min,
            pickup_lon_max: self.pickup_lon_max,
            dropoff_lat_min: self.dropoff_lat_min,
            dropoff_lat_max: self.dropoff_lat_max,
            dropoff_lon_min: self.dropoff_lon_min,
            dropoff_lon_max: self.dropoff_lon_max,
            store_and_fwd_flag: self
                .store_and_fwd_flag
                .as_deref()
                .map(str::parse::<StoreFlag>)
                .transpose()?,
        })
    }

    /// The same selection as HTTP query parameters.
    fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        push_opt(&mut query, "pickup_start", self.pickup_start.as_deref());
        push_opt(&mut query, "pickup_end", self.pickup_end.as_deref());
        push_opt(&mut query, "dropoff_start", self.dropoff_start.as_deref());
        push_opt(&mut query, "dropoff_end", self.dropoff_end.as_deref());
        push_opt(&mut query, "min_duration", self.min_duration);
        push_opt(&mut query, "max_duration", self.max_duration);
        push_opt(&mut query, "min_passengers", self.min_passengers);
        push_opt(&mut query, "max_passengers", self.max_passengers);
        push_opt(&mut query, "vendor_id", self.vendor_id);
        push_opt(&mut query, "pickup_lat_min", self.pickup_lat_min);
        push_opt(&mut query, "pickup_lat_max", self.pickup_lat_max);
        push_opt(&mut query, "pickup_lon_min", self.pickup_lon_min);
        push_opt(&mut query, "pickup_lon_max", self.pickup_lon_max);
        push_opt(&mut query, "dropoff_lat_min", self.dropoff_lat_min);
        push_opt(&mut query, "dropoff_lat_max", self.dropoff_lat_max);
        push_opt(&mut query, "dropoff_lon_min", self.dropoff_lon_min);
        push_opt(&mut query, "dropoff_lon_max", self.dropoff_lon_max);
        push_opt(&mut query, "store_and_fwd_flag", self.store_and_fwd_flag.as_deref());
        push_opt(&mut query, "sort_by", self.sort_by.as_deref());
        push_opt(&mut query, "sort_order", self.sort_order.as_deref());
        query.push(("skip", self.skip.to_string()));
        query.push(("limit", self.limit.to_string()));
        query
    }
}

// ============================================================================
// Output
// ============================================================================

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_trip_page(page: &TripPage) {
    if page.trips.is_empty() {
        println!("{}", "No trips match.".yellow());
    }
    for trip in &page.trips {
        println!(
            "{}  {}  {:>6}s  {} pax  vendor {}",
            trip.id.cyan(),
            trip.pickup_datetime,
            trip.trip_duration,
            trip.passenger_count,
            trip.vendor_id
        );
    }
    let info = &page.pagination;
    println!();
    println!(
        "{}",
        format!(
            "Page {} of {} ({} trips total)",
            info.page, info.total_pages, info.total
        )
        .bright_black()
    );
}

fn print_trip(trip: &Trip) {
    println!("{} {}", "Trip".bold(), trip.id.cyan());
    println!("  {} {}", "Vendor:".bright_white(), trip.vendor_id);
    println!("  {} {}", "Pickup:".bright_white(), trip.pickup_datetime);
    println!(
        "          ({:.6}, {:.6})",
        trip.pickup_latitude, trip.pickup_longitude
    );
    println!("  {} {}", "Dropoff:".bright_white(), trip.dropoff_datetime);
    println!(
        "          ({:.6}, {:.6})",
        trip.dropoff_latitude, trip.dropoff_longitude
    );
    println!("  {} {}", "Passengers:".bright_white(), trip.passenger_count);
    println!("  {} {}s", "Duration:".bright_white(), trip.trip_duration);
    println!(
        "  {} {}",
        "Store and forward:".bright_white(),
        trip.store_and_fwd_flag
    );
}

fn print_stats(stats: &TripStats) {
    println!("{}", "Trip Statistics".bold().cyan());
    println!("  {} {}", "Total trips:".bright_white(), stats.total_trips);
    println!(
        "  {} {}s",
        "Total duration:".bright_white(),
        stats.total_duration
    );
    println!(
        "  {} {}",
        "Total passengers:".bright_white(),
        stats.total_passengers
    );
}

fn print_series(points: &[TimeSeriesPoint]) {
    println!(
        "{}",
        format!("{:<20} {:>8} {:>12}", "bucket", "trips", "avg dur (s)").bold()
    );
    for point in points {
        println!(
            "{:<20} {:>8} {:>12.1}",
            point.timestamp.to_string(),
            point.trip_count,
            point.avg_duration
        );
    }
}

// ============================================================================
// Commands
// ============================================================================

fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn handle_remote_command(command: &Commands, url: &str, json: bool) -> Result<()> {
    let client = HttpClient::new(url);

    match command {
        Commands::Serve { .. } => {
            println!("{}", "Cannot start HTTP server with --url flag".red());
            println!("  Remove --url to serve a local database.");
            std::process::exit(1);
        }

        Commands::Trips(args) => {
            let page = client.trips(args).await?;
            if json {
                return print_json(&page);
            }
            print_trip_page(&page);
        }

        Commands::Trip { id } => {
            let trip = client.trip(id).await?;
            if json {
                return print_json(&trip);
            }
            print_trip(&trip);
        }

        Commands::Stats {
            pickup_start,
            pickup_end,
        } => {
            let stats = client
                .stats(pickup_start.as_deref(), pickup_end.as_deref())
                .await?;
            if json {
                return print_json(&stats);
            }
            print_stats(&stats);
        }

        Commands::Series { range, interval } => {
            let points = client
                .series(range.as_deref(), interval.as_deref())
                .await?;
            if json {
                return print_json(&points);
            }
            print_series(&points);
        }
    }
    Ok(())
}

async fn handle_local_command(
    command: Commands,
    config: &ExplorerConfig,
    json: bool,
) -> Result<()> {
    let store = SqliteStore::open_read_only(&config.db_path)
        .with_context(|| format!("Failed to open {}", config.db_path.display()))?;
    let explorer = Explorer::new(store);

    match command {
        Commands::Serve { .. } => run_http_server(explorer, config).await?,

        Commands::Trips(args) => {
            let params = args.filter_params()?;
            let page = PageRequest::new(args.skip, args.limit, config.max_page_size)?;
            let sort = SortSpec::resolve(args.sort_by.as_deref(), args.sort_order.as_deref());

            let page = explorer.list_trips(&params, sort, page).await?;
            if json {
                return print_json(&page);
            }
            print_trip_page(&page);
        }

        Commands::Trip { id } => {
            let trip = explorer.get_trip(&id).await?;
            if json {
                return print_json(&trip);
            }
            print_trip(&trip);
        }

        Commands::Stats {
            pickup_start,
            pickup_end,
        } => {
            let start = pickup_start.as_deref().map(parse_timestamp).transpose()?;
            let end = pickup_end.as_deref().map(parse_timestamp).transpose()?;

            let stats = explorer.stats(start, end).await?;
            if json {
                return print_json(&stats);
            }
            print_stats(&stats);
        }

        Commands::Series { range, interval } => {
            let range = TimeRange::parse(range.as_deref());
            let granularity = Granularity::parse(interval.as_deref());

            let points = explorer.time_series(range, granularity).await?;
            if json {
                return print_json(&points);
            }
            print_series(&points);
        }
    }
    Ok(())
}

/// Run the HTTP API server
async fn run_http_server(explorer: Explorer, config: &ExplorerConfig) -> Result<()> {
    let bind_addr = config.listen_addr();

    println!("{}", "Starting Mobility Explorer HTTP server...".bold().cyan());
    println!();
    println!("  {} {}", "Bind:".bright_white(), bind_addr);
    println!("  {} {}", "Database:".bright_white(), config.db_path.display());
    println!();
    println!("  {}", "Endpoints:".bright_black());
    println!("    GET    /                              - Service index");
    println!("    GET    /api/trips                     - List trips");
    println!("    GET    /api/trips/:trip_id            - Get trip");
    println!("    GET    /api/analytics/stats           - Statistics");
    println!("    GET    /api/analytics/time-series     - Time series");
    println!();
    println!("{}", "Server is running. Press Ctrl+C to stop.".green());
    println!();

    let server = HttpServer::new(explorer).with_max_page_size(config.max_page_size);

    let shutdown = async {
        signal::ctrl_c().await.ok();
        println!();
        println!("{}", "Shutting down...".yellow());
    };

    tokio::select! {
        result = server.bind(&bind_addr) => {
            if let Err(e) = result {
                eprintln!("{} {}", "Server error:".red(), e);
            }
        }
        _ = shutdown => {}
    }

    println!("{}", "Server stopped.".green());
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ExplorerConfig::from_env().context("Invalid configuration")?;
    init_tracing(&config.log_level);

    // Handle remote operations via HTTP
    if let Some(url) = &cli.url {
        return handle_remote_command(&cli.command, url, cli.json).await;
    }

    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }

    if let Commands::Serve { port, bind } = &cli.command {
        if let Some(port) = port {
            config.port = *port;
        }
        if let Some(bind) = bind {
            config.bind = bind.clone();
        }
    }

    handle_local_command(cli.command, &config, cli.json).await
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("{}", "Error".red().bold());
        eprintln!("  {:#}", e);
        std::process::exit(1);
    }
}
