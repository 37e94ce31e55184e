/// Runtime configuration.
///
/// Settings come from the environment (after loading a `.env` file, if any)
/// and fall back to defaults. Command line flags override them in the
/// binary.
///
/// | Variable | Default |
/// |---|---|
/// | `MOBEX_DB_PATH` | `<data dir>/mobility-explorer/trips.db` |
/// | `MOBEX_BIND` | `0.0.0.0` |
/// | `MOBEX_PORT` | `8080` |
/// | `MOBEX_MAX_PAGE_SIZE` | `1000` |
/// | `MOBEX_LOG_LEVEL` | `info` |
use crate::error::{ExplorerError, ExplorerResult};
use crate::pagination::MAX_PAGE_SIZE;
use std::path::PathBuf;
use std::str::FromStr;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8080;

/// Service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorerConfig {
    /// SQLite database holding the `trips` table
    pub db_path: PathBuf,
    /// Address to bind the HTTP server to
    pub bind: String,
    pub port: u16,
    /// Largest `limit` a listing accepts
    pub max_page_size: u64,
    /// Fallback log filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            bind: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_page_size: MAX_PAGE_SIZE,
            log_level: "info".to_string(),
        }
    }
}

impl ExplorerConfig {
    /// Load from the process environment, reading `.env` first.
    pub fn from_env() -> ExplorerResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> ExplorerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let max_page_size = parse_var(&lookup, "MOBEX_MAX_PAGE_SIZE", defaults.max_page_size)?;
        if max_page_size == 0 {
            return Err(ExplorerError::Config {
                reason: "MOBEX_MAX_PAGE_SIZE must be at least 1".to_string(),
            });
        }

        Ok(Self {
            db_path: lookup("MOBEX_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            bind: lookup("MOBEX_BIND").unwrap_or(defaults.bind),
            port: parse_var(&lookup, "MOBEX_PORT", defaults.port)?,
            max_page_size,
            log_level: lookup("MOBEX_LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }

    /// `bind:port`
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> ExplorerResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e| ExplorerError::Config {
            reason: format!("{} = '{}': {}", key, raw, e),
        }),
        None => Ok(default),
    }
}

/// `<data dir>/mobility-explorer/trips.db`, or `./trips.db` when the platform
/// has no data directory.
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("mobility-explorer").join("trips.db"))
        .unwrap_or_else(|| PathBuf::from("trips.db"))
}
