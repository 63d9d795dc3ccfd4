use std::time::Duration;

use anyhow::{Context, Result, bail};
use availability_snapshot::{
    SnapshotEngineConfig, TrackedFacility, default_tracked_facilities, parse_tracked_facilities,
};
use chrono::FixedOffset;

/// Server settings read from the environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Shared secret for the trigger endpoints
    pub cron_secret: String,
    /// Address the HTTP server binds to
    pub bind_addr: String,
    /// Postgres URL; the in-memory store is used when absent
    pub database_url: Option<String>,
    /// Recreation.gov API key
    pub rec_gov_api_key: Option<String>,
    /// Campgrounds fetched on every run
    pub facilities: Vec<TrackedFacility>,
    /// Engine tunables
    pub engine: SnapshotEngineConfig,
}

impl ServerConfig {
    /// Reads the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let cron_secret = var("CRON_SECRET").context("CRON_SECRET must be set")?;

        let facilities = match var("TRACKED_FACILITIES_FILE") {
            Some(path) => {
                let json = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read tracked facilities from {}", path))?;
                parse_tracked_facilities(&json)
                    .with_context(|| format!("Invalid tracked facilities in {}", path))?
            }
            None => default_tracked_facilities(),
        };

        let mut engine = SnapshotEngineConfig::default();
        if let Some(hours) = parse_var::<i32>(&var, "SNAPSHOT_UTC_OFFSET_HOURS")? {
            engine.utc_offset = hours
                .checked_mul(3600)
                .and_then(FixedOffset::east_opt)
                .with_context(|| format!("SNAPSHOT_UTC_OFFSET_HOURS out of range: {}", hours))?;
        }
        if let Some(secs) = parse_var::<u64>(&var, "SNAPSHOT_RUN_DEADLINE_SECS")? {
            engine.run_deadline = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&var, "SNAPSHOT_FETCH_TIMEOUT_SECS")? {
            engine.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(limit) = parse_var::<usize>(&var, "SNAPSHOT_MAX_CONCURRENT_FETCHES")? {
            if limit == 0 {
                bail!("SNAPSHOT_MAX_CONCURRENT_FETCHES must be at least 1");
            }
            engine.max_concurrent_fetches = limit;
        }

        Ok(Self {
            cron_secret,
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            database_url: var("DATABASE_URL"),
            rec_gov_api_key: var(rec_gov::API_KEY_VAR),
            facilities,
            engine,
        })
    }
}

fn parse_var<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    var(name)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid value for {}: {:?}", name, raw))
        })
        .transpose()
}
