use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A site seen as available on the observed date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteObservation {
    /// Upstream facility (campground) identifier
    pub facility_id: String,
    /// Display name of the facility
    pub facility_name: String,
    /// Upstream site identifier
    pub site_id: String,
    /// Display name of the site
    pub site_name: String,
    /// The calendar date the site is available for
    pub date: NaiveDate,
}

/// Point-in-time record of every site available for `date`, captured at `hour`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// The calendar date being observed
    pub date: NaiveDate,
    /// Wall-clock hour (0-23) at capture time, only used for keying
    pub hour: u32,
    /// Available sites keyed by site identifier
    pub sites: BTreeMap<String, SiteObservation>,
    /// When the snapshot was taken
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// Number of available sites in the snapshot
    pub fn site_count(&self) -> usize {
        self.sites.len()
    }
}

/// A site whose availability was first observed on a given day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewlyAvailableEvent {
    /// Upstream site identifier, unique within a day's ledger
    pub site_id: String,
    /// Display name of the site
    pub site_name: String,
    /// Upstream facility identifier
    pub facility_id: String,
    /// Display name of the facility
    pub facility_name: String,
    /// Two-letter state code of the facility, when known
    pub facility_state: Option<String>,
    /// City of the facility, when known
    pub facility_city: Option<String>,
    /// The calendar date the site is available for
    pub date: NaiveDate,
    /// Where the site can be booked
    pub reservation_url: String,
    /// When the transition was first observed
    pub became_available_at: DateTime<Utc>,
}

/// All newly-available events recorded for one calendar date
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ledger {
    /// Date the ledger belongs to
    pub date: NaiveDate,
    /// Events in append order, at most one per site
    pub events: Vec<NewlyAvailableEvent>,
}

impl Ledger {
    /// Creates an empty ledger for `date`
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            events: Vec::new(),
        }
    }

    /// Whether an event for `site_id` is already recorded
    pub fn contains_site(&self, site_id: &str) -> bool {
        self.events.iter().any(|event| event.site_id == site_id)
    }
}

/// What a retention sweep removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionReport {
    /// Newest date that was pruned; everything on or before it is gone
    pub cutoff: NaiveDate,
    /// Number of snapshot records deleted
    pub snapshots_deleted: usize,
    /// Number of ledger records deleted
    pub ledgers_deleted: usize,
}

/// Summary of a completed engine run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Identifier used to correlate the run's log lines
    pub run_id: Uuid,
    /// Observed date
    pub date: NaiveDate,
    /// Capture hour
    pub hour: u32,
    /// Sites available in this run's snapshot
    pub total_sites_available: usize,
    /// Events appended to today's ledger by this run
    pub newly_available_count: usize,
    /// Size of today's ledger after this run
    pub total_newly_available_today: usize,
    /// Facilities whose fetch succeeded
    pub facilities_scanned: usize,
    /// Facilities whose fetch failed and were left out
    pub facilities_failed: usize,
    /// No prior snapshot existed in the lookback window
    pub cold_start: bool,
    /// What the retention sweep removed
    pub retention: RetentionReport,
}

/// Terminal state of an engine run that did not fail
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The run went through every step
    Completed(RunSummary),
    /// A snapshot already exists for this (date, hour)
    Skipped {
        /// Observed date
        date: NaiveDate,
        /// Capture hour
        hour: u32,
    },
}

/// Errors raised while taking snapshots
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Provider credentials are not configured
    #[error("Missing provider credentials: {0}")]
    MissingCredentials(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// API error
    #[error("API error: {0}")]
    ApiError(String),

    /// Rate limited by external API
    #[error("Rate limited by external API")]
    RateLimited,

    /// Authentication failed with external service
    #[error("Authentication failed with external service")]
    AuthenticationFailed,

    /// Facility unknown to the provider
    #[error("Facility not found")]
    NotFound,

    /// Data format error
    #[error("Data format error: {0}")]
    DataFormat(String),

    /// A single facility fetch took too long
    #[error("Fetch for facility {0} timed out")]
    FetchTimeout(String),

    /// The whole run exceeded its deadline
    #[error("Snapshot run exceeded its deadline of {0}s")]
    DeadlineExceeded(u64),

    /// Store read or write failed
    #[error("Store error: {0}")]
    Store(String),

    /// Trigger caller did not present the shared secret
    #[error("Unauthorized")]
    Unauthorized,

    /// JSON encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl actix_web::ResponseError for SnapshotError {
    fn error_response(&self) -> actix_web::HttpResponse {
        use actix_web::HttpResponse;

        match self {
            SnapshotError::Unauthorized => HttpResponse::Unauthorized().json(serde_json::json!({
                "success": false,
                "error": "unauthorized",
                "message": "Invalid or missing cron secret"
            })),
            SnapshotError::MissingCredentials(_) | SnapshotError::ConfigError(_) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "success": false,
                    "error": "configuration_error",
                    "message": self.to_string()
                }))
            }
            SnapshotError::DeadlineExceeded(_) => {
                HttpResponse::GatewayTimeout().json(serde_json::json!({
                    "success": false,
                    "error": "deadline_exceeded",
                    "message": self.to_string()
                }))
            }
            SnapshotError::Store(_) | SnapshotError::Serialization(_) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "success": false,
                    "error": "store_error",
                    "message": self.to_string()
                }))
            }
            SnapshotError::RateLimited => HttpResponse::TooManyRequests().json(serde_json::json!({
                "success": false,
                "error": "rate_limited",
                "message": "Rate limited by external service. Please try again later."
            })),
            _ => HttpResponse::BadGateway().json(serde_json::json!({
                "success": false,
                "error": "upstream_error",
                "message": self.to_string()
            })),
        }
    }
}
