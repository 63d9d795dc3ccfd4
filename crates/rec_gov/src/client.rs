use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use availability_snapshot::{
    AvailabilityProvider, AvailabilityState, FacilityAvailability, SiteCalendar, SnapshotError,
};
use chrono::{Datelike, NaiveDate};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

/// Environment variable holding the Recreation.gov API key
pub const API_KEY_VAR: &str = "RECREATION_GOV_API_KEY";

const DEFAULT_BASE_URL: &str = "https://www.recreation.gov/api";

/// Client for interacting with recreation.gov API
pub struct RecGovClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

/// Response structure from recreation.gov month availability API
#[derive(Debug, Deserialize)]
pub struct RecGovMonthResponse {
    /// Campsites keyed by campsite ID
    pub campsites: HashMap<String, RecGovCampsite>,
}

/// Campsite availability data from the month API
#[derive(Debug, Deserialize)]
pub struct RecGovCampsite {
    /// Status per night, keyed by `YYYY-MM-DDT00:00:00Z`
    #[serde(default)]
    pub availabilities: HashMap<String, String>,

    /// Campsite ID repeated inside the record
    pub campsite_id: Option<String>,

    /// Site label shown on recreation.gov (e.g. "A012")
    pub site: Option<String>,
}

impl RecGovClient {
    /// Create a new recreation.gov API client
    pub fn new(api_key: Option<String>) -> Result<Self, SnapshotError> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36")
            .cookie_store(true)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SnapshotError::ApiError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    /// Create a client from the `RECREATION_GOV_API_KEY` environment variable
    pub fn from_env() -> Result<Self, SnapshotError> {
        Self::new(std::env::var(API_KEY_VAR).ok())
    }

    /// Point the client at another host, e.g. a local mock
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn month_url(&self, facility_id: &str) -> String {
        format!(
            "{}/camps/availability/campground/{}/month",
            self.base_url,
            urlencoding::encode(facility_id)
        )
    }

    /// `start_date` query value: first of the month at midnight UTC
    fn month_param(month: NaiveDate) -> Result<String, SnapshotError> {
        let first = NaiveDate::from_ymd_opt(month.year(), month.month(), 1)
            .ok_or_else(|| SnapshotError::DataFormat("Invalid date".to_string()))?;
        Ok(format!("{}T00:00:00.000Z", first.format("%Y-%m-%d")))
    }

    /// Convert a month response into validated per-site calendars.
    /// Campsites with an empty ID or a malformed date are dropped.
    fn parse_month_response(&self, response: RecGovMonthResponse) -> FacilityAvailability {
        let mut sites = HashMap::new();

        for (campsite_id, campsite) in response.campsites {
            let campsite_id = campsite_id.trim().to_string();
            if campsite_id.is_empty() {
                warn!("Dropping campsite record without an ID");
                continue;
            }

            match self.parse_campsite(&campsite_id, campsite) {
                Ok(calendar) => {
                    sites.insert(campsite_id, calendar);
                }
                Err(e) => warn!("Dropping campsite {}: {}", campsite_id, e),
            }
        }

        sites
    }

    fn parse_campsite(
        &self,
        campsite_id: &str,
        campsite: RecGovCampsite,
    ) -> Result<SiteCalendar, SnapshotError> {
        if let Some(ref inner_id) = campsite.campsite_id {
            if inner_id != campsite_id {
                return Err(SnapshotError::DataFormat(format!(
                    "campsite ID mismatch ({} vs {})",
                    campsite_id, inner_id
                )));
            }
        }

        let mut dates = BTreeMap::new();
        for (date_str, status) in &campsite.availabilities {
            // Format: "2024-01-15T00:00:00Z"
            let date = date_str
                .get(..10)
                .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
                .ok_or_else(|| SnapshotError::DataFormat(format!("bad date {:?}", date_str)))?;
            dates.insert(date, self.parse_availability_status(status));
        }

        let site_name = campsite
            .site
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| campsite_id.to_string());

        Ok(SiteCalendar { site_name, dates })
    }

    /// Parse availability status from recreation.gov format
    fn parse_availability_status(&self, status: &str) -> AvailabilityState {
        match status {
            "Available" => AvailabilityState::Available,
            "Reserved" | "Not Available" | "Not Reservable" | "Walk-up" | "Open" | "Closed" => {
                AvailabilityState::Unavailable
            }
            // Legacy RIDB format support
            "A" => AvailabilityState::Available,
            "R" | "X" | "W" | "N" => AvailabilityState::Unavailable,
            // Price string, means available
            s if s.starts_with('$') => AvailabilityState::Available,
            _ => {
                debug!("Unknown availability status: {}", status);
                AvailabilityState::Unavailable
            }
        }
    }
}

#[async_trait::async_trait]
impl AvailabilityProvider for RecGovClient {
    fn check_credentials(&self) -> Result<(), SnapshotError> {
        match self.api_key {
            Some(_) => Ok(()),
            None => Err(SnapshotError::MissingCredentials(format!(
                "{} is not set",
                API_KEY_VAR
            ))),
        }
    }

    async fn fetch_month(
        &self,
        facility_id: &str,
        month: NaiveDate,
    ) -> Result<FacilityAvailability, SnapshotError> {
        let url = self.month_url(facility_id);
        let start_date = Self::month_param(month)?;

        debug!("Making request to: {}?start_date={}", url, start_date);

        let mut request = self.client.get(&url).query(&[("start_date", start_date)]);
        if let Some(ref api_key) = self.api_key {
            request = request.header("apikey", api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SnapshotError::ApiError(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read response body".to_string());
            warn!("API request failed with status {}: {}", status, body);

            return Err(match status.as_u16() {
                429 => SnapshotError::RateLimited,
                401 | 403 => SnapshotError::AuthenticationFailed,
                404 => SnapshotError::NotFound,
                _ => SnapshotError::ApiError(format!("HTTP {} - {}", status, body)),
            });
        }

        let month_response: RecGovMonthResponse = response
            .json()
            .await
            .map_err(|e| SnapshotError::DataFormat(format!("Failed to parse response: {}", e)))?;

        let sites = self.parse_month_response(month_response);
        debug!("Facility {} returned {} campsites", facility_id, sites.len());

        Ok(sites)
    }
}
