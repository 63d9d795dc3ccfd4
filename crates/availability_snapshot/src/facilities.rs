use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::types::SnapshotError;

/// A campground whose availability is captured on every run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct TrackedFacility {
    /// Upstream facility identifier
    #[validate(length(min = 1, message = "Facility ID is required"))]
    pub id: String,

    /// Display name
    #[validate(length(min = 1, message = "Facility name is required"))]
    pub name: String,

    /// Two-letter state code
    #[validate(length(equal = 2, message = "State must be a two-letter code"))]
    pub state: Option<String>,

    /// City, when known
    #[serde(default)]
    pub city: Option<String>,
}

impl TrackedFacility {
    fn new(id: &str, name: &str, state: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            state: Some(state.to_string()),
            city: None,
        }
    }
}

/// Parses and validates a JSON array of tracked facilities
pub fn parse_tracked_facilities(json: &str) -> Result<Vec<TrackedFacility>, SnapshotError> {
    let facilities: Vec<TrackedFacility> = serde_json::from_str(json)
        .map_err(|e| SnapshotError::ConfigError(format!("Invalid facility list: {}", e)))?;

    if facilities.is_empty() {
        return Err(SnapshotError::ConfigError(
            "Facility list must not be empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for facility in &facilities {
        facility.validate().map_err(|e| {
            SnapshotError::ConfigError(format!("Invalid facility {}: {}", facility.id, e))
        })?;
        if !seen.insert(facility.id.as_str()) {
            return Err(SnapshotError::ConfigError(format!(
                "Duplicate facility ID: {}",
                facility.id
            )));
        }
    }

    Ok(facilities)
}

/// Recreation.gov campgrounds tracked when no facility list is configured
pub fn default_tracked_facilities() -> Vec<TrackedFacility> {
    vec![
        // Yosemite
        TrackedFacility::new("232450", "Upper Pines Campground", "CA"),
        TrackedFacility::new("232449", "Lower Pines Campground", "CA"),
        TrackedFacility::new("232447", "North Pines Campground", "CA"),
        // Grand Canyon
        TrackedFacility::new("232266", "Mather Campground", "AZ"),
        TrackedFacility::new("258825", "Desert View Campground", "AZ"),
        // Yellowstone
        TrackedFacility::new("232462", "Madison Campground", "WY"),
        TrackedFacility::new("251869", "Bridge Bay Campground", "WY"),
        // Joshua Tree
        TrackedFacility::new("70925", "Jumbo Rocks Campground", "CA"),
        TrackedFacility::new("232381", "Indian Cove Campground", "CA"),
        // Zion
        TrackedFacility::new("232490", "Watchman Campground", "UT"),
        TrackedFacility::new("251889", "South Campground", "UT"),
        // Rocky Mountain
        TrackedFacility::new("232493", "Moraine Park Campground", "CO"),
        TrackedFacility::new("251870", "Glacier Basin Campground", "CO"),
        // Acadia
        TrackedFacility::new("232487", "Blackwoods Campground", "ME"),
        TrackedFacility::new("232488", "Seawall Campground", "ME"),
        // Great Smoky Mountains
        TrackedFacility::new("232478", "Cades Cove Campground", "TN"),
        TrackedFacility::new("232477", "Elkmont Campground", "TN"),
        // Olympic
        TrackedFacility::new("232465", "Kalaloch Campground", "WA"),
        TrackedFacility::new("232466", "Sol Duc Hot Springs Campground", "WA"),
    ]
}
