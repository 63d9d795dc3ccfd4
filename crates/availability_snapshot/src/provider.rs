use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::SnapshotError;

/// Availability of one site on one night
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AvailabilityState {
    /// Bookable
    Available,
    /// Reserved, closed, walk-up only, or otherwise not bookable
    Unavailable,
}

/// Per-night states reported for one site
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SiteCalendar {
    /// Display name reported by the provider
    pub site_name: String,
    /// State per calendar date. A missing date means unknown, not unavailable.
    pub dates: BTreeMap<NaiveDate, AvailabilityState>,
}

impl SiteCalendar {
    /// Whether the site is known to be available on `date`
    pub fn is_available_on(&self, date: NaiveDate) -> bool {
        matches!(self.dates.get(&date), Some(AvailabilityState::Available))
    }
}

/// Month of availability for one facility, keyed by site identifier
pub type FacilityAvailability = HashMap<String, SiteCalendar>;

/// Upstream source of campsite availability
#[async_trait::async_trait]
pub trait AvailabilityProvider: Send + Sync {
    /// Fails with [`SnapshotError::MissingCredentials`] when the provider cannot be called at all
    fn check_credentials(&self) -> Result<(), SnapshotError> {
        Ok(())
    }

    /// Fetches the calendar month containing `month` for `facility_id`
    async fn fetch_month(
        &self,
        facility_id: &str,
        month: NaiveDate,
    ) -> Result<FacilityAvailability, SnapshotError>;
}
