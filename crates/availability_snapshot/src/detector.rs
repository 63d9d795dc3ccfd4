use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::facilities::TrackedFacility;
use crate::types::{NewlyAvailableEvent, SiteObservation};

const RESERVATION_BASE_URL: &str = "https://www.recreation.gov/camping/campsites";

/// Booking page for a site
pub fn reservation_url(site_id: &str) -> String {
    format!("{}/{}", RESERVATION_BASE_URL, site_id)
}

/// Turns today's availability plus the lookback union into newly-available events.
/// Does no I/O.
#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    facilities: HashMap<String, TrackedFacility>,
}

impl ChangeDetector {
    /// Creates a detector that enriches events with metadata from `facilities`
    pub fn new(facilities: &[TrackedFacility]) -> Self {
        Self {
            facilities: facilities
                .iter()
                .map(|facility| (facility.id.clone(), facility.clone()))
                .collect(),
        }
    }

    /// Emits one event per site in `todays_sites` that is absent from `historical_site_ids`.
    ///
    /// With an empty history every site is reported.
    pub fn detect(
        &self,
        todays_sites: &BTreeMap<String, SiteObservation>,
        historical_site_ids: &HashSet<String>,
        now: DateTime<Utc>,
    ) -> Vec<NewlyAvailableEvent> {
        todays_sites
            .iter()
            .filter(|(site_id, _)| !historical_site_ids.contains(site_id.as_str()))
            .map(|(_, observation)| self.to_event(observation, now))
            .collect()
    }

    fn to_event(&self, observation: &SiteObservation, now: DateTime<Utc>) -> NewlyAvailableEvent {
        let facility = self.facilities.get(&observation.facility_id);

        NewlyAvailableEvent {
            site_id: observation.site_id.clone(),
            site_name: observation.site_name.clone(),
            facility_id: observation.facility_id.clone(),
            facility_name: observation.facility_name.clone(),
            facility_state: facility.and_then(|f| f.state.clone()),
            facility_city: facility.and_then(|f| f.city.clone()),
            date: observation.date,
            reservation_url: reservation_url(&observation.site_id),
            became_available_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone};

    use super::*;

    fn sites(ids: &[&str]) -> BTreeMap<String, SiteObservation> {
        ids.iter()
            .map(|id| {
                (
                    id.to_string(),
                    SiteObservation {
                        facility_id: "232450".to_string(),
                        facility_name: "Upper Pines Campground".to_string(),
                        site_id: id.to_string(),
                        site_name: format!("Site {}", id),
                        date: NaiveDate::from_ymd_opt(2025, 7, 10).unwrap(),
                    },
                )
            })
            .collect()
    }

    fn set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn detector() -> ChangeDetector {
        ChangeDetector::new(&[TrackedFacility {
            id: "232450".to_string(),
            name: "Upper Pines Campground".to_string(),
            state: Some("CA".to_string()),
            city: Some("Yosemite Valley".to_string()),
        }])
    }

    fn ids(events: &[NewlyAvailableEvent]) -> HashSet<String> {
        events.iter().map(|e| e.site_id.clone()).collect()
    }

    #[test]
    fn test_detects_sites_missing_from_history() {
        let now = Utc.with_ymd_and_hms(2025, 7, 10, 15, 0, 0).unwrap();
        let history = set(&["A", "B", "C"]);
        let events = detector().detect(&sites(&["A", "B", "D"]), &history, now);
        assert_eq!(ids(&events), set(&["D"]));
    }

    #[test]
    fn test_cold_start_reports_everything() {
        let now = Utc.with_ymd_and_hms(2025, 7, 10, 15, 0, 0).unwrap();
        let events = detector().detect(&sites(&["X", "Y"]), &HashSet::new(), now);
        assert_eq!(ids(&events), set(&["X", "Y"]));
    }

    #[test]
    fn test_empty_today_yields_nothing() {
        let now = Utc.with_ymd_and_hms(2025, 7, 10, 15, 0, 0).unwrap();
        let events = detector().detect(&BTreeMap::new(), &set(&["A"]), now);
        assert!(events.is_empty());
    }

    #[test]
    fn test_event_is_enriched() {
        let now = Utc.with_ymd_and_hms(2025, 7, 10, 15, 0, 0).unwrap();
        let events = detector().detect(&sites(&["D"]), &HashSet::new(), now);
        let event = &events[0];

        assert_eq!(event.facility_state.as_deref(), Some("CA"));
        assert_eq!(event.facility_city.as_deref(), Some("Yosemite Valley"));
        assert_eq!(event.became_available_at, now);
        assert_eq!(
            event.reservation_url,
            "https://www.recreation.gov/camping/campsites/D"
        );
    }

    #[test]
    fn test_unknown_facility_has_no_location() {
        let now = Utc.with_ymd_and_hms(2025, 7, 10, 15, 0, 0).unwrap();
        let events = ChangeDetector::default().detect(&sites(&["D"]), &HashSet::new(), now);
        assert_eq!(events[0].facility_state, None);
        assert_eq!(events[0].facility_city, None);
    }
}
