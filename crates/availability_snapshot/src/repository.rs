use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use tracing::{debug, info, warn};

use crate::store::Store;
use crate::types::*;

/// Key prefix shared by every snapshot record
pub const SNAPSHOT_PREFIX: &str = "snapshot:";

/// Key prefix shared by every ledger record
pub const LEDGER_PREFIX: &str = "ledger:";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// `snapshot:{date}:{hour}` with a zero-padded hour so keys sort chronologically
pub fn snapshot_key(date: NaiveDate, hour: u32) -> String {
    format!("{}{}:{:02}", SNAPSHOT_PREFIX, date.format(DATE_FORMAT), hour)
}

/// Prefix matching every snapshot captured for `date`
pub fn snapshot_day_prefix(date: NaiveDate) -> String {
    format!("{}{}:", SNAPSHOT_PREFIX, date.format(DATE_FORMAT))
}

/// `ledger:{date}`
pub fn ledger_key(date: NaiveDate) -> String {
    format!("{}{}", LEDGER_PREFIX, date.format(DATE_FORMAT))
}

/// Extracts the date from a snapshot or ledger key
fn date_from_key(key: &str, prefix: &str) -> Option<NaiveDate> {
    let rest = key.strip_prefix(prefix)?;
    let date_part = rest.get(..10)?;
    NaiveDate::parse_from_str(date_part, DATE_FORMAT).ok()
}

/// Result of appending to a ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerAppend {
    /// Events actually added
    pub appended: usize,
    /// Ledger size after the append
    pub total: usize,
}

/// Reads and writes snapshots and ledgers. The only component that talks to the store.
#[derive(Clone)]
pub struct SnapshotRepository {
    store: Arc<dyn Store>,
}

impl SnapshotRepository {
    /// Creates a repository over `store`
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Loads the most recently captured snapshot for `date`, if any
    pub async fn load_latest_snapshot(
        &self,
        date: NaiveDate,
    ) -> Result<Option<Snapshot>, SnapshotError> {
        let entries = self.store.get_by_prefix(&snapshot_day_prefix(date)).await?;

        // Keys sort by hour, so the last one is the latest capture
        match entries.into_iter().max_by(|(a, _), (b, _)| a.cmp(b)) {
            Some((key, value)) => {
                debug!("Using snapshot {} for {}", key, date);
                Ok(Some(serde_json::from_value(value)?))
            }
            None => Ok(None),
        }
    }

    /// Union of site identifiers in the latest snapshot of each of the
    /// `days_back` days before `reference_date`. Days without a snapshot add nothing.
    pub async fn load_lookback_union(
        &self,
        reference_date: NaiveDate,
        days_back: u32,
    ) -> Result<HashSet<String>, SnapshotError> {
        let mut union = HashSet::new();

        for offset in 1..=days_back {
            let Some(day) = reference_date.checked_sub_days(Days::new(offset.into())) else {
                continue;
            };

            match self.load_latest_snapshot(day).await? {
                Some(snapshot) => {
                    debug!("Lookback {}: {} sites", day, snapshot.sites.len());
                    union.extend(snapshot.sites.into_keys());
                }
                None => debug!("Lookback {}: no snapshot", day),
            }
        }

        Ok(union)
    }

    /// Whether a snapshot exists for `(date, hour)`
    pub async fn has_snapshot(&self, date: NaiveDate, hour: u32) -> Result<bool, SnapshotError> {
        Ok(self.store.get(&snapshot_key(date, hour)).await?.is_some())
    }

    /// Upserts the snapshot under its `(date, hour)` key
    pub async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        let value = serde_json::to_value(snapshot)?;
        self.store
            .set(&snapshot_key(snapshot.date, snapshot.hour), value)
            .await
    }

    /// Stores the snapshot only when no snapshot exists for its `(date, hour)`.
    /// Returns false when another writer got there first.
    pub async fn insert_snapshot_if_absent(
        &self,
        snapshot: &Snapshot,
    ) -> Result<bool, SnapshotError> {
        let value = serde_json::to_value(snapshot)?;
        self.store
            .set_if_absent(&snapshot_key(snapshot.date, snapshot.hour), value)
            .await
    }

    /// Loads the ledger for `date`, or an empty one
    pub async fn load_ledger(&self, date: NaiveDate) -> Result<Ledger, SnapshotError> {
        match self.store.get(&ledger_key(date)).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Ledger::empty(date)),
        }
    }

    /// Appends events for sites not yet in the ledger for `date`
    pub async fn append_to_ledger(
        &self,
        date: NaiveDate,
        events: Vec<NewlyAvailableEvent>,
    ) -> Result<LedgerAppend, SnapshotError> {
        let mut ledger = self.load_ledger(date).await?;
        let before = ledger.events.len();

        for event in events {
            if ledger.contains_site(&event.site_id) {
                debug!("Site {} already in ledger for {}", event.site_id, date);
                continue;
            }
            ledger.events.push(event);
        }

        let appended = ledger.events.len() - before;
        if appended > 0 {
            let value = serde_json::to_value(&ledger)?;
            self.store.set(&ledger_key(date), value).await?;
        }

        Ok(LedgerAppend {
            appended,
            total: ledger.events.len(),
        })
    }

    /// Deletes every snapshot and ledger dated `retention_days` or more before
    /// `reference_date`. Older dates left behind by missed runs are swept too.
    pub async fn run_retention(
        &self,
        reference_date: NaiveDate,
        retention_days: u32,
    ) -> Result<RetentionReport, SnapshotError> {
        let cutoff = reference_date
            .checked_sub_days(Days::new(retention_days.into()))
            .ok_or_else(|| {
                SnapshotError::DataFormat(format!(
                    "Cannot compute retention cutoff for {}",
                    reference_date
                ))
            })?;

        let snapshots_deleted = self.delete_through(SNAPSHOT_PREFIX, cutoff).await?;
        let ledgers_deleted = self.delete_through(LEDGER_PREFIX, cutoff).await?;

        if snapshots_deleted > 0 || ledgers_deleted > 0 {
            info!(
                "Retention removed {} snapshots and {} ledgers dated on or before {}",
                snapshots_deleted, ledgers_deleted, cutoff
            );
        }

        Ok(RetentionReport {
            cutoff,
            snapshots_deleted,
            ledgers_deleted,
        })
    }

    async fn delete_through(&self, prefix: &str, cutoff: NaiveDate) -> Result<usize, SnapshotError> {
        let mut deleted = 0;

        for (key, _) in self.store.get_by_prefix(prefix).await? {
            match date_from_key(&key, prefix) {
                Some(date) if date <= cutoff => {
                    self.store.delete(&key).await?;
                    deleted += 1;
                }
                Some(_) => {}
                None => warn!("Skipping unrecognised key during retention: {}", key),
            }
        }

        Ok(deleted)
    }

    /// Events from the ledgers of `reference_date` and the `days - 1` days
    /// before it, most recently detected first
    pub async fn recent_events(
        &self,
        reference_date: NaiveDate,
        days: u32,
    ) -> Result<Vec<NewlyAvailableEvent>, SnapshotError> {
        let mut events = Vec::new();

        for offset in 0..days {
            let Some(day) = reference_date.checked_sub_days(Days::new(offset.into())) else {
                continue;
            };
            events.extend(self.load_ledger(day).await?.events);
        }

        events.sort_by(|a, b| b.became_available_at.cmp(&a.became_available_at));
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Datelike, TimeZone, Utc};

    use super::*;
    use crate::store::InMemoryStore;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
    }

    fn snapshot(date: NaiveDate, hour: u32, site_ids: &[&str]) -> Snapshot {
        let sites = site_ids
            .iter()
            .map(|id| {
                (
                    id.to_string(),
                    SiteObservation {
                        facility_id: "232450".to_string(),
                        facility_name: "Upper Pines Campground".to_string(),
                        site_id: id.to_string(),
                        site_name: format!("Site {}", id),
                        date,
                    },
                )
            })
            .collect::<BTreeMap<_, _>>();

        Snapshot {
            date,
            hour,
            sites,
            captured_at: Utc.with_ymd_and_hms(2025, 7, date.day0() + 1, hour, 0, 0).unwrap(),
        }
    }

    fn event(site_id: &str, date: NaiveDate, minute: u32) -> NewlyAvailableEvent {
        NewlyAvailableEvent {
            site_id: site_id.to_string(),
            site_name: format!("Site {}", site_id),
            facility_id: "232450".to_string(),
            facility_name: "Upper Pines Campground".to_string(),
            facility_state: Some("CA".to_string()),
            facility_city: None,
            date,
            reservation_url: format!("https://www.recreation.gov/camping/campsites/{}", site_id),
            became_available_at: Utc.with_ymd_and_hms(2025, 7, 10, 8, minute, 0).unwrap(),
        }
    }

    fn repository() -> (Arc<InMemoryStore>, SnapshotRepository) {
        let store = Arc::new(InMemoryStore::new());
        let repository = SnapshotRepository::new(store.clone());
        (store, repository)
    }

    #[test]
    fn test_key_scheme() {
        assert_eq!(snapshot_key(day(3), 8), "snapshot:2025-07-03:08");
        assert_eq!(snapshot_key(day(3), 20), "snapshot:2025-07-03:20");
        assert_eq!(snapshot_day_prefix(day(3)), "snapshot:2025-07-03:");
        assert_eq!(ledger_key(day(3)), "ledger:2025-07-03");
        assert_eq!(
            date_from_key("snapshot:2025-07-03:08", SNAPSHOT_PREFIX),
            Some(day(3))
        );
        assert_eq!(date_from_key("ledger:2025-07-03", LEDGER_PREFIX), Some(day(3)));
        assert_eq!(date_from_key("ledger:garbage", LEDGER_PREFIX), None);
    }

    #[tokio::test]
    async fn test_lookback_union_uses_latest_snapshot_per_day() {
        let (_, repo) = repository();
        repo.save_snapshot(&snapshot(day(9), 8, &["A", "X"])).await.unwrap();
        repo.save_snapshot(&snapshot(day(9), 20, &["A"])).await.unwrap();
        repo.save_snapshot(&snapshot(day(8), 12, &["B"])).await.unwrap();

        let union = repo.load_lookback_union(day(10), 4).await.unwrap();
        let expected: HashSet<String> = ["A", "B"].iter().map(|s| s.to_string()).collect();
        assert_eq!(union, expected);
    }

    #[tokio::test]
    async fn test_lookback_union_covers_exactly_the_window() {
        let (_, repo) = repository();
        repo.save_snapshot(&snapshot(day(9), 8, &["A", "B"])).await.unwrap();
        repo.save_snapshot(&snapshot(day(8), 8, &["A"])).await.unwrap();
        repo.save_snapshot(&snapshot(day(7), 8, &["A", "C"])).await.unwrap();
        repo.save_snapshot(&snapshot(day(6), 8, &["B"])).await.unwrap();
        // Outside the window on both sides
        repo.save_snapshot(&snapshot(day(5), 8, &["OLD"])).await.unwrap();
        repo.save_snapshot(&snapshot(day(10), 8, &["TODAY"])).await.unwrap();

        let union = repo.load_lookback_union(day(10), 4).await.unwrap();
        let expected: HashSet<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        assert_eq!(union, expected);
    }

    #[tokio::test]
    async fn test_has_snapshot_and_conditional_insert() {
        let (_, repo) = repository();
        let first = snapshot(day(10), 8, &["A"]);
        assert!(!repo.has_snapshot(day(10), 8).await.unwrap());

        assert!(repo.insert_snapshot_if_absent(&first).await.unwrap());
        assert!(repo.has_snapshot(day(10), 8).await.unwrap());
        assert!(!repo.has_snapshot(day(10), 12).await.unwrap());

        let second = snapshot(day(10), 8, &["B"]);
        assert!(!repo.insert_snapshot_if_absent(&second).await.unwrap());
        let stored = repo.load_latest_snapshot(day(10)).await.unwrap().unwrap();
        assert!(stored.sites.contains_key("A"));
    }

    #[tokio::test]
    async fn test_append_to_ledger_deduplicates_by_site() {
        let (_, repo) = repository();

        let first = repo
            .append_to_ledger(day(10), vec![event("A", day(10), 0), event("B", day(10), 1)])
            .await
            .unwrap();
        assert_eq!(first, LedgerAppend { appended: 2, total: 2 });

        let second = repo
            .append_to_ledger(
                day(10),
                vec![event("B", day(10), 30), event("C", day(10), 31), event("C", day(10), 32)],
            )
            .await
            .unwrap();
        assert_eq!(second, LedgerAppend { appended: 1, total: 3 });

        let ledger = repo.load_ledger(day(10)).await.unwrap();
        let ids: Vec<&str> = ledger.events.iter().map(|e| e.site_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        // The original detection time is kept
        assert_eq!(ledger.events[1].became_available_at.format("%M").to_string(), "01");
    }

    #[tokio::test]
    async fn test_append_nothing_does_not_write() {
        let (store, repo) = repository();
        let result = repo.append_to_ledger(day(10), Vec::new()).await.unwrap();
        assert_eq!(result, LedgerAppend { appended: 0, total: 0 });
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_retention_removes_boundary_and_older() {
        let (store, repo) = repository();
        for d in 1..=10 {
            repo.save_snapshot(&snapshot(day(d), 8, &["A"])).await.unwrap();
            repo.append_to_ledger(day(d), vec![event("A", day(d), 0)])
                .await
                .unwrap();
        }
        repo.save_snapshot(&snapshot(day(5), 20, &["A"])).await.unwrap();

        let report = repo.run_retention(day(10), 5).await.unwrap();
        assert_eq!(report.cutoff, day(5));
        assert_eq!(report.snapshots_deleted, 6);
        assert_eq!(report.ledgers_deleted, 5);

        for d in 1..=5 {
            assert!(repo.load_latest_snapshot(day(d)).await.unwrap().is_none());
            assert!(store.get(&ledger_key(day(d))).await.unwrap().is_none());
        }
        for d in 6..=10 {
            assert!(repo.load_latest_snapshot(day(d)).await.unwrap().is_some());
            assert!(store.get(&ledger_key(day(d))).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_retention_ignores_foreign_keys() {
        let (store, repo) = repository();
        store
            .set("snapshot:not-a-date", serde_json::json!({}))
            .await
            .unwrap();

        let report = repo.run_retention(day(10), 5).await.unwrap();
        assert_eq!(report.snapshots_deleted, 0);
        assert!(store.get("snapshot:not-a-date").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_recent_events_newest_first() {
        let (_, repo) = repository();
        repo.append_to_ledger(day(9), vec![event("A", day(9), 5)])
            .await
            .unwrap();
        repo.append_to_ledger(day(10), vec![event("B", day(10), 1), event("C", day(10), 9)])
            .await
            .unwrap();
        repo.append_to_ledger(day(1), vec![event("OLD", day(1), 59)])
            .await
            .unwrap();

        let events = repo.recent_events(day(10), 5).await.unwrap();
        let ids: Vec<&str> = events.iter().map(|e| e.site_id.as_str()).collect();
        assert_eq!(ids, vec!["C", "A", "B"]);
    }
}
