use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Timelike, Utc};
use futures_util::stream::{self, StreamExt};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::detector::ChangeDetector;
use crate::facilities::TrackedFacility;
use crate::provider::AvailabilityProvider;
use crate::repository::SnapshotRepository;
use crate::store::Store;
use crate::types::*;

/// Tunables for a snapshot run
#[derive(Debug, Clone)]
pub struct SnapshotEngineConfig {
    /// Prior days whose latest snapshot forms the lookback union (default: 4)
    pub lookback_days: u32,

    /// Age in days at which snapshots and ledgers are deleted (default: 5)
    pub retention_days: u32,

    /// Overall deadline for fetching every facility (default: 4 minutes)
    pub run_deadline: Duration,

    /// Timeout for a single facility fetch (default: 30 seconds)
    pub fetch_timeout: Duration,

    /// How many facilities are fetched at once (default: 4)
    pub max_concurrent_fetches: usize,

    /// Offset used to derive the observed date and hour (default: UTC-8)
    pub utc_offset: FixedOffset,
}

impl Default for SnapshotEngineConfig {
    fn default() -> Self {
        Self {
            lookback_days: 4,
            retention_days: 5,
            run_deadline: Duration::from_secs(4 * 60),
            fetch_timeout: Duration::from_secs(30),
            max_concurrent_fetches: 4,
            utc_offset: FixedOffset::west_opt(8 * 3600).unwrap_or_else(|| Utc.fix()),
        }
    }
}

/// Aggregate of every facility fetch in a run
struct FetchOutcome {
    sites: BTreeMap<String, SiteObservation>,
    scanned: usize,
    failed: usize,
}

/// Runs one snapshot: fetch, diff against the lookback window, persist, prune
pub struct SnapshotEngine {
    repository: SnapshotRepository,
    provider: Arc<dyn AvailabilityProvider>,
    detector: ChangeDetector,
    facilities: Vec<TrackedFacility>,
    clock: Arc<dyn Clock>,
    config: SnapshotEngineConfig,
}

impl SnapshotEngine {
    /// Creates an engine tracking `facilities`
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn AvailabilityProvider>,
        facilities: Vec<TrackedFacility>,
        clock: Arc<dyn Clock>,
        config: Option<SnapshotEngineConfig>,
    ) -> Self {
        Self {
            repository: SnapshotRepository::new(store),
            provider,
            detector: ChangeDetector::new(&facilities),
            facilities,
            clock,
            config: config.unwrap_or_default(),
        }
    }

    /// The repository the engine writes through
    pub fn repository(&self) -> &SnapshotRepository {
        &self.repository
    }

    /// Active configuration
    pub fn config(&self) -> &SnapshotEngineConfig {
        &self.config
    }

    /// Facilities fetched on every run
    pub fn facilities(&self) -> &[TrackedFacility] {
        &self.facilities
    }

    /// Calendar date in the engine's wall-clock offset
    pub fn today(&self) -> NaiveDate {
        self.observed_at(self.clock.now()).0
    }

    fn observed_at(&self, now: DateTime<Utc>) -> (NaiveDate, u32) {
        let local = now.with_timezone(&self.config.utc_offset);
        (local.date_naive(), local.hour())
    }

    /// Executes one run.
    ///
    /// Returns [`RunOutcome::Skipped`] when a snapshot already exists for the
    /// current hour. Nothing is written if credentials are missing, if the
    /// deadline passes while fetching, or if every facility fetch fails.
    pub async fn run(&self) -> Result<RunOutcome, SnapshotError> {
        let run_id = Uuid::new_v4();

        if let Err(e) = self.provider.check_credentials() {
            error!("Snapshot run {} aborted: {}", run_id, e);
            return Err(e);
        }

        let now = self.clock.now();
        let (date, hour) = self.observed_at(now);
        info!("Snapshot run {} started for {} hour {}", run_id, date, hour);

        if self.repository.has_snapshot(date, hour).await? {
            info!("Snapshot for {} hour {} already exists, skipping", date, hour);
            return Ok(RunOutcome::Skipped { date, hour });
        }

        let fetched = timeout(self.config.run_deadline, self.fetch_all(date))
            .await
            .map_err(|_| {
                error!(
                    "Snapshot run {} exceeded its deadline while fetching, nothing recorded",
                    run_id
                );
                SnapshotError::DeadlineExceeded(self.config.run_deadline.as_secs())
            })?;

        if fetched.scanned == 0 && fetched.failed > 0 {
            error!(
                "Snapshot run {}: all {} facility fetches failed, nothing recorded",
                run_id, fetched.failed
            );
            return Err(SnapshotError::ApiError(format!(
                "All {} facility fetches failed",
                fetched.failed
            )));
        }

        let snapshot = Snapshot {
            date,
            hour,
            sites: fetched.sites,
            captured_at: now,
        };

        let history = self
            .repository
            .load_lookback_union(date, self.config.lookback_days)
            .await?;
        let cold_start = history.is_empty();
        if cold_start {
            warn!(
                "No snapshots in the previous {} days: all {} available sites will be reported as newly available",
                self.config.lookback_days,
                snapshot.site_count()
            );
        }

        let events = self.detector.detect(&snapshot.sites, &history, now);
        debug!("Detected {} candidate events", events.len());

        if !self.repository.insert_snapshot_if_absent(&snapshot).await? {
            warn!(
                "Snapshot for {} hour {} was written by another run, skipping",
                date, hour
            );
            return Ok(RunOutcome::Skipped { date, hour });
        }

        let ledger = self.repository.append_to_ledger(date, events).await?;

        let retention = self
            .repository
            .run_retention(date, self.config.retention_days)
            .await?;

        let summary = RunSummary {
            run_id,
            date,
            hour,
            total_sites_available: snapshot.site_count(),
            newly_available_count: ledger.appended,
            total_newly_available_today: ledger.total,
            facilities_scanned: fetched.scanned,
            facilities_failed: fetched.failed,
            cold_start,
            retention,
        };

        info!(
            "Snapshot run {} done: {} sites available, {} newly available ({} today), {} facilities failed",
            run_id,
            summary.total_sites_available,
            summary.newly_available_count,
            summary.total_newly_available_today,
            summary.facilities_failed
        );

        Ok(RunOutcome::Completed(summary))
    }

    /// Fetches every tracked facility with bounded concurrency
    async fn fetch_all(&self, date: NaiveDate) -> FetchOutcome {
        let month = NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date);

        let results: Vec<_> = stream::iter(self.facilities.iter())
            .map(|facility| async move {
                let result = self.fetch_facility(facility, month, date).await;
                (facility, result)
            })
            .buffer_unordered(self.config.max_concurrent_fetches.max(1))
            .collect()
            .await;

        let mut outcome = FetchOutcome {
            sites: BTreeMap::new(),
            scanned: 0,
            failed: 0,
        };

        for (facility, result) in results {
            match result {
                Ok(observations) => {
                    debug!(
                        "Facility {} has {} available sites on {}",
                        facility.id,
                        observations.len(),
                        date
                    );
                    outcome.scanned += 1;
                    for observation in observations {
                        outcome.sites.insert(observation.site_id.clone(), observation);
                    }
                }
                Err(e) => {
                    warn!("Skipping facility {} ({}): {}", facility.id, facility.name, e);
                    outcome.failed += 1;
                }
            }
        }

        outcome
    }

    async fn fetch_facility(
        &self,
        facility: &TrackedFacility,
        month: NaiveDate,
        date: NaiveDate,
    ) -> Result<Vec<SiteObservation>, SnapshotError> {
        let availability = timeout(
            self.config.fetch_timeout,
            self.provider.fetch_month(&facility.id, month),
        )
        .await
        .map_err(|_| SnapshotError::FetchTimeout(facility.id.clone()))??;

        Ok(availability
            .into_iter()
            .filter(|(_, calendar)| calendar.is_available_on(date))
            .map(|(site_id, calendar)| SiteObservation {
                facility_id: facility.id.clone(),
                facility_name: facility.name.clone(),
                site_id,
                site_name: calendar.site_name,
                date,
            })
            .collect())
    }
}
