use actix_web::{HttpRequest, HttpResponse, Result, web};
use availability_snapshot::{RunOutcome, RunSummary, SnapshotEngine, SnapshotError};
use serde::Serialize;

use crate::cron_auth::{CronSecret, TriggerQuery};

/// Body returned when a run completes
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRunResponse {
    /// Always `true`
    pub success: bool,
    /// Human-readable outcome
    pub message: String,
    /// Counters from the run
    #[serde(flatten)]
    pub summary: RunSummary,
}

/// Body returned when the current hour already has a snapshot
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSkippedResponse {
    /// Always `true`
    pub success: bool,
    /// Always `true`
    pub already_exists: bool,
    /// Human-readable outcome
    pub message: String,
    /// Observed date of the existing snapshot
    pub date: chrono::NaiveDate,
    /// Observed hour of the existing snapshot
    pub hour: u32,
}

/// Scheduler entry point: `GET /api/cron/snapshot`
pub async fn cron_snapshot(
    req: HttpRequest,
    query: web::Query<TriggerQuery>,
    secret: web::Data<CronSecret>,
    engine: web::Data<SnapshotEngine>,
) -> Result<HttpResponse, SnapshotError> {
    secret.authorize(&req, &query)?;
    log::info!("⏰ Cron snapshot triggered");
    run_snapshot(&engine).await
}

/// Admin "take snapshot now": `POST /api/take-snapshot`
pub async fn take_snapshot(
    req: HttpRequest,
    query: web::Query<TriggerQuery>,
    secret: web::Data<CronSecret>,
    engine: web::Data<SnapshotEngine>,
) -> Result<HttpResponse, SnapshotError> {
    secret.authorize(&req, &query)?;
    log::info!("📸 Manual snapshot triggered");
    run_snapshot(&engine).await
}

async fn run_snapshot(engine: &SnapshotEngine) -> Result<HttpResponse, SnapshotError> {
    match engine.run().await? {
        RunOutcome::Completed(summary) => {
            let message = format!(
                "Snapshot taken: {} sites available, {} newly available",
                summary.total_sites_available, summary.newly_available_count
            );
            log::info!("✅ {}", message);

            Ok(HttpResponse::Ok().json(SnapshotRunResponse {
                success: true,
                message,
                summary,
            }))
        }
        RunOutcome::Skipped { date, hour } => {
            log::info!("⏭️ Snapshot for {} hour {} already exists", date, hour);

            Ok(HttpResponse::Ok().json(SnapshotSkippedResponse {
                success: true,
                already_exists: true,
                message: format!("Snapshot already exists for {} hour {}", date, hour),
                date,
                hour,
            }))
        }
    }
}

/// Public feed of recently detected sites, newest first: `GET /api/newly-available`
pub async fn newly_available(
    engine: web::Data<SnapshotEngine>,
) -> Result<HttpResponse, SnapshotError> {
    let events = engine
        .repository()
        .recent_events(engine.today(), engine.config().retention_days)
        .await?;

    Ok(HttpResponse::Ok().json(events))
}

/// Health check endpoint for the snapshot service
pub async fn api_health(engine: web::Data<SnapshotEngine>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "service": "availability-snapshot",
        "status": "healthy",
        "trackedFacilities": engine.facilities().len(),
        "timestamp": chrono::Utc::now()
    })))
}
