//! Main entry point for the availability snapshot server.
//! This crate wires the store, provider and engine together and serves the REST API.

use std::sync::Arc;

use actix_web::{App, HttpResponse, HttpServer, middleware::Logger, web};
use anyhow::Context;
use availability_snapshot::{InMemoryStore, SnapshotEngine, Store, SystemClock};
use postgres::PgStore;
use postgres::database::*;
use rec_gov::RecGovClient;
use web_handlers::*;

/// Environment-driven server settings
mod config;
use config::ServerConfig;

async fn create_store(database_url: Option<&str>) -> anyhow::Result<Arc<dyn Store>> {
    let Some(database_url) = database_url else {
        log::warn!("⚠️ DATABASE_URL not set, snapshots are kept in memory only");
        return Ok(Arc::new(InMemoryStore::new()));
    };

    let pool = create_connection_pool(database_url)
        .await
        .context("Failed to create database pool")?;
    log::info!("🗃️ Database pool created successfully");

    if let Err(e) = test_connection(&pool).await {
        log::error!("❌ Database connection test failed: {}", e);
    }
    ensure_schema(&pool)
        .await
        .context("Failed to create kv_store table")?;

    Ok(Arc::new(PgStore::new(pool)))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    log::info!("🚀 Starting availability snapshot server...");

    let config = ServerConfig::from_env()?;

    let store = create_store(config.database_url.as_deref()).await?;

    let client = RecGovClient::new(config.rec_gov_api_key.clone())
        .context("Failed to create Recreation.gov client")?;
    if config.rec_gov_api_key.is_none() {
        log::warn!("🔑 RECREATION_GOV_API_KEY not set, snapshot runs will fail until it is");
    }

    log::info!(
        "🏕️ Tracking {} facilities, UTC offset {}",
        config.facilities.len(),
        config.engine.utc_offset
    );

    let engine = web::Data::new(SnapshotEngine::new(
        store,
        Arc::new(client),
        config.facilities.clone(),
        Arc::new(SystemClock),
        Some(config.engine.clone()),
    ));
    let cron_secret = web::Data::new(CronSecret::new(config.cron_secret.clone()));

    log::info!("🌐 Server will be available at: http://{}", config.bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(engine.clone())
            .app_data(cron_secret.clone())
            .wrap(Logger::default())
            .service(
                web::scope("/api")
                    .route("/health", web::get().to(api_health))
                    .route("/newly-available", web::get().to(newly_available))
                    // Secret-protected triggers
                    .route("/cron/snapshot", web::get().to(cron_snapshot))
                    .route("/take-snapshot", web::post().to(take_snapshot)),
            )
            .route(
                "/health",
                web::get().to(|| async { HttpResponse::Ok().body("OK") }),
            )
    })
    .bind(&config.bind_addr)
    .with_context(|| format!("Failed to bind {}", config.bind_addr))?
    .run()
    .await?;

    Ok(())
}
