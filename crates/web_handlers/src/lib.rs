//! # Web Handlers for the Availability Snapshot Service
//!
//! This crate provides the HTTP handlers that trigger snapshot runs and serve
//! the newly-available campsite feed.

/// Shared-secret check for trigger endpoints
mod cron_auth;
pub use cron_auth::*;

/// Snapshot trigger, newly-available feed and health handlers
mod snapshot_handlers;
pub use snapshot_handlers::*;
