//! # Availability Snapshot
//!
//! This crate records which campsites are available on each run, compares the
//! result against the previous days, and keeps a per-day ledger of sites that
//! became available (typically after a cancellation).

/// Data model and error types
mod types;
pub use types::*;

/// Key-value store capability and the in-memory implementation
mod store;
pub use store::*;

/// Upstream availability capability
mod provider;
pub use provider::*;

/// Campgrounds tracked on every run
mod facilities;
pub use facilities::*;

/// Injected time source
mod clock;
pub use clock::*;

/// Key scheme, ledger appends and retention
mod repository;
pub use repository::*;

/// Newly-available detection
mod detector;
pub use detector::*;

/// Run orchestration
mod engine;
pub use engine::*;
