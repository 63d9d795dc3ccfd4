//! # RecGov
//!
//! This crate provides a client for the Recreation.gov availability API, used
//! as the upstream source for campsite snapshots.

/// Month-availability client for Recreation.gov campgrounds.
mod client;
pub use client::*;
