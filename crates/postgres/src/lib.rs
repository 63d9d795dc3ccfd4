//! # Postgres
//!
//! This crate provides PostgreSQL persistence for the availability snapshot
//! engine: the connection pool and a `Store` backed by a single key-value table.

/// Connection pool and schema setup.
pub mod database;

/// `Store` implementation over the `kv_store` table.
mod kv_store;
pub use kv_store::*;
