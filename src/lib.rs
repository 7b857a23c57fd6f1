//! skilltrace - usage telemetry for skills
//!
//! - [`tracker`] wraps a unit of work and reports one event per invocation
//! - [`ingest`] validates events, hashes the caller identity and stores them
//! - [`store`] holds the SQLite event table and the analytics views
//! - [`server`] exposes ingestion and analytics over HTTP

pub mod config;
pub mod events;
pub mod hashing;
pub mod ingest;
pub mod server;
pub mod store;
pub mod tracker;
pub mod util;
