//! Feed ingestion: poll RSS, Atom and RDF sources, store new items with a
//! category, tags and a cached image.
//!
//! - [`feed`] - fetching, format detection and parsing
//! - [`ingest`] - per-source import of new items
//! - [`scheduler`] - the paced scan loop
//! - [`storage`] - SQLite-backed content and category stores
//! - [`cache`] - typed in-memory cache for category lookups
//! - [`config`] - TOML configuration

pub mod cache;
pub mod config;
pub mod feed;
pub mod ingest;
pub mod scheduler;
pub mod storage;
pub mod util;

pub use config::Config;
pub use scheduler::{ScanContext, ScanError, ScanScheduler, ScanSummary};
