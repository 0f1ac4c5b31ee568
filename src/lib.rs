//! News feed ingestion pipeline.
//!
//! Fetches configured RSS sources on a schedule, extracts articles with a
//! tolerant parser, deduplicates them by link, and tracks per-source health
//! in either an in-memory or SQLite-backed store.

pub mod config;
pub mod feed;
pub mod ingest;
pub mod storage;
