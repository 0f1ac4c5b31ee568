use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Storage backend errors.
///
/// Any of these surfaced from `list_sources` is fatal for the ingestion run
/// that observed it; everywhere else they are absorbed into per-item or
/// per-source report entries.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The store cannot be reached at all (fatal for the current run)
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Migration failed
    #[error("database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

// ============================================================================
// Data Structures
// ============================================================================

/// Per-source health state.
///
/// `Unknown` exists only before the first ingestion attempt; every completed
/// attempt leaves the source `Online` or `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Unknown,
    Online,
    Error,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Unknown => "unknown",
            SourceStatus::Online => "online",
            SourceStatus::Error => "error",
        }
    }

    /// Decode a persisted status string. Unrecognized values fall back to
    /// `Unknown` rather than failing the row.
    pub fn from_db(s: &str) -> Self {
        match s {
            "online" => SourceStatus::Online,
            "error" => SourceStatus::Error,
            _ => SourceStatus::Unknown,
        }
    }
}

/// A stored article. Identity is the canonical `link` URL; at most one
/// article exists per distinct link.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    /// Mirrors `description` for RSS items at ingest time
    pub content: Option<String>,
    pub link: String,
    /// Lower-cased source name
    pub source: String,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
    /// Set once at insert, never updated
    pub created_at: DateTime<Utc>,
}

/// Candidate article built by the ingestor, before the store assigns an id.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub title: String,
    pub description: Option<String>,
    pub content: Option<String>,
    pub link: String,
    pub source: String,
    pub image_url: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// A configured feed source with its health bookkeeping.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub active: bool,
    /// Timestamp of the last successful fetch; `None` until the first one
    pub last_fetched: Option<DateTime<Utc>>,
    pub status: SourceStatus,
}

/// Source definition from configuration, synced into the store at startup.
#[derive(Debug, Clone)]
pub struct SourceSeed {
    pub name: String,
    pub url: String,
    pub active: bool,
}
