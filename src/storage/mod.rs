//! Entity store for articles and sources.
//!
//! The ingestion pipeline talks to storage through the [`Store`] trait so the
//! same pipeline runs against either backend:
//!
//! - [`MemoryStore`] - in-process maps behind an async lock, used by tests
//!   and by deployments that don't need durability
//! - [`SqliteStore`] - durable SQLite database via sqlx
//!
//! Both backends enforce the unique-link invariant: `insert_article` is
//! insert-or-ignore keyed on the article link, so concurrent ingestors
//! racing on the same link resolve safely regardless of the pre-insert
//! existence check.

mod memory;
mod sqlite;
mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use types::{Article, NewArticle, Source, SourceSeed, SourceStatus, StorageError};

/// Narrow storage interface consumed by the ingestion pipeline.
#[async_trait]
pub trait Store: Send + Sync {
    /// Upsert configured sources by unique URL. Name and active flag follow
    /// the configuration; health state (`status`, `last_fetched`) of an
    /// already-known source is preserved.
    async fn sync_sources(&self, seeds: &[SourceSeed]) -> Result<(), StorageError>;

    /// All sources, active or not.
    async fn list_sources(&self) -> Result<Vec<Source>, StorageError>;

    /// Record the outcome of one ingestion attempt for a source.
    ///
    /// `status` is written on every outcome; `fetched_at` is written only
    /// when `Some` (i.e. on success). Both land in a single statement so a
    /// source's status/timestamp pair is never observed half-updated.
    async fn update_source_result(
        &self,
        source_id: i64,
        status: SourceStatus,
        fetched_at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError>;

    /// Look up an article by exact link equality.
    async fn article_by_link(&self, link: &str) -> Result<Option<Article>, StorageError>;

    /// Insert an article unless its link is already present. Returns whether
    /// a new row was actually inserted; an existing article is never
    /// overwritten.
    async fn insert_article(&self, article: &NewArticle) -> Result<bool, StorageError>;

    /// Articles ordered by published timestamp descending, optionally
    /// filtered to one source identifier.
    async fn list_articles(
        &self,
        limit: i64,
        offset: i64,
        source: Option<&str>,
    ) -> Result<Vec<Article>, StorageError>;
}
