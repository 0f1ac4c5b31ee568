//! Ingestion pipeline: fetch every active source, persist new articles,
//! record per-source health.
//!
//! A run visits sources sequentially and isolates failures per source: a
//! feed that times out, returns an error status, or parses to nothing marks
//! only that source as failing. The single fatal condition is the store
//! itself becoming unavailable, which aborts the run.

mod scheduler;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::feed::{fetch_feed, parse_items, ParsedItem};
use crate::storage::{NewArticle, Source, SourceStatus, StorageError, Store};

pub use scheduler::{Scheduler, SchedulerState};

/// A single item that could not be persisted. Recorded and skipped; the rest
/// of the batch continues.
#[derive(Debug, Error)]
#[error("failed to persist {link}: {reason}")]
pub struct ItemPersistError {
    pub link: String,
    pub reason: String,
}

/// Fatal pipeline errors. Per-source failures never surface here; they are
/// folded into the run report instead.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("store unavailable: {0}")]
    Store(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

/// Outcome of one source within a run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceResult {
    pub source_name: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub articles_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of one full ingestion run, in configured source order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub results: Vec<SourceResult>,
    pub run_at: DateTime<Utc>,
}

/// What happened while persisting one source's parsed items.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    /// Articles actually inserted (duplicates excluded)
    pub new_articles: usize,
    pub item_errors: Vec<ItemPersistError>,
}

/// Persist a batch of parsed items for one source.
///
/// Items whose link is already stored are skipped without touching the
/// existing article. A storage error on one item is recorded and the batch
/// continues, so a single poison item cannot block the rest of the feed.
pub async fn ingest_source(
    store: &dyn Store,
    source: &Source,
    items: &[ParsedItem],
) -> IngestOutcome {
    let source_key = source.name.to_lowercase();
    let mut outcome = IngestOutcome::default();

    for item in items {
        // The parser already drops these, but direct callers may not
        if item.title.trim().is_empty() || item.link.trim().is_empty() {
            continue;
        }

        match store.article_by_link(&item.link).await {
            Ok(Some(_)) => {
                debug!(link = %item.link, "skipping known article");
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                outcome.item_errors.push(ItemPersistError {
                    link: item.link.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        }

        let description = if item.description.is_empty() {
            None
        } else {
            Some(item.description.clone())
        };
        let article = NewArticle {
            title: item.title.clone(),
            description: description.clone(),
            content: description,
            link: item.link.clone(),
            source: source_key.clone(),
            image_url: item.image_url.clone(),
            published_at: item.published_at,
        };

        match store.insert_article(&article).await {
            Ok(true) => outcome.new_articles += 1,
            // Lost an insert race; the existing article stands
            Ok(false) => {}
            Err(e) => outcome.item_errors.push(ItemPersistError {
                link: item.link.clone(),
                reason: e.to_string(),
            }),
        }
    }

    outcome
}

/// Drives full ingestion runs over every active source.
pub struct Coordinator {
    store: Arc<dyn Store>,
    client: reqwest::Client,
    fetch_timeout: Duration,
}

impl Coordinator {
    pub fn new(store: Arc<dyn Store>, client: reqwest::Client, fetch_timeout: Duration) -> Self {
        Self {
            store,
            client,
            fetch_timeout,
        }
    }

    /// Run one full ingestion pass.
    ///
    /// Sources are visited sequentially in stored order; inactive sources are
    /// skipped entirely (no fetch, no status change). Every attempted source
    /// gets its status updated, but `last_fetched` only advances on success.
    pub async fn run(&self) -> Result<RunReport, IngestError> {
        let run_at = Utc::now();
        let sources = self.store.list_sources().await?;
        let mut results = Vec::new();

        for source in sources.iter().filter(|s| s.active) {
            results.push(self.run_source(source).await?);
        }

        let ok = results
            .iter()
            .filter(|r| r.status == OutcomeStatus::Success)
            .count();
        info!(
            sources = results.len(),
            ok,
            failed = results.len() - ok,
            "ingestion run complete"
        );

        Ok(RunReport { results, run_at })
    }

    async fn run_source(&self, source: &Source) -> Result<SourceResult, IngestError> {
        let attempt_at = Utc::now();
        debug!(source = %source.name, url = %source.url, "fetching feed");

        let body = match fetch_feed(&self.client, &source.url, self.fetch_timeout).await {
            Ok(body) => body,
            Err(e) => {
                warn!(source = %source.name, error = %e, "feed fetch failed");
                self.store
                    .update_source_result(source.id, SourceStatus::Error, None)
                    .await?;
                return Ok(SourceResult {
                    source_name: source.name.clone(),
                    status: OutcomeStatus::Error,
                    articles_count: None,
                    error: Some(e.to_string()),
                });
            }
        };

        let items = parse_items(&body);
        let outcome = ingest_source(self.store.as_ref(), source, &items).await;
        for err in &outcome.item_errors {
            warn!(source = %source.name, error = %err, "article persist failed");
        }

        // The fetch succeeded, so the source is healthy even when the feed
        // parsed to zero items.
        self.store
            .update_source_result(source.id, SourceStatus::Online, Some(attempt_at))
            .await?;

        info!(
            source = %source.name,
            parsed = items.len(),
            new = outcome.new_articles,
            "source ingested"
        );

        Ok(SourceResult {
            source_name: source.name.clone(),
            status: OutcomeStatus::Success,
            articles_count: Some(outcome.new_articles),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn source(id: i64, name: &str) -> Source {
        Source {
            id,
            name: name.to_string(),
            url: format!("https://{}.example.com/rss", name.to_lowercase()),
            active: true,
            last_fetched: None,
            status: SourceStatus::Unknown,
        }
    }

    fn item(link: &str, title: &str) -> ParsedItem {
        ParsedItem {
            title: title.to_string(),
            description: "summary".to_string(),
            link: link.to_string(),
            image_url: None,
            published_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn ingest_counts_only_new_articles() {
        let store = MemoryStore::new();
        let src = source(1, "Matichon");
        let items = vec![
            item("https://example.com/1", "One"),
            item("https://example.com/2", "Two"),
        ];

        let first = ingest_source(&store, &src, &items).await;
        assert_eq!(first.new_articles, 2);
        assert!(first.item_errors.is_empty());

        let second = ingest_source(&store, &src, &items).await;
        assert_eq!(second.new_articles, 0);
    }

    #[tokio::test]
    async fn ingest_never_overwrites_existing_article() {
        let store = MemoryStore::new();
        let src = source(1, "Matichon");

        ingest_source(&store, &src, &[item("https://example.com/1", "Original")]).await;
        ingest_source(&store, &src, &[item("https://example.com/1", "Updated")]).await;

        let stored = store
            .article_by_link("https://example.com/1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.title, "Original");
    }

    #[tokio::test]
    async fn ingest_tags_articles_with_lowercased_source() {
        let store = MemoryStore::new();
        let src = source(1, "TNN");

        ingest_source(&store, &src, &[item("https://example.com/1", "One")]).await;

        let stored = store
            .article_by_link("https://example.com/1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.source, "tnn");
    }

    #[tokio::test]
    async fn ingest_skips_items_without_title_or_link() {
        let store = MemoryStore::new();
        let src = source(1, "Matichon");
        let mut untitled = item("https://example.com/untitled", "");
        untitled.title = " ".to_string();
        let mut unlinked = item("", "Unlinked");
        unlinked.link = String::new();

        let outcome = ingest_source(&store, &src, &[untitled, unlinked]).await;
        assert_eq!(outcome.new_articles, 0);
        assert!(outcome.item_errors.is_empty());
    }

    #[tokio::test]
    async fn ingest_maps_empty_description_to_none() {
        let store = MemoryStore::new();
        let src = source(1, "Matichon");
        let mut bare = item("https://example.com/bare", "Bare");
        bare.description = String::new();

        ingest_source(&store, &src, &[bare]).await;

        let stored = store
            .article_by_link("https://example.com/bare")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.description, None);
        assert_eq!(stored.content, None);
    }
}
