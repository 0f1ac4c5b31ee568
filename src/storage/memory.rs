use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::types::{Article, NewArticle, Source, SourceSeed, SourceStatus, StorageError};
use super::Store;

/// In-process store backed by maps behind an async lock.
///
/// Articles are keyed by link, so the unique-link invariant holds by
/// construction: the existence check and the insert happen under one write
/// lock. Sources keep insertion order so ingestion runs visit them in the
/// order they were configured.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    next_article_id: i64,
    next_source_id: i64,
    /// Keyed by article link
    articles: HashMap<String, Article>,
    sources: Vec<Source>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn sync_sources(&self, seeds: &[SourceSeed]) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        for seed in seeds {
            if let Some(existing) = inner.sources.iter_mut().find(|s| s.url == seed.url) {
                existing.name = seed.name.clone();
                existing.active = seed.active;
                continue;
            }
            inner.next_source_id += 1;
            let id = inner.next_source_id;
            inner.sources.push(Source {
                id,
                name: seed.name.clone(),
                url: seed.url.clone(),
                active: seed.active,
                last_fetched: None,
                status: SourceStatus::Unknown,
            });
        }
        Ok(())
    }

    async fn list_sources(&self) -> Result<Vec<Source>, StorageError> {
        Ok(self.inner.read().await.sources.clone())
    }

    async fn update_source_result(
        &self,
        source_id: i64,
        status: SourceStatus,
        fetched_at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.write().await;
        if let Some(source) = inner.sources.iter_mut().find(|s| s.id == source_id) {
            source.status = status;
            if let Some(at) = fetched_at {
                source.last_fetched = Some(at);
            }
        }
        Ok(())
    }

    async fn article_by_link(&self, link: &str) -> Result<Option<Article>, StorageError> {
        Ok(self.inner.read().await.articles.get(link).cloned())
    }

    async fn insert_article(&self, article: &NewArticle) -> Result<bool, StorageError> {
        let mut inner = self.inner.write().await;
        if inner.articles.contains_key(&article.link) {
            return Ok(false);
        }
        inner.next_article_id += 1;
        let id = inner.next_article_id;
        inner.articles.insert(
            article.link.clone(),
            Article {
                id,
                title: article.title.clone(),
                description: article.description.clone(),
                content: article.content.clone(),
                link: article.link.clone(),
                source: article.source.clone(),
                image_url: article.image_url.clone(),
                published_at: article.published_at,
                created_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn list_articles(
        &self,
        limit: i64,
        offset: i64,
        source: Option<&str>,
    ) -> Result<Vec<Article>, StorageError> {
        let inner = self.inner.read().await;
        let mut articles: Vec<Article> = inner
            .articles
            .values()
            .filter(|a| source.is_none_or(|s| a.source == s))
            .cloned()
            .collect();
        articles.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(articles
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}
