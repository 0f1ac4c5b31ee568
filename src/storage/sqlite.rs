use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::{Article, NewArticle, Source, SourceSeed, SourceStatus, StorageError};
use super::Store;

/// Hard cap on rows returned by any article listing (OOM protection)
const MAX_ARTICLES: i64 = 1000;

/// Durable store backed by SQLite via sqlx.
///
/// Timestamps are stored as unix seconds. The `UNIQUE` constraint on
/// `articles.link` is the final arbiter of deduplication; `insert_article`
/// relies on `ON CONFLICT DO NOTHING` so concurrent writers racing on the
/// same link never error and never duplicate.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open a database connection and run migrations.
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // busy_timeout=5000: SQLite waits up to 5 seconds for locks to
        // release before returning SQLITE_BUSY. Set via pragma so every
        // connection in the pool inherits it.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(StorageError::Database)?
            .pragma("busy_timeout", "5000");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store
            .migrate()
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;
        Ok(store)
    }

    /// Run schema migrations atomically within a transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                url TEXT UNIQUE NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                last_fetched INTEGER,
                status TEXT NOT NULL DEFAULT 'unknown'
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT,
                content TEXT,
                link TEXT UNIQUE NOT NULL,
                source TEXT NOT NULL,
                image_url TEXT,
                published_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Covers the default listing: ORDER BY published_at DESC
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_published ON articles(published_at DESC)",
        )
        .execute(&mut *tx)
        .await?;

        // Covers the per-source listing: WHERE source = ? ORDER BY published_at DESC
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_source_published ON articles(source, published_at DESC)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(sqlx::FromRow)]
struct ArticleRow {
    id: i64,
    title: String,
    description: Option<String>,
    content: Option<String>,
    link: String,
    source: String,
    image_url: Option<String>,
    published_at: i64,
    created_at: i64,
}

impl ArticleRow {
    fn into_article(self) -> Article {
        Article {
            id: self.id,
            title: self.title,
            description: self.description,
            content: self.content,
            link: self.link,
            source: self.source,
            image_url: self.image_url,
            published_at: from_unix(self.published_at),
            created_at: from_unix(self.created_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct SourceRow {
    id: i64,
    name: String,
    url: String,
    active: bool,
    last_fetched: Option<i64>,
    status: String,
}

impl SourceRow {
    fn into_source(self) -> Source {
        Source {
            id: self.id,
            name: self.name,
            url: self.url,
            active: self.active,
            last_fetched: self.last_fetched.map(from_unix),
            status: SourceStatus::from_db(&self.status),
        }
    }
}

fn from_unix(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

// ============================================================================
// Store Implementation
// ============================================================================

#[async_trait]
impl Store for SqliteStore {
    async fn sync_sources(&self, seeds: &[SourceSeed]) -> Result<(), StorageError> {
        if seeds.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for seed in seeds {
            sqlx::query(
                r#"
                INSERT INTO sources (name, url, active)
                VALUES (?, ?, ?)
                ON CONFLICT(url) DO UPDATE SET
                    name = excluded.name,
                    active = excluded.active
            "#,
            )
            .bind(&seed.name)
            .bind(&seed.url)
            .bind(seed.active)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_sources(&self) -> Result<Vec<Source>, StorageError> {
        let rows: Vec<SourceRow> = sqlx::query_as(
            "SELECT id, name, url, active, last_fetched, status FROM sources ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SourceRow::into_source).collect())
    }

    async fn update_source_result(
        &self,
        source_id: i64,
        status: SourceStatus,
        fetched_at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError> {
        // One statement per outcome so status and timestamp are never
        // observed half-updated.
        match fetched_at {
            Some(at) => {
                sqlx::query("UPDATE sources SET status = ?, last_fetched = ? WHERE id = ?")
                    .bind(status.as_str())
                    .bind(at.timestamp())
                    .bind(source_id)
                    .execute(&self.pool)
                    .await?;
            }
            None => {
                sqlx::query("UPDATE sources SET status = ? WHERE id = ?")
                    .bind(status.as_str())
                    .bind(source_id)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn article_by_link(&self, link: &str) -> Result<Option<Article>, StorageError> {
        let row: Option<ArticleRow> = sqlx::query_as(
            r#"
            SELECT id, title, description, content, link, source, image_url,
                   published_at, created_at
            FROM articles
            WHERE link = ?
        "#,
        )
        .bind(link)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ArticleRow::into_article))
    }

    async fn insert_article(&self, article: &NewArticle) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO articles
                (title, description, content, link, source, image_url, published_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(link) DO NOTHING
        "#,
        )
        .bind(&article.title)
        .bind(&article.description)
        .bind(&article.content)
        .bind(&article.link)
        .bind(&article.source)
        .bind(&article.image_url)
        .bind(article.published_at.timestamp())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_articles(
        &self,
        limit: i64,
        offset: i64,
        source: Option<&str>,
    ) -> Result<Vec<Article>, StorageError> {
        let limit = limit.clamp(0, MAX_ARTICLES);
        let offset = offset.max(0);

        let rows: Vec<ArticleRow> = match source {
            Some(source) => {
                sqlx::query_as(
                    r#"
                    SELECT id, title, description, content, link, source, image_url,
                           published_at, created_at
                    FROM articles
                    WHERE source = ?
                    ORDER BY published_at DESC, created_at DESC
                    LIMIT ? OFFSET ?
                "#,
                )
                .bind(source)
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT id, title, description, content, link, source, image_url,
                           published_at, created_at
                    FROM articles
                    ORDER BY published_at DESC, created_at DESC
                    LIMIT ? OFFSET ?
                "#,
                )
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows.into_iter().map(ArticleRow::into_article).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> SqliteStore {
        SqliteStore::open(":memory:").await.unwrap()
    }

    fn test_seed(name: &str, url: &str) -> SourceSeed {
        SourceSeed {
            name: name.to_string(),
            url: url.to_string(),
            active: true,
        }
    }

    fn test_article(link: &str, published: i64) -> NewArticle {
        NewArticle {
            title: "Test".to_string(),
            description: Some("summary".to_string()),
            content: Some("summary".to_string()),
            link: link.to_string(),
            source: "matichon".to_string(),
            image_url: None,
            published_at: DateTime::from_timestamp(published, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let store = test_db().await;
        store.migrate().await.unwrap();
        store.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn sync_sources_upserts_by_url() {
        let store = test_db().await;
        store
            .sync_sources(&[test_seed("Old Name", "https://example.com/rss")])
            .await
            .unwrap();
        store
            .sync_sources(&[test_seed("New Name", "https://example.com/rss")])
            .await
            .unwrap();

        let sources = store.list_sources().await.unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name, "New Name");
        assert_eq!(sources[0].status, SourceStatus::Unknown);
    }

    #[tokio::test]
    async fn sync_sources_preserves_status_and_timestamp() {
        let store = test_db().await;
        store
            .sync_sources(&[test_seed("TNN", "https://tnn.example.com/rss")])
            .await
            .unwrap();
        let id = store.list_sources().await.unwrap()[0].id;

        let fetched = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        store
            .update_source_result(id, SourceStatus::Online, Some(fetched))
            .await
            .unwrap();

        store
            .sync_sources(&[test_seed("TNN", "https://tnn.example.com/rss")])
            .await
            .unwrap();

        let source = &store.list_sources().await.unwrap()[0];
        assert_eq!(source.status, SourceStatus::Online);
        assert_eq!(source.last_fetched, Some(fetched));
    }

    #[tokio::test]
    async fn unique_link_constraint_is_the_backstop() {
        let store = test_db().await;
        assert!(store
            .insert_article(&test_article("https://example.com/1", 100))
            .await
            .unwrap());
        // Duplicate link: no error, no second row, no overwrite
        assert!(!store
            .insert_article(&test_article("https://example.com/1", 200))
            .await
            .unwrap());

        let articles = store.list_articles(10, 0, None).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].published_at.timestamp(), 100);
    }

    #[tokio::test]
    async fn article_by_link_round_trip() {
        let store = test_db().await;
        store
            .insert_article(&test_article("https://example.com/found", 100))
            .await
            .unwrap();

        let found = store
            .article_by_link("https://example.com/found")
            .await
            .unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().source, "matichon");

        let missing = store
            .article_by_link("https://example.com/missing")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn list_articles_ordering_filter_and_pagination() {
        let store = test_db().await;
        for (i, ts) in [(1, 300), (2, 100), (3, 200)] {
            store
                .insert_article(&test_article(&format!("https://example.com/{}", i), ts))
                .await
                .unwrap();
        }
        let mut other = test_article("https://other.example.com/x", 999);
        other.source = "tnn".to_string();
        store.insert_article(&other).await.unwrap();

        let all = store.list_articles(10, 0, None).await.unwrap();
        let timestamps: Vec<i64> = all.iter().map(|a| a.published_at.timestamp()).collect();
        assert_eq!(timestamps, vec![999, 300, 200, 100]);

        let filtered = store.list_articles(10, 0, Some("matichon")).await.unwrap();
        assert_eq!(filtered.len(), 3);

        let page = store.list_articles(2, 1, Some("matichon")).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].published_at.timestamp(), 200);
    }

    #[tokio::test]
    async fn error_status_leaves_last_fetched_unchanged() {
        let store = test_db().await;
        store
            .sync_sources(&[test_seed("Matichon", "https://matichon.example.com/rss")])
            .await
            .unwrap();
        let id = store.list_sources().await.unwrap()[0].id;

        let fetched = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        store
            .update_source_result(id, SourceStatus::Online, Some(fetched))
            .await
            .unwrap();
        store
            .update_source_result(id, SourceStatus::Error, None)
            .await
            .unwrap();

        let source = &store.list_sources().await.unwrap()[0];
        assert_eq!(source.status, SourceStatus::Error);
        assert_eq!(source.last_fetched, Some(fetched));
    }
}
