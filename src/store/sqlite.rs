//! SQLite-backed [`ScholarStore`].
//!
//! # Schema
//!
//! ```text
//! authors          (id, name UNIQUE)
//! articles         (id, external_id, title, summary NULL, published_at)
//!                  UNIQUE (external_id, title, summary IS NULL, coalesce(summary, ''), published_at)
//! article_authors  (article_id, author_id) PRIMARY KEY (article_id, author_id)
//! ```
//!
//! `published_at` is stored as microseconds since the Unix epoch so ordering
//! and equality are plain integer comparisons. The natural-key index treats a
//! NULL summary and an empty summary as different values.
//!
//! Get-or-create is `INSERT .. ON CONFLICT DO NOTHING` followed by a keyed
//! `SELECT`; the unique constraints make it safe across concurrent writers.

use crate::errors::PersistenceError;
use crate::models::{
    Article, ArticleDetail, ArticleHeadline, ArticleKey, Author, AuthorDetail, AuthorSummary,
    Page, PageRequest,
};
use crate::store::ScholarStore;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Debug, FromRow)]
struct ArticleRow {
    id: i64,
    external_id: String,
    title: String,
    summary: Option<String>,
    published_at: i64,
}

impl TryFrom<ArticleRow> for Article {
    type Error = PersistenceError;

    fn try_from(row: ArticleRow) -> Result<Self, Self::Error> {
        Ok(Article {
            id: row.id,
            external_id: row.external_id,
            title: row.title,
            summary: row.summary,
            published_at: from_micros(row.published_at)?,
        })
    }
}

fn from_micros(value: i64) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::from_timestamp_micros(value).ok_or(PersistenceError::InvalidTimestamp(value))
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

const ARTICLE_COLUMNS: &str = "id, external_id, title, summary, published_at";

#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open an existing database and apply the schema.
    ///
    /// # Arguments
    ///
    /// * `url` - A SQLite connection URL such as `sqlite://scholar.db`
    ///
    /// # Returns
    ///
    /// The connected store, or a [`PersistenceError`] if the URL is invalid or
    /// the database file does not exist.
    pub async fn connect(url: &str) -> Result<Self, PersistenceError> {
        Self::open(url, false).await
    }

    /// Open the database at `url`, creating the file if it does not exist yet.
    pub async fn connect_or_create(url: &str) -> Result<Self, PersistenceError> {
        Self::open(url, true).await
    }

    #[instrument(level = "info", skip_all, fields(%url, create))]
    async fn open(url: &str, create: bool) -> Result<Self, PersistenceError> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(create)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30));
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        info!("Database ready");
        Ok(store)
    }

    /// Private in-memory database on a single pooled connection.
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, PersistenceError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    #[cfg(test)]
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS authors (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY,
                external_id TEXT NOT NULL,
                title TEXT NOT NULL,
                summary TEXT,
                published_at INTEGER NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_articles_natural_key ON articles (
                external_id, title, summary IS NULL, coalesce(summary, ''), published_at
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_published ON articles(published_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS article_authors (
                article_id INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
                author_id INTEGER NOT NULL REFERENCES authors(id) ON DELETE CASCADE,
                PRIMARY KEY (article_id, author_id)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_article_authors_author ON article_authors(author_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn count_articles(&self) -> Result<usize, PersistenceError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    pub async fn count_authors(&self) -> Result<usize, PersistenceError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM authors")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    /// Current author set of an article, ordered by name.
    pub async fn article_authors(&self, article_id: i64) -> Result<Vec<Author>, PersistenceError> {
        let authors = sqlx::query_as::<_, Author>(
            r#"
            SELECT au.id, au.name
            FROM authors au
            JOIN article_authors aa ON aa.author_id = au.id
            WHERE aa.article_id = ?
            ORDER BY au.name
        "#,
        )
        .bind(article_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(authors)
    }

    /// Articles published on or after `cutoff`, newest first.
    #[instrument(level = "debug", skip(self))]
    pub async fn newest_articles(
        &self,
        cutoff: DateTime<Utc>,
        request: PageRequest,
    ) -> Result<Page<Article>, PersistenceError> {
        let since = cutoff.timestamp_micros();
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE published_at >= ?")
                .bind(since)
                .fetch_one(&self.pool)
                .await?;
        let total = total as usize;

        let rows = sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE published_at >= ? \
             ORDER BY published_at DESC, id DESC LIMIT ? OFFSET ?"
        ))
        .bind(since)
        .bind(to_i64(request.per_page))
        .bind(to_i64(request.offset(total)))
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(Article::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(request, total, items))
    }

    /// Every author with the number of their articles published on or after
    /// `cutoff` and their latest publish time overall. Most active first.
    #[instrument(level = "debug", skip(self))]
    pub async fn prolific_authors(
        &self,
        cutoff: DateTime<Utc>,
        request: PageRequest,
    ) -> Result<Page<AuthorSummary>, PersistenceError> {
        let total = self.count_authors().await?;

        let rows: Vec<(i64, String, i64, Option<i64>)> = sqlx::query_as(
            r#"
            SELECT
                au.id,
                au.name,
                COUNT(CASE WHEN ar.published_at >= ? THEN 1 END) AS article_count,
                MAX(ar.published_at) AS last_published
            FROM authors au
            LEFT JOIN article_authors aa ON aa.author_id = au.id
            LEFT JOIN articles ar ON ar.id = aa.article_id
            GROUP BY au.id, au.name
            ORDER BY article_count DESC, last_published DESC, au.id
            LIMIT ? OFFSET ?
        "#,
        )
        .bind(cutoff.timestamp_micros())
        .bind(to_i64(request.per_page))
        .bind(to_i64(request.offset(total)))
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(
                |(id, name, article_count, last_published)| -> Result<_, PersistenceError> {
                    Ok(AuthorSummary {
                        id,
                        name,
                        article_count,
                        last_published: last_published.map(from_micros).transpose()?,
                    })
                },
            )
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(request, total, items))
    }

    pub async fn article_detail(&self, id: i64) -> Result<Option<ArticleDetail>, PersistenceError> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let article = Article::try_from(row)?;
        let authors = self.article_authors(article.id).await?;
        Ok(Some(ArticleDetail { article, authors }))
    }

    /// An author with the headlines of their articles published on or after
    /// `cutoff`, newest first.
    pub async fn author_detail(
        &self,
        id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<AuthorDetail>, PersistenceError> {
        let author = sqlx::query_as::<_, Author>("SELECT id, name FROM authors WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(author) = author else {
            return Ok(None);
        };

        let articles = sqlx::query_as::<_, ArticleHeadline>(
            r#"
            SELECT ar.id, ar.title
            FROM articles ar
            JOIN article_authors aa ON aa.article_id = ar.id
            WHERE aa.author_id = ? AND ar.published_at >= ?
            ORDER BY ar.published_at DESC, ar.id DESC
        "#,
        )
        .bind(author.id)
        .bind(cutoff.timestamp_micros())
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(AuthorDetail {
            name: author.name,
            articles,
        }))
    }
}

impl ScholarStore for SqliteStore {
    async fn get_or_create_author(&self, name: &str) -> Result<(Author, bool), PersistenceError> {
        let inserted = sqlx::query("INSERT INTO authors (name) VALUES (?) ON CONFLICT DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await?
            .rows_affected();

        let author = sqlx::query_as::<_, Author>("SELECT id, name FROM authors WHERE name = ?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok((author, inserted == 1))
    }

    async fn get_or_create_article(
        &self,
        key: &ArticleKey,
    ) -> Result<(Article, bool), PersistenceError> {
        let published_at = key.published_at.timestamp_micros();
        let inserted = sqlx::query(
            r#"
            INSERT INTO articles (external_id, title, summary, published_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT DO NOTHING
        "#,
        )
        .bind(&key.external_id)
        .bind(&key.title)
        .bind(&key.summary)
        .bind(published_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let row = sqlx::query_as::<_, ArticleRow>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles \
             WHERE external_id = ? AND title = ? AND summary IS ? AND published_at = ?"
        ))
        .bind(&key.external_id)
        .bind(&key.title)
        .bind(&key.summary)
        .bind(published_at)
        .fetch_one(&self.pool)
        .await?;
        Ok((Article::try_from(row)?, inserted == 1))
    }

    async fn set_article_authors(
        &self,
        article_id: i64,
        author_ids: &[i64],
    ) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM article_authors WHERE article_id = ?")
            .bind(article_id)
            .execute(&mut *tx)
            .await?;
        for author_id in author_ids {
            sqlx::query(
                "INSERT INTO article_authors (article_id, author_id) VALUES (?, ?) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(article_id)
            .bind(author_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn scratch_db_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("scholar_feed_{name}_{}.db", std::process::id()))
    }

    fn remove_db_files(path: &std::path::Path) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }

    #[tokio::test]
    async fn test_connect_does_not_create_missing_database() {
        let path = scratch_db_path("missing");
        remove_db_files(&path);
        let url = format!("sqlite://{}", path.display());

        let result = SqliteStore::connect(&url).await;
        assert!(matches!(result, Err(PersistenceError::Database(_))));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_connect_or_create_then_reopen() {
        let path = scratch_db_path("created");
        remove_db_files(&path);
        let url = format!("sqlite://{}", path.display());

        let store = SqliteStore::connect_or_create(&url).await.unwrap();
        store.get_or_create_author("A. Smith").await.unwrap();
        store.close().await;
        assert!(path.exists());

        let reopened = SqliteStore::connect(&url).await.unwrap();
        assert_eq!(reopened.count_authors().await.unwrap(), 1);
        reopened.close().await;
        remove_db_files(&path);
    }

    fn key(id: &str, published_at: DateTime<Utc>) -> ArticleKey {
        ArticleKey {
            external_id: id.to_string(),
            title: format!("Title of {id}"),
            summary: Some("A summary.".to_string()),
            published_at,
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn t(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, day, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_author_is_idempotent() {
        let store = SqliteStore::in_memory().await.unwrap();
        let (first, created) = store.get_or_create_author("A. Smith").await.unwrap();
        assert!(created);
        let (again, created) = store.get_or_create_author("A. Smith").await.unwrap();
        assert!(!created);
        assert_eq!(first, again);
        assert_eq!(store.count_authors().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_author_names_are_case_sensitive() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.get_or_create_author("a. smith").await.unwrap();
        let (_, created) = store.get_or_create_author("A. Smith").await.unwrap();
        assert!(created);
        assert_eq!(store.count_authors().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_article_natural_key_includes_every_field() {
        let store = SqliteStore::in_memory().await.unwrap();
        let base = key("http://arxiv.org/abs/1", t(1));

        let (a, created) = store.get_or_create_article(&base).await.unwrap();
        assert!(created);
        let (b, created) = store.get_or_create_article(&base).await.unwrap();
        assert!(!created);
        assert_eq!(a, b);
        assert_eq!(b.published_at, t(1));

        let edited = ArticleKey {
            summary: Some("Edited upstream.".to_string()),
            ..base.clone()
        };
        let (c, created) = store.get_or_create_article(&edited).await.unwrap();
        assert!(created);
        assert_ne!(a.id, c.id);
        assert_eq!(store.count_articles().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_null_and_empty_summary_are_distinct_keys() {
        let store = SqliteStore::in_memory().await.unwrap();
        let without = ArticleKey {
            summary: None,
            ..key("x", t(2))
        };
        let empty = ArticleKey {
            summary: Some(String::new()),
            ..key("x", t(2))
        };

        let (a, _) = store.get_or_create_article(&without).await.unwrap();
        let (again, created) = store.get_or_create_article(&without).await.unwrap();
        assert!(!created);
        assert_eq!(a.id, again.id);
        assert_eq!(a.summary, None);

        let (b, created) = store.get_or_create_article(&empty).await.unwrap();
        assert!(created);
        assert_eq!(b.summary.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn test_upsert_article_replaces_author_set() {
        let store = SqliteStore::in_memory().await.unwrap();
        let k = key("x", t(3));

        let first = store
            .upsert_article(&k, &names(&["A. Smith", "B. Lee"]))
            .await
            .unwrap();
        assert!(first.article_created);
        assert_eq!(first.authors_created, 2);

        let second = store
            .upsert_article(&k, &names(&["C. Wu"]))
            .await
            .unwrap();
        assert!(!second.article_created);
        assert_eq!(second.article.id, first.article.id);

        let authors = store.article_authors(first.article.id).await.unwrap();
        let current: Vec<_> = authors.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(current, vec!["C. Wu"]);
        // Previously linked authors stay in the table.
        assert_eq!(store.count_authors().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_upsert_article_collapses_duplicate_names() {
        let store = SqliteStore::in_memory().await.unwrap();
        let result = store
            .upsert_article(&key("x", t(4)), &names(&["A. Smith", "A. Smith"]))
            .await
            .unwrap();
        assert_eq!(result.authors.len(), 1);
        assert_eq!(result.authors_created, 1);
        assert_eq!(store.article_authors(result.article.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_author_is_reused() {
        let store = SqliteStore::in_memory().await.unwrap();
        let (smith, _) = store.get_or_create_author("A. Smith").await.unwrap();

        let result = store
            .upsert_article(&key("x", t(5)), &names(&["A. Smith", "B. Lee"]))
            .await
            .unwrap();
        assert_eq!(result.authors_created, 1);
        assert_eq!(result.authors[0].id, smith.id);
        assert_eq!(store.count_authors().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_newest_articles_filters_and_orders() {
        let store = SqliteStore::in_memory().await.unwrap();
        for (id, day) in [("old", 1), ("mid", 10), ("new", 20)] {
            store.get_or_create_article(&key(id, t(day))).await.unwrap();
        }

        let page = store
            .newest_articles(t(5), PageRequest::new(1, 50))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.num_pages, 1);
        let ids: Vec<_> = page.items.iter().map(|a| a.external_id.as_str()).collect();
        assert_eq!(ids, vec!["new", "mid"]);
    }

    #[tokio::test]
    async fn test_newest_articles_paginates_and_clamps() {
        let store = SqliteStore::in_memory().await.unwrap();
        for day in 1..=5 {
            store
                .get_or_create_article(&key(&format!("a{day}"), t(day)))
                .await
                .unwrap();
        }

        let page = store
            .newest_articles(t(1), PageRequest::new(99, 2))
            .await
            .unwrap();
        assert_eq!(page.number, 3);
        assert_eq!(page.num_pages, 3);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].external_id, "a1");
    }

    #[tokio::test]
    async fn test_prolific_authors_ranking() {
        let store = SqliteStore::in_memory().await.unwrap();
        let cutoff = t(10);
        store
            .upsert_article(&key("a", t(11)), &names(&["Busy", "Recent"]))
            .await
            .unwrap();
        store
            .upsert_article(&key("b", t(12)), &names(&["Busy"]))
            .await
            .unwrap();
        store
            .upsert_article(&key("c", t(20)), &names(&["Recent"]))
            .await
            .unwrap();
        store
            .upsert_article(&key("d", t(2)), &names(&["Stale"]))
            .await
            .unwrap();
        store.get_or_create_author("Idle").await.unwrap();

        let page = store
            .prolific_authors(cutoff, PageRequest::new(1, 50))
            .await
            .unwrap();
        let ranking: Vec<_> = page
            .items
            .iter()
            .map(|a| (a.name.as_str(), a.article_count))
            .collect();
        // Ties on count break on latest publish time.
        assert_eq!(
            ranking,
            vec![("Recent", 2), ("Busy", 2), ("Stale", 0), ("Idle", 0)]
        );
        assert_eq!(page.items[0].last_published, Some(t(20)));
        assert_eq!(page.items[2].last_published, Some(t(2)));
        assert_eq!(page.items[3].last_published, None);
        assert_eq!(page.total, 4);
    }

    #[tokio::test]
    async fn test_article_and_author_detail() {
        let store = SqliteStore::in_memory().await.unwrap();
        let recent = store
            .upsert_article(&key("recent", t(20)), &names(&["B. Lee", "A. Smith"]))
            .await
            .unwrap();
        store
            .upsert_article(&key("old", t(1)), &names(&["A. Smith"]))
            .await
            .unwrap();

        let detail = store
            .article_detail(recent.article.id)
            .await
            .unwrap()
            .unwrap();
        let authors: Vec<_> = detail.authors.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(authors, vec!["A. Smith", "B. Lee"]);
        assert!(store.article_detail(9999).await.unwrap().is_none());

        let smith = recent
            .authors
            .iter()
            .find(|a| a.name == "A. Smith")
            .unwrap();
        let author = store
            .author_detail(smith.id, t(20) - Duration::days(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(author.name, "A. Smith");
        assert_eq!(
            author.articles,
            vec![ArticleHeadline {
                id: recent.article.id,
                title: "Title of recent".to_string()
            }]
        );
        assert!(store.author_detail(9999, t(1)).await.unwrap().is_none());
    }
}
