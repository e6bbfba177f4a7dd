//! Upsert repository for authors and articles.
//!
//! [`ScholarStore`] is the persistence boundary: get-or-create for authors and
//! articles keyed by their natural keys, and replacement of an article's
//! author set. Implementations must make get-or-create atomic per key, since
//! overlapping ingestion runs may race on the same names and articles.
//!
//! Read-side queries used for browsing live on [`SqliteStore`] directly.

pub mod sqlite;

pub use sqlite::SqliteStore;

use crate::errors::PersistenceError;
use crate::models::{Article, ArticleKey, Author};
use itertools::Itertools;
use tracing::debug;

/// What happened when one entry was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryUpsert {
    pub article: Article,
    pub article_created: bool,
    pub authors: Vec<Author>,
    pub authors_created: usize,
}

pub trait ScholarStore {
    /// Return the author named exactly `name`, creating it if needed.
    /// The flag is `true` when this call created the row.
    async fn get_or_create_author(&self, name: &str) -> Result<(Author, bool), PersistenceError>;

    /// Return the article matching every field of `key`, creating it if needed.
    async fn get_or_create_article(
        &self,
        key: &ArticleKey,
    ) -> Result<(Article, bool), PersistenceError>;

    /// Replace the author set of `article_id` with `author_ids`.
    async fn set_article_authors(
        &self,
        article_id: i64,
        author_ids: &[i64],
    ) -> Result<(), PersistenceError>;

    /// Upsert all authors, then the article, then replace its author set.
    ///
    /// Authors are written first and are not rolled back if the article write
    /// fails; they are reused on the next sighting.
    async fn upsert_article(
        &self,
        key: &ArticleKey,
        author_names: &[String],
    ) -> Result<EntryUpsert, PersistenceError> {
        let mut authors = Vec::with_capacity(author_names.len());
        let mut authors_created = 0;
        for name in author_names.iter().unique() {
            let (author, created) = self.get_or_create_author(name).await?;
            if created {
                authors_created += 1;
            }
            authors.push(author);
        }

        let (article, article_created) = self.get_or_create_article(key).await?;
        let ids: Vec<i64> = authors.iter().map(|a| a.id).collect();
        self.set_article_authors(article.id, &ids).await?;

        debug!(
            article_id = article.id,
            article_created,
            authors = ids.len(),
            authors_created,
            "Upserted article"
        );
        Ok(EntryUpsert {
            article,
            article_created,
            authors,
            authors_created,
        })
    }
}
