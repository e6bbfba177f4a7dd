//! Data models for feed entries and their persisted representations.
//!
//! This module defines the core data structures used throughout the application:
//! - [`RemotePage`], [`RawEntry`], [`RawField`]: one decoded page of the remote feed
//! - [`ParsedEntry`]: a single entry mapped onto the fields we care about
//! - [`ArticleKey`]: the natural key an article is deduplicated on
//! - [`Author`], [`Article`]: persisted records
//! - Read-side projections: [`ArticleDetail`], [`AuthorSummary`], [`AuthorDetail`], [`Page`]
//!
//! Transient types never reach the database as-is; they exist only for the
//! duration of a single page fetch.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One page of results as returned by the remote feed.
///
/// `total_results` is only authoritative on the first page (`offset == 0`);
/// later pages may carry `None`.
#[derive(Debug, Clone, Default)]
pub struct RemotePage {
    /// Index of the first entry of this page within the full result set.
    pub offset: usize,
    /// Page size that was requested.
    pub limit: usize,
    /// Total number of results reported by the feed envelope.
    pub total_results: Option<usize>,
    /// Entries in feed order.
    pub entries: Vec<RawEntry>,
}

/// A single child element of a feed entry, in wire form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawField {
    /// Local element name, namespace prefix stripped (`arxiv:comment` -> `comment`).
    pub tag: String,
    /// Unescaped text content; empty when the element only has child elements.
    pub text: String,
    /// Nested child elements, in document order.
    pub children: Vec<RawField>,
}

impl RawField {
    pub fn leaf(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            text: text.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(tag: impl Into<String>, children: Vec<RawField>) -> Self {
        Self {
            tag: tag.into(),
            text: String::new(),
            children,
        }
    }
}

/// One article record as returned by the feed: a tag-ordered bag of fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub fields: Vec<RawField>,
}

/// An entry after field mapping. Any field may be missing; the driver decides
/// whether the entry is usable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedEntry {
    pub external_id: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub summary: Option<String>,
    /// Display names in feed order. Duplicates are kept.
    pub author_names: Vec<String>,
}

/// The field tuple an [`Article`] is deduplicated on.
///
/// Two sightings of an article only collapse into one row when all four
/// fields match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArticleKey {
    pub external_id: String,
    pub title: String,
    pub summary: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// A persisted author. `name` is unique (case-sensitive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Author {
    pub id: i64,
    pub name: String,
}

/// A persisted article. Default read ordering is newest `published_at` first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Article {
    pub id: i64,
    pub external_id: String,
    pub title: String,
    pub summary: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// An article together with its current author set.
#[derive(Debug, Clone, Serialize)]
pub struct ArticleDetail {
    #[serde(flatten)]
    pub article: Article,
    pub authors: Vec<Author>,
}

/// An author annotated with their activity inside the retention window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorSummary {
    pub id: i64,
    pub name: String,
    /// Number of linked articles published on or after the cutoff.
    pub article_count: i64,
    /// Latest publish time across all linked articles.
    pub last_published: Option<DateTime<Utc>>,
}

/// Minimal article projection used when listing an author's work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct ArticleHeadline {
    pub id: i64,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorDetail {
    pub name: String,
    pub articles: Vec<ArticleHeadline>,
}

/// A 1-based page request. Out-of-range numbers are clamped when resolved
/// against a total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub number: usize,
    pub per_page: usize,
}

impl PageRequest {
    pub fn new(number: usize, per_page: usize) -> Self {
        Self {
            number,
            per_page: per_page.max(1),
        }
    }

    /// Number of pages needed for `total` items. Always at least one.
    pub fn num_pages(&self, total: usize) -> usize {
        total.div_ceil(self.per_page).max(1)
    }

    /// The page number actually served for `total` items.
    pub fn clamped_number(&self, total: usize) -> usize {
        self.number.clamp(1, self.num_pages(total))
    }

    /// Row offset of the clamped page.
    pub fn offset(&self, total: usize) -> usize {
        (self.clamped_number(total) - 1) * self.per_page
    }
}

/// One page of a read-side listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub number: usize,
    pub num_pages: usize,
    pub total: usize,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(request: PageRequest, total: usize, items: Vec<T>) -> Self {
        Self {
            number: request.clamped_number(total),
            num_pages: request.num_pages(total),
            total,
            items,
        }
    }
}
