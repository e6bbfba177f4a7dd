//! Entry parser: maps a [`RawEntry`] onto a [`ParsedEntry`].
//!
//! Fields are dispatched on their exact local tag name through [`EntryField`];
//! tags outside that table are ignored. When a tag repeats, the last
//! occurrence wins, except `author`, which accumulates. For each author block
//! only the first nested element (the display name) is kept.
//!
//! Absent fields leave the output field unset. Only a present-but-unreadable
//! `published` timestamp is an error.

use crate::errors::EntryParseError;
use crate::models::{ArticleKey, ParsedEntry, RawEntry, RawField};
use crate::utils::collapse_whitespace;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Recognised entry fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryField {
    Id,
    Published,
    Title,
    Summary,
    Author,
}

impl EntryField {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "id" => Some(Self::Id),
            "published" => Some(Self::Published),
            "title" => Some(Self::Title),
            "summary" => Some(Self::Summary),
            "author" => Some(Self::Author),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Published => "published",
            Self::Title => "title",
            Self::Summary => "summary",
            Self::Author => "author",
        }
    }
}

/// A non-fatal problem with a single entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    #[error("entry has no {0} field")]
    MissingField(&'static str),

    #[error("author block has no name")]
    EmptyAuthorName,
}

/// Parse one raw entry.
///
/// Missing top-level fields are not errors here; they are reported separately
/// by [`missing_fields`].
///
/// # Arguments
///
/// * `raw` - The entry's child fields in document order
///
/// # Returns
///
/// The mapped entry together with any warnings collected while reading author
/// blocks, or an [`EntryParseError`] if the publish time is present but not a
/// valid RFC 3339 timestamp.
pub fn parse_entry(raw: &RawEntry) -> Result<(ParsedEntry, Vec<ParseWarning>), EntryParseError> {
    let mut entry = ParsedEntry::default();
    let mut warnings = Vec::new();

    for field in &raw.fields {
        let Some(kind) = EntryField::from_tag(&field.tag) else {
            continue;
        };
        match kind {
            EntryField::Id => entry.external_id = Some(field.text.trim().to_string()),
            EntryField::Published => entry.published_at = Some(parse_timestamp(&field.text)?),
            EntryField::Title => entry.title = Some(collapse_whitespace(&field.text)),
            EntryField::Summary => entry.summary = Some(field.text.trim().to_string()),
            EntryField::Author => match author_name(field) {
                Some(name) => entry.author_names.push(name),
                None => warnings.push(ParseWarning::EmptyAuthorName),
            },
        }
    }

    Ok((entry, warnings))
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, EntryParseError> {
    let value = text.trim();
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| EntryParseError::InvalidTimestamp {
            value: value.to_string(),
            source,
        })
}

fn author_name(field: &RawField) -> Option<String> {
    let name = collapse_whitespace(&field.children.first()?.text);
    (!name.is_empty()).then_some(name)
}

/// Top-level fields that are absent from `entry`. Summary may legitimately
/// be null and is not reported.
pub fn missing_fields(entry: &ParsedEntry) -> Vec<ParseWarning> {
    let mut missing = Vec::new();
    if entry.external_id.as_deref().is_none_or(str::is_empty) {
        missing.push(ParseWarning::MissingField(EntryField::Id.as_str()));
    }
    if entry.published_at.is_none() {
        missing.push(ParseWarning::MissingField(EntryField::Published.as_str()));
    }
    if entry.title.is_none() {
        missing.push(ParseWarning::MissingField(EntryField::Title.as_str()));
    }
    missing
}

/// Build the natural key for `entry`, or `None` when the id or publish time
/// is missing. A missing title becomes the empty string.
pub fn article_key(entry: &ParsedEntry) -> Option<ArticleKey> {
    let external_id = entry.external_id.clone().filter(|id| !id.is_empty())?;
    Some(ArticleKey {
        external_id,
        title: entry.title.clone().unwrap_or_default(),
        summary: entry.summary.clone(),
        published_at: entry.published_at?,
    })
}
