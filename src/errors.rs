//! Error taxonomy for the ingestion pipeline.
//!
//! Each stage of the pipeline has its own error family so callers can tell a
//! transport failure from a malformed feed or a database problem:
//!
//! - [`FetchError`]: network, transport, or non-success HTTP status
//! - [`DecodeError`]: the response is not the feed structure we expect
//! - [`EntryParseError`]: a field that is present could not be interpreted
//! - [`PersistenceError`]: a repository read or write failed
//!
//! [`IngestError`] wraps all of them for the driver. Any `IngestError` moves a
//! run to the `Failed` terminal state; there is no per-entry recovery.
//! Non-fatal problems with a single entry are reported as
//! [`crate::parser::ParseWarning`] instead and only logged.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("invalid request url: {0}")]
    Url(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("invalid XML escape: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),

    #[error("feed envelope has no totalResults element")]
    MissingTotalResults,

    #[error("feed envelope totalResults is not a count: {0:?}")]
    InvalidTotalResults(String),

    #[error("feed ended inside an <entry> element")]
    UnexpectedEof,

    #[error("remote API reported an error: {0}")]
    Api(String),
}

#[derive(Error, Debug)]
pub enum EntryParseError {
    #[error("published timestamp {value:?} is not RFC 3339: {source}")]
    InvalidTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored timestamp {0} is out of range")]
    InvalidTimestamp(i64),
}

/// Anything that aborts an ingestion run.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Parse(#[from] EntryParseError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(
        "feed is not sorted newest first: {external_id} published {current} after an entry published {previous}"
    )]
    OutOfOrder {
        external_id: String,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_ingest_error_is_transparent_over_decode() {
        let err: IngestError = DecodeError::MissingTotalResults.into();
        assert_eq!(err.to_string(), "feed envelope has no totalResults element");
    }

    #[test]
    fn test_out_of_order_message_names_entry() {
        let err = IngestError::OutOfOrder {
            external_id: "http://arxiv.org/abs/2401.00001v1".to_string(),
            previous: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            current: Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap(),
        };
        let msg = err.to_string();
        assert!(msg.contains("2401.00001v1"));
        assert!(msg.contains("not sorted newest first"));
    }

    #[test]
    fn test_fetch_error_status_display() {
        let err = FetchError::Status {
            url: "http://example.test/api/query".to_string(),
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
        };
        assert_eq!(
            err.to_string(),
            "http://example.test/api/query returned HTTP 503 Service Unavailable"
        );
    }
}
