//! arXiv export API client.
//!
//! Queries the [arXiv Atom API](https://info.arxiv.org/help/api/user-manual.html)
//! for a fixed keyword set, newest submissions first, one page per request.
//!
//! # URL Pattern
//!
//! ```text
//! {base}?search_query={query}&start={offset}&max_results={limit}&sortBy=submittedDate&sortOrder=descending
//! ```
//!
//! # Decoding
//!
//! The envelope's `opensearch:totalResults` gives the result count. Every
//! `<entry>` becomes a [`RawEntry`] whose fields are the entry's direct child
//! elements, keyed by local name, with one level of nesting kept for author
//! blocks (`<author><name/><arxiv:affiliation/></author>`).

use crate::errors::{DecodeError, FetchError, IngestError};
use crate::models::{RawEntry, RawField, RemotePage};
use crate::scrapers::PageFetcher;
use crate::utils::{normalize_text, truncate_for_log};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub const DEFAULT_API_BASE: &str = "http://export.arxiv.org/api/query";

pub const DEFAULT_SEARCH_QUERY: &str =
    r#"all:psychiatry OR all:therapy OR all:"machine learning" OR all:"data science""#;

/// Connection and query settings for [`ArxivClient`].
#[derive(Debug, Clone)]
pub struct ArxivConfig {
    pub base_url: String,
    pub search_query: String,
    pub timeout: Duration,
}

#[cfg(test)]
impl Default for ArxivConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            search_query: DEFAULT_SEARCH_QUERY.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArxivClient {
    http: Client,
    config: ArxivConfig,
}

impl ArxivClient {
    pub fn new(config: ArxivConfig) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { http, config })
    }

    /// Build the request URL for one page.
    pub fn page_url(&self, offset: usize, limit: usize) -> Result<Url, FetchError> {
        let mut url = Url::parse(&self.config.base_url)?;
        url.query_pairs_mut()
            .append_pair("search_query", &self.config.search_query)
            .append_pair("start", &offset.to_string())
            .append_pair("max_results", &limit.to_string())
            .append_pair("sortBy", "submittedDate")
            .append_pair("sortOrder", "descending");
        Ok(url)
    }
}

impl PageFetcher for ArxivClient {
    #[instrument(level = "info", skip(self))]
    async fn fetch(&self, offset: usize, limit: usize) -> Result<RemotePage, IngestError> {
        let url = self.page_url(offset, limit)?;
        debug!(%url, "Fetching arXiv page");

        let transport = |source: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            source,
        };
        let resp = self.http.get(url.clone()).send().await.map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            }
            .into());
        }
        let body = resp.text().await.map_err(transport)?;

        let page = decode_feed(&body, offset, limit).inspect_err(|e| {
            warn!(
                error = %e,
                body_preview = %truncate_for_log(&body, 300),
                "arXiv response did not decode"
            );
        })?;
        info!(
            entries = page.entries.len(),
            total_results = ?page.total_results,
            bytes = body.len(),
            "Decoded arXiv page"
        );
        Ok(page)
    }
}

/// Decode one Atom feed document into a [`RemotePage`].
///
/// # Arguments
///
/// * `xml` - The response body
/// * `offset` - Offset the page was requested at
/// * `limit` - Page size the page was requested with
///
/// # Returns
///
/// The page's entries and, when the envelope carries it, the total result count.
///
/// # Errors
///
/// - [`DecodeError::MissingTotalResults`] when `offset == 0` and the envelope
///   carries no count
/// - [`DecodeError::Api`] when the feed is an arXiv error document
/// - [`DecodeError::Xml`] / [`DecodeError::Escape`] on malformed markup
pub fn decode_feed(xml: &str, offset: usize, limit: usize) -> Result<RemotePage, DecodeError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut page = RemotePage {
        offset,
        limit,
        total_results: None,
        entries: Vec::new(),
    };

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"entry" => page.entries.push(read_entry(&mut reader)?),
                b"totalResults" => {
                    let raw = reader.read_text(e.name())?;
                    let text = normalize_text(&raw)?;
                    let total = text
                        .parse::<usize>()
                        .map_err(|_| DecodeError::InvalidTotalResults(text.clone()))?;
                    page.total_results = Some(total);
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(message) = api_error(&page.entries) {
        return Err(DecodeError::Api(message));
    }
    if offset == 0 && page.total_results.is_none() {
        return Err(DecodeError::MissingTotalResults);
    }
    Ok(page)
}

fn local_tag(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

// Consume events up to the matching </entry>, collecting direct children.
fn read_entry(reader: &mut Reader<&[u8]>) -> Result<RawEntry, DecodeError> {
    let mut fields = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let tag = local_tag(&e);
                let raw = reader.read_text(e.name())?;
                fields.push(raw_field(tag, &raw)?);
            }
            Event::Empty(e) => fields.push(RawField::leaf(local_tag(&e), String::new())),
            Event::End(e) if e.local_name().as_ref() == b"entry" => {
                return Ok(RawEntry { fields });
            }
            Event::Eof => return Err(DecodeError::UnexpectedEof),
            _ => {}
        }
    }
}

fn raw_field(tag: String, inner: &str) -> Result<RawField, DecodeError> {
    let children = read_fragment(inner)?;
    let text = if children.is_empty() {
        normalize_text(inner)?
    } else {
        String::new()
    };
    Ok(RawField {
        tag,
        text,
        children,
    })
}

// Child elements of an element's inner markup. Plain text and CDATA yield none.
fn read_fragment(inner: &str) -> Result<Vec<RawField>, DecodeError> {
    let trimmed = inner.trim_start();
    if !trimmed.contains('<') || trimmed.starts_with("<![CDATA[") {
        return Ok(Vec::new());
    }

    let mut reader = Reader::from_str(inner);
    reader.config_mut().trim_text(true);
    let mut children = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let tag = local_tag(&e);
                let raw = reader.read_text(e.name())?;
                children.push(raw_field(tag, &raw)?);
            }
            Event::Empty(e) => children.push(RawField::leaf(local_tag(&e), String::new())),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(children)
}

// arXiv reports bad queries as a single entry whose id lives under /api/errors.
fn api_error(entries: &[RawEntry]) -> Option<String> {
    entries.iter().find_map(|entry| {
        let id = entry.fields.iter().find(|f| f.tag == "id")?;
        if !id.text.contains("/api/errors") {
            return None;
        }
        let summary = entry
            .fields
            .iter()
            .find(|f| f.tag == "summary")
            .map(|f| f.text.clone())
            .filter(|s| !s.is_empty());
        Some(summary.unwrap_or_else(|| id.text.clone()))
    })
}
