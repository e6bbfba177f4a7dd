//! JSON rendering of browse results.
//!
//! Listings are wrapped with their paging metadata:
//!
//! ```text
//! {
//!   "number": 1,
//!   "num_pages": 3,
//!   "total": 120,
//!   "items": [ ... ]
//! }
//! ```

use serde::Serialize;
use std::error::Error;
use tokio::io::{AsyncWriteExt, stdout};
use tracing::{debug, instrument};

/// Serialize `value` as pretty-printed JSON with a trailing newline.
pub fn render<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    Ok(json)
}

/// Write `value` to standard output as JSON.
#[instrument(level = "debug", skip_all)]
pub async fn print<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    let json = render(value)?;
    let mut out = stdout();
    out.write_all(json.as_bytes()).await?;
    out.flush().await?;
    debug!(bytes = json.len(), "Wrote JSON to stdout");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Article, ArticleDetail, Author, Page, PageRequest};
    use chrono::{TimeZone, Utc};
    use serde_json::Value;

    fn article() -> Article {
        Article {
            id: 3,
            external_id: "http://arxiv.org/abs/2410.00001v1".to_string(),
            title: "Therapy outcomes".to_string(),
            summary: None,
            published_at: Utc.with_ymd_and_hms(2026, 9, 1, 8, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_render_page_includes_paging_metadata() {
        let page = Page::new(PageRequest::new(7, 50), 1, vec![article()]);
        let json: Value = serde_json::from_str(&render(&page).unwrap()).unwrap();

        assert_eq!(json["number"], 1);
        assert_eq!(json["num_pages"], 1);
        assert_eq!(json["total"], 1);
        assert_eq!(json["items"][0]["title"], "Therapy outcomes");
        assert_eq!(json["items"][0]["published_at"], "2026-09-01T08:30:00Z");
        assert!(json["items"][0]["summary"].is_null());
    }

    #[test]
    fn test_render_article_detail_is_flat() {
        let detail = ArticleDetail {
            article: article(),
            authors: vec![Author {
                id: 1,
                name: "A. Smith".to_string(),
            }],
        };
        let rendered = render(&detail).unwrap();
        let json: Value = serde_json::from_str(&rendered).unwrap();

        assert!(rendered.ends_with('\n'));
        assert_eq!(json["id"], 3);
        assert_eq!(json["authors"][0]["name"], "A. Smith");
    }
}
