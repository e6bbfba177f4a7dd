//! Remote feed access.
//!
//! The driver only talks to the feed through [`PageFetcher`], so tests can
//! substitute canned pages for the network.
//!
//! # Supported Sources
//!
//! | Source | Module | Method | Notes |
//! |--------|--------|--------|-------|
//! | arXiv | [`arxiv`] | Atom export API | Keyword query, newest submissions first |

pub mod arxiv;

use crate::errors::IngestError;
use crate::models::RemotePage;

/// Fetch one page of the remote feed.
pub trait PageFetcher {
    /// Fetch `limit` entries starting at `offset`.
    ///
    /// Implementations must report `total_results` when `offset == 0`.
    async fn fetch(&self, offset: usize, limit: usize) -> Result<RemotePage, IngestError>;
}
