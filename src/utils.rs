//! Utility functions for text normalization and logging.
//!
//! This module provides helper functions used throughout the application:
//! - XML text normalization (CDATA unwrapping, entity unescaping)
//! - Whitespace collapsing for titles and author names
//! - String truncation for log previews

use quick_xml::escape::unescape;
use quick_xml::escape::EscapeError;

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";

/// Normalize the raw text content of an XML element.
///
/// Text outside `<![CDATA[...]]>` sections has its XML entities resolved;
/// text inside them is kept verbatim with the markers removed. Sections may
/// appear anywhere in the content, and an unterminated section runs to the
/// end. Surrounding whitespace is stripped from the result.
///
/// # Arguments
///
/// * `raw` - The undecoded inner text of an element
///
/// # Returns
///
/// The decoded text, or an [`EscapeError`] if text outside a CDATA section
/// contains an unknown or malformed entity reference.
pub fn normalize_text(raw: &str) -> Result<String, EscapeError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find(CDATA_OPEN) {
        out.push_str(&unescape(&rest[..start])?);
        let section = &rest[start + CDATA_OPEN.len()..];
        match section.find(CDATA_CLOSE) {
            Some(end) => {
                out.push_str(&section[..end]);
                rest = &section[end + CDATA_CLOSE.len()..];
            }
            None => {
                out.push_str(section);
                rest = "";
            }
        }
    }
    out.push_str(&unescape(rest)?);
    Ok(out.trim().to_string())
}

/// Collapse every run of whitespace (including newlines) into a single space.
///
/// Feed titles and names are hard-wrapped upstream; collapsing keeps the
/// stored value stable across wraps.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(collapse_whitespace("Deep\n  Learning "), "Deep Learning");
/// ```
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to at most `max` bytes (on a character
/// boundary) with an ellipsis and byte count indicator appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let cut = s
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max)
        .last()
        .unwrap_or(0);
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}
