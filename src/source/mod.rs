//! Media reference resolution.
//!
//! Turns a user-supplied URL (or a bare identifier) into a validated
//! [`SourceId`]. Purely syntactic, no network access.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while resolving a media reference.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("not a recognizable media reference: {0}")]
    InvalidReference(String),
}

/// Validated identifier of one remote media item.
///
/// Always exactly 11 characters of `[A-Za-z0-9_-]`. Used as the cache key
/// and as the argument to the acquisition and transcode pipelines, so the
/// only way to construct one is through validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

const SOURCE_ID_LEN: usize = 11;

lazy_static! {
    static ref STRICT_ID: Regex = Regex::new(r"^[A-Za-z0-9_-]{11}$").unwrap();

    // Ordered extraction patterns: query parameter, generic path segment,
    // embed path, short-link path, shorts path. First match wins.
    static ref URL_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?:v=|/)([0-9A-Za-z_-]{11})").unwrap(),
        Regex::new(r"embed/([0-9A-Za-z_-]{11})").unwrap(),
        Regex::new(r"youtu\.be/([0-9A-Za-z_-]{11})").unwrap(),
        Regex::new(r"shorts/([0-9A-Za-z_-]{11})").unwrap(),
    ];
}

impl SourceId {
    /// Validate a bare identifier token.
    pub fn parse(raw: &str) -> Result<SourceId, ResolveError> {
        if STRICT_ID.is_match(raw) {
            Ok(SourceId(raw.to_string()))
        } else {
            Err(ResolveError::InvalidReference(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve a free-form reference (full URL or bare token) to a [`SourceId`].
///
/// Bare tokens must pass the strict 11-character check; URLs are scanned
/// with a small ordered pattern set and the first plausible match wins.
pub fn resolve_reference(input: &str) -> Result<SourceId, ResolveError> {
    let input = input.trim();

    if STRICT_ID.is_match(input) {
        return Ok(SourceId(input.to_string()));
    }

    for pattern in URL_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(input) {
            if let Some(m) = captures.get(1) {
                debug_assert_eq!(m.as_str().len(), SOURCE_ID_LEN);
                return Ok(SourceId(m.as_str().to_string()));
            }
        }
    }

    Err(ResolveError::InvalidReference(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_resolves(input: &str, expected: &str) {
        assert_eq!(resolve_reference(input).unwrap().as_str(), expected);
    }

    #[test]
    fn resolves_watch_urls() {
        assert_resolves("https://x/watch?v=dQw4w9WgXcQ", "dQw4w9WgXcQ");
        assert_resolves(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42",
            "dQw4w9WgXcQ",
        );
    }

    #[test]
    fn resolves_short_links() {
        assert_resolves("https://youtu.be/dQw4w9WgXcQ", "dQw4w9WgXcQ");
    }

    #[test]
    fn resolves_embed_and_shorts_paths() {
        assert_resolves("https://www.youtube.com/embed/dQw4w9WgXcQ", "dQw4w9WgXcQ");
        assert_resolves("https://www.youtube.com/shorts/dQw4w9WgXcQ", "dQw4w9WgXcQ");
    }

    #[test]
    fn resolves_bare_token() {
        assert_resolves("dQw4w9WgXcQ", "dQw4w9WgXcQ");
        assert_resolves("  dQw4w9WgXcQ  ", "dQw4w9WgXcQ");
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            resolve_reference("not a url"),
            Err(ResolveError::InvalidReference(_))
        ));
        assert!(resolve_reference("").is_err());
        assert!(resolve_reference("https://example.com/").is_err());
    }

    #[test]
    fn strict_parse_rejects_wrong_length_or_charset() {
        assert!(SourceId::parse("dQw4w9WgXcQ").is_ok());
        assert!(SourceId::parse("tooshort").is_err());
        assert!(SourceId::parse("exactly12chr").is_err());
        assert!(SourceId::parse("bad!chars&&").is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = SourceId::parse("dQw4w9WgXcQ").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"dQw4w9WgXcQ\"");
    }
}
