//! Slash-separated store paths with segment validation.

#![allow(missing_docs)]

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Serialize, Serializer};

use crate::core::errors::{KibError, Result};

/// Longest key the store accepts, in bytes.
pub const MAX_SEGMENT_BYTES: usize = 768;

fn segment_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[^.#$\[\]/\x00-\x1f\x7f]+$"))
        .as_ref()
        .map_err(|err| KibError::Runtime {
            details: format!("segment pattern failed to compile: {err}"),
        })
}

/// Check one path segment: non-empty, at most 768 bytes, and free of
/// `. # $ [ ] /` and control characters.
pub fn validate_segment(segment: &str) -> Result<()> {
    let invalid = |reason: &str| KibError::InvalidPath {
        path: segment.to_string(),
        reason: reason.to_string(),
    };
    if segment.is_empty() {
        return Err(invalid("empty segment"));
    }
    if segment.len() > MAX_SEGMENT_BYTES {
        return Err(invalid("segment longer than 768 bytes"));
    }
    if !segment_pattern()?.is_match(segment) {
        return Err(invalid(
            "segment contains one of . # $ [ ] / or a control character",
        ));
    }
    Ok(())
}

/// A validated location in the document tree. The empty path is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse `devices/kibbler_001/pet_registry`; leading and trailing slashes
    /// are ignored, empty inner segments are rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let mut segments = Vec::new();
        for segment in trimmed.split('/') {
            validate_segment(segment).map_err(|_| KibError::InvalidPath {
                path: raw.to_string(),
                reason: format!("bad segment {segment:?}"),
            })?;
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    /// `devices/{id}`.
    pub fn device(id: &str) -> Result<Self> {
        Self::root().child("devices")?.child(id)
    }

    pub fn child(&self, segment: &str) -> Result<Self> {
        validate_segment(segment)?;
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self { segments })
    }

    /// Append a relative, slash-separated path.
    pub fn join(&self, relative: &str) -> Result<Self> {
        let rel = Self::parse(relative)?;
        let mut segments = self.segments.clone();
        segments.extend(rel.segments);
        Ok(Self { segments })
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Strict ancestor test.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.segments.len() < other.segments.len() && other.segments.starts_with(&self.segments)
    }

    /// Equal, ancestor or descendant.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self == other || self.is_ancestor_of(other) || other.is_ancestor_of(self)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

impl Serialize for StorePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let p = StorePath::parse("/devices/kibbler_001/pet_registry/").expect("path");
        assert_eq!(p.segments().len(), 3);
        assert_eq!(p.to_string(), "/devices/kibbler_001/pet_registry");
        assert!(StorePath::parse("").expect("root").is_root());
        assert_eq!(StorePath::root().to_string(), "/");
    }

    #[test]
    fn rejects_reserved_characters_and_empty_segments() {
        for bad in ["a//b", "a/b.c", "a/#", "a/$x", "a/[0]", "tab\there"] {
            assert!(StorePath::parse(bad).is_err(), "{bad} should be rejected");
        }
        assert!(validate_segment("").is_err());
        assert!(validate_segment(&"x".repeat(769)).is_err());
        assert!(validate_segment("battery:2026-10-17T18:00:00_000Z").is_ok());
    }

    #[test]
    fn ancestry() {
        let root = StorePath::device("kibbler_001").expect("device");
        let child = root.join("stats/last_fed_pet").expect("join");
        assert!(root.is_ancestor_of(&child));
        assert!(!child.is_ancestor_of(&root));
        assert!(!root.is_ancestor_of(&root));
        assert!(root.overlaps(&child));
        assert!(child.overlaps(&root));
        let sibling = root.child("history").expect("child");
        assert!(!sibling.overlaps(&child));
    }

    #[test]
    fn serializes_as_display_string() {
        let p = StorePath::parse("devices/x").expect("path");
        assert_eq!(serde_json::to_string(&p).expect("json"), "\"/devices/x\"");
    }
}
