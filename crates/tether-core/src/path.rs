#![forbid(unsafe_code)]

//! Dot-delimited attribute paths.
//!
//! A [`Path`] addresses a value inside a graph of attribute-bearing objects:
//! `"customer.address.city"` names the `city` attribute of whatever object
//! the `address` attribute of `customer` currently resolves to. Paths are
//! plain data here; resolution against a live graph happens in the reactive
//! layer.
//!
//! # Invariants
//!
//! 1. Segments are non-empty: `parse` drops empty segments, so `"a..b"` and
//!    `".a.b."` both yield `["a", "b"]`. A degenerate input of only dots
//!    parses to the empty path.
//! 2. `parse` and `Display` round-trip for any path built from non-empty
//!    segments.
//! 3. `suffix()` of a path of length n has length n - 1 (or 0 for the empty
//!    path); splitting never allocates new segment strings beyond the clone.

use core::fmt;

/// An ordered sequence of attribute-name segments.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// Parse a dot-delimited path string. Empty segments are dropped.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self {
            segments: raw
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }

    /// Build a path from pre-split segments. Empty segments are dropped.
    #[must_use]
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
        }
    }

    /// The path's segments in order.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether the path has no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The first segment, if any.
    #[must_use]
    pub fn head(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// The last segment, if any. Class bindings derive their class name from
    /// this.
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The path with its first segment removed.
    #[must_use]
    pub fn suffix(&self) -> Self {
        Self {
            segments: self.segments.iter().skip(1).cloned().collect(),
        }
    }

    /// The path starting at segment `index` (so `suffix_from(1)` equals
    /// `suffix()`).
    #[must_use]
    pub fn suffix_from(&self, index: usize) -> Self {
        Self {
            segments: self.segments.iter().skip(index).cloned().collect(),
        }
    }

    /// Split into head segment and remaining suffix.
    #[must_use]
    pub fn split_first(&self) -> Option<(&str, Self)> {
        self.head().map(|h| (h, self.suffix()))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl From<&str> for Path {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for Path {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}
