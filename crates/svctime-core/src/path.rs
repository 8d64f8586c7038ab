//! Service path model.
//!
//! A [`ServicePath`] is the ordered list of segment names that locates a node
//! in the service tree, root first. Paths compare positionally and
//! case-sensitively. The empty path locates nothing and is rejected by every
//! mutating store operation.
//!
//! # Parsing
//!
//! External path syntax is slash separated. Empty segments are discarded, so
//! leading, trailing and doubled slashes are tolerated:
//!
//! ```rust
//! use svctime_core::path::ServicePath;
//!
//! let path = ServicePath::parse("//app1/cat1/");
//! assert_eq!(path.segments(), ["app1", "cat1"]);
//! ```
//!
//! [`ServicePath::from_encoded`] percent-decodes the whole string once and
//! only then splits it. An encoded `%2F` inside what the client meant as one
//! segment therefore becomes a separator.

use std::fmt;

use percent_encoding::percent_decode_str;

/// Ordered sequence of segment names identifying a node, root first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ServicePath {
    segments: Vec<String>,
}

impl ServicePath {
    /// Builds a path from already-split segments.
    ///
    /// Empty segments are dropped, matching [`ServicePath::parse`].
    #[must_use]
    pub fn new<I, S>(segments: I) -> Self
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

    /// Splits `raw` on `/`, discarding empty segments. No decoding is done.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        Self::new(raw.split('/'))
    }

    /// Percent-decodes `raw` once, then splits it like [`ServicePath::parse`].
    ///
    /// Byte sequences that do not decode to UTF-8 are replaced with U+FFFD.
    #[must_use]
    pub fn from_encoded(raw: &str) -> Self {
        let decoded = percent_decode_str(raw).decode_utf8_lossy();
        Self::parse(&decoded)
    }

    /// A single-segment path. The name is used verbatim and never split.
    #[must_use]
    pub fn root(name: impl Into<String>) -> Self {
        Self::new([name.into()])
    }

    /// Segment names, root first.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Last segment, if any.
    #[must_use]
    pub fn leaf(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The path minus its last segment.
    ///
    /// Returns `None` for the empty path and for depth-1 paths, which have no
    /// parent node.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// The sibling path obtained by replacing the last segment with `name`.
    ///
    /// Returns `None` for the empty path.
    #[must_use]
    pub fn with_leaf(&self, name: &str) -> Option<Self> {
        let (_, ancestors) = self.segments.split_last()?;
        let mut segments = ancestors.to_vec();
        segments.push(name.to_owned());
        Some(Self { segments })
    }

    /// Every non-empty prefix of this path, shortest first.
    ///
    /// For `a/b/c` this yields `a`, `a/b`, `a/b/c`.
    pub fn prefixes(&self) -> impl Iterator<Item = Self> + '_ {
        (1..=self.segments.len()).map(|len| Self {
            segments: self.segments[..len].to_vec(),
        })
    }

    /// Whether `self` equals `other` or lies underneath it.
    ///
    /// The comparison is per segment, so `app10` is not under `app1`.
    #[must_use]
    pub fn starts_with(&self, other: &Self) -> bool {
        self.segments.starts_with(&other.segments)
    }
}

/// Percent-decodes a single service name. The result is never split, so a
/// decoded `/` stays part of the name.
#[must_use]
pub fn decode_name(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

impl fmt::Display for ServicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl From<&str> for ServicePath {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}
