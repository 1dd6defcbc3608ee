//! Addresses for files nested inside archives
//!
//! A `DeepPath` names a file through up to [`MAX_DEPTH`] levels of
//! containers. Segment 0 is relative to the source root; segment `i` is the
//! entry name inside the archive addressed by segments `[0..i)`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Deepest nesting the transform registry may describe
pub const MAX_DEPTH: usize = 3;

/// Separator used when displaying or parsing a deep path
pub const SEPARATOR: &str = "!";

/// Errors for deep path construction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeepPathError {
    #[error("deep path needs at least one segment")]
    Empty,

    #[error("deep path segment {index} is empty")]
    EmptySegment { index: usize },

    #[error("cannot append {child:?} to {path}: deep paths hold at most {max} segments", max = MAX_DEPTH)]
    TooDeep { path: DeepPath, child: String },
}

/// Location of a file across nested containers.
///
/// Equality and hashing are structural over all segments, so a deep path is
/// usable as a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct DeepPath {
    segments: Vec<String>,
}

impl DeepPath {
    /// Top-level path, relative to the source root
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            segments: vec![path.into()],
        }
    }

    /// Build from 1 to [`MAX_DEPTH`] non-empty segments.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, DeepPathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut iter = segments.into_iter().map(Into::into);
        let first = iter.next().ok_or(DeepPathError::Empty)?;
        if first.is_empty() {
            return Err(DeepPathError::EmptySegment { index: 0 });
        }
        iter.try_fold(Self::new(first), |path, segment| path.append(segment))
    }

    /// Parse the `outer!inner!leaf` display form.
    pub fn parse(text: &str) -> Result<Self, DeepPathError> {
        Self::from_segments(text.split(SEPARATOR))
    }

    /// Return a new path with `child` as its deepest segment.
    pub fn append(&self, child: impl Into<String>) -> Result<Self, DeepPathError> {
        let child = child.into();
        if child.is_empty() {
            return Err(DeepPathError::EmptySegment {
                index: self.segments.len(),
            });
        }
        if self.segments.len() >= MAX_DEPTH {
            return Err(DeepPathError::TooDeep {
                path: self.clone(),
                child,
            });
        }
        let mut segments = self.segments.clone();
        segments.push(child);
        Ok(Self { segments })
    }

    /// Deepest segment: the leaf file name.
    pub fn last(&self) -> &str {
        // `segments` is never empty
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Number of filled segments (1..=MAX_DEPTH)
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Whether another level can be appended
    pub fn can_descend(&self) -> bool {
        self.segments.len() < MAX_DEPTH
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for DeepPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join(SEPARATOR))
    }
}

impl TryFrom<Vec<String>> for DeepPath {
    type Error = DeepPathError;

    fn try_from(segments: Vec<String>) -> Result<Self, Self::Error> {
        Self::from_segments(segments)
    }
}

impl From<DeepPath> for Vec<String> {
    fn from(path: DeepPath) -> Self {
        path.segments
    }
}
