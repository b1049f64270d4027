//! Hierarchical bucket and field addressing
//!
//! A [`Path`] is an ordered list of non-empty segments with a canonical
//! `/`-joined form. `"/"` (no segments) is the root path. Leading, trailing
//! and doubled separators are ignored, so `"users"`, `"/users"` and
//! `"users/"` all name the same bucket.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Separator between path segments
pub const PATH_SEPARATOR: char = '/';

/// A `/`-separated address of a bucket (or of a field inside a document)
///
/// Equality, ordering and hashing follow the canonical form.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// The root path `/`
    pub fn root() -> Self {
        Path::default()
    }

    /// Parse a path, dropping empty segments
    pub fn new(s: &str) -> Self {
        Path {
            segments: s
                .split(PATH_SEPARATOR)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Build a path from already-split segments
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if a segment is empty or contains the separator.
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = Vec::new();
        for segment in segments {
            let segment = segment.into();
            validate_segment(&segment)?;
            out.push(segment);
        }
        Ok(Path { segments: out })
    }

    /// The ordered segments
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// True for `/`
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Last segment, `None` for the root
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Path without its last segment, `None` for the root
    pub fn parent(&self) -> Option<Path> {
        if self.is_root() {
            return None;
        }
        Some(Path {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Append one segment
    ///
    /// # Errors
    ///
    /// Returns `InvalidPath` if the segment is empty or contains `/`.
    pub fn join(&self, segment: &str) -> Result<Path> {
        validate_segment(segment)?;
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Path { segments })
    }

    /// Canonical string form
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(Error::InvalidPath("empty path segment".to_string()));
    }
    if segment.contains(PATH_SEPARATOR) {
        return Err(Error::InvalidPath(format!(
            "segment '{}' contains '{}'",
            segment, PATH_SEPARATOR
        )));
    }
    Ok(())
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(Path::new(s))
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Path::new(s)
    }
}

impl From<String> for Path {
    fn from(s: String) -> Self {
        Path::new(&s)
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical())
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Path::new(&s))
    }
}
