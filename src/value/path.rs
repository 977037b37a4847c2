//! Segmented path queries over value trees.
//!
//! A path addresses a location in a decoded document: string keys step into
//! mappings, numeric segments index sequences, and the `*` wildcard expands
//! to every element of the current container. Paths parse from
//! `/`-separated strings (`"results/energies/2"`) or are built from explicit
//! segments.
//!
//! Wildcard resolution follows the aggregation contract: elements for which
//! the remaining path fails are dropped rather than failing the whole
//! lookup, a nested wildcard expansion is flattened one level, and an
//! expansion with no surviving elements is a lookup error.

use std::fmt;

use super::Value;
use crate::{Error, Result};

/// One component of a [`DataPath`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Mapping key.
    Key(String),
    /// Sequence (or flat typed-array) index.
    Index(usize),
    /// Expansion over every element of the current container.
    Wildcard,
}

/// A parsed lookup path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPath {
    segments: Vec<Segment>,
}

impl DataPath {
    /// Parse a `/`-separated path.
    ///
    /// Each piece becomes a key segment, except all-digit pieces (indices)
    /// and `*` (wildcard). A trailing empty piece is a no-op, so
    /// `"info/"` addresses the same location as `"info"`.
    #[must_use]
    pub fn parse(path: &str) -> Self {
        let segments = path
            .split('/')
            .map(|piece| {
                if piece == "*" {
                    Segment::Wildcard
                } else if !piece.is_empty() && piece.bytes().all(|b| b.is_ascii_digit()) {
                    piece
                        .parse::<usize>()
                        .map_or_else(|_| Segment::Key(piece.to_string()), Segment::Index)
                } else {
                    Segment::Key(piece.to_string())
                }
            })
            .collect();
        Self { segments }
    }

    /// Build a path from explicit segments.
    #[must_use]
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// The parsed segments.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Resolve this path against a value tree.
    ///
    /// # Errors
    ///
    /// Returns a lookup error when a non-wildcard segment does not resolve,
    /// or when a wildcard expansion ends up empty.
    pub fn lookup(&self, value: &Value) -> Result<Value> {
        match resolve(value, &self.segments) {
            Some(Resolved::Plain(v)) => Ok(v),
            Some(Resolved::Expanded(items)) if !items.is_empty() => Ok(Value::Seq(items)),
            _ => Err(Error::Lookup(format!("path \"{self}\" did not resolve"))),
        }
    }
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            match segment {
                Segment::Key(k) => write!(f, "{k}")?,
                Segment::Index(n) => write!(f, "{n}")?,
                Segment::Wildcard => write!(f, "*")?,
            }
        }
        Ok(())
    }
}

impl From<&str> for DataPath {
    fn from(path: &str) -> Self {
        Self::parse(path)
    }
}

enum Resolved {
    Plain(Value),
    Expanded(Vec<Value>),
}

fn resolve(value: &Value, segments: &[Segment]) -> Option<Resolved> {
    let Some((segment, rest)) = segments.split_first() else {
        return Some(Resolved::Plain(value.clone()));
    };

    match segment {
        Segment::Key(key) => {
            if key.is_empty() && rest.is_empty() {
                return Some(Resolved::Plain(value.clone()));
            }
            resolve(value.get(key)?, rest)
        }
        Segment::Index(index) => match value {
            Value::Seq(items) => resolve(items.get(*index)?, rest),
            Value::Array(array) => resolve(&Value::Float(array.get(*index)?), rest),
            _ => None,
        },
        Segment::Wildcard => {
            let elements: Vec<Value> = match value {
                Value::Map(map) => map.values().cloned().collect(),
                Value::Seq(items) => items.clone(),
                Value::Array(array) => array.data().iter().map(|&f| Value::Float(f)).collect(),
                _ => return None,
            };
            let mut expanded = Vec::new();
            for element in &elements {
                match resolve(element, rest) {
                    // A failing element is dropped, not an error.
                    None => {}
                    Some(Resolved::Plain(v)) => expanded.push(v),
                    // A nested expansion flattens one level.
                    Some(Resolved::Expanded(items)) => expanded.extend(items),
                }
            }
            Some(Resolved::Expanded(expanded))
        }
    }
}
