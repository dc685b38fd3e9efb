//! Internal representation of a column path as a sequence of field names.

use std::fmt::{Display, Formatter};
use std::ops::Deref;

/// Provides a type-safe representation for the path from the schema root to
/// a node, used for error context in schema parsing, projection and
/// striping.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ColumnPath(Vec<String>);

impl Deref for ColumnPath {
    type Target = [String];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&[&str]> for ColumnPath {
    fn from(slice: &[&str]) -> Self {
        ColumnPath(slice.iter().map(|s| s.to_string()).collect())
    }
}

impl From<Vec<String>> for ColumnPath {
    fn from(vec: Vec<String>) -> Self {
        ColumnPath(vec)
    }
}

impl Display for ColumnPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.join("."))
        }
    }
}

impl ColumnPath {
    /// The empty path denoting the schema root.
    pub fn root() -> Self {
        ColumnPath::default()
    }

    /// Checks if path represents the root (is empty)
    pub fn is_root(&self) -> bool {
        self.is_empty()
    }

    /// Creates a new `ColumnPath` by appending a field name.
    pub fn child(&self, name: &str) -> Self {
        let mut components = self.0.clone();
        components.push(name.to_string());
        ColumnPath(components)
    }
}
