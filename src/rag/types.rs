//! Documents, chunks and their metadata.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const KEY_SOURCE: &str = "source";
pub const KEY_PAGE_NUMBER: &str = "pageNumber";
pub const KEY_ROW: &str = "row";
pub const KEY_FILE: &str = "file";
pub const KEY_FILENAME: &str = "filename";
pub const KEY_UPLOAD_DATE: &str = "uploadDate";
pub const KEY_INDEX_DATE: &str = "indexDate";
pub const KEY_USER_ID: &str = "userId";

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetaValue::Integer(n) => Some(*n),
            MetaValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            MetaValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Bool(b) => write!(f, "{b}"),
            MetaValue::Integer(n) => write!(f, "{n}"),
            MetaValue::Float(x) => write!(f, "{x}"),
            MetaValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Text(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Integer(value)
    }
}

impl From<usize> for MetaValue {
    fn from(value: usize) -> Self {
        MetaValue::Integer(value as i64)
    }
}

/// Open mapping of metadata keys to scalar values.
pub type Metadata = BTreeMap<String, MetaValue>;

/// A slice of text plus the metadata describing where it came from.
///
/// Loaders produce one per page/row/page-body; the splitter refines them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub text: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl DocumentChunk {
    pub fn new(text: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(MetaValue::as_str)
    }

    pub fn meta_i64(&self, key: &str) -> Option<i64> {
        self.metadata.get(key).and_then(MetaValue::as_i64)
    }
}

/// A chunk returned by a search, with its relevance score.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}
