//! Format-specific adapters turning uploads and web pages into documents.
//!
//! Every loader returns `(text, metadata)` pairs as `DocumentChunk`s with
//! the metadata keys of its source type populated:
//! - PDF: `pageNumber` (1-based)
//! - CSV: `row` (1-based) and `file`
//! - URL: `source`

mod pdf;
mod tabular;
mod web;

pub use pdf::load_pdf;
pub use tabular::load_csv;
pub use web::{extract_main_text, WebLoader, CONTENT_SELECTORS};

#[cfg(test)]
pub(crate) use pdf::fixtures;

use super::error::{RagError, Result};

/// Upload size cap applied before any parsing.
pub const MAX_UPLOAD_BYTES: usize = 1_048_576;

/// The kind of input an ingestion call starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Pdf,
    Csv,
    Url,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Pdf => "pdf",
            SourceKind::Csv => "csv",
            SourceKind::Url => "url",
        }
    }

    /// Logical collection used when the caller does not name one.
    pub fn default_collection(&self) -> &'static str {
        match self {
            SourceKind::Pdf => "pdf-collection",
            SourceKind::Csv => "csv-collection",
            SourceKind::Url => "url-collection",
        }
    }
}

pub fn ensure_within_limit(bytes: &[u8], limit: usize) -> Result<()> {
    if bytes.len() > limit {
        return Err(RagError::PayloadTooLarge {
            limit,
            actual: bytes.len(),
        });
    }
    Ok(())
}
