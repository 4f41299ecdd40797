use lopdf::Document;

use crate::rag::error::{RagError, Result};
use crate::rag::types::{DocumentChunk, Metadata, KEY_PAGE_NUMBER};

/// Extract one document per non-empty page.
pub fn load_pdf(bytes: &[u8]) -> Result<Vec<DocumentChunk>> {
    let document =
        Document::load_mem(bytes).map_err(|e| RagError::Load(format!("invalid PDF: {e}")))?;

    let mut pages = Vec::new();
    for page_number in document.get_pages().into_keys() {
        let text = match document.extract_text(&[page_number]) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(page_number, "Skipping unreadable PDF page: {}", err);
                continue;
            }
        };
        if text.trim().is_empty() {
            continue;
        }

        let mut metadata = Metadata::new();
        metadata.insert(KEY_PAGE_NUMBER.to_string(), (page_number as i64).into());
        pages.push(DocumentChunk::new(text, metadata));
    }

    tracing::debug!(page_count = pages.len(), "Loaded PDF");
    Ok(pages)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_one_document_per_page() {
        let bytes = fixtures::pdf_with_pages(&["Alpha page", "Beta page", "Gamma page"]);
        let pages = load_pdf(&bytes).unwrap();

        assert_eq!(pages.len(), 3);
        assert!(pages[0].text.contains("Alpha"));
        assert!(pages[2].text.contains("Gamma"));
        let numbers: Vec<i64> = pages
            .iter()
            .filter_map(|p| p.meta_i64(KEY_PAGE_NUMBER))
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        for page in &pages {
            assert_eq!(page.metadata.len(), 1);
        }
    }

    #[test]
    fn corrupt_bytes_are_a_load_error() {
        let err = load_pdf(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, RagError::Load(_)));
    }
}
