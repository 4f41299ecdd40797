//! Recursive character-boundary text splitting.
//!
//! Chunks are byte ranges of the source text. Each chunk ends on the
//! strongest separator available inside its size window (paragraph, line,
//! sentence, word) and falls back to a hard cut. The next chunk starts up to
//! `chunk_overlap` characters before the previous end, aligned to a word start
//! when one exists in the overlap window.

use std::ops::Range;

use super::types::{DocumentChunk, Metadata};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

const SEPARATORS: [&str; 7] = ["\n\n", "\n", ". ", "! ", "? ", "; ", " "];

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl TextSplitter {
    /// Sizes are in characters. The overlap is capped at half the chunk size.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size / 2),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split every document and merge `overlay` onto each produced chunk.
    ///
    /// Overlay values win over inherited ones. Whitespace-only pieces are
    /// dropped, so no returned chunk is empty.
    pub fn split_documents(&self, documents: &[DocumentChunk], overlay: &Metadata) -> Vec<DocumentChunk> {
        let mut chunks = Vec::new();
        for document in documents {
            for span in self.split_spans(&document.text) {
                let piece = &document.text[span];
                if piece.trim().is_empty() {
                    continue;
                }
                let mut metadata = document.metadata.clone();
                metadata.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
                chunks.push(DocumentChunk::new(piece, metadata));
            }
        }
        chunks
    }

    /// Byte ranges of the chunks of `text`, in order.
    pub fn split_spans(&self, text: &str) -> Vec<Range<usize>> {
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(idx, _)| idx)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = bounds.len() - 1;
        if total == 0 {
            return Vec::new();
        }

        let mut spans = Vec::new();
        let mut start = 0;
        loop {
            if total - start <= self.chunk_size {
                spans.push(bounds[start]..text.len());
                break;
            }
            let end = self.break_point(text, &bounds, start);
            spans.push(bounds[start]..bounds[end]);
            start = self.overlap_start(text, &bounds, end);
        }
        spans
    }

    /// Char index where the chunk starting at `start` should end.
    fn break_point(&self, text: &str, bounds: &[usize], start: usize) -> usize {
        let hard_end = start + self.chunk_size;
        // the next chunk must start strictly after `start`
        let floor = bounds[start + self.chunk_overlap + 1];
        let base = bounds[start];
        let window = &text[base..bounds[hard_end]];

        for separator in SEPARATORS {
            if let Some(idx) = window.rfind(separator) {
                let cut = base + idx + separator.len();
                if cut >= floor {
                    return bounds.binary_search(&cut).unwrap_or_else(|idx| idx);
                }
            }
        }
        hard_end
    }

    /// Char index where the chunk following one that ends at `end` starts.
    fn overlap_start(&self, text: &str, bounds: &[usize], end: usize) -> usize {
        let earliest = end - self.chunk_overlap;
        for position in earliest..end {
            let previous = &text[bounds[position - 1]..bounds[position]];
            let current = &text[bounds[position]..bounds[position + 1]];
            let at_word_start = previous.chars().all(char::is_whitespace)
                && !current.chars().all(char::is_whitespace);
            if at_word_start {
                return position;
            }
        }
        earliest
    }
}
