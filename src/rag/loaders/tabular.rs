use crate::rag::error::{RagError, Result};
use crate::rag::types::{DocumentChunk, Metadata, KEY_FILE, KEY_ROW};

/// One document per data row, rendered as `header: value` lines.
pub fn load_csv(bytes: &[u8], filename: &str) -> Result<Vec<DocumentChunk>> {
    let mut reader = ::csv::ReaderBuilder::new()
        .flexible(true)
        .trim(::csv::Trim::All)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|e| RagError::Load(format!("invalid CSV header: {e}")))?
        .clone();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| RagError::Load(format!("invalid CSV row {}: {e}", index + 1)))?;

        let text = record
            .iter()
            .enumerate()
            .filter(|(_, value)| !value.is_empty())
            .map(|(column, value)| match headers.get(column) {
                Some(header) if !header.is_empty() => format!("{header}: {value}"),
                _ => value.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            continue;
        }

        let mut metadata = Metadata::new();
        metadata.insert(KEY_ROW.to_string(), (index + 1).into());
        metadata.insert(KEY_FILE.to_string(), filename.into());
        rows.push(DocumentChunk::new(text, metadata));
    }

    tracing::debug!(row_count = rows.len(), file = filename, "Loaded CSV");
    Ok(rows)
}
