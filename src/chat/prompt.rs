//! System prompts, context rendering and citations.

use serde::Serialize;

use crate::rag::types::{
    RetrievedChunk, KEY_FILE, KEY_FILENAME, KEY_PAGE_NUMBER, KEY_ROW, KEY_SOURCE,
};

/// Exact reply the model is told to give when the context lacks the answer.
pub const UNSURE_SENTINEL: &str = "Unsure about answer";

pub const PREVIEW_CHARS: usize = 200;

/// Replaces the grounded prompt when nothing could be retrieved.
pub const FALLBACK_PROMPT: &str = "You are an AI assistant for a document question-answering app. \
No document context could be retrieved for this question: the selected collection may not exist, \
may be empty, or the document search is temporarily unavailable. \
Apologize briefly, say that you could not find relevant information in the selected collection, \
and suggest uploading a PDF, a CSV file or a website URL, or trying again later. \
Do not answer the question from general knowledge.";

/// Render retrieved chunks as numbered blocks prefixed with their metadata.
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, retrieved)| {
            let chunk = &retrieved.chunk;
            let mut header = format!("Chunk {}", i + 1);
            if let Some(page) = chunk.metadata.get(KEY_PAGE_NUMBER) {
                header.push_str(&format!(" (Page {page})"));
            }
            if let Some(source) = chunk.metadata.get(KEY_SOURCE) {
                header.push_str(&format!(" (Source: {source})"));
            }
            if let Some(row) = chunk.metadata.get(KEY_ROW) {
                match chunk.metadata.get(KEY_FILE) {
                    Some(file) => header.push_str(&format!(" (Row: {row}, File: {file})")),
                    None => header.push_str(&format!(" (Row: {row})")),
                }
            }
            if let Some(filename) = chunk.metadata.get(KEY_FILENAME) {
                header.push_str(&format!(" (File: {filename})"));
            }
            format!("{header}:\n{}", chunk.text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn system_prompt(context: &str, first_turn: bool) -> String {
    let greeting = if first_turn {
        "- This is the first reply of the conversation: greet the user positively before answering."
    } else {
        "- This is not the first reply: do not greet the user again."
    };
    format!(
        "You are an AI assistant who answers queries based ONLY on the given context.\n\
         {greeting}\n\
         - If the question is unrelated to the uploaded content, steer the conversation back to \
         uploading files or website URLs.\n\
         Always cite the source:\n\
         - For PDFs: include the page number and filename if available.\n\
         - For web documents: include the source URL.\n\
         - For CSVs: include the row number and filename.\n\
         \n\
         If the answer is not in the context, reply exactly:\n\
         \"{UNSURE_SENTINEL}\"\n\
         \n\
         Context:\n\
         {context}"
    )
}

/// Case-sensitive match after trimming whitespace and surrounding quotes.
pub fn is_unsure(reply: &str) -> bool {
    reply
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        == UNSURE_SENTINEL
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub chunk_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub content_preview: String,
}

pub fn citations(chunks: &[RetrievedChunk]) -> Vec<Citation> {
    chunks
        .iter()
        .enumerate()
        .map(|(i, retrieved)| {
            let chunk = &retrieved.chunk;
            Citation {
                chunk_index: i + 1,
                page_number: chunk.meta_i64(KEY_PAGE_NUMBER),
                source_url: chunk
                    .meta_str(KEY_SOURCE)
                    .filter(|source| is_web_url(source))
                    .map(str::to_string),
                row: chunk.meta_i64(KEY_ROW),
                filename: chunk
                    .meta_str(KEY_FILENAME)
                    .or_else(|| chunk.meta_str(KEY_FILE))
                    .map(str::to_string),
                content_preview: preview(&chunk.text),
            }
        })
        .collect()
}

/// Manual text carries `source = "manual"`, which is not a link.
fn is_web_url(source: &str) -> bool {
    reqwest::Url::parse(source)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
