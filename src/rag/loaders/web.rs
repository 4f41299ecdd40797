use std::time::Duration;

use reqwest::{Client, Url};
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};

use crate::rag::error::{RagError, Result};
use crate::rag::types::{DocumentChunk, Metadata, KEY_SOURCE};

/// Main-content selectors, most specific first. `body` is the fallback.
pub const CONTENT_SELECTORS: [&str; 4] = [
    "main#content article",
    "article#wikiArticle",
    "main#content",
    "body",
];

const SKIPPED_TAGS: [&str; 5] = ["script", "style", "noscript", "template", "svg"];

#[derive(Clone)]
pub struct WebLoader {
    client: Client,
}

impl WebLoader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ragdesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RagError::Load(e.to_string()))?;
        Ok(Self { client })
    }

    /// Fetch `url` and return its main content as a single document.
    pub async fn load(&self, url: &str) -> Result<Vec<DocumentChunk>> {
        let parsed = parse_http_url(url)?;

        let response = self
            .client
            .get(parsed.clone())
            .send()
            .await
            .map_err(|e| RagError::Load(format!("failed to fetch {parsed}: {e}")))?;
        if !response.status().is_success() {
            return Err(RagError::Load(format!(
                "failed to fetch {parsed}: HTTP {}",
                response.status()
            )));
        }
        let html = response
            .text()
            .await
            .map_err(|e| RagError::Load(format!("failed to read {parsed}: {e}")))?;

        let text = extract_main_text(&html);
        if text.is_empty() {
            tracing::warn!(url = %parsed, "Fetched page has no readable content");
            return Ok(Vec::new());
        }

        let mut metadata = Metadata::new();
        metadata.insert(KEY_SOURCE.to_string(), url.into());
        Ok(vec![DocumentChunk::new(text, metadata)])
    }
}

pub(crate) fn parse_http_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| RagError::Validation(format!("Invalid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(RagError::Validation(format!(
            "Unsupported URL scheme: {other}"
        ))),
    }
}

/// Text of the first content selector that yields anything readable.
pub fn extract_main_text(html: &str) -> String {
    let document = Html::parse_document(html);
    for raw in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        let text = document
            .select(&selector)
            .map(element_text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if !text.is_empty() {
            return text;
        }
    }
    String::new()
}

fn element_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    for node in element.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|el| SKIPPED_TAGS.contains(&el.name()))
                .unwrap_or(false)
        });
        if !hidden {
            raw.push_str(text);
        }
    }

    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
