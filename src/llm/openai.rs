use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::core::config::LlmConfig;
use crate::core::errors::ApiError;
use super::provider::{EmbeddingProvider, LlmProvider, TokenStream};
use super::types::ChatRequest;

/// OpenAI-compatible client serving both chat completions and embeddings.
#[derive(Clone)]
pub struct OpenAiProvider {
    base_url: String,
    api_key: Option<String>,
    chat_model: String,
    embedding_model: String,
    dimensions: usize,
    request_timeout: Duration,
    client: Client,
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

impl OpenAiProvider {
    /// Blocking calls are bounded by `request_timeout_secs` end to end. Streams
    /// only by the gap between reads, so long completions are not cut off.
    pub fn new(config: &LlmConfig, dimensions: usize) -> Result<Self, ApiError> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(request_timeout))
            .read_timeout(request_timeout)
            .build()
            .map_err(ApiError::internal)?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|key| !key.trim().is_empty()),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            dimensions,
            request_timeout,
            client,
        })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let request = self.client.post(format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn completion_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": self.chat_model,
            "messages": request.messages,
            "stream": stream,
        });
        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
        }
        body
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

async fn upstream_error(context: &str, res: reqwest::Response) -> ApiError {
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    tracing::error!(%status, "{} failed", context);
    ApiError::Internal(format!("{context} returned {status}: {detail}"))
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
        let body = self.completion_body(&request, false);
        let res = self
            .post("/chat/completions")
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            return Err(upstream_error("chat completion", res).await);
        }

        let payload: Value = res.json().await.map_err(ApiError::internal)?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(content)
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<TokenStream, ApiError> {
        let body = self.completion_body(&request, true);
        let res = self
            .post("/chat/completions")
            .json(&body)
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            return Err(upstream_error("chat stream", res).await);
        }

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            let mut decoder = SseDecoder::default();
            loop {
                let item = tokio::select! {
                    _ = tx.closed() => {
                        tracing::debug!("stream receiver dropped; aborting completion");
                        return;
                    }
                    item = stream.next() => item,
                };
                let Some(item) = item else {
                    return;
                };
                let bytes = match item {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(Err(ApiError::internal(e))).await;
                        return;
                    }
                };
                for event in decoder.push(&bytes) {
                    match event {
                        SseEvent::Delta(content) => {
                            if tx.send(Ok(content)).await.is_err() {
                                tracing::debug!("stream receiver dropped; aborting completion");
                                return;
                            }
                        }
                        SseEvent::Done => return,
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(batch_size = inputs.len(), model = %self.embedding_model, "embedding batch");

        let res = self
            .post("/embeddings")
            .timeout(self.request_timeout)
            .json(&EmbeddingRequest {
                model: &self.embedding_model,
                input: inputs,
            })
            .send()
            .await
            .map_err(ApiError::internal)?;

        if !res.status().is_success() {
            return Err(upstream_error("embedding request", res).await);
        }

        let mut payload: EmbeddingResponse = res.json().await.map_err(ApiError::internal)?;
        if payload.data.len() != inputs.len() {
            return Err(ApiError::Internal(format!(
                "embedding service returned {} vectors for {} inputs",
                payload.data.len(),
                inputs.len()
            )));
        }
        payload
            .data
            .sort_by_key(|item| item.index.unwrap_or(usize::MAX));
        Ok(payload.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[derive(Debug, PartialEq)]
enum SseEvent {
    Delta(String),
    Done,
}

/// Line-buffered decoder for `data:` events of a streamed completion.
///
/// Network chunks may split lines (and UTF-8 sequences) anywhere, so bytes are
/// held until a full line is available.
#[derive(Default)]
struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim_start();
            if data == "[DONE]" {
                events.push(SseEvent::Done);
                break;
            }
            if let Ok(json) = serde_json::from_str::<Value>(data) {
                if let Some(content) = json["choices"][0]["delta"]["content"].as_str() {
                    if !content.is_empty() {
                        events.push(SseEvent::Delta(content.to_string()));
                    }
                }
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use axum::body::Body;
    use futures_util::stream;

    /// Flips when the upstream response body is dropped.
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    async fn serve(app: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// Completion endpoint that sends one delta and then never finishes.
    async fn stalling_upstream(closed: Arc<AtomicBool>) -> String {
        let app = axum::Router::new().route(
            "/chat/completions",
            axum::routing::post(move || {
                let flag = DropFlag(closed.clone());
                async move {
                    let first = delta_line("hi");
                    let body = stream::once(async move { Ok::<_, std::io::Error>(first) })
                        .chain(stream::pending())
                        .map(move |item| {
                            let _alive = &flag;
                            item
                        });
                    Body::from_stream(body)
                }
            }),
        );
        serve(app).await
    }

    /// Completion endpoint that trickles `parts` with `gap` between them.
    async fn slow_upstream(parts: Vec<&'static str>, gap: Duration) -> String {
        let app = axum::Router::new().route(
            "/chat/completions",
            axum::routing::post(move || {
                let parts = parts.clone();
                async move {
                    let mut lines: Vec<String> = parts.into_iter().map(delta_line).collect();
                    lines.push("data: [DONE]\n\n".to_string());
                    let body = stream::iter(lines).then(move |line| async move {
                        tokio::time::sleep(gap).await;
                        Ok::<_, std::io::Error>(line)
                    });
                    Body::from_stream(body)
                }
            }),
        );
        serve(app).await
    }

    fn provider(base_url: String, request_timeout_secs: u64) -> OpenAiProvider {
        let config = LlmConfig {
            base_url,
            request_timeout_secs,
            ..LlmConfig::default()
        };
        OpenAiProvider::new(&config, 8).unwrap()
    }

    fn hello() -> ChatRequest {
        ChatRequest::new(vec![crate::llm::ChatMessage::user("hello")])
    }

    #[tokio::test]
    async fn dropping_the_receiver_releases_a_stalled_upstream() {
        let closed = Arc::new(AtomicBool::new(false));
        let base_url = stalling_upstream(closed.clone()).await;
        let provider = provider(base_url, 120);

        let mut rx = provider.stream_chat(hello()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().unwrap(), "hi");
        drop(rx);

        for _ in 0..50 {
            if closed.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn streams_may_outlive_the_request_timeout() {
        let base_url = slow_upstream(vec!["a", "b", "c", "d"], Duration::from_millis(400)).await;
        let provider = provider(base_url, 1);

        let mut rx = provider.stream_chat(hello()).await.unwrap();
        let mut text = String::new();
        while let Some(part) = rx.recv().await {
            text.push_str(&part.unwrap());
        }
        assert_eq!(text, "abcd");
    }

    fn delta_line(content: &str) -> String {
        format!(
            "data: {}\n\n",
            json!({ "choices": [{ "delta": { "content": content } }] })
        )
    }

    #[test]
    fn decodes_deltas_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        let stream = format!("{}{}data: [DONE]\n\n", delta_line("Hel"), delta_line("lo"));
        let (a, b) = stream.as_bytes().split_at(17);

        let mut events = decoder.push(a);
        events.extend(decoder.push(b));
        assert_eq!(
            events,
            vec![
                SseEvent::Delta("Hel".into()),
                SseEvent::Delta("lo".into()),
                SseEvent::Done
            ]
        );
    }

    #[test]
    fn keeps_multibyte_characters_intact() {
        let mut decoder = SseDecoder::default();
        let line = delta_line("日本");
        let bytes = line.as_bytes();
        let cut = line.find('日').map(|i| i + 1).unwrap();

        assert!(decoder.push(&bytes[..cut]).is_empty());
        assert_eq!(decoder.push(&bytes[cut..]), vec![SseEvent::Delta("日本".into())]);
    }

    #[test]
    fn ignores_comments_and_role_only_deltas() {
        let mut decoder = SseDecoder::default();
        let role = format!(
            "data: {}\n",
            json!({ "choices": [{ "delta": { "role": "assistant" } }] })
        );
        let input = format!(": keep-alive\n{role}event: ping\n");
        assert!(decoder.push(input.as_bytes()).is_empty());
    }

    #[test]
    fn request_body_carries_model_and_options() {
        let config = LlmConfig::default();
        let provider = OpenAiProvider::new(&config, 8).unwrap();
        let request = ChatRequest::new(vec![crate::llm::ChatMessage::user("hi")])
            .with_temperature(Some(0.2));
        let body = provider.completion_body(&request, true);
        assert_eq!(body["model"], config.chat_model);
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["temperature"], 0.2);
        assert!(body.get("max_tokens").is_none());
    }
}
