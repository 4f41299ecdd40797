use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use serde_json::json;

use crate::chat::{ChatMode, ChatOutcome};
use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, Role, TokenStream};
use crate::rag::CollectionKey;
use crate::state::AppState;

use super::utils::non_blank;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub collection_name: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

impl ChatBody {
    /// Split into the query and the turns before it.
    ///
    /// An explicit `message` wins; otherwise the last user entry of
    /// `messages` is the query.
    fn into_turns(self) -> Result<(String, Vec<ChatMessage>), ApiError> {
        if let Some(message) = non_blank(&[self.message.as_deref()]) {
            return Ok((message.to_string(), self.messages));
        }
        let mut history = self.messages;
        let last_user = history
            .iter()
            .rposition(|m| m.role == Role::User && !m.content.trim().is_empty())
            .ok_or_else(|| ApiError::bad_request("Message is required."))?;
        let query = history.remove(last_user).content;
        history.truncate(last_user);
        Ok((query, history))
    }
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ChatBody>,
) -> Result<Response, ApiError> {
    let tenant = state.auth.authorize(&headers)?;
    let collection = non_blank(&[payload.collection.as_deref(), payload.collection_name.as_deref()])
        .ok_or_else(|| ApiError::bad_request("Collection name is required."))?;
    let key = CollectionKey::new(tenant, collection)?;

    let mode = if payload.stream {
        ChatMode::Streaming
    } else {
        ChatMode::Blocking
    };
    let (query, history) = payload.into_turns()?;

    match state.chat.answer(&query, &history, &key, mode).await? {
        ChatOutcome::Complete(answer) => Ok(Json(json!({
            "success": true,
            "answerText": answer.text,
            "citations": answer.citations,
            "collection": key.logical(),
            "degraded": answer.degraded.is_some(),
        }))
        .into_response()),
        ChatOutcome::Stream(tokens) => Ok((
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            Body::from_stream(token_stream(tokens)),
        )
            .into_response()),
    }
}

/// Forward tokens until the completion ends. Dropping the response body drops
/// the receiver, which stops the upstream task.
fn token_stream(tokens: TokenStream) -> impl Stream<Item = Result<String, ApiError>> {
    stream::unfold(tokens, |mut tokens| async move {
        let item = tokens.recv().await?;
        if let Err(err) = &item {
            tracing::warn!("Chat stream aborted: {}", err);
        }
        Some((item, tokens))
    })
}
