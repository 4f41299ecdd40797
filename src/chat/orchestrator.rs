use std::sync::Arc;

use tracing::{info, warn};

use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider, Role, TokenStream};
use crate::rag::{CollectionKey, Retrieval, RetrievalPipeline, RetrievedChunk};
use super::prompt::{self, Citation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatMode {
    Blocking,
    Streaming,
}

/// Why the grounded prompt was replaced by the fallback prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degraded {
    MissingCollection,
    RetrievalUnavailable,
    NoRelevantChunks,
}

#[derive(Debug, Clone)]
pub struct ChatAnswer {
    pub text: String,
    pub citations: Vec<Citation>,
    pub degraded: Option<Degraded>,
}

pub enum ChatOutcome {
    Complete(ChatAnswer),
    Stream(TokenStream),
}

#[derive(Clone)]
pub struct ChatOrchestrator {
    pipeline: RetrievalPipeline,
    llm: Arc<dyn LlmProvider>,
}

enum Grounding {
    Context(Vec<RetrievedChunk>),
    Fallback(Degraded),
}

impl ChatOrchestrator {
    pub fn new(pipeline: RetrievalPipeline, llm: Arc<dyn LlmProvider>) -> Self {
        Self { pipeline, llm }
    }

    /// Answer `query` grounded on `key`, given the earlier turns in `history`.
    pub async fn answer(
        &self,
        query: &str,
        history: &[ChatMessage],
        key: &CollectionKey,
        mode: ChatMode,
    ) -> Result<ChatOutcome, ApiError> {
        let grounding = self.ground(query, key).await;
        let first_turn = !history.iter().any(|m| m.role == Role::Assistant);

        let system = match &grounding {
            Grounding::Context(chunks) => {
                prompt::system_prompt(&prompt::build_context(chunks), first_turn)
            }
            Grounding::Fallback(reason) => {
                warn!(collection = %key, reason = ?reason, "Answering with fallback prompt");
                prompt::FALLBACK_PROMPT.to_string()
            }
        };

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(history.iter().filter(|m| m.role != Role::System).cloned());
        messages.push(ChatMessage::user(query));
        let request = ChatRequest::new(messages);

        match mode {
            ChatMode::Streaming => {
                let stream = self.llm.stream_chat(request).await?;
                Ok(ChatOutcome::Stream(stream))
            }
            ChatMode::Blocking => {
                let text = self.llm.chat(request).await?;
                let (citations, degraded) = match grounding {
                    Grounding::Context(_) if prompt::is_unsure(&text) => (Vec::new(), None),
                    Grounding::Context(chunks) => (prompt::citations(&chunks), None),
                    Grounding::Fallback(reason) => (Vec::new(), Some(reason)),
                };
                info!(
                    collection = %key,
                    citations = citations.len(),
                    provider = self.llm.name(),
                    "Chat answered"
                );
                Ok(ChatOutcome::Complete(ChatAnswer {
                    text,
                    citations,
                    degraded,
                }))
            }
        }
    }

    async fn ground(&self, query: &str, key: &CollectionKey) -> Grounding {
        match self.pipeline.gateway().exists(key).await {
            Ok(true) => {}
            Ok(false) => return Grounding::Fallback(Degraded::MissingCollection),
            Err(err) => {
                warn!(collection = %key, "Collection lookup failed: {}", err);
            }
        }
        match self.pipeline.retrieve(query, key).await {
            Retrieval::Found(chunks) if chunks.is_empty() => {
                Grounding::Fallback(Degraded::NoRelevantChunks)
            }
            Retrieval::Found(chunks) => Grounding::Context(chunks),
            Retrieval::Unavailable => Grounding::Fallback(Degraded::RetrievalUnavailable),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedLlm;
    use super::*;
    use crate::chat::prompt::{FALLBACK_PROMPT, UNSURE_SENTINEL};
    use crate::rag::gateway::testing::LetterEmbedder;
    use crate::rag::pipeline::testing::pipeline;
    use crate::rag::{InMemoryVectorStore, TenantId};

    struct Fixture {
        orchestrator: ChatOrchestrator,
        llm: Arc<ScriptedLlm>,
        pipeline: RetrievalPipeline,
    }

    fn fixture(reply: &str, embedder: LetterEmbedder) -> Fixture {
        let pipeline = pipeline(Arc::new(InMemoryVectorStore::new()), Arc::new(embedder));
        let llm = Arc::new(ScriptedLlm::new(reply));
        Fixture {
            orchestrator: ChatOrchestrator::new(pipeline.clone(), llm.clone()),
            llm,
            pipeline,
        }
    }

    fn key(name: &str) -> CollectionKey {
        CollectionKey::new(Some(TenantId::new("alice").unwrap()), name).unwrap()
    }

    async fn blocking(f: &Fixture, query: &str, history: &[ChatMessage], name: &str) -> ChatAnswer {
        match f
            .orchestrator
            .answer(query, history, &key(name), ChatMode::Blocking)
            .await
            .unwrap()
        {
            ChatOutcome::Complete(answer) => answer,
            ChatOutcome::Stream(_) => panic!("expected a complete answer"),
        }
    }

    #[tokio::test]
    async fn grounded_answer_cites_retrieved_chunks() {
        let f = fixture("Rust was released in 2015 (Page 1, spec.pdf).", LetterEmbedder::default());
        f.pipeline
            .store_text("rust stable release date", &key("docs"))
            .await
            .unwrap();

        let answer = blocking(&f, "when was rust released", &[], "docs").await;
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].chunk_index, 1);
        assert!(answer.degraded.is_none());

        let system = f.llm.last_system_prompt();
        assert!(system.contains("Chunk 1 (Source: manual):\nrust stable release date"));
        assert!(system.contains(UNSURE_SENTINEL));
        assert!(system.contains("greet the user positively"));
    }

    #[tokio::test]
    async fn unsure_reply_clears_citations() {
        let f = fixture("\"Unsure about answer\"", LetterEmbedder::default());
        f.pipeline.store_text("something unrelated", &key("docs")).await.unwrap();

        let answer = blocking(&f, "what is X", &[], "docs").await;
        assert_eq!(answer.text, "\"Unsure about answer\"");
        assert!(answer.citations.is_empty());
    }

    #[tokio::test]
    async fn missing_collection_uses_fallback_prompt() {
        let f = fixture("Sorry, nothing found.", LetterEmbedder::default());
        let answer = blocking(&f, "anything", &[], "ghost").await;

        assert_eq!(answer.degraded, Some(Degraded::MissingCollection));
        assert!(answer.citations.is_empty());
        assert_eq!(f.llm.last_system_prompt(), FALLBACK_PROMPT);
    }

    #[tokio::test]
    async fn empty_collection_uses_fallback_prompt() {
        let f = fixture("Sorry.", LetterEmbedder::default());
        f.pipeline.gateway().ensure_collection(&key("empty")).await.unwrap();

        let answer = blocking(&f, "anything", &[], "empty").await;
        assert_eq!(answer.degraded, Some(Degraded::NoRelevantChunks));
        assert_eq!(f.llm.last_system_prompt(), FALLBACK_PROMPT);
    }

    #[tokio::test]
    async fn failing_retrieval_degrades_to_fallback() {
        let f = fixture(
            "Sorry.",
            LetterEmbedder {
                fail: true,
                ..LetterEmbedder::default()
            },
        );
        f.pipeline.gateway().ensure_collection(&key("docs")).await.unwrap();

        let answer = blocking(&f, "anything", &[], "docs").await;
        assert_eq!(answer.degraded, Some(Degraded::RetrievalUnavailable));
        assert!(answer.citations.is_empty());
        assert_eq!(f.llm.last_system_prompt(), FALLBACK_PROMPT);
    }

    #[tokio::test]
    async fn later_turns_skip_the_greeting_and_keep_history() {
        let f = fixture("ok", LetterEmbedder::default());
        f.pipeline.store_text("alpha beta", &key("docs")).await.unwrap();
        let history = vec![
            ChatMessage::system("client supplied"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("Hello!"),
        ];

        blocking(&f, "alpha?", &history, "docs").await;
        let requests = f.llm.requests.lock().unwrap();
        let messages = &requests[0].messages;
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert!(messages[0].content.contains("do not greet"));
        assert_eq!(messages[3].content, "alpha?");
    }

    #[tokio::test]
    async fn streaming_forwards_fragments() {
        let f = fixture("one two three", LetterEmbedder::default());
        f.pipeline.store_text("one", &key("docs")).await.unwrap();

        let outcome = f
            .orchestrator
            .answer("one?", &[], &key("docs"), ChatMode::Streaming)
            .await
            .unwrap();
        let ChatOutcome::Stream(mut rx) = outcome else {
            panic!("expected a stream");
        };
        let mut text = String::new();
        while let Some(fragment) = rx.recv().await {
            text.push_str(&fragment.unwrap());
        }
        assert_eq!(text, "one two three");
    }
}
