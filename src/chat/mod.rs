//! Chat hook: owns transcript state, submission and reply streaming.
//!
//! The browser only renders; every message lives in the [`ChatStore`]. A
//! submission appends the user message, and the reply stream posts the full
//! transcript to the backend and relays the answer as [`ChatEvent`]s.

mod stream;
mod transcript;

pub use stream::{StreamDecoder, StreamFormat, StreamPart};
pub use transcript::{ChatMessage, ChatStore, ReplyGuard, Role, Transcript};

use std::sync::Arc;

use async_stream::stream;
use futures::{Stream, StreamExt};
use reqwest::Method;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::backend::{
    BackendClient, BackendError, RequestOptions, RequestSession, call_backend_server,
    error_for_status,
};

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Message must not be empty")]
    EmptyMessage,

    #[error("A reply is still streaming")]
    ReplyInProgress,
}

/// Events relayed to the page while a reply streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Delta(String),
    Error(String),
    /// Stream finished; carries the stored reply when there was one.
    Done(Option<ChatMessage>),
}

#[derive(Debug, Clone)]
pub struct ChatHook {
    store: ChatStore,
    backend: Arc<BackendClient>,
    endpoint: String,
}

impl ChatHook {
    pub fn new(store: ChatStore, backend: Arc<BackendClient>, endpoint: impl Into<String>) -> Self {
        Self {
            store,
            backend,
            endpoint: endpoint.into(),
        }
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    /// Messages for a user, oldest first.
    pub fn transcript(&self, user_id: &str) -> Vec<ChatMessage> {
        self.store
            .get(user_id)
            .map(|transcript| transcript.messages())
            .unwrap_or_default()
    }

    /// Append a user message. Rejected while a reply is streaming.
    pub fn submit(&self, user_id: &str, text: &str) -> Result<ChatMessage, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let removed = self.store.cleanup_expired();
        if removed > 0 {
            info!(name: "chat.transcripts.expired", count = removed, "Dropped idle transcripts");
        }

        let message = ChatMessage::user(text);
        if !self.store.get_or_create(user_id).push_user(message.clone()) {
            return Err(ChatError::ReplyInProgress);
        }
        Ok(message)
    }

    /// Stream the assistant reply to the pending user message.
    ///
    /// Every stream ends with `Done`, so the page never reconnects. `Done(None)`
    /// comes straight away when nothing awaits a reply or a reply is already
    /// streaming. Whatever text arrived before a transport error is stored.
    pub fn stream_reply(
        &self,
        session: RequestSession,
    ) -> impl Stream<Item = ChatEvent> + Send + 'static + use<> {
        let hook = self.clone();

        stream! {
            let Some(user_id) = session.user().map(|user| user.id.clone()) else {
                yield ChatEvent::Error(BackendError::NotAuthenticated.to_string());
                yield ChatEvent::Done(None);
                return;
            };

            let transcript = hook.store.get_or_create(&user_id);
            let Some(guard) = transcript.begin_reply() else {
                yield ChatEvent::Done(None);
                return;
            };

            let body = json!({ "messages": transcript.messages() });
            let options = match RequestOptions::new().method(Method::POST).json(&body) {
                Ok(options) => options,
                Err(e) => {
                    yield ChatEvent::Error(e.to_string());
                    yield ChatEvent::Done(None);
                    return;
                }
            };

            let response = match call_backend_server(&hook.backend, &session, &hook.endpoint, options).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(name: "chat.backend.failed", error = %e, "Chat request failed");
                    yield ChatEvent::Error(e.to_string());
                    yield ChatEvent::Done(None);
                    return;
                }
            };

            let response = match error_for_status(response).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(name: "chat.backend.status", error = %e, "Chat backend returned an error");
                    yield ChatEvent::Error(e.to_string());
                    yield ChatEvent::Done(None);
                    return;
                }
            };

            let mut decoder = StreamDecoder::new(StreamFormat::from_headers(response.headers()));
            let mut content = String::new();
            let mut chunks = response.bytes_stream();

            while let Some(chunk) = chunks.next().await {
                let parts = match chunk {
                    Ok(bytes) => decoder.push(&bytes),
                    Err(e) => {
                        warn!(name: "chat.stream.interrupted", error = %e, "Reply stream interrupted");
                        yield ChatEvent::Error(e.to_string());
                        break;
                    }
                };
                for part in parts {
                    match part {
                        StreamPart::Text(text) => {
                            content.push_str(&text);
                            yield ChatEvent::Delta(text);
                        }
                        StreamPart::Error(message) => yield ChatEvent::Error(message),
                    }
                }
            }

            for part in decoder.finish() {
                match part {
                    StreamPart::Text(text) => {
                        content.push_str(&text);
                        yield ChatEvent::Delta(text);
                    }
                    StreamPart::Error(message) => yield ChatEvent::Error(message),
                }
            }

            let reply = (!content.is_empty()).then(|| ChatMessage::assistant(content));
            guard.finish(reply.clone());
            info!(name: "chat.reply.stored", user = %user_id, stored = reply.is_some(), "Reply finished");
            yield ChatEvent::Done(reply);
        }
    }
}
