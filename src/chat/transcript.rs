//! Per-user chat transcripts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// One user's conversation.
///
/// Cloning shares the underlying transcript.
#[derive(Debug, Clone)]
pub struct Transcript {
    inner: Arc<TranscriptInner>,
}

#[derive(Debug)]
struct TranscriptInner {
    owner: String,
    messages: RwLock<Vec<ChatMessage>>,
    last_activity: RwLock<DateTime<Utc>>,
    /// Set while an assistant reply is being streamed.
    replying: AtomicBool,
}

impl Transcript {
    fn new(owner: String) -> Self {
        Self {
            inner: Arc::new(TranscriptInner {
                owner,
                messages: RwLock::new(Vec::new()),
                last_activity: RwLock::new(Utc::now()),
                replying: AtomicBool::new(false),
            }),
        }
    }

    /// User id this transcript belongs to.
    pub fn owner(&self) -> &str {
        &self.inner.owner
    }

    pub fn push(&self, message: ChatMessage) {
        self.inner
            .messages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
        self.touch();
    }

    /// Append a user message unless a reply is streaming.
    ///
    /// Returns `false` and leaves the transcript untouched while a
    /// [`ReplyGuard`] is held, so a reply always follows the message it
    /// answers.
    pub fn push_user(&self, message: ChatMessage) -> bool {
        let mut messages = self
            .inner
            .messages
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if self.inner.replying.load(Ordering::Acquire) {
            return false;
        }
        messages.push(message);
        drop(messages);
        self.touch();
        true
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.inner
            .messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner
            .messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the last message is from the user and has no reply yet.
    pub fn awaiting_reply(&self) -> bool {
        self.inner
            .messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .is_some_and(|message| message.role == Role::User)
    }

    /// Claim the pending user message for a reply.
    ///
    /// Returns `None` when nothing awaits a reply or another reply is in
    /// flight. Dropping the guard without [`ReplyGuard::finish`] releases the
    /// claim so the message can be answered again.
    pub fn begin_reply(&self) -> Option<ReplyGuard> {
        // Held across the claim so a concurrent `push_user` sees it.
        let messages = self
            .inner
            .messages
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !messages.last().is_some_and(|message| message.role == Role::User) {
            return None;
        }
        self.inner
            .replying
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        drop(messages);
        Some(ReplyGuard {
            transcript: self.clone(),
        })
    }

    fn touch(&self) {
        *self
            .inner
            .last_activity
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Utc::now();
    }

    pub fn is_expired_with_timeout(&self, timeout: Duration) -> bool {
        if self.inner.replying.load(Ordering::Acquire) {
            return false;
        }
        let last = *self
            .inner
            .last_activity
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        // Negative means clock skew.
        (Utc::now() - last)
            .to_std()
            .is_ok_and(|idle| idle > timeout)
    }
}

/// Exclusive right to append the assistant reply to a transcript.
#[derive(Debug)]
pub struct ReplyGuard {
    transcript: Transcript,
}

impl ReplyGuard {
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Append the reply (if any) and release the claim.
    pub fn finish(self, reply: Option<ChatMessage>) {
        if let Some(message) = reply {
            self.transcript.push(message);
        }
    }
}

impl Drop for ReplyGuard {
    fn drop(&mut self) {
        self.transcript
            .inner
            .replying
            .store(false, Ordering::Release);
    }
}

/// Thread-safe map of transcripts keyed by user id.
#[derive(Debug, Clone)]
pub struct ChatStore {
    inner: Arc<RwLock<HashMap<String, Transcript>>>,
    idle_timeout: Duration,
}

impl ChatStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            idle_timeout,
        }
    }

    pub fn get(&self, user_id: &str) -> Option<Transcript> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
    }

    pub fn get_or_create(&self, user_id: &str) -> Transcript {
        if let Some(transcript) = self.get(user_id) {
            return transcript;
        }
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user_id.to_string())
            .or_insert_with(|| Transcript::new(user_id.to_string()))
            .clone()
    }

    pub fn remove(&self, user_id: &str) -> Option<Transcript> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user_id)
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop transcripts idle for longer than the configured timeout.
    ///
    /// Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|_, transcript| !transcript.is_expired_with_timeout(self.idle_timeout));
        before - guard.len()
    }
}
