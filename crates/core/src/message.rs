//! Messages and the transcript store.
//!
//! The turn loop never owns the conversation. It reads it through
//! [`TranscriptStore::messages`] before every model call and appends tool
//! summaries through [`TranscriptStore::add_message`] between turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::{Error, Result};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
    /// System instructions
    System,
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// When the message was recorded
    pub timestamp: DateTime<Utc>,

    /// Optional metadata (provider, model, ...)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }
}

/// The conversation contract the turn loop reads from and appends to.
///
/// Implementations use interior mutability so a store can be shared
/// (`Arc<dyn TranscriptStore>`) between the loop and its caller.
pub trait TranscriptStore: Send + Sync {
    /// A snapshot of every message, oldest first.
    fn messages(&self) -> Vec<Message>;

    /// Append a message.
    fn add_message(&self, message: Message);
}

/// Per-role statistics over a [`ChatHistory`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub system_messages: usize,
    pub average_user_message_length: usize,
    pub average_assistant_message_length: usize,
}

#[derive(Serialize, Deserialize)]
struct HistoryExport {
    messages: Vec<Message>,
    #[serde(default = "Utc::now")]
    exported_at: DateTime<Utc>,
}

/// Default cap on retained messages.
pub const DEFAULT_MAX_MESSAGES: usize = 100;

/// A bounded in-memory transcript. When the cap is exceeded the oldest
/// messages are dropped.
#[derive(Debug)]
pub struct ChatHistory {
    messages: Mutex<Vec<Message>>,
    max_messages: Mutex<usize>,
}

impl ChatHistory {
    pub fn new() -> Self {
        Self::with_max_messages(DEFAULT_MAX_MESSAGES)
    }

    pub fn with_max_messages(max_messages: usize) -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            max_messages: Mutex::new(max_messages.max(1)),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Vec<Message>> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cap(&self) -> usize {
        *self.max_messages.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn trim(messages: &mut Vec<Message>, cap: usize) {
        if messages.len() > cap {
            let excess = messages.len() - cap;
            messages.drain(..excess);
        }
    }

    pub fn last(&self) -> Option<Message> {
        self.guard().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    pub fn clear(&self) {
        self.guard().clear();
    }

    /// All messages with the given role, oldest first.
    pub fn by_role(&self, role: Role) -> Vec<Message> {
        self.guard().iter().filter(|m| m.role == role).cloned().collect()
    }

    /// The last `count` messages.
    pub fn recent(&self, count: usize) -> Vec<Message> {
        let messages = self.guard();
        let start = messages.len().saturating_sub(count);
        messages[start..].to_vec()
    }

    /// Messages whose timestamp falls in `[start, end]`.
    pub fn between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Message> {
        self.guard()
            .iter()
            .filter(|m| m.timestamp >= start && m.timestamp <= end)
            .cloned()
            .collect()
    }

    pub fn max_messages(&self) -> usize {
        self.cap()
    }

    /// Change the cap, dropping the oldest messages if needed.
    pub fn set_max_messages(&self, max: usize) {
        let max = max.max(1);
        *self.max_messages.lock().unwrap_or_else(|e| e.into_inner()) = max;
        Self::trim(&mut self.guard(), max);
    }

    pub fn stats(&self) -> HistoryStats {
        let messages = self.guard();
        let average = |role: Role| {
            let lengths: Vec<usize> = messages
                .iter()
                .filter(|m| m.role == role)
                .map(|m| m.content.chars().count())
                .collect();
            if lengths.is_empty() {
                0
            } else {
                (lengths.iter().sum::<usize>() as f64 / lengths.len() as f64).round() as usize
            }
        };
        let count = |role: Role| messages.iter().filter(|m| m.role == role).count();

        HistoryStats {
            total: messages.len(),
            user_messages: count(Role::User),
            assistant_messages: count(Role::Assistant),
            system_messages: count(Role::System),
            average_user_message_length: average(Role::User),
            average_assistant_message_length: average(Role::Assistant),
        }
    }

    /// Serialize the history as pretty JSON.
    pub fn export(&self) -> Result<String> {
        let export = HistoryExport {
            messages: self.guard().clone(),
            exported_at: Utc::now(),
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }

    /// Replace the history with a previously exported one.
    pub fn import(&self, json: &str) -> Result<()> {
        let export: HistoryExport = serde_json::from_str(json)
            .map_err(|e| Error::Transcript(format!("Invalid JSON format for chat history: {e}")))?;
        let cap = self.cap();
        let mut messages = self.guard();
        *messages = export.messages;
        Self::trim(&mut messages, cap);
        Ok(())
    }

    /// Keep only the newest messages that fit in roughly `token_limit`
    /// tokens (4 chars ≈ 1 token). The newest message is always kept, even
    /// when it alone exceeds the limit.
    pub fn truncate_to_token_limit(&self, token_limit: usize) {
        let max_chars = token_limit.saturating_mul(4);
        let mut messages = self.guard();
        let newest = messages.len().saturating_sub(1);
        let mut total = 0usize;
        let mut cutoff = 0usize;
        for (i, message) in messages.iter().enumerate().rev() {
            total += message.content.len();
            if total > max_chars {
                cutoff = (i + 1).min(newest);
                break;
            }
        }
        if cutoff > 0 {
            messages.drain(..cutoff);
        }
    }

    /// Get the total token count estimate (rough: 4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.guard().iter().map(|m| m.content.len() / 4).sum()
    }
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptStore for ChatHistory {
    fn messages(&self) -> Vec<Message> {
        self.guard().clone()
    }

    fn add_message(&self, message: Message) {
        let cap = self.cap();
        let mut messages = self.guard();
        messages.push(message);
        Self::trim(&mut messages, cap);
    }
}
