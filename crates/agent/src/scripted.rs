//! A provider that replays canned responses.
//!
//! Used by the `turnloop replay` command and throughout the tests. Each
//! `chat` call pops the next response; running past the end of the script
//! is a provider error.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use turnloop_core::error::ProviderError;
use turnloop_core::message::Message;
use turnloop_core::provider::{ChatOptions, ChatResponse, Provider};

/// One scripted entry: bare text or a full response object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScriptEntry {
    Text(String),
    Response(ChatResponse),
}

impl From<ScriptEntry> for ChatResponse {
    fn from(entry: ScriptEntry) -> Self {
        match entry {
            ScriptEntry::Text(text) => ChatResponse::text(text),
            ScriptEntry::Response(response) => response,
        }
    }
}

#[derive(Debug, Default)]
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<ChatResponse>>,
    failure: Option<ProviderError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    transcripts: Mutex<Vec<Vec<Message>>>,
    options: Mutex<Vec<ChatOptions>>,
}

impl ScriptedProvider {
    pub fn new(responses: impl IntoIterator<Item = ChatResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            ..Self::default()
        }
    }

    /// A provider whose every call fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    /// Parse a JSON array of strings and/or response objects.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let entries: Vec<ScriptEntry> = serde_json::from_str(json)?;
        Ok(Self::new(entries.into_iter().map(ChatResponse::from)))
    }

    /// Wait this long (on the tokio clock) before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// The transcript passed to each call, in call order.
    pub fn seen_transcripts(&self) -> Vec<Vec<Message>> {
        self.transcripts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn seen_options(&self) -> Vec<ChatOptions> {
        self.options.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, messages: &[Message], options: &ChatOptions) -> Result<ChatResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.transcripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());
        self.options
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(options.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }

        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or_else(|| ProviderError::MalformedResponse("script exhausted".into()))
    }
}
