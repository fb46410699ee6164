//! Turn events and the event bus.
//!
//! The turn loop publishes a [`TurnEvent`] at every step of its lifecycle.
//! Observers either register synchronous listeners per event type, or take
//! a broadcast [`tap`](EventBus::tap) of every event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::error;

use crate::agent::{AgenticTurnOptions, TurnState};
use crate::tool::{ToolCall, ToolResult};

/// The kind of a [`TurnEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnEventType {
    TurnStart,
    ToolCallRequest,
    ToolCallResponse,
    AiResponse,
    TurnComplete,
    Error,
}

impl TurnEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TurnStart => "turn_start",
            Self::ToolCallRequest => "tool_call_request",
            Self::ToolCallResponse => "tool_call_response",
            Self::AiResponse => "ai_response",
            Self::TurnComplete => "turn_complete",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for TurnEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event payloads, one shape per event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TurnEventData {
    /// The loop started (emitted once per run).
    TurnStart {
        prompt: String,
        options: AgenticTurnOptions,
    },

    /// A tool is about to run.
    ToolCallRequest(ToolCall),

    /// A tool finished (or was refused by the budget).
    ToolCallResponse(ToolResult),

    /// The model answered.
    AiResponse { response: String, turn: u32 },

    /// A turn ended.
    TurnComplete(TurnState),

    /// The loop aborted.
    Error { error: String, turn: u32 },
}

impl TurnEventData {
    pub fn event_type(&self) -> TurnEventType {
        match self {
            Self::TurnStart { .. } => TurnEventType::TurnStart,
            Self::ToolCallRequest(_) => TurnEventType::ToolCallRequest,
            Self::ToolCallResponse(_) => TurnEventType::ToolCallResponse,
            Self::AiResponse { .. } => TurnEventType::AiResponse,
            Self::TurnComplete(_) => TurnEventType::TurnComplete,
            Self::Error { .. } => TurnEventType::Error,
        }
    }
}

/// A timestamped turn event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnEvent {
    #[serde(flatten)]
    pub data: TurnEventData,
    pub timestamp: DateTime<Utc>,
}

impl TurnEvent {
    pub fn now(data: TurnEventData) -> Self {
        Self {
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn event_type(&self) -> TurnEventType {
        self.data.event_type()
    }
}

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&TurnEvent) + Send + Sync>;

/// Typed observer registry plus a broadcast tap.
///
/// Listeners run synchronously, in registration order, on the publishing
/// task. A panicking listener is logged and skipped; it never reaches the
/// publisher.
pub struct EventBus {
    listeners: RwLock<HashMap<TurnEventType, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
    tap: broadcast::Sender<Arc<TurnEvent>>,
}

impl EventBus {
    /// Create a new event bus whose tap buffers `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (tap, _) = broadcast::channel(capacity.max(1));
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            tap,
        }
    }

    /// Register a listener for one event type.
    pub fn subscribe<F>(&self, event_type: TurnEventType, listener: F) -> ListenerId
    where
        F: Fn(&TurnEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(event_type)
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, event_type: TurnEventType, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let Some(list) = listeners.get_mut(&event_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|(lid, _)| *lid != id);
        before != list.len()
    }

    pub fn listener_count(&self, event_type: TurnEventType) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&event_type)
            .map_or(0, Vec::len)
    }

    /// Timestamp `data`, deliver it, and hand the event back.
    pub fn publish(&self, data: TurnEventData) -> TurnEvent {
        let event = TurnEvent::now(data);
        self.dispatch(&event);
        event
    }

    /// Deliver an already built event to listeners and the tap.
    pub fn dispatch(&self, event: &TurnEvent) {
        let event_type = event.event_type();
        // Snapshot so listeners may (un)subscribe without deadlocking.
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&event_type)
            .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!(event_type = %event_type, "Event listener panicked");
            }
        }

        // No tap receivers is fine.
        let _ = self.tap.send(Arc::new(event.clone()));
    }

    /// Receive every published event asynchronously.
    pub fn tap(&self) -> broadcast::Receiver<Arc<TurnEvent>> {
        self.tap.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
