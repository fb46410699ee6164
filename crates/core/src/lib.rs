//! # TurnLoop Core
//!
//! Domain types, traits, and error definitions for the TurnLoop agentic
//! turn engine. This crate has **no runtime opinions**: it defines the
//! contracts the turn loop is written against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the loop is a trait here:
//! - [`Provider`]: the model behind the `chat` call
//! - [`Tool`]: one invocable capability, collected in a [`ToolRegistry`]
//! - [`TranscriptStore`]: the conversation the loop reads and appends to
//!
//! Implementations live in their respective crates, so tests can swap in
//! scripted providers and in-memory stores.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod agent;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{ChatHistory, HistoryStats, Message, Role, TranscriptStore};
pub use provider::{ChatOptions, ChatResponse, FunctionCall, OpenAiToolCall, Provider, Usage};
pub use tool::{ParameterSchema, Tool, ToolCall, ToolDefinition, ToolOutcome, ToolRegistry, ToolResult};
pub use agent::{AgenticTurnOptions, RunStats, TurnState};
pub use event::{EventBus, ListenerId, TurnEvent, TurnEventData, TurnEventType};
