//! The agentic turn loop: the heart of TurnLoop.
//!
//! A run alternates between the model and the tools:
//!
//! 1. **Ask** the provider with the current transcript
//! 2. **Extract** tool calls from structured fields and free text
//! 3. **Act**: invoke each call within the run's tool-call budget
//! 4. **Decide** with the continuation heuristic whether to go again
//!
//! The loop ends when the model asks for nothing, the heuristic says the
//! task is done, or a turn/time budget runs out. Progress is observable
//! through the [`turnloop_core::EventBus`] and as a [`TurnEventStream`].

pub mod continuation;
pub mod direct;
pub mod error;
pub mod extractor;
pub mod scripted;
pub mod session;
pub mod stream;
pub mod turn;

pub use continuation::{ContinuationAnalyzer, ContinuationDecision, ContinuationPhrases, ContinuationSignals};
pub use direct::ToolExecutionService;
pub use error::AgentError;
pub use extractor::{PatternTextParser, TextCallParser, ToolCallExtractor};
pub use scripted::ScriptedProvider;
pub use session::{AgenticChat, ChatOutcome, agentic_system_prompt};
pub use stream::TurnEventStream;
pub use turn::{AgenticTurn, RunSummary, StopReason};
