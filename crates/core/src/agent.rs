//! Turn loop configuration, per-turn state, and progress counters.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::tool::{ToolCall, ToolResult};

/// Run-scoped configuration for the agentic turn loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgenticTurnOptions {
    /// Hard cap on loop iterations
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,

    /// Hard cap on tool invocations across the whole run
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: u32,

    /// Wall-clock budget in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Verbose diagnostics
    #[serde(default)]
    pub debug: bool,
}

fn default_max_turns() -> u32 {
    10
}
fn default_max_tool_calls() -> u32 {
    50
}
fn default_timeout_ms() -> u64 {
    300_000
}

impl AgenticTurnOptions {
    pub fn with_max_turns(mut self, max: u32) -> Self {
        self.max_turns = max;
        self
    }

    pub fn with_max_tool_calls(mut self, max: u32) -> Self {
        self.max_tool_calls = max;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for AgenticTurnOptions {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_tool_calls: default_max_tool_calls(),
            timeout_ms: default_timeout_ms(),
            debug: false,
        }
    }
}

/// Everything that happened in one loop iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnState {
    /// 1-based, monotonic within a run
    pub turn_number: u32,

    /// The prompt that triggered this turn
    pub user_message: String,

    /// Raw model text
    pub ai_response: String,

    pub tool_calls: Vec<ToolCall>,

    pub tool_results: Vec<ToolResult>,

    pub is_complete: bool,

    pub needs_continuation: bool,
}

impl TurnState {
    pub fn new(turn_number: u32, user_message: impl Into<String>) -> Self {
        Self {
            turn_number,
            user_message: user_message.into(),
            ai_response: String::new(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
            is_complete: false,
            needs_continuation: false,
        }
    }

    /// Terminal: the loop stops after this turn.
    pub fn mark_complete(&mut self) {
        self.is_complete = true;
        self.needs_continuation = false;
    }

    /// Another turn follows.
    pub fn mark_needs_continuation(&mut self) {
        self.is_complete = false;
        self.needs_continuation = true;
    }

    pub fn has_tool_errors(&self) -> bool {
        self.tool_results.iter().any(|r| r.is_error())
    }
}

/// Progress of the current (or last) run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub current_turn: u32,
    pub total_tool_calls: u32,
    pub max_turns: u32,
    pub max_tool_calls: u32,
}

impl RunStats {
    pub fn turns_exhausted(&self) -> bool {
        self.current_turn >= self.max_turns
    }

    pub fn tool_calls_exhausted(&self) -> bool {
        self.total_tool_calls >= self.max_tool_calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_defaults() {
        let opts = AgenticTurnOptions::default();
        assert_eq!(opts.max_turns, 10);
        assert_eq!(opts.max_tool_calls, 50);
        assert_eq!(opts.timeout(), Duration::from_secs(300));
        assert!(!opts.debug);
    }

    #[test]
    fn options_deserialize_with_partial_fields() {
        let opts: AgenticTurnOptions = serde_json::from_str(r#"{"max_turns": 3}"#).unwrap();
        assert_eq!(opts.max_turns, 3);
        assert_eq!(opts.max_tool_calls, 50);
    }

    #[test]
    fn completion_and_continuation_are_exclusive() {
        let mut state = TurnState::new(1, "go");
        state.mark_needs_continuation();
        assert!(state.needs_continuation && !state.is_complete);
        state.mark_complete();
        assert!(state.is_complete && !state.needs_continuation);
    }

    #[test]
    fn stats_exhaustion() {
        let stats = RunStats {
            current_turn: 10,
            total_tool_calls: 3,
            max_turns: 10,
            max_tool_calls: 50,
        };
        assert!(stats.turns_exhausted());
        assert!(!stats.tool_calls_exhausted());
    }
}
