use thiserror::Error;

/// A loop-fatal failure: the provider call or tool-call extraction broke
/// during `turn`. Tool failures never surface here.
#[derive(Debug, Error)]
#[error("turn {turn}: {source}")]
pub struct AgentError {
    pub turn: u32,
    pub source: turnloop_core::Error,
}

impl AgentError {
    pub fn new(turn: u32, source: impl Into<turnloop_core::Error>) -> Self {
        Self {
            turn,
            source: source.into(),
        }
    }
}
