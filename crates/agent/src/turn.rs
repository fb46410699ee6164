//! The agentic turn loop.
//!
//! One run repeats **ask → extract → act → decide** until the model stops
//! asking for tools, the continuation heuristic says stop, or a budget
//! (turns, tool calls, wall clock) runs out:
//!
//! 1. Send the transcript to the provider
//! 2. Extract tool calls from the response
//! 3. Invoke them one by one, within the tool-call budget
//! 4. Ask the [`ContinuationAnalyzer`] whether another turn is needed
//! 5. If so, append a results summary to the transcript and loop
//!
//! Every step is published on the [`EventBus`] and, for streamed runs,
//! forwarded to the [`TurnEventStream`]. Provider and extraction failures,
//! and panics inside the loop, end the run with an [`AgentError`]; tool
//! failures never do.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use turnloop_core::event::{EventBus, ListenerId, TurnEvent, TurnEventData, TurnEventType};
use turnloop_core::message::{Message, TranscriptStore};
use turnloop_core::provider::{ChatOptions, Provider};
use turnloop_core::tool::{ToolRegistry, ToolResult};
use turnloop_core::{AgenticTurnOptions, RunStats, TurnState};

use crate::continuation::{ContinuationAnalyzer, ContinuationDecision, user_text};
use crate::error::AgentError;
use crate::extractor::ToolCallExtractor;
use crate::stream::TurnEventStream;

/// Why a run ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// No tool calls, or the heuristic said stop.
    Completed,
    /// `max_turns` iterations ran.
    TurnLimit,
    /// The wall-clock budget elapsed.
    Timeout,
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub turns: Vec<TurnState>,
    /// Text of the last model response
    pub final_response: String,
    pub stop_reason: StopReason,
    pub stats: RunStats,
}

impl RunSummary {
    /// Tool calls that actually ran. Calls refused by the budget are
    /// recorded in the turns but not counted.
    pub fn tool_call_count(&self) -> usize {
        self.stats.total_tool_calls as usize
    }
}

/// Counters of one run. Each run starts from zero.
struct RunContext {
    started: Instant,
    current_turn: u32,
    total_tool_calls: u32,
}

impl RunContext {
    fn start() -> Self {
        Self {
            started: Instant::now(),
            current_turn: 0,
            total_tool_calls: 0,
        }
    }
}

/// Mirror of the latest run's counters, readable while it runs.
#[derive(Debug, Default)]
struct LiveStats {
    current_turn: AtomicU32,
    total_tool_calls: AtomicU32,
}

/// Drives the turn loop for one tool registry and one transcript.
#[derive(Clone)]
pub struct AgenticTurn {
    tools: Arc<ToolRegistry>,
    transcript: Arc<dyn TranscriptStore>,
    options: AgenticTurnOptions,
    extractor: Arc<ToolCallExtractor>,
    analyzer: Arc<ContinuationAnalyzer>,
    events: Arc<EventBus>,
    live: Arc<LiveStats>,
}

impl AgenticTurn {
    pub fn new(
        tools: Arc<ToolRegistry>,
        transcript: Arc<dyn TranscriptStore>,
        options: AgenticTurnOptions,
    ) -> Self {
        Self {
            tools,
            transcript,
            options,
            extractor: Arc::new(ToolCallExtractor::default()),
            analyzer: Arc::new(ContinuationAnalyzer::default()),
            events: Arc::new(EventBus::default()),
            live: Arc::new(LiveStats::default()),
        }
    }

    pub fn with_extractor(mut self, extractor: ToolCallExtractor) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    pub fn with_analyzer(mut self, analyzer: ContinuationAnalyzer) -> Self {
        self.analyzer = Arc::new(analyzer);
        self
    }

    /// Publish on a shared bus instead of a private one.
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn options(&self) -> &AgenticTurnOptions {
        &self.options
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn add_event_listener<F>(&self, event_type: TurnEventType, listener: F) -> ListenerId
    where
        F: Fn(&TurnEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(event_type, listener)
    }

    pub fn remove_event_listener(&self, event_type: TurnEventType, id: ListenerId) -> bool {
        self.events.unsubscribe(event_type, id)
    }

    /// Counters of the current run, or of the last one once it ended.
    pub fn stats(&self) -> RunStats {
        RunStats {
            current_turn: self.live.current_turn.load(Ordering::Relaxed),
            total_tool_calls: self.live.total_tool_calls.load(Ordering::Relaxed),
            max_turns: self.options.max_turns,
            max_tool_calls: self.options.max_tool_calls,
        }
    }

    /// Run the loop on the current task and return its outcome.
    ///
    /// The transcript must already hold the user's request; `prompt` only
    /// labels the first turn and the `TurnStart` event.
    pub async fn run(
        &self,
        prompt: impl Into<String>,
        provider: &dyn Provider,
        chat_options: ChatOptions,
    ) -> Result<RunSummary, AgentError> {
        self.guarded(prompt.into(), provider, chat_options, None).await
    }

    /// Run the loop on a spawned task, streaming its events.
    pub fn execute_agentic_loop(
        &self,
        prompt: impl Into<String>,
        provider: Arc<dyn Provider>,
        chat_options: ChatOptions,
    ) -> TurnEventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let this = self.clone();
        let prompt = prompt.into();
        let handle = tokio::spawn(async move {
            this.guarded(prompt, provider.as_ref(), chat_options, Some(&tx)).await
        });
        TurnEventStream::new(rx, handle)
    }

    fn emit(&self, sink: Option<&UnboundedSender<TurnEvent>>, data: TurnEventData) {
        let event = self.events.publish(data);
        if let Some(tx) = sink {
            // A dropped stream only stops forwarding; the run goes on.
            let _ = tx.send(event);
        }
    }

    fn publish_stats(&self, ctx: &RunContext) {
        self.live.current_turn.store(ctx.current_turn, Ordering::Relaxed);
        self.live.total_tool_calls.store(ctx.total_tool_calls, Ordering::Relaxed);
    }

    fn snapshot(&self, ctx: &RunContext) -> RunStats {
        RunStats {
            current_turn: ctx.current_turn,
            total_tool_calls: ctx.total_tool_calls,
            max_turns: self.options.max_turns,
            max_tool_calls: self.options.max_tool_calls,
        }
    }

    fn fail(
        &self,
        sink: Option<&UnboundedSender<TurnEvent>>,
        turn: u32,
        source: turnloop_core::Error,
    ) -> AgentError {
        error!(turn, error = %source, "Turn loop aborted");
        self.emit(
            sink,
            TurnEventData::Error {
                error: source.to_string(),
                turn,
            },
        );
        AgentError { turn, source }
    }

    fn request_options(&self, mut chat_options: ChatOptions) -> ChatOptions {
        chat_options.include_tools_in_response = true;
        if chat_options.tools.is_empty() {
            chat_options.tools = self.tools.list();
        }
        chat_options
    }

    fn log_decision(&self, turn: u32, decision: &ContinuationDecision) {
        let s = &decision.signals;
        if self.options.debug {
            info!(
                turn,
                should_continue = decision.should_continue,
                continuation = s.has_continuation,
                errors = s.has_errors,
                incomplete = s.has_incomplete,
                completion = s.has_completion,
                first_tool_only = s.first_tool_only,
                "Continuation decision"
            );
        } else {
            debug!(turn, should_continue = decision.should_continue, signals = ?s, "Continuation decision");
        }
    }

    /// [`Self::drive`], with a panic anywhere in the loop turned into a
    /// fatal error for the turn that was running.
    async fn guarded(
        &self,
        prompt: String,
        provider: &dyn Provider,
        chat_options: ChatOptions,
        sink: Option<&UnboundedSender<TurnEvent>>,
    ) -> Result<RunSummary, AgentError> {
        let run = AssertUnwindSafe(self.drive(prompt, provider, chat_options, sink));
        match run.catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let turn = self.live.current_turn.load(Ordering::Relaxed);
                let message = panic_message(panic.as_ref());
                Err(self.fail(
                    sink,
                    turn,
                    turnloop_core::Error::Internal(format!("turn loop panicked: {message}")),
                ))
            }
        }
    }

    async fn drive(
        &self,
        prompt: String,
        provider: &dyn Provider,
        chat_options: ChatOptions,
        sink: Option<&UnboundedSender<TurnEvent>>,
    ) -> Result<RunSummary, AgentError> {
        let mut ctx = RunContext::start();
        self.publish_stats(&ctx);

        info!(
            provider = provider.name(),
            max_turns = self.options.max_turns,
            max_tool_calls = self.options.max_tool_calls,
            "Starting agentic loop"
        );
        self.emit(
            sink,
            TurnEventData::TurnStart {
                prompt: prompt.clone(),
                options: self.options.clone(),
            },
        );

        let chat_options = self.request_options(chat_options);
        let timeout = self.options.timeout();
        let mut turns = Vec::new();
        let mut final_response = String::new();
        let mut next_prompt = prompt;

        let stop_reason = loop {
            if ctx.started.elapsed() >= timeout {
                warn!(timeout_ms = self.options.timeout_ms, turn = ctx.current_turn, "Agentic loop timed out");
                break StopReason::Timeout;
            }
            if ctx.current_turn >= self.options.max_turns {
                warn!(max_turns = self.options.max_turns, "Maximum turns reached");
                break StopReason::TurnLimit;
            }

            ctx.current_turn += 1;
            self.publish_stats(&ctx);
            let turn = ctx.current_turn;
            let mut state = TurnState::new(turn, std::mem::take(&mut next_prompt));
            debug!(turn, "Agentic turn");

            let response = match provider.chat(&self.transcript.messages(), &chat_options).await {
                Ok(response) => response,
                Err(e) => return Err(self.fail(sink, turn, e.into())),
            };
            state.ai_response = response.content.clone();
            final_response = response.content.clone();
            self.emit(
                sink,
                TurnEventData::AiResponse {
                    response: response.content.clone(),
                    turn,
                },
            );

            let calls = match self.extractor.extract(&response, &self.tools) {
                Ok(calls) => calls,
                Err(e) => return Err(self.fail(sink, turn, e.into())),
            };
            if self.options.debug {
                info!(turn, calls = calls.len(), "Extracted tool calls");
            }

            if calls.is_empty() {
                state.mark_complete();
                self.emit(sink, TurnEventData::TurnComplete(state.clone()));
                turns.push(state);
                break StopReason::Completed;
            }

            for call in calls {
                if ctx.total_tool_calls >= self.options.max_tool_calls {
                    warn!(max_tool_calls = self.options.max_tool_calls, "Tool call budget exhausted");
                    let refused = ToolResult::failure(
                        &call,
                        format!("Maximum tool calls ({}) exceeded", self.options.max_tool_calls),
                    );
                    self.emit(sink, TurnEventData::ToolCallRequest(call.clone()));
                    self.emit(sink, TurnEventData::ToolCallResponse(refused.clone()));
                    state.tool_calls.push(call);
                    state.tool_results.push(refused);
                    break;
                }

                ctx.total_tool_calls += 1;
                self.publish_stats(&ctx);

                self.emit(sink, TurnEventData::ToolCallRequest(call.clone()));
                let result = self.tools.invoke(&call).await;
                if let Some(e) = result.error() {
                    warn!(tool = %call.name, error = %e, "Tool call failed");
                }
                self.emit(sink, TurnEventData::ToolCallResponse(result.clone()));
                state.tool_calls.push(call);
                state.tool_results.push(result);
            }

            let decision = self.analyzer.analyze(
                &response.content,
                &state.tool_results,
                &user_text(&self.transcript.messages()),
            );
            self.log_decision(turn, &decision);

            if decision.should_continue {
                next_prompt = continuation_prompt(&state.tool_results);
                self.transcript
                    .add_message(Message::assistant(transcript_summary(&state.tool_results)));
                state.mark_needs_continuation();
                self.emit(sink, TurnEventData::TurnComplete(state.clone()));
                turns.push(state);
            } else {
                state.mark_complete();
                self.emit(sink, TurnEventData::TurnComplete(state.clone()));
                turns.push(state);
                break StopReason::Completed;
            }
        };

        info!(
            turns = ctx.current_turn,
            tool_calls = ctx.total_tool_calls,
            stop_reason = ?stop_reason,
            "Agentic loop finished"
        );

        Ok(RunSummary {
            turns,
            final_response,
            stop_reason,
            stats: self.snapshot(&ctx),
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// The prompt that labels the next turn: one line per result, then an
/// instruction to proceed.
pub fn continuation_prompt(results: &[ToolResult]) -> String {
    let mut prompt = String::from("Based on the previous actions, here are the results:\n\n");
    for result in results {
        match (result.result(), result.error()) {
            (_, Some(error)) => prompt.push_str(&format!("❌ {}: Error - {error}\n", result.name)),
            (Some(value), None) => prompt.push_str(&format!("✅ {}: {}\n", result.name, pretty(value))),
            (None, None) => {}
        }
    }
    prompt.push_str("\nPlease continue with the next steps to complete the task.");
    prompt
}

/// The assistant message appended to the transcript between turns.
pub fn transcript_summary(results: &[ToolResult]) -> String {
    let lines: Vec<String> = results
        .iter()
        .map(|r| match (r.result(), r.error()) {
            (_, Some(error)) => format!("Tool {} failed: {error}", r.name),
            (Some(value), None) => format!("Tool {} succeeded: {value}", r.name),
            (None, None) => format!("Tool {} succeeded: null", r.name),
        })
        .collect();
    format!("Tool execution results:\n{}", lines.join("\n"))
}
