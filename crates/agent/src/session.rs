//! A conversational front-end over the turn loop.
//!
//! [`AgenticChat`] owns the transcript: it records each question, drives
//! one loop run per question, and stores the model's final answer.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use tracing::info;
use turnloop_config::AppConfig;
use turnloop_core::event::{TurnEventData, TurnEventType};
use turnloop_core::message::{ChatHistory, Message, TranscriptStore};
use turnloop_core::provider::{ChatOptions, Provider};
use turnloop_core::tool::ToolRegistry;

use crate::continuation::{ContinuationAnalyzer, ContinuationPhrases};
use crate::error::AgentError;
use crate::turn::{AgenticTurn, RunSummary};

/// Build a system prompt that lists the registry's tools.
pub fn agentic_system_prompt(base: Option<&str>, registry: &ToolRegistry) -> String {
    let mut prompt = base
        .unwrap_or("You are a helpful assistant that completes tasks step by step using tools.")
        .to_string();

    if !registry.is_empty() {
        prompt.push_str("\n\nAvailable tools:\n");
        for def in registry.list() {
            let _ = writeln!(prompt, "- {}: {}", def.name, def.description);
        }
        prompt.push_str(
            "\nCall a tool by writing name(arg=\"value\"). \
             After each result, either call the next tool or state that the task is complete.",
        );
    }
    prompt
}

/// The answer to one question.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub response: String,
    pub summary: RunSummary,
}

pub struct AgenticChat {
    turn: AgenticTurn,
    history: Arc<ChatHistory>,
    provider: Arc<dyn Provider>,
    chat_options: ChatOptions,
    last_response: Arc<Mutex<Option<String>>>,
}

impl AgenticChat {
    pub fn new(turn: AgenticTurn, history: Arc<ChatHistory>, provider: Arc<dyn Provider>, chat_options: ChatOptions) -> Self {
        let last_response = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&last_response);
        turn.add_event_listener(TurnEventType::AiResponse, move |event| {
            if let TurnEventData::AiResponse { response, .. } = &event.data {
                *sink.lock().unwrap_or_else(|e| e.into_inner()) = Some(response.clone());
            }
        });

        Self {
            turn,
            history,
            provider,
            chat_options,
            last_response,
        }
    }

    /// Wire a session from configuration: history cap, loop budgets,
    /// phrase lists, chat settings and a tool-aware system prompt.
    pub fn from_config(config: &AppConfig, tools: Arc<ToolRegistry>, provider: Arc<dyn Provider>) -> Self {
        let history = Arc::new(ChatHistory::with_max_messages(config.history.max_messages));
        let analyzer = ContinuationAnalyzer::new(ContinuationPhrases::from_config(&config.continuation));

        let mut chat_options = config.chat_options();
        chat_options.system_prompt = Some(agentic_system_prompt(
            config.chat.system_prompt.as_deref(),
            &tools,
        ));

        let transcript: Arc<dyn TranscriptStore> = history.clone();
        let turn = AgenticTurn::new(tools, transcript, config.turn_options()).with_analyzer(analyzer);
        Self::new(turn, history, provider, chat_options)
    }

    pub fn history(&self) -> &Arc<ChatHistory> {
        &self.history
    }

    pub fn turn(&self) -> &AgenticTurn {
        &self.turn
    }

    /// The most recent model text seen by this session, if any.
    pub fn last_response(&self) -> Option<String> {
        self.last_response.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Ask one question and run the loop until it settles.
    pub async fn ask(&self, question: &str) -> Result<ChatOutcome, AgentError> {
        self.history.add_message(Message::user(question));

        let summary = self
            .turn
            .run(question, self.provider.as_ref(), self.chat_options.clone())
            .await?;

        let response = self.last_response().unwrap_or_default();
        self.history.add_message(Message::assistant(response.clone()));

        info!(
            turns = summary.turns.len(),
            tool_calls = summary.tool_call_count(),
            stop_reason = ?summary.stop_reason,
            "Question answered"
        );
        Ok(ChatOutcome { response, summary })
    }
}
