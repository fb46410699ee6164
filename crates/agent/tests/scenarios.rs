//! End-to-end runs of the turn loop over the built-in tools and a
//! scripted provider.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use turnloop_agent::{AgenticTurn, RunSummary, ScriptedProvider, StopReason};
use turnloop_config::ToolsConfig;
use turnloop_core::message::{ChatHistory, Message, Role, TranscriptStore};
use turnloop_core::provider::{ChatOptions, ChatResponse};
use turnloop_core::tool::{Arguments, ToolRegistry};
use turnloop_core::{AgenticTurnOptions, TurnEvent, TurnEventData, TurnEventType};

fn builtin_tools() -> Arc<ToolRegistry> {
    Arc::new(turnloop_tools::default_registry(&ToolsConfig::default()))
}

fn transcript(prompt: &str) -> Arc<ChatHistory> {
    let history = Arc::new(ChatHistory::new());
    history.add_message(Message::user(prompt));
    history
}

fn args(value: serde_json::Value) -> Arguments {
    value.as_object().cloned().unwrap_or_default()
}

async fn stream_run(
    prompt: &str,
    options: AgenticTurnOptions,
    script: Vec<ChatResponse>,
) -> (Vec<TurnEvent>, RunSummary, Arc<ScriptedProvider>, Arc<ChatHistory>) {
    let history = transcript(prompt);
    let turn = AgenticTurn::new(builtin_tools(), history.clone(), options);
    let provider = Arc::new(ScriptedProvider::new(script));
    let (events, outcome) = turn
        .execute_agentic_loop(prompt, provider.clone(), ChatOptions::default())
        .collect_all()
        .await;
    (events, outcome.expect("run should succeed"), provider, history)
}

fn count(events: &[TurnEvent], kind: TurnEventType) -> usize {
    events.iter().filter(|e| e.event_type() == kind).count()
}

#[tokio::test]
async fn plain_completion_is_a_single_turn() {
    let (events, summary, _, _) = stream_run(
        "create the file",
        AgenticTurnOptions::default(),
        vec![ChatResponse::text("The file has been created successfully.")],
    )
    .await;

    assert_eq!(summary.turns.len(), 1);
    assert!(summary.turns[0].is_complete);
    assert_eq!(count(&events, TurnEventType::ToolCallRequest), 0);
    assert_eq!(count(&events, TurnEventType::TurnStart), 1);
    assert_eq!(events.last().map(TurnEvent::event_type), Some(TurnEventType::TurnComplete));
}

#[tokio::test]
async fn structured_call_without_cues_stops_after_one_turn() {
    let (events, summary, provider, _) = stream_run(
        "what is 2+2",
        AgenticTurnOptions::default(),
        vec![
            ChatResponse::text("").with_function_call("calculate", args(json!({"expression": "2+2"}))),
            ChatResponse::text("unused"),
        ],
    )
    .await;

    assert_eq!(summary.stop_reason, StopReason::Completed);
    assert_eq!(summary.turns.len(), 1);
    assert_eq!(summary.turns[0].tool_results[0].result(), Some(&json!(4)));
    assert_eq!(count(&events, TurnEventType::ToolCallRequest), 1);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn first_of_several_tasks_forces_a_second_turn() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.json");
    std::fs::write(&config, r#"{"verbose": true}"#).unwrap();

    let (_, summary, provider, _) = stream_run(
        "read config.json and then summarize it",
        AgenticTurnOptions::default(),
        vec![
            ChatResponse::text(format!(r#"read_file(path="{}")"#, config.display())),
            ChatResponse::text("The config enables verbose output. Task completed."),
        ],
    )
    .await;

    assert_eq!(summary.turns.len(), 2);
    assert!(summary.turns[0].needs_continuation);
    assert_eq!(summary.turns[0].tool_calls[0].name, "read_file");
    assert!(summary.turns[1].user_message.contains("✅ read_file:"));
    assert!(summary.turns[1].user_message.contains("verbose"));
    assert!(summary.turns[1].is_complete);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn tool_budget_refuses_the_second_call() {
    let (events, summary, _, _) = stream_run(
        "two sums",
        AgenticTurnOptions::default().with_max_tool_calls(1),
        vec![
            ChatResponse::text("")
                .with_function_call("calculate", args(json!({"expression": "2+2"})))
                .with_function_call("calculate", args(json!({"expression": "3+3"}))),
            ChatResponse::text("Stopping here, all set."),
        ],
    )
    .await;

    let first = &summary.turns[0];
    assert_eq!(first.tool_results.len(), 2);
    assert_eq!(first.tool_results[0].result(), Some(&json!(4)));
    assert_eq!(first.tool_results[1].error(), Some("Maximum tool calls (1) exceeded"));
    assert_eq!(summary.stats.total_tool_calls, 1);

    // Each refused call is still announced and answered.
    assert_eq!(count(&events, TurnEventType::ToolCallRequest), 2);
    assert_eq!(count(&events, TurnEventType::ToolCallResponse), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_provider_hits_the_timeout_on_the_next_guard() {
    let history = transcript("keep calculating");
    let options = AgenticTurnOptions::default().with_timeout(Duration::from_millis(100));
    let turn = AgenticTurn::new(builtin_tools(), history, options);
    let provider = Arc::new(
        ScriptedProvider::new(vec![
            ChatResponse::text("Next I will continue.")
                .with_function_call("calculate", args(json!({"expression": "1+1"}))),
            ChatResponse::text("never requested"),
        ])
        .with_delay(Duration::from_millis(500)),
    );

    let (events, outcome) = turn
        .execute_agentic_loop("keep calculating", provider.clone(), ChatOptions::default())
        .collect_all()
        .await;
    let summary = outcome.unwrap();

    assert_eq!(summary.stop_reason, StopReason::Timeout);
    assert_eq!(summary.turns.len(), 1);
    assert_eq!(provider.calls(), 1);
    assert_eq!(count(&events, TurnEventType::AiResponse), 1);
}

#[tokio::test]
async fn write_then_read_across_turns() {
    let dir = tempfile::tempdir().unwrap();
    let notes = dir.path().join("notes/today.txt");
    let path = notes.display().to_string();

    let (events, summary, provider, history) = stream_run(
        "write hello to notes, read it back",
        AgenticTurnOptions::default(),
        vec![
            ChatResponse::text(format!(
                r#"write_file(path="{path}", content="hello") Next I will read it."#
            )),
            ChatResponse::text(format!(r#"read_file(path="{path}") Task completed."#)),
        ],
    )
    .await;

    assert_eq!(std::fs::read_to_string(&notes).unwrap(), "hello");
    assert_eq!(summary.turns.len(), 2);
    assert_eq!(summary.turns[1].tool_results[0].result(), Some(&json!("hello")));
    assert_eq!(summary.stop_reason, StopReason::Completed);

    // The second model call saw the first turn's results.
    let transcripts = provider.seen_transcripts();
    let second = &transcripts[1];
    assert_eq!(second.len(), 2);
    assert_eq!(second[1].role, Role::Assistant);
    assert!(second[1].content.starts_with("Tool execution results:\nTool write_file succeeded:"));
    assert_eq!(history.messages().len(), 2);

    let turns: Vec<u32> = events
        .iter()
        .filter_map(|e| match &e.data {
            TurnEventData::AiResponse { turn, .. } => Some(*turn),
            _ => None,
        })
        .collect();
    assert_eq!(turns, vec![1, 2]);
}

#[tokio::test]
async fn blocked_paths_fail_the_call_not_the_run() {
    let (_, summary, _, _) = stream_run(
        "show me the passwords",
        AgenticTurnOptions::default().with_max_turns(1),
        vec![ChatResponse::text(r#"read_file(path="/etc/passwd")"#)],
    )
    .await;

    let result = &summary.turns[0].tool_results[0];
    assert!(result.error().unwrap().starts_with("Permission denied"));
    assert_eq!(summary.stop_reason, StopReason::TurnLimit);
}
