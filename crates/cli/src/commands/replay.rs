//! `turnloop replay`: run the turn loop against a scripted model.
//!
//! The script is a JSON array; each entry answers one model call and is
//! either plain text or a full response object with `functionCalls` /
//! `tool_calls`. Every turn event is printed as it happens.

use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use turnloop_agent::direct::render;
use turnloop_agent::{
    AgenticTurn, ContinuationAnalyzer, ContinuationPhrases, RunSummary, ScriptedProvider, agentic_system_prompt,
};
use turnloop_config::AppConfig;
use turnloop_core::message::{ChatHistory, Message, TranscriptStore};
use turnloop_core::{Provider, TurnEvent, TurnEventData};
use tracing::debug;

/// One human-readable line per event.
pub fn format_event(event: &TurnEvent) -> String {
    match &event.data {
        TurnEventData::TurnStart { prompt, options } => format!(
            "▶ start: {prompt} (max_turns={}, max_tool_calls={}, timeout={}ms)",
            options.max_turns, options.max_tool_calls, options.timeout_ms
        ),
        TurnEventData::AiResponse { response, turn } => format!("🤖 turn {turn}: {response}"),
        TurnEventData::ToolCallRequest(call) => {
            format!("🔧 {} {}", call.name, serde_json::Value::Object(call.arguments.clone()))
        }
        TurnEventData::ToolCallResponse(result) => format!("   {}", render(result)),
        TurnEventData::TurnComplete(state) if state.is_complete => {
            format!("✔ turn {} complete", state.turn_number)
        }
        TurnEventData::TurnComplete(state) => format!("↻ turn {} continues", state.turn_number),
        TurnEventData::Error { error, turn } => format!("❌ turn {turn}: {error}"),
    }
}

pub fn format_summary(summary: &RunSummary) -> String {
    format!(
        "Stopped: {:?} after {} turn(s), {} tool call(s)\nFinal response: {}",
        summary.stop_reason,
        summary.turns.len(),
        summary.stats.total_tool_calls,
        summary.final_response
    )
}

pub async fn run(config: &AppConfig, script: &Path, prompt: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(script)
        .map_err(|e| format!("Failed to read script {}: {e}", script.display()))?;
    let scripted = ScriptedProvider::from_json(&raw)?;
    debug!(script = %script.display(), responses = scripted.remaining(), "Loaded replay script");
    let provider: Arc<dyn Provider> = Arc::new(scripted);

    let tools = Arc::new(turnloop_tools::default_registry(&config.tools));
    let history = Arc::new(ChatHistory::with_max_messages(config.history.max_messages));
    history.add_message(Message::user(prompt));

    let mut chat_options = config.chat_options();
    chat_options.system_prompt = Some(agentic_system_prompt(config.chat.system_prompt.as_deref(), &tools));

    let analyzer = ContinuationAnalyzer::new(ContinuationPhrases::from_config(&config.continuation));
    let transcript: Arc<dyn TranscriptStore> = history.clone();
    let turn = AgenticTurn::new(tools, transcript, config.turn_options()).with_analyzer(analyzer);

    let mut stream = turn.execute_agentic_loop(prompt, provider, chat_options);
    while let Some(event) = stream.next().await {
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            println!("{}", format_event(&event));
        }
    }

    let summary = stream.finish().await?;
    history.add_message(Message::assistant(summary.final_response.clone()));
    if json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!();
        println!("{}", format_summary(&summary));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use turnloop_agent::StopReason;
    use turnloop_core::tool::{ToolCall, ToolResult};
    use turnloop_core::{AgenticTurnOptions, TurnState};

    #[test]
    fn formats_each_event_kind() {
        let call = ToolCall::with_id("call_1", "calculate", json!({"expression": "2+2"}).as_object().cloned().unwrap());
        let start = TurnEvent::now(TurnEventData::TurnStart {
            prompt: "sum".into(),
            options: AgenticTurnOptions::default(),
        });
        assert_eq!(
            format_event(&start),
            "▶ start: sum (max_turns=10, max_tool_calls=50, timeout=300000ms)"
        );

        let request = TurnEvent::now(TurnEventData::ToolCallRequest(call.clone()));
        assert_eq!(format_event(&request), r#"🔧 calculate {"expression":"2+2"}"#);

        let response = TurnEvent::now(TurnEventData::ToolCallResponse(ToolResult::success(&call, json!(4))));
        assert_eq!(format_event(&response), "   ✅ calculate: 4");

        let mut state = TurnState::new(2, "p");
        state.mark_needs_continuation();
        assert_eq!(format_event(&TurnEvent::now(TurnEventData::TurnComplete(state.clone()))), "↻ turn 2 continues");
        state.mark_complete();
        assert_eq!(format_event(&TurnEvent::now(TurnEventData::TurnComplete(state))), "✔ turn 2 complete");
    }

    #[test]
    fn summary_line() {
        let summary = RunSummary {
            turns: vec![TurnState::new(1, "p")],
            final_response: "4".into(),
            stop_reason: StopReason::Completed,
            stats: Default::default(),
        };
        assert_eq!(format_summary(&summary), "Stopped: Completed after 1 turn(s), 0 tool call(s)\nFinal response: 4");
    }

    #[tokio::test]
    async fn replays_a_script_file() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("script.json");
        std::fs::write(
            &script,
            r#"[{"content": "", "functionCalls": [{"name": "calculate", "args": {"expression": "6*7"}}]}]"#,
        )
        .unwrap();
        assert!(run(&AppConfig::default(), &script, "what is 6*7", true).await.is_ok());
        assert!(run(&AppConfig::default(), &dir.path().join("missing.json"), "x", false).await.is_err());
    }
}
