//! Deciding whether the loop runs another turn.
//!
//! The decision is a heuristic over lowercase substring matches. Rules are
//! evaluated in order and the first match wins:
//!
//! 1. completion phrase, no tool error, not first-tool-only → stop
//! 2. continuation phrase, tool error, incompleteness phrase or
//!    first-tool-only → continue
//! 3. otherwise stop
//!
//! "first-tool-only" means exactly one tool ran this turn while the user's
//! messages contain a multi-task connective. Substring matching produces
//! false positives ("dan" inside "redundant", "next" inside "context");
//! they are accepted as is.

use serde::{Deserialize, Serialize};
use turnloop_config::ContinuationConfig;
use turnloop_core::message::{Message, Role};
use turnloop_core::tool::ToolResult;

const COMPLETION: &[&str] = &[
    "done",
    "complete",
    "finished",
    "task completed",
    "successfully",
    "all set",
    "that's it",
    "final result",
    "task accomplished",
    "selesai",
    "berhasil",
    "telah selesai",
];

const CONTINUATION: &[&str] = &[
    "next",
    "then",
    "now i will",
    "let me also",
    "i need to",
    "i should",
    "after that",
    "following",
    "continue",
    "proceed",
    "sekarang",
    "selanjutnya",
    "lalu",
    "kemudian",
    "mari",
    "langkah",
];

const INCOMPLETE: &[&str] = &["incomplete", "partial", "in progress"];

const MULTI_TASK: &[&str] = &[
    "then",
    "and then",
    "lalu",
    "kemudian",
    "dan",
    "juga",
    "serta",
    "setelah itu",
    "after that",
    "next",
];

/// The four phrase lists, all lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationPhrases {
    pub completion: Vec<String>,
    pub continuation: Vec<String>,
    pub incomplete: Vec<String>,
    pub multi_task: Vec<String>,
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn extend_lowercase(target: &mut Vec<String>, extra: &[String]) {
    for phrase in extra {
        let phrase = phrase.trim().to_lowercase();
        if !phrase.is_empty() && !target.contains(&phrase) {
            target.push(phrase);
        }
    }
}

impl ContinuationPhrases {
    /// The built-in lists extended with the configured extras.
    pub fn from_config(config: &ContinuationConfig) -> Self {
        let mut phrases = Self::default();
        extend_lowercase(&mut phrases.completion, &config.completion);
        extend_lowercase(&mut phrases.continuation, &config.continuation);
        extend_lowercase(&mut phrases.incomplete, &config.incomplete);
        extend_lowercase(&mut phrases.multi_task, &config.multi_task);
        phrases
    }
}

impl Default for ContinuationPhrases {
    fn default() -> Self {
        Self {
            completion: owned(COMPLETION),
            continuation: owned(CONTINUATION),
            incomplete: owned(INCOMPLETE),
            multi_task: owned(MULTI_TASK),
        }
    }
}

/// Which cues fired for one turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationSignals {
    pub has_continuation: bool,
    pub has_errors: bool,
    pub has_incomplete: bool,
    pub has_completion: bool,
    pub multi_task_request: bool,
    pub first_tool_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationDecision {
    pub should_continue: bool,
    pub signals: ContinuationSignals,
}

#[derive(Debug, Clone, Default)]
pub struct ContinuationAnalyzer {
    phrases: ContinuationPhrases,
}

fn contains_any(haystack: &str, phrases: &[String]) -> bool {
    phrases.iter().any(|p| haystack.contains(p.as_str()))
}

impl ContinuationAnalyzer {
    pub fn new(phrases: ContinuationPhrases) -> Self {
        Self { phrases }
    }

    pub fn phrases(&self) -> &ContinuationPhrases {
        &self.phrases
    }

    /// Evaluate one turn.
    ///
    /// `user_text` is the concatenation of the transcript's user messages,
    /// see [`user_text`].
    pub fn analyze(&self, response: &str, results: &[ToolResult], user_text: &str) -> ContinuationDecision {
        let response = response.to_lowercase();
        let user_text = user_text.to_lowercase();

        let multi_task_request = contains_any(&user_text, &self.phrases.multi_task);
        let signals = ContinuationSignals {
            has_continuation: contains_any(&response, &self.phrases.continuation),
            has_errors: results.iter().any(ToolResult::is_error),
            has_incomplete: contains_any(&response, &self.phrases.incomplete),
            has_completion: contains_any(&response, &self.phrases.completion),
            multi_task_request,
            first_tool_only: results.len() == 1 && multi_task_request,
        };

        let should_continue = if signals.has_completion && !signals.has_errors && !signals.first_tool_only {
            false
        } else {
            signals.has_continuation || signals.has_errors || signals.has_incomplete || signals.first_tool_only
        };

        ContinuationDecision {
            should_continue,
            signals,
        }
    }
}

/// All user messages joined by single spaces.
pub fn user_text(messages: &[Message]) -> String {
    messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use turnloop_core::tool::{Arguments, ToolCall};

    fn ok(name: &str) -> ToolResult {
        ToolResult::success(&ToolCall::new(name, Arguments::new()), json!("ok"))
    }

    fn failed(name: &str) -> ToolResult {
        ToolResult::failure(&ToolCall::new(name, Arguments::new()), "boom")
    }

    fn analyze(response: &str, results: &[ToolResult], user: &str) -> ContinuationDecision {
        ContinuationAnalyzer::default().analyze(response, results, user)
    }

    #[test]
    fn completion_without_errors_stops() {
        let d = analyze("Task completed successfully.", &[ok("calculate")], "what is 2+2");
        assert!(!d.should_continue);
        assert!(d.signals.has_completion);
    }

    #[test]
    fn completion_with_error_continues() {
        let d = analyze("Done.", &[failed("read_file")], "read a file");
        assert!(d.should_continue);
        assert!(d.signals.has_errors);
    }

    #[test]
    fn first_tool_only_overrides_completion() {
        let d = analyze("Done reading.", &[ok("read_file")], "read the file and then summarize it");
        assert!(d.signals.multi_task_request);
        assert!(d.signals.first_tool_only);
        assert!(d.should_continue);
    }

    #[test]
    fn two_results_are_not_first_tool_only() {
        let d = analyze("All set.", &[ok("a"), ok("b")], "do a then b");
        assert!(!d.signals.first_tool_only);
        assert!(!d.should_continue);
    }

    #[test]
    fn continuation_phrase_continues() {
        let d = analyze("I read it. Next I will write the summary.", &[ok("read_file")], "summarize");
        assert!(d.should_continue);
        assert!(d.signals.has_continuation);
    }

    #[test]
    fn incomplete_phrase_continues() {
        let d = analyze("Results are partial.", &[ok("list_files")], "list");
        assert!(d.should_continue);
        assert!(d.signals.has_incomplete);
    }

    #[test]
    fn no_signal_stops() {
        let d = analyze("Here is the answer: 4", &[ok("calculate")], "what is 2+2");
        assert!(!d.should_continue);
        assert_eq!(d.signals, ContinuationSignals::default());
    }

    #[test]
    fn matching_ignores_case() {
        let d = analyze("TASK COMPLETED", &[], "HELLO");
        assert!(!d.should_continue);
        assert!(d.signals.has_completion);
    }

    #[test]
    fn indonesian_phrases() {
        assert!(!analyze("Tugas telah selesai", &[], "buat file").should_continue);
        assert!(analyze("Selanjutnya saya akan membaca file", &[], "baca").should_continue);
    }

    #[test]
    fn substring_false_positive_is_accepted() {
        // "dan" inside "redundant" reads as a multi-task connective.
        let d = analyze("Done.", &[ok("read_file")], "remove the redundant lines");
        assert!(d.signals.first_tool_only);
        assert!(d.should_continue);
    }

    #[test]
    fn configured_extras_extend_defaults() {
        let config = ContinuationConfig {
            completion: vec!["  Wrapped Up ".into()],
            continuation: vec![],
            incomplete: vec!["WIP".into()],
            multi_task: vec![],
        };
        let phrases = ContinuationPhrases::from_config(&config);
        assert!(phrases.completion.contains(&"wrapped up".to_string()));
        assert!(phrases.completion.contains(&"done".to_string()));
        let analyzer = ContinuationAnalyzer::new(phrases);
        assert!(!analyzer.analyze("All wrapped up", &[], "x").should_continue);
        assert!(analyzer.analyze("still wip", &[], "x").should_continue);
    }

    #[test]
    fn user_text_joins_only_user_messages() {
        let messages = vec![
            Message::user("read a.txt"),
            Message::assistant("ok"),
            Message::system("be brief"),
            Message::user("then b.txt"),
        ];
        assert_eq!(user_text(&messages), "read a.txt then b.txt");
    }
}
