//! Preservation context
//!
//! Facts that must survive summarization, derived from the whole turn list
//! in a single fold. Nothing here depends on anchor detection.

use serde::{Deserialize, Serialize};

use crate::signals::{classify, Signal, Verdict};
use crate::turn::{display_name, normalize_whitespace, truncate, ConversationTurn, Role, ToolKind};

/// Longest user intent kept verbatim
const MAX_INTENT_CHARS: usize = 300;
/// Longest single error line in the summary
const MAX_ERROR_CHARS: usize = 160;

/// Leading phrases removed before looking for a verb
const POLITENESS_PREFIXES: &[&str] = &[
    "please",
    "kindly",
    "could you",
    "can you",
    "would you",
    "will you",
    "help me",
    "i need you to",
    "i want you to",
    "i'd like you to",
    "i would like you to",
    "let's",
    "lets",
    "now",
    "then",
    "and",
];

const ACTION_VERBS: &[&str] = &[
    "add", "build", "change", "check", "clean", "configure", "convert", "create", "debug",
    "delete", "deploy", "document", "enable", "disable", "extract", "find", "fix", "implement",
    "improve", "install", "integrate", "investigate", "make", "migrate", "move", "optimize",
    "refactor", "remove", "rename", "replace", "resolve", "rewrite", "run", "set", "setup",
    "support", "test", "update", "upgrade", "validate", "write",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BuildStatus {
    Passing,
    Failing,
    #[default]
    Unknown,
}

impl BuildStatus {
    fn from_signal(signal: Signal) -> Self {
        match signal.verdict {
            Verdict::Pass => BuildStatus::Passing,
            Verdict::Fail => BuildStatus::Failing,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Passing => "passing",
            BuildStatus::Failing => "failing",
            BuildStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PreservationContext {
    pub active_files: Vec<String>,
    pub current_goals: Vec<String>,
    pub error_states: Vec<String>,
    pub build_status: BuildStatus,
    pub last_user_intent: String,
}

impl PreservationContext {
    /// Fold over all turns into a fresh context
    pub fn extract(turns: &[ConversationTurn]) -> Self {
        turns.iter().fold(Self::default(), |ctx, turn| ctx.absorb(turn))
    }

    fn absorb(mut self, turn: &ConversationTurn) -> Self {
        if turn.role == Role::User {
            if let Some(goal) = extract_goal(&turn.content) {
                if !self
                    .current_goals
                    .iter()
                    .any(|g| g.eq_ignore_ascii_case(&goal))
                {
                    self.current_goals.push(goal);
                }
            }
            let intent = normalize_whitespace(&turn.content);
            if !intent.is_empty() {
                self.last_user_intent = truncate(&intent, MAX_INTENT_CHARS);
            }
        }

        if turn.role == Role::Tool {
            if let Some(signal) = classify(&turn.content) {
                self.build_status = BuildStatus::from_signal(signal);
            }
        }

        for call in &turn.tool_calls {
            let kind = call.kind();
            if matches!(kind, ToolKind::Edit | ToolKind::Write | ToolKind::Read) {
                if let Some(path) = call.path() {
                    let name = display_name(path);
                    if !self.active_files.contains(&name) {
                        self.active_files.push(name);
                    }
                }
            }

            let Some(result) = &call.result else {
                continue;
            };
            if let Some(message) = result.error_message() {
                self.error_states.push(message);
            }
            if let Some(signal) = call.signal() {
                self.build_status = BuildStatus::from_signal(signal);
            }
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.active_files.is_empty()
            && self.current_goals.is_empty()
            && self.error_states.is_empty()
            && self.build_status == BuildStatus::Unknown
            && self.last_user_intent.is_empty()
    }

    /// Fixed-label lines; fields without data are left out
    pub fn format_for_summary(&self) -> String {
        let mut lines = Vec::new();
        if !self.active_files.is_empty() {
            lines.push(format!("Active files: {}", self.active_files.join(", ")));
        }
        if !self.current_goals.is_empty() {
            lines.push(format!("Goals: {}", self.current_goals.join("; ")));
        }
        if !self.error_states.is_empty() {
            let errors: Vec<String> = self
                .error_states
                .iter()
                .map(|e| truncate(&normalize_whitespace(e), MAX_ERROR_CHARS))
                .collect();
            lines.push(format!("Errors: {}", errors.join("; ")));
        }
        if self.build_status != BuildStatus::Unknown {
            lines.push(format!("Build: {}", self.build_status.as_str()));
        }
        if !self.last_user_intent.is_empty() {
            lines.push(format!("Last user intent: {}", self.last_user_intent));
        }
        lines.join("\n")
    }
}

// ============================================================================
// Goal heuristic
// ============================================================================

/// First sentence of a user message, reduced to verb + object
///
/// Politeness phrasing is stripped from the front, and the remainder must
/// start with a known action verb. "Please fix the auth bug." becomes
/// "Fix the auth bug".
fn extract_goal(text: &str) -> Option<String> {
    let sentence = text
        .split(['.', '!', '?', '\n'])
        .map(str::trim)
        .find(|s| !s.is_empty())?;
    let mut rest = normalize_whitespace(sentence);

    loop {
        let lower = rest.to_ascii_lowercase();
        let stripped = POLITENESS_PREFIXES.iter().find_map(|prefix| {
            lower
                .strip_prefix(prefix)
                .filter(|tail| tail.is_empty() || tail.starts_with([' ', ',']))
                .map(|tail| rest[rest.len() - tail.len()..].trim_start_matches([' ', ',']).to_string())
        });
        match stripped {
            Some(next) if next != rest => rest = next,
            _ => break,
        }
    }

    let rest = rest
        .trim_end_matches(|c: char| c == ',' || c.is_whitespace())
        .trim_end_matches(" please")
        .trim_end_matches(',')
        .trim()
        .to_string();
    let verb = rest.split_whitespace().next()?.to_lowercase();
    if !ACTION_VERBS.contains(&verb.as_str()) || rest.split_whitespace().count() < 2 {
        return None;
    }

    let mut chars = rest.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::ToolInvocation;
    use serde_json::json;

    fn bash(output: &str, success: bool) -> ToolInvocation {
        let call = ToolInvocation::new("Bash", json!({"command": "cargo test"}));
        if success {
            call.succeeded(output)
        } else {
            call.with_result(crate::turn::ToolOutcome::failure("exit status 101").with_output(output))
        }
    }

    #[test]
    fn test_active_files_in_first_seen_order() {
        let turns = vec![
            ConversationTurn::user("Fix login"),
            ConversationTurn::assistant("editing")
                .with_tool_call(ToolInvocation::new("Edit", json!({"file_path": "src/auth.rs"})).succeeded("ok")),
            ConversationTurn::assistant("writing")
                .with_tool_call(ToolInvocation::new("Write", json!({"file_path": "web/login.ts"})).succeeded("ok")),
            ConversationTurn::assistant("reading")
                .with_tool_call(ToolInvocation::new("Read", json!({"file_path": "config.json"})).succeeded("{}")),
            ConversationTurn::assistant("again")
                .with_tool_call(ToolInvocation::new("Read", json!({"file_path": "src/auth.rs"})).succeeded("..."))
                .with_tool_call(ToolInvocation::new("Grep", json!({"path": "src"})).succeeded("x")),
        ];

        let ctx = PreservationContext::extract(&turns);
        assert_eq!(ctx.active_files, vec!["auth.rs", "login.ts", "config.json"]);
    }

    #[test]
    fn test_build_status_follows_latest_signal() {
        let passing = vec![ConversationTurn::assistant("t").with_tool_call(bash("All 15 tests passed", true))];
        assert_eq!(PreservationContext::extract(&passing).build_status, BuildStatus::Passing);

        let failing = vec![ConversationTurn::assistant("t").with_tool_call(bash("FAILED: 3 tests failed", false))];
        assert_eq!(PreservationContext::extract(&failing).build_status, BuildStatus::Failing);

        let recovered = vec![
            ConversationTurn::assistant("t").with_tool_call(bash("FAILED: 3 tests failed", false)),
            ConversationTurn::assistant("t").with_tool_call(bash("ls output", true)),
            ConversationTurn::assistant("t").with_tool_call(bash("All 15 tests passed", true)),
        ];
        assert_eq!(PreservationContext::extract(&recovered).build_status, BuildStatus::Passing);

        let quiet = vec![ConversationTurn::assistant("t").with_tool_call(bash("src lib", true))];
        assert_eq!(PreservationContext::extract(&quiet).build_status, BuildStatus::Unknown);
    }

    #[test]
    fn test_file_contents_do_not_change_build_status() {
        let source = "fn main() {\n    eprintln!(\"Error: {e}\");\n    // tests failed before\n}";
        let turns = vec![
            ConversationTurn::assistant("t").with_tool_call(bash("test result: ok. 4 passed; 0 failed", true)),
            ConversationTurn::assistant("r").with_tool_call(
                ToolInvocation::new("Read", json!({"file_path": "src/main.rs"})).succeeded(source),
            ),
            ConversationTurn::assistant("g").with_tool_call(
                ToolInvocation::new("Grep", json!({"pattern": "panicked at"})).succeeded("src/lib.rs:3: panicked at"),
            ),
            ConversationTurn::assistant("e").with_tool_call(
                ToolInvocation::new("Edit", json!({"file_path": "src/main.rs"})).succeeded(source),
            ),
        ];
        let ctx = PreservationContext::extract(&turns);
        assert_eq!(ctx.build_status, BuildStatus::Passing);
        assert!(ctx.error_states.is_empty());
    }

    #[test]
    fn test_tool_role_content_counts_as_output() {
        let turns = vec![ConversationTurn::tool("test result: ok. 4 passed; 0 failed")];
        assert_eq!(PreservationContext::extract(&turns).build_status, BuildStatus::Passing);
    }

    #[test]
    fn test_error_states_most_recent_last() {
        let turns = vec![
            ConversationTurn::assistant("a")
                .with_tool_call(ToolInvocation::new("Bash", json!({})).failed("command not found: npx")),
            ConversationTurn::assistant("b").with_tool_call(bash("error[E0425]: cannot find value", false)),
        ];
        let ctx = PreservationContext::extract(&turns);
        assert_eq!(
            ctx.error_states,
            vec!["command not found: npx", "exit status 101"]
        );
    }

    #[test]
    fn test_goal_heuristic() {
        assert_eq!(extract_goal("Please fix the auth bug.").as_deref(), Some("Fix the auth bug"));
        assert_eq!(
            extract_goal("Could you please add rate limiting to the API? Thanks").as_deref(),
            Some("Add rate limiting to the API")
        );
        assert_eq!(
            extract_goal("let's refactor the parser module").as_deref(),
            Some("Refactor the parser module")
        );
        assert_eq!(extract_goal("Thanks, looks good!"), None);
        assert_eq!(extract_goal("fix"), None);
        assert_eq!(extract_goal(""), None);
    }

    #[test]
    fn test_goals_deduplicated_and_intent_is_latest() {
        let turns = vec![
            ConversationTurn::user("Please fix the auth bug"),
            ConversationTurn::assistant("on it"),
            ConversationTurn::user("fix the auth bug"),
            ConversationTurn::user("Also   update the\n docs"),
        ];
        let ctx = PreservationContext::extract(&turns);
        assert_eq!(ctx.current_goals, vec!["Fix the auth bug"]);
        assert_eq!(ctx.last_user_intent, "Also update the docs");
    }

    #[test]
    fn test_format_for_summary_omits_empty_fields() {
        let ctx = PreservationContext {
            active_files: vec!["auth.rs".into(), "login.ts".into()],
            build_status: BuildStatus::Passing,
            ..Default::default()
        };
        assert_eq!(ctx.format_for_summary(), "Active files: auth.rs, login.ts\nBuild: passing");

        assert_eq!(PreservationContext::default().format_for_summary(), "");
        assert!(PreservationContext::default().is_empty());
    }

    #[test]
    fn test_format_for_summary_is_deterministic() {
        let ctx = PreservationContext {
            active_files: vec!["a.rs".into()],
            current_goals: vec!["Fix a".into(), "Test b".into()],
            error_states: vec!["boom".into()],
            build_status: BuildStatus::Failing,
            last_user_intent: "fix a".into(),
        };
        let first = ctx.format_for_summary();
        assert_eq!(first, ctx.clone().format_for_summary());
        assert_eq!(
            first,
            "Active files: a.rs\nGoals: Fix a; Test b\nErrors: boom\nBuild: failing\nLast user intent: fix a"
        );
        assert!(!first.contains("[from conversation]"));
    }
}
