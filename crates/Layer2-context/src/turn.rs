//! Conversation turn model
//!
//! Turns live in an append-only [`TurnLog`]; everything downstream (anchors,
//! selection, compaction results) refers to them by index only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ContextError, Result};
use crate::signals::{classify_outcome, Signal};

/// Parameter keys that carry a file or directory path
const PATH_KEYS: &[&str] = &["file_path", "path", "notebook_path"];

/// Basename-stable display form of a path (`src/auth.rs` -> `auth.rs`)
pub fn display_name(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches(['/', '\\']);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(trimmed)
        .to_string()
}

pub(crate) fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut to `max_chars` characters, marking the cut with `...`
pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

// ============================================================================
// Role / ToolKind
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// Closed classification of tool names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolKind {
    Edit,
    Write,
    Read,
    Shell,
    Search,
    Other,
}

impl ToolKind {
    pub fn classify(tool: &str) -> Self {
        match tool.to_ascii_lowercase().as_str() {
            "edit" | "multiedit" | "multi_edit" | "str_replace" | "notebookedit" => ToolKind::Edit,
            "write" | "create" => ToolKind::Write,
            "read" | "cat" | "view" => ToolKind::Read,
            "bash" | "shell" | "sh" | "exec" => ToolKind::Shell,
            "websearch" | "web_search" | "grep" | "glob" | "search" | "ls" => ToolKind::Search,
            _ => ToolKind::Other,
        }
    }

    /// File-modifying tools
    pub fn modifies_files(&self) -> bool {
        matches!(self, ToolKind::Edit | ToolKind::Write)
    }

    /// Tools that must name a file
    pub fn requires_path(&self) -> bool {
        matches!(self, ToolKind::Edit | ToolKind::Write | ToolKind::Read)
    }

    /// Tools whose output can report a build or test run
    ///
    /// Read, search and edit results echo file contents, so an
    /// `Error:` inside a source file says nothing about the build.
    pub fn reports_checks(&self) -> bool {
        matches!(self, ToolKind::Shell | ToolKind::Other)
    }
}

// ============================================================================
// Tool invocation
// ============================================================================

/// Outcome of a tool execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
}

impl ToolOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            target_path: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            target_path: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_target(mut self, path: impl Into<String>) -> Self {
        self.target_path = Some(path.into());
        self
    }

    /// Error message, falling back to the first non-empty output line
    pub fn error_message(&self) -> Option<String> {
        if self.success {
            return None;
        }
        self.error
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .or_else(|| self.output.lines().map(str::trim).find(|l| !l.is_empty()))
            .map(str::to_string)
    }

    /// Output and error text together, for signal scanning
    pub fn text(&self) -> String {
        match &self.error {
            Some(err) if !self.output.is_empty() => format!("{}\n{}", self.output, err),
            Some(err) => err.clone(),
            None => self.output.clone(),
        }
    }
}

/// A tool call and (once executed) its result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub tool: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolOutcome>,
}

impl ToolInvocation {
    pub fn new(tool: impl Into<String>, parameters: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tool: tool.into(),
            parameters,
            result: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_result(mut self, result: ToolOutcome) -> Self {
        self.result = Some(result);
        self
    }

    pub fn succeeded(self, output: impl Into<String>) -> Self {
        self.with_result(ToolOutcome::success(output))
    }

    pub fn failed(self, error: impl Into<String>) -> Self {
        self.with_result(ToolOutcome::failure(error))
    }

    pub fn kind(&self) -> ToolKind {
        ToolKind::classify(&self.tool)
    }

    /// Path from the parameters, else from the result
    pub fn path(&self) -> Option<&str> {
        PATH_KEYS
            .iter()
            .find_map(|key| self.parameters.get(*key).and_then(Value::as_str))
            .or_else(|| self.result.as_ref()?.target_path.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    pub fn is_success(&self) -> bool {
        self.result.as_ref().is_some_and(|r| r.success)
    }

    /// Pass/fail signal of the result, for tools that run checks
    pub fn signal(&self) -> Option<Signal> {
        if !self.kind().reports_checks() {
            return None;
        }
        self.result.as_ref().and_then(classify_outcome)
    }

    pub fn is_failure(&self) -> bool {
        self.result.as_ref().is_some_and(|r| !r.success)
    }
}

// ============================================================================
// Conversation turn
// ============================================================================

/// Ordered unit of conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolInvocation>,
    pub timestamp: DateTime<Utc>,
    /// Set by the caller when the turn follows an unresolved error
    #[serde(default)]
    pub previous_error: bool,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            timestamp: Utc::now(),
            previous_error: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    pub fn with_tool_call(mut self, call: ToolInvocation) -> Self {
        self.tool_calls.push(call);
        self
    }

    pub fn with_previous_error(mut self, previous_error: bool) -> Self {
        self.previous_error = previous_error;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Whole text of the turn (message plus tool outputs)
    pub fn full_text(&self) -> String {
        let mut text = self.content.clone();
        for call in &self.tool_calls {
            if let Some(result) = &call.result {
                text.push('\n');
                text.push_str(&result.text());
            }
        }
        text
    }

    /// Reject turns that cannot be analysed
    pub fn validate(&self, turn_index: usize) -> Result<()> {
        for call in &self.tool_calls {
            if call.tool.trim().is_empty() {
                return Err(ContextError::malformed(turn_index, "tool call without a name"));
            }
            if call.kind().requires_path() && call.path().is_none() {
                return Err(ContextError::malformed(
                    turn_index,
                    format!("{} call {} has no file path", call.tool, call.id),
                ));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Turn log
// ============================================================================

/// Append-only turn arena
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnLog {
    turns: Vec<ConversationTurn>,
}

impl TurnLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn and return its stable index
    pub fn push(&mut self, turn: ConversationTurn) -> usize {
        self.turns.push(turn);
        self.turns.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&ConversationTurn> {
        self.turns.get(index)
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

impl From<Vec<ConversationTurn>> for TurnLog {
    fn from(turns: Vec<ConversationTurn>) -> Self {
        Self { turns }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("src/auth.rs"), "auth.rs");
        assert_eq!(display_name("C:\\proj\\login.ts"), "login.ts");
        assert_eq!(display_name("config.json"), "config.json");
        assert_eq!(display_name("src/components/"), "components");
    }

    #[test]
    fn test_tool_kind_classification() {
        assert_eq!(ToolKind::classify("Edit"), ToolKind::Edit);
        assert_eq!(ToolKind::classify("bash"), ToolKind::Shell);
        assert_eq!(ToolKind::classify("WebSearch"), ToolKind::Search);
        assert_eq!(ToolKind::classify("Grep"), ToolKind::Search);
        assert_eq!(ToolKind::classify("TodoWrite"), ToolKind::Other);
        assert!(ToolKind::Write.modifies_files());
        assert!(!ToolKind::Read.modifies_files());
    }

    #[test]
    fn test_signal_only_from_tools_that_run_checks() {
        let failing = "thread 'main' panicked at src/lib.rs:3:5";
        let shell = ToolInvocation::new("Bash", json!({"command": "cargo test"})).succeeded(failing);
        assert!(shell.signal().is_some());

        let custom = ToolInvocation::new("run_tests", json!({})).succeeded("All 3 tests passed");
        assert!(custom.signal().is_some_and(|s| s.is_test_pass()));

        for tool in ["Read", "Grep", "Edit", "Write"] {
            let call = ToolInvocation::new(tool, json!({"file_path": "src/lib.rs"})).succeeded(failing);
            assert!(call.signal().is_none(), "{tool}");
        }
    }

    #[test]
    fn test_path_from_params_or_result() {
        let call = ToolInvocation::new("Edit", json!({"file_path": "src/auth.rs"}));
        assert_eq!(call.path(), Some("src/auth.rs"));

        let call = ToolInvocation::new("Read", json!({}))
            .with_result(ToolOutcome::success("x").with_target("config.json"));
        assert_eq!(call.path(), Some("config.json"));
    }

    #[test]
    fn test_error_message_fallback() {
        let failed = ToolOutcome::failure("  ").with_output("\nerror[E0308]: mismatched types\nmore");
        assert_eq!(
            failed.error_message().as_deref(),
            Some("error[E0308]: mismatched types")
        );
        assert_eq!(ToolOutcome::success("ok").error_message(), None);
    }

    #[test]
    fn test_validate_flags_malformed_calls() {
        let ok = ConversationTurn::assistant("editing")
            .with_tool_call(ToolInvocation::new("Edit", json!({"file_path": "a.rs"})));
        assert!(ok.validate(0).is_ok());

        let nameless = ConversationTurn::assistant("?")
            .with_tool_call(ToolInvocation::new("", json!({})));
        assert!(matches!(
            nameless.validate(2),
            Err(ContextError::MalformedTurn { turn_index: 2, .. })
        ));

        let pathless = ConversationTurn::assistant("?")
            .with_tool_call(ToolInvocation::new("Write", json!({"content": "x"})));
        assert!(pathless.validate(0).is_err());
    }

    #[test]
    fn test_turn_log_indices_are_stable() {
        let mut log = TurnLog::new();
        assert_eq!(log.push(ConversationTurn::user("a")), 0);
        assert_eq!(log.push(ConversationTurn::assistant("b")), 1);
        assert_eq!(log.get(1).map(|t| t.role), Some(Role::Assistant));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_turn_serde() {
        let turn = ConversationTurn::user("hi")
            .with_tool_call(ToolInvocation::new("Read", json!({"file_path": "a"})).with_id("t1"));
        let json = serde_json::to_string(&turn).unwrap();
        assert!(json.contains("\"role\":\"user\""));

        let back: ConversationTurn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, turn);
    }
}
