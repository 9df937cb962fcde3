//! Turn and content block domain types.
//!
//! A [`Turn`] is one immutable entry in the conversation log. Its content is an
//! ordered list of [`ContentBlock`]s: plain text, model reasoning, tool
//! invocations requested by the assistant, and tool outcomes answering them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// System instructions
    System,
    /// Tool execution result
    Tool,
}

/// Why the loop produced a terminal turn.
///
/// This is the caller-visible outcome of one controller run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationReason {
    /// The model finished without requesting further tool work.
    NormalFinish,
    /// A post-reasoning hook asked the loop to stop.
    StopRequestedReasoning,
    /// A post-acting hook asked the loop to stop.
    StopRequestedActing,
    /// One or more tool outcomes await external completion.
    ToolSuspended,
    /// Partial content flushed when the run was interrupted.
    Interrupted,
}

impl std::fmt::Display for GenerationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NormalFinish => "normal-finish",
            Self::StopRequestedReasoning => "stop-requested(reasoning)",
            Self::StopRequestedActing => "stop-requested(acting)",
            Self::ToolSuspended => "tool-suspended",
            Self::Interrupted => "interrupted",
        };
        f.write_str(s)
    }
}

/// A tool call requested by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Unique call ID (matches the LLM's tool_call.id)
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

impl ToolInvocation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The result of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// The invocation ID this outcome answers
    pub id: String,

    /// Name of the tool that produced it
    pub name: String,

    /// Output content shown to the model
    pub output: String,

    /// Awaiting external (human) completion; never persisted to the log
    #[serde(default)]
    pub suspended: bool,
}

impl ToolOutcome {
    /// A finalized outcome.
    pub fn completed(id: impl Into<String>, name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            output: output.into(),
            suspended: false,
        }
    }

    /// A placeholder outcome awaiting external completion.
    pub fn suspended(id: impl Into<String>, name: impl Into<String>, placeholder: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            output: placeholder.into(),
            suspended: true,
        }
    }
}

/// A typed unit of turn content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Reasoning { text: String },
    ToolInvocation(ToolInvocation),
    ToolOutcome(ToolOutcome),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::Reasoning { text: text.into() }
    }

    pub fn is_tool_outcome(&self) -> bool {
        matches!(self, Self::ToolOutcome(_))
    }
}

/// One immutable entry in the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    pub id: String,

    /// Who authored this turn
    pub role: Role,

    /// Ordered content
    #[serde(default)]
    pub blocks: Vec<ContentBlock>,

    /// Outcome tag set on terminal turns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<GenerationReason>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Optional metadata (usage, finish reason, etc.)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Turn {
    /// Create a turn with the given role and blocks.
    pub fn new(role: Role, blocks: Vec<ContentBlock>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            blocks,
            reason: None,
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, vec![ContentBlock::text(content)])
    }

    /// Create a new assistant turn with a single text block.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, vec![ContentBlock::text(content)])
    }

    /// Create a new system turn.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, vec![ContentBlock::text(content)])
    }

    /// Create a tool turn carrying one outcome.
    pub fn tool_result(outcome: ToolOutcome) -> Self {
        Self::new(Role::Tool, vec![ContentBlock::ToolOutcome(outcome)])
    }

    /// Tag this turn with a generation reason.
    pub fn with_reason(mut self, reason: GenerationReason) -> Self {
        self.reason = Some(reason);
        self
    }

    /// Concatenated text blocks.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Concatenated reasoning blocks.
    pub fn reasoning(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Reasoning { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_invocations(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.blocks.iter().filter_map(|b| match b {
            ContentBlock::ToolInvocation(inv) => Some(inv),
            _ => None,
        })
    }

    pub fn tool_outcomes(&self) -> impl Iterator<Item = &ToolOutcome> {
        self.blocks.iter().filter_map(|b| match b {
            ContentBlock::ToolOutcome(out) => Some(out),
            _ => None,
        })
    }

    pub fn has_tool_invocations(&self) -> bool {
        self.tool_invocations().next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_turn() {
        let turn = Turn::user("Hello, agent!");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.text(), "Hello, agent!");
        assert!(!turn.has_tool_invocations());
        assert!(turn.reason.is_none());
    }

    #[test]
    fn turn_accessors_filter_by_kind() {
        let turn = Turn::new(
            Role::Assistant,
            vec![
                ContentBlock::reasoning("think "),
                ContentBlock::reasoning("hard"),
                ContentBlock::text("answer"),
                ContentBlock::ToolInvocation(ToolInvocation::new(
                    "t1",
                    "search",
                    serde_json::json!({"q": "rust"}),
                )),
            ],
        );
        assert_eq!(turn.reasoning(), "think hard");
        assert_eq!(turn.text(), "answer");
        assert_eq!(turn.tool_invocations().count(), 1);
        assert_eq!(turn.tool_outcomes().count(), 0);
    }

    #[test]
    fn content_block_serialization_is_tagged() {
        let block = ContentBlock::ToolOutcome(ToolOutcome::suspended("t2", "ask_user", "pending"));
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains(r#""type":"tool_outcome""#));
        assert!(json.contains(r#""suspended":true"#));
    }

    #[test]
    fn generation_reason_display() {
        assert_eq!(GenerationReason::NormalFinish.to_string(), "normal-finish");
        assert_eq!(GenerationReason::ToolSuspended.to_string(), "tool-suspended");
        assert_eq!(
            GenerationReason::StopRequestedActing.to_string(),
            "stop-requested(acting)"
        );
    }
}
