//! Provider trait — the abstraction over streaming LLM backends.
//!
//! A Provider knows how to send the prepared prompt to a model and hand back
//! the response as a sequence of [`StreamFragment`]s. Wire formats are the
//! provider's concern; the agent loop only ever sees fragments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::Turn;

/// Generation options for one model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// The model to use (e.g., "anthropic/claude-sonnet-4", "gpt-4o")
    pub model: String,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,

    /// Force a specific tool ("auto" when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

fn default_temperature() -> f32 {
    0.7
}

impl GenerationOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: default_temperature(),
            max_tokens: None,
            stop: Vec::new(),
            tool_choice: None,
        }
    }
}

/// A tool definition sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A streaming request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The full prompt: system turn followed by the conversation
    pub turns: Vec<Turn>,

    /// Available tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Effective generation options
    pub options: GenerationOptions,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single fragment of a streaming response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFragment {
    /// Partial chain-of-thought
    ReasoningDelta { text: String },

    /// Partial answer text
    TextDelta { text: String },

    /// Partial tool invocation.
    ///
    /// The first fragment of a call usually carries `id` and `name`; later
    /// fragments may carry only an argument continuation.
    ToolInvocationDelta {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default)]
        arguments_delta: String,
    },

    /// End of stream
    End {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
}

impl StreamFragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self::TextDelta { text: text.into() }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Self::ReasoningDelta { text: text.into() }
    }

    /// Opening fragment of a tool invocation.
    pub fn tool_start(id: impl Into<String>, name: impl Into<String>, arguments_delta: impl Into<String>) -> Self {
        Self::ToolInvocationDelta {
            id: Some(id.into()),
            name: Some(name.into()),
            arguments_delta: arguments_delta.into(),
        }
    }

    /// Argument continuation with no id attached.
    pub fn tool_args(arguments_delta: impl Into<String>) -> Self {
        Self::ToolInvocationDelta {
            id: None,
            name: None,
            arguments_delta: arguments_delta.into(),
        }
    }

    pub fn end() -> Self {
        Self::End {
            usage: None,
            finish_reason: None,
        }
    }
}

/// Receiver side of a provider stream.
pub type FragmentStream = mpsc::Receiver<Result<StreamFragment, ProviderError>>;

/// The core Provider trait.
///
/// Every LLM backend implements this trait. The agent loop calls `stream()`
/// without knowing which provider is being used.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter", "anthropic").
    fn name(&self) -> &str;

    /// Send a request and get a stream of response fragments.
    ///
    /// The sender side is dropped once the response is complete.
    async fn stream(&self, request: ProviderRequest) -> Result<FragmentStream, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_options_defaults() {
        let opts = GenerationOptions::new("gpt-4o");
        assert!((opts.temperature - 0.7).abs() < f32::EPSILON);
        assert!(opts.max_tokens.is_none());
        assert!(opts.tool_choice.is_none());
    }

    #[test]
    fn fragment_deserialization() {
        let json = r#"{"type":"tool_invocation_delta","arguments_delta":"{\"q\":"}"#;
        let frag: StreamFragment = serde_json::from_str(json).unwrap();
        match frag {
            StreamFragment::ToolInvocationDelta { id, name, arguments_delta } => {
                assert!(id.is_none());
                assert!(name.is_none());
                assert_eq!(arguments_delta, "{\"q\":");
            }
            other => panic!("Wrong variant: {other:?}"),
        }
    }

    #[test]
    fn tool_definition_serialization() {
        let tool = ToolDefinition {
            name: "search".into(),
            description: "Search the web".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"]
            }),
        };
        let json = serde_json::to_string(&tool).unwrap();
        assert!(json.contains("search"));
        assert!(json.contains("query"));
    }
}
