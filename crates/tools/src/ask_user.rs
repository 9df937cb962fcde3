//! Ask-user tool — hands a question to a human and suspends.
//!
//! The tool never answers by itself. Its outcome is a suspended placeholder
//! carrying the question; the caller later resumes the loop with the human's
//! answer as a tool outcome for the same call id.

use async_trait::async_trait;
use clawloop_core::error::ToolError;
use clawloop_core::tool::{Tool, ToolContext, ToolOutput};

pub const ASK_USER_TOOL: &str = "ask_user";

pub struct AskUserTool;

#[async_trait]
impl Tool for AskUserTool {
    fn name(&self) -> &str {
        ASK_USER_TOOL
    }

    fn description(&self) -> &str {
        "Ask the human user a question and wait for their answer. Use when you need a decision, \
         confirmation, or information only the user has."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to put to the user"
                }
            },
            "required": ["question"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let question = arguments["question"]
            .as_str()
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'question' argument".into()))?;

        Ok(ToolOutput::suspend(format!("Awaiting user answer to: {question}")))
    }
}
