//! Finish tool — the structured-output response channel.
//!
//! The model calls `finish` with its final answer shaped by the tool's schema.
//! The tool validates that the required fields are present and echoes the
//! arguments back as JSON; a hook then stops the loop on success.

use async_trait::async_trait;
use clawloop_core::error::ToolError;
use clawloop_core::tool::{Tool, ToolContext, ToolOutput};

pub const FINISH_TOOL: &str = "finish";

pub struct FinishTool {
    schema: serde_json::Value,
}

impl FinishTool {
    /// A finish tool whose only field is a free-text `response`.
    pub fn new() -> Self {
        Self::with_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "response": {
                    "type": "string",
                    "description": "Your final answer to the user"
                }
            },
            "required": ["response"]
        }))
    }

    /// A finish tool for a caller-defined output shape.
    pub fn with_schema(schema: serde_json::Value) -> Self {
        Self { schema }
    }

    fn required_fields(&self) -> Vec<&str> {
        self.schema["required"]
            .as_array()
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }
}

impl Default for FinishTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FinishTool {
    fn name(&self) -> &str {
        FINISH_TOOL
    }

    fn description(&self) -> &str {
        "Submit your final response. Call this exactly once, when you are done."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.schema.clone()
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        _ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let Some(fields) = arguments.as_object() else {
            return Err(ToolError::InvalidArguments(
                "Arguments must be a JSON object".into(),
            ));
        };

        let missing: Vec<_> = self
            .required_fields()
            .into_iter()
            .filter(|f| !fields.contains_key(*f))
            .collect();
        if !missing.is_empty() {
            return Err(ToolError::InvalidArguments(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        Ok(ToolOutput::text(arguments.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawloop_core::tool::ExecutionContext;

    #[tokio::test]
    async fn echoes_valid_arguments() {
        let ctx = ExecutionContext::default().for_invocation("f1");
        let out = FinishTool::new()
            .execute(serde_json::json!({"response": "42"}), &ctx)
            .await
            .unwrap();
        assert!(!out.suspended);
        let parsed: serde_json::Value = serde_json::from_str(&out.content).unwrap();
        assert_eq!(parsed["response"], "42");
    }

    #[tokio::test]
    async fn missing_fields_rejected() {
        let tool = FinishTool::with_schema(serde_json::json!({
            "type": "object",
            "properties": { "city": {"type": "string"}, "population": {"type": "integer"} },
            "required": ["city", "population"]
        }));
        let ctx = ExecutionContext::default().for_invocation("f1");
        let err = tool
            .execute(serde_json::json!({"city": "Oslo"}), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("population"));
    }
}
