//! Agent configuration types.

use serde::{Deserialize, Serialize};

use crate::provider::GenerationOptions;

/// Configuration for the agent's behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent name (used in logs and execution contexts)
    #[serde(default = "default_name")]
    pub name: String,

    /// System prompt prepended to every model call
    #[serde(default)]
    pub system_prompt: String,

    /// Default generation options
    pub options: GenerationOptions,

    /// Maximum reasoning iterations per run before summarizing
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Directive injected when the iteration budget runs out
    #[serde(default = "default_summary_directive")]
    pub summary_directive: String,
}

fn default_name() -> String {
    "assistant".into()
}
fn default_max_iterations() -> u32 {
    10
}
pub fn default_summary_directive() -> String {
    "You have failed to generate a response within the maximum iterations. \
     Now respond directly by summarizing the current situation."
        .into()
}

impl AgentConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            name: default_name(),
            system_prompt: String::new(),
            options: GenerationOptions::new(model),
            max_iterations: default_max_iterations(),
            summary_directive: default_summary_directive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_minimal_json() {
        let cfg: AgentConfig = serde_json::from_str(r#"{"options":{"model":"m"}}"#).unwrap();
        assert_eq!(cfg.name, "assistant");
        assert_eq!(cfg.max_iterations, 10);
        assert!(cfg.summary_directive.contains("summarizing"));
    }
}
