//! Error types for the ClawLoop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all ClawLoop operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Resumption input rejected ---
    #[error("Invalid resumption input: {0}")]
    Resume(#[from] ResumeError),

    // --- Hook errors ---
    #[error("Hook error: {0}")]
    Hook(#[from] HookError),

    // --- Message log errors ---
    #[error("Message log error: {0}")]
    Log(#[from] LogError),

    // --- Cooperative cancellation ---
    #[error("Agent loop interrupted")]
    Interrupted,

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error is the interruption signal (never swallowed by the loop).
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("Permission denied: {tool_name} — {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution cancelled: {0}")]
    Cancelled(String),
}

impl ToolError {
    /// Transient failures worth another attempt under the execution policy.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ExecutionFailed { .. } | Self::Timeout { .. })
    }
}

/// Rejections of caller-supplied resumption input.
///
/// The log is never touched when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResumeError {
    #[error("tool calls {pending:?} are awaiting results but the input carries no tool outcomes")]
    MissingToolOutcomes { pending: Vec<String> },

    #[error("tool outcome '{0}' is supplied more than once")]
    DuplicateOutcome(String),

    #[error("tool outcome '{0}' does not answer any pending tool call")]
    UnknownOutcome(String),

    #[error(
        "outcomes for {supplied:?} only partially resolve pending calls {pending:?} and cannot be mixed with other content"
    )]
    AmbiguousPartialResumption {
        supplied: Vec<String>,
        pending: Vec<String>,
    },
}

/// A hook failed while handling a phase event.
#[derive(Debug, Clone, Error)]
#[error("hook '{hook}' failed during {phase}: {reason}")]
pub struct HookError {
    pub hook: String,
    pub phase: String,
    pub reason: String,
}

impl HookError {
    /// Create an error from inside a hook; the pipeline fills in hook name and phase.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            hook: String::new(),
            phase: String::new(),
            reason: reason.into(),
        }
    }

    /// Attribute this error to a hook and phase.
    pub fn within(mut self, hook: impl Into<String>, phase: impl Into<String>) -> Self {
        self.hook = hook.into();
        self.phase = phase.into();
        self
    }
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("Storage error: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn hook_error_is_attributed() {
        let err = HookError::new("bad arguments").within("guard", "pre_acting");
        let msg = Error::from(err).to_string();
        assert!(msg.contains("guard"));
        assert!(msg.contains("pre_acting"));
        assert!(msg.contains("bad arguments"));
    }

    #[test]
    fn only_transient_tool_errors_retry() {
        assert!(ToolError::Timeout { tool_name: "x".into(), timeout_ms: 10 }.is_retryable());
        assert!(!ToolError::NotFound("x".into()).is_retryable());
        assert!(!ToolError::InvalidArguments("x".into()).is_retryable());
    }

    #[test]
    fn resume_error_names_ids() {
        let err = ResumeError::AmbiguousPartialResumption {
            supplied: vec!["a".into()],
            pending: vec!["a".into(), "b".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("\"a\""));
        assert!(msg.contains("\"b\""));
    }
}
