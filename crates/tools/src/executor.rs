//! Registry-backed tool executor.
//!
//! Runs a batch of invocations against a [`ToolRegistry`] snapshot under an
//! [`ExecutionPolicy`]: per-attempt timeout, bounded retries with capped
//! exponential backoff, and optional concurrency. Outcomes always come back in
//! invocation order, and every failure is folded into outcome content.

use async_trait::async_trait;
use clawloop_core::error::ToolError;
use clawloop_core::message::{ToolInvocation, ToolOutcome};
use clawloop_core::tool::{ExecutionContext, ExecutionPolicy, ToolExecutor, ToolRegistry};
use futures::future::join_all;
use tracing::{debug, warn};

pub struct RegistryExecutor {
    registry: ToolRegistry,
}

impl RegistryExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    async fn run_one(
        &self,
        invocation: &ToolInvocation,
        policy: &ExecutionPolicy,
        ctx: &ExecutionContext,
    ) -> ToolOutcome {
        let Some(tool) = self.registry.get(&invocation.name) else {
            warn!(tool = %invocation.name, call_id = %invocation.id, "Unknown tool requested");
            return failed(invocation, &ToolError::NotFound(invocation.name.clone()));
        };

        let tool_ctx = ctx.for_invocation(&invocation.id);
        let mut attempt = 0u32;

        loop {
            let result = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => Err(ToolError::Cancelled(invocation.name.clone())),
                r = tokio::time::timeout(
                    policy.timeout,
                    tool.execute(invocation.arguments.clone(), &tool_ctx),
                ) => r.unwrap_or_else(|_| Err(ToolError::Timeout {
                    tool_name: invocation.name.clone(),
                    timeout_ms: policy.timeout.as_millis() as u64,
                })),
            };

            match result {
                Ok(output) => {
                    debug!(
                        tool = %invocation.name,
                        call_id = %invocation.id,
                        suspended = output.suspended,
                        attempts = attempt + 1,
                        "Tool finished"
                    );
                    return ToolOutcome {
                        id: invocation.id.clone(),
                        name: invocation.name.clone(),
                        output: output.content,
                        suspended: output.suspended,
                    };
                }
                Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                    attempt += 1;
                    let delay = policy.backoff_for(attempt);
                    warn!(
                        tool = %invocation.name,
                        call_id = %invocation.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Tool failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = ctx.cancel.cancelled() => {
                            return failed(invocation, &ToolError::Cancelled(invocation.name.clone()));
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    warn!(tool = %invocation.name, call_id = %invocation.id, error = %e, "Tool execution failed");
                    return failed(invocation, &e);
                }
            }
        }
    }
}

fn failed(invocation: &ToolInvocation, error: &ToolError) -> ToolOutcome {
    ToolOutcome::completed(&invocation.id, &invocation.name, format!("Error: {error}"))
}

#[async_trait]
impl ToolExecutor for RegistryExecutor {
    async fn execute(
        &self,
        invocations: &[ToolInvocation],
        policy: &ExecutionPolicy,
        ctx: &ExecutionContext,
    ) -> Vec<ToolOutcome> {
        if policy.concurrent {
            join_all(invocations.iter().map(|inv| self.run_one(inv, policy, ctx))).await
        } else {
            let mut outcomes = Vec::with_capacity(invocations.len());
            for inv in invocations {
                outcomes.push(self.run_one(inv, policy, ctx).await);
            }
            outcomes
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawloop_core::tool::{Tool, ToolContext, ToolOutput};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    /// Sleeps for `ms` then echoes its name.
    struct SleepTool {
        name: &'static str,
        ms: u64,
    }

    #[async_trait]
    impl Tool for SleepTool {
        fn name(&self) -> &str { self.name }
        fn description(&self) -> &str { "sleeps" }
        fn parameters_schema(&self) -> serde_json::Value { serde_json::json!({"type": "object"}) }
        async fn execute(&self, _arguments: serde_json::Value, ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
            ctx.emit_chunk("working");
            tokio::time::sleep(Duration::from_millis(self.ms)).await;
            Ok(ToolOutput::text(self.name))
        }
    }

    /// Fails with a retryable error until `succeed_on` attempts were made.
    struct FlakyTool {
        attempts: AtomicU32,
        succeed_on: u32,
    }

    #[async_trait]
    impl Tool for FlakyTool {
        fn name(&self) -> &str { "flaky" }
        fn description(&self) -> &str { "fails first" }
        fn parameters_schema(&self) -> serde_json::Value { serde_json::json!({"type": "object"}) }
        async fn execute(&self, _arguments: serde_json::Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if n < self.succeed_on {
                Err(ToolError::ExecutionFailed { tool_name: "flaky".into(), reason: format!("attempt {n}") })
            } else {
                Ok(ToolOutput::text(format!("ok after {n}")))
            }
        }
    }

    struct InvalidArgsTool;

    #[async_trait]
    impl Tool for InvalidArgsTool {
        fn name(&self) -> &str { "strict" }
        fn description(&self) -> &str { "rejects everything" }
        fn parameters_schema(&self) -> serde_json::Value { serde_json::json!({"type": "object"}) }
        async fn execute(&self, _arguments: serde_json::Value, _ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
            Err(ToolError::InvalidArguments("missing 'query'".into()))
        }
    }

    fn policy() -> ExecutionPolicy {
        ExecutionPolicy {
            timeout: Duration::from_millis(500),
            max_retries: 2,
            backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(40),
            concurrent: true,
        }
    }

    fn inv(id: &str, name: &str) -> ToolInvocation {
        ToolInvocation::new(id, name, serde_json::json!({}))
    }

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("test", CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_results_keep_invocation_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SleepTool { name: "slow", ms: 200 }));
        registry.register(Arc::new(SleepTool { name: "fast", ms: 1 }));
        let executor = RegistryExecutor::new(registry);

        let outcomes = executor
            .execute(&[inv("a", "slow"), inv("b", "fast")], &policy(), &ctx())
            .await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].id, "a");
        assert_eq!(outcomes[0].output, "slow");
        assert_eq!(outcomes[1].id, "b");
        assert_eq!(outcomes[1].output, "fast");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_becomes_error_outcome() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SleepTool { name: "slow", ms: 10_000 }));
        let executor = RegistryExecutor::new(registry);

        let policy = ExecutionPolicy { max_retries: 0, ..policy() };
        let outcomes = executor.execute(&[inv("a", "slow")], &policy, &ctx()).await;

        assert!(!outcomes[0].suspended);
        assert!(outcomes[0].output.contains("timed out"), "{}", outcomes[0].output);
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failures_are_retried() {
        let mut registry = ToolRegistry::new();
        let flaky = Arc::new(FlakyTool { attempts: AtomicU32::new(0), succeed_on: 3 });
        registry.register(flaky.clone());
        let executor = RegistryExecutor::new(registry);

        let outcomes = executor.execute(&[inv("a", "flaky")], &policy(), &ctx()).await;

        assert_eq!(outcomes[0].output, "ok after 3");
        assert_eq!(flaky.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let mut registry = ToolRegistry::new();
        let flaky = Arc::new(FlakyTool { attempts: AtomicU32::new(0), succeed_on: 10 });
        registry.register(flaky.clone());
        let executor = RegistryExecutor::new(registry);

        let outcomes = executor.execute(&[inv("a", "flaky")], &policy(), &ctx()).await;

        assert!(outcomes[0].output.starts_with("Error:"));
        assert_eq!(flaky.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_once() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(InvalidArgsTool));
        let executor = RegistryExecutor::new(registry);

        let outcomes = executor.execute(&[inv("a", "strict")], &policy(), &ctx()).await;
        assert!(outcomes[0].output.contains("missing 'query'"));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_in_outcome() {
        let executor = RegistryExecutor::new(ToolRegistry::new());
        let outcomes = executor.execute(&[inv("a", "nope")], &policy(), &ctx()).await;
        assert_eq!(outcomes[0].id, "a");
        assert!(outcomes[0].output.contains("Tool not found: nope"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_context_stops_execution() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SleepTool { name: "slow", ms: 10_000 }));
        let executor = RegistryExecutor::new(registry);

        let token = CancellationToken::new();
        token.cancel();
        let ctx = ExecutionContext::new("test", token);
        let outcomes = executor.execute(&[inv("a", "slow")], &policy(), &ctx).await;
        assert!(outcomes[0].output.contains("cancelled"));
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_mode_runs_in_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SleepTool { name: "slow", ms: 50 }));
        registry.register(Arc::new(SleepTool { name: "fast", ms: 1 }));
        let executor = RegistryExecutor::new(registry);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let ctx = ctx().with_chunk_sink(tx);
        let policy = ExecutionPolicy { concurrent: false, ..policy() };
        let outcomes = executor
            .execute(&[inv("a", "slow"), inv("b", "fast")], &policy, &ctx)
            .await;
        assert_eq!(outcomes[1].output, "fast");

        // Sequential execution means chunk order follows invocation order.
        assert_eq!(rx.recv().await.unwrap().invocation_id, "a");
        assert_eq!(rx.recv().await.unwrap().invocation_id, "b");
    }
}
