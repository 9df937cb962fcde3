//! Shared test helpers for controller tests.

use async_trait::async_trait;
use clawloop_core::error::{ProviderError, ToolError};
use clawloop_core::provider::{FragmentStream, Provider, ProviderRequest, StreamFragment};
use clawloop_core::tool::{Tool, ToolContext, ToolOutput};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One scripted model response.
pub struct Script {
    fragments: Vec<StreamFragment>,
    /// Stop sending after this many fragments and hold the stream open
    stall_after: Option<usize>,
    /// Cancelled once the stalled stream's last fragment was consumed
    cancel: Option<CancellationToken>,
    fail: Option<ProviderError>,
}

impl Script {
    pub fn new(fragments: Vec<StreamFragment>) -> Self {
        Self {
            fragments,
            stall_after: None,
            cancel: None,
            fail: None,
        }
    }

    pub fn text(text: &str) -> Self {
        Self::new(vec![StreamFragment::text(text), StreamFragment::end()])
    }

    /// A turn calling each `(id, tool, arguments)` in order.
    pub fn calls(calls: &[(&str, &str, &str)]) -> Self {
        let mut fragments: Vec<_> = calls
            .iter()
            .map(|(id, name, args)| StreamFragment::tool_start(*id, *name, *args))
            .collect();
        fragments.push(StreamFragment::end());
        Self::new(fragments)
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            fail: Some(error),
            ..Self::new(Vec::new())
        }
    }

    /// Deliver only the first `n` fragments, then never finish.
    pub fn stall_after(mut self, n: usize) -> Self {
        self.stall_after = Some(n);
        self
    }

    /// Cancel `token` right after the stall point is reached.
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// A provider that replays scripts in order and records every request.
///
/// Panics if more calls are made than scripts provided.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<FragmentStream, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider: no script for call #{call}"));

        let Script {
            fragments,
            stall_after,
            cancel,
            fail,
        } = script;
        if let Some(error) = fail {
            return Err(error);
        }

        // Capacity 1 lets the sender tell when the consumer took a fragment.
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(async move {
            for fragment in fragments.into_iter().take(stall_after.unwrap_or(usize::MAX)) {
                if tx.send(Ok(fragment)).await.is_err() {
                    return;
                }
            }
            if stall_after.is_some() {
                if let Ok(permit) = tx.reserve().await {
                    drop(permit);
                }
                if let Some(token) = cancel {
                    token.cancel();
                }
                tx.closed().await;
            }
        });
        Ok(rx)
    }
}

/// Echoes its arguments and counts executions.
pub struct CountingTool {
    name: &'static str,
    executions: AtomicUsize,
}

impl CountingTool {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            executions: AtomicUsize::new(0),
        }
    }

    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for CountingTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Echoes its arguments"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        ctx.emit_chunk(format!("{} running", self.name));
        Ok(ToolOutput::text(format!("{} result for {arguments}", self.name)))
    }
}
