//! Built-in hooks.
//!
//! - [`TracingHook`] logs every phase at debug level.
//! - [`StructuredOutputHook`] steers the model toward the `finish` tool and
//!   ends the run once `finish` succeeds.

use super::{Hook, HookEvent, HookPhase};
use async_trait::async_trait;
use clawloop_core::error::HookError;
use clawloop_core::message::Turn;
use clawloop_tools::FINISH_TOOL;
use std::sync::Mutex;
use tracing::{debug, info};

/// Logs a one-line summary of each phase event.
pub struct TracingHook;

#[async_trait]
impl Hook for TracingHook {
    fn name(&self) -> &str {
        "tracing"
    }

    /// Runs before everything else so it logs what the model actually produced.
    fn priority(&self) -> i32 {
        i32::MAX
    }

    fn handles(&self, phase: HookPhase) -> bool {
        !matches!(phase, HookPhase::ReasoningChunk | HookPhase::SummaryChunk)
    }

    async fn on_event(&self, event: HookEvent<'_>) -> Result<(), HookError> {
        match event {
            HookEvent::PreReasoning(e) => debug!(
                iteration = e.iteration,
                turns = e.turns.len(),
                tools = e.tools.len(),
                model = %e.options.model,
                "Calling model"
            ),
            HookEvent::PostReasoning(e) => match &e.turn {
                Some(turn) => debug!(
                    iteration = e.iteration,
                    text_len = turn.text().len(),
                    tool_calls = turn.tool_invocations().count(),
                    "Model turn complete"
                ),
                None => debug!(iteration = e.iteration, "Model returned nothing"),
            },
            HookEvent::PreActing(e) => debug!(
                tool = %e.invocation.name,
                call_id = %e.invocation.id,
                "Executing tool"
            ),
            HookEvent::ActingChunk(chunk) => debug!(
                call_id = %chunk.invocation_id,
                len = chunk.content.len(),
                "Tool progress"
            ),
            HookEvent::PostActing(e) => debug!(
                tool = %e.invocation.name,
                call_id = %e.invocation.id,
                "Tool result recorded"
            ),
            HookEvent::PreSummary(e) => debug!(turns = e.turns.len(), "Summarizing"),
            HookEvent::PostSummary(e) => {
                debug!(produced = e.turn.is_some(), "Summary complete")
            }
            HookEvent::ReasoningChunk(_) | HookEvent::SummaryChunk(_) => {}
        }
        Ok(())
    }
}

/// Requires the model to answer through the `finish` tool.
///
/// When the model replies in plain text (no tool calls at all), the reply is
/// sent back together with a reminder and the model reasons again, up to
/// `max_reminders` times per run. A successful `finish` call ends the run.
pub struct StructuredOutputHook {
    reminder: String,
    max_reminders: u32,
    /// Run id and reminders sent during it
    sent: Mutex<(String, u32)>,
}

impl StructuredOutputHook {
    pub fn new() -> Self {
        Self {
            reminder: format!(
                "You must call the `{FINISH_TOOL}` tool to submit your final response."
            ),
            max_reminders: 3,
            sent: Mutex::new((String::new(), 0)),
        }
    }

    pub fn with_reminder(mut self, reminder: impl Into<String>) -> Self {
        self.reminder = reminder.into();
        self
    }

    pub fn with_max_reminders(mut self, max: u32) -> Self {
        self.max_reminders = max;
        self
    }
}

impl Default for StructuredOutputHook {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Hook for StructuredOutputHook {
    fn name(&self) -> &str {
        "structured_output"
    }

    fn handles(&self, phase: HookPhase) -> bool {
        matches!(phase, HookPhase::PostReasoning | HookPhase::PostActing)
    }

    async fn on_event(&self, event: HookEvent<'_>) -> Result<(), HookError> {
        match event {
            HookEvent::PostReasoning(e) => {
                let Some(turn) = &e.turn else {
                    return Ok(());
                };
                // Tool calls other than finish still get executed normally.
                if turn.has_tool_invocations() {
                    return Ok(());
                }

                let sent = {
                    let mut state = self
                        .sent
                        .lock()
                        .map_err(|_| HookError::new("reminder state poisoned"))?;
                    if state.0 != e.run_id {
                        *state = (e.run_id.clone(), 0);
                    }
                    state.1 += 1;
                    state.1 - 1
                };
                if sent >= self.max_reminders {
                    info!(reminders = sent, "Model never called finish, accepting text reply");
                    return Ok(());
                }

                debug!(attempt = sent + 1, "Reminding model to call finish");
                let turns = vec![turn.clone(), Turn::user(&self.reminder)];
                e.request_goto_reasoning(turns);
            }
            HookEvent::PostActing(e) => {
                if e.invocation.name != FINISH_TOOL {
                    return Ok(());
                }
                let failed = e
                    .turn
                    .tool_outcomes()
                    .any(|o| o.output.starts_with("Error:"));
                if !failed {
                    e.request_stop();
                }
            }
            _ => {}
        }
        Ok(())
    }
}
