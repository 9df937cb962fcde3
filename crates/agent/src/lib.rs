//! The ClawLoop reasoning/acting loop.
//!
//! The controller follows a **Reason → Act → Resume** cycle:
//!
//! 1. **Resolve** pending tool calls left in the log by an earlier run
//! 2. **Reason**: stream a model turn, folding fragments into a [`Turn`]
//! 3. **Act**: execute the turn's tool calls and log their outcomes
//! 4. **Loop** back to step 2 until the model answers without tool calls
//! 5. **Summarize** when the iteration budget runs out
//!
//! Tools may suspend, which ends the run with the calls left pending; the
//! caller resumes later by supplying their outcomes. Hooks intercept every
//! phase and may edit its inputs or request a stop or another reasoning round.
//!
//! [`Turn`]: clawloop_core::message::Turn

pub mod accumulator;
pub mod controller;
pub mod hooks;
pub mod pending;

#[cfg(test)]
mod test_helpers;

pub use accumulator::StreamAccumulator;
pub use controller::ReactController;
pub use hooks::{
    ChunkEvent, Hook, HookEvent, HookPhase, HookPipeline, PostActingEvent, PostReasoningEvent,
    PostSummaryEvent, PreActingEvent, PreReasoningEvent, PreSummaryEvent, StructuredOutputHook,
    TracingHook,
};
pub use pending::{pending_ids, pending_invocations, validate_resumption};
