//! Hook pipeline — ordered interception of every controller phase.
//!
//! Each phase of the loop builds a phase event and runs it through the
//! registered hooks, highest priority first (registration order breaks ties).
//! Hooks receive the event by mutable reference and may rewrite its fields,
//! which is how they edit the prompt, rewrite a tool call, swap a turn, or
//! request that the loop stop or re-reason.
//!
//! Chunk phases are observe-only. They run on a [`ChunkDispatcher`] task so
//! a slow hook never stalls the provider stream, but still see chunks in
//! arrival order.

pub mod builtin;

use async_trait::async_trait;
use clawloop_core::error::HookError;
use clawloop_core::message::{ToolInvocation, Turn};
use clawloop_core::provider::{GenerationOptions, ToolDefinition};
use clawloop_core::tool::ToolChunk;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

pub use builtin::{StructuredOutputHook, TracingHook};

/// A point in the controller loop where hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    PreReasoning,
    ReasoningChunk,
    PostReasoning,
    PreActing,
    ActingChunk,
    PostActing,
    PreSummary,
    SummaryChunk,
    PostSummary,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PreReasoning => "pre_reasoning",
            Self::ReasoningChunk => "reasoning_chunk",
            Self::PostReasoning => "post_reasoning",
            Self::PreActing => "pre_acting",
            Self::ActingChunk => "acting_chunk",
            Self::PostActing => "post_acting",
            Self::PreSummary => "pre_summary",
            Self::SummaryChunk => "summary_chunk",
            Self::PostSummary => "post_summary",
        };
        f.write_str(name)
    }
}

/// Input to a model call, before it is sent.
#[derive(Debug, Clone)]
pub struct PreReasoningEvent {
    /// Full prompt: system turn followed by the log
    pub turns: Vec<Turn>,
    pub tools: Vec<ToolDefinition>,
    pub options: GenerationOptions,
    /// Reasoning rounds already completed in this run
    pub iteration: u32,
}

/// One accumulated view of a streaming model turn.
#[derive(Debug, Clone)]
pub struct ChunkEvent {
    pub phase: HookPhase,
    /// Zero-based position of this view within the stream
    pub sequence: usize,
    pub turn: Turn,
}

/// The finished model turn, before the controller acts on it.
#[derive(Debug, Clone)]
pub struct PostReasoningEvent {
    /// `None` when the stream produced no content
    pub turn: Option<Turn>,
    pub iteration: u32,
    /// Identifies the controller run; stable across its iterations
    pub run_id: String,
    stop_requested: bool,
    goto_reasoning: Option<Vec<Turn>>,
}

impl PostReasoningEvent {
    pub fn new(turn: Option<Turn>, iteration: u32) -> Self {
        Self {
            turn,
            iteration,
            run_id: String::new(),
            stop_requested: false,
            goto_reasoning: None,
        }
    }

    pub fn in_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    /// End the run with this turn instead of acting on it.
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// Discard this turn, append `turns` to the log, and reason again
    /// without counting the extra round against the iteration budget.
    pub fn request_goto_reasoning(&mut self, turns: Vec<Turn>) {
        self.goto_reasoning = Some(turns);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub fn goto_requested(&self) -> bool {
        self.goto_reasoning.is_some()
    }

    pub(crate) fn take_goto(&mut self) -> Option<Vec<Turn>> {
        self.goto_reasoning.take()
    }
}

/// A tool call about to be executed.
#[derive(Debug, Clone)]
pub struct PreActingEvent {
    pub invocation: ToolInvocation,
}

/// A completed tool call and the tool turn that will be logged for it.
#[derive(Debug, Clone)]
pub struct PostActingEvent {
    pub invocation: ToolInvocation,
    pub turn: Turn,
    stop_requested: bool,
}

impl PostActingEvent {
    pub fn new(invocation: ToolInvocation, turn: Turn) -> Self {
        Self {
            invocation,
            turn,
            stop_requested: false,
        }
    }

    /// End the run once this batch of results has been logged.
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }
}

/// The summary prompt, before the final model call.
#[derive(Debug, Clone)]
pub struct PreSummaryEvent {
    pub turns: Vec<Turn>,
    pub options: GenerationOptions,
}

/// The summary turn, before it is logged and returned.
#[derive(Debug, Clone)]
pub struct PostSummaryEvent {
    pub turn: Option<Turn>,
}

/// A phase event on its way through the pipeline.
///
/// Mutable phases hand hooks a `&mut` to the controller's own event; chunk
/// phases hand out shared references.
#[derive(Debug)]
pub enum HookEvent<'a> {
    PreReasoning(&'a mut PreReasoningEvent),
    ReasoningChunk(&'a ChunkEvent),
    PostReasoning(&'a mut PostReasoningEvent),
    PreActing(&'a mut PreActingEvent),
    ActingChunk(&'a ToolChunk),
    PostActing(&'a mut PostActingEvent),
    PreSummary(&'a mut PreSummaryEvent),
    SummaryChunk(&'a ChunkEvent),
    PostSummary(&'a mut PostSummaryEvent),
}

impl HookEvent<'_> {
    pub fn phase(&self) -> HookPhase {
        match self {
            Self::PreReasoning(_) => HookPhase::PreReasoning,
            Self::ReasoningChunk(_) => HookPhase::ReasoningChunk,
            Self::PostReasoning(_) => HookPhase::PostReasoning,
            Self::PreActing(_) => HookPhase::PreActing,
            Self::ActingChunk(_) => HookPhase::ActingChunk,
            Self::PostActing(_) => HookPhase::PostActing,
            Self::PreSummary(_) => HookPhase::PreSummary,
            Self::SummaryChunk(_) => HookPhase::SummaryChunk,
            Self::PostSummary(_) => HookPhase::PostSummary,
        }
    }

    /// Borrow the same event again for the next hook in line.
    fn reborrow(&mut self) -> HookEvent<'_> {
        match self {
            Self::PreReasoning(e) => HookEvent::PreReasoning(&mut **e),
            Self::ReasoningChunk(e) => HookEvent::ReasoningChunk(*e),
            Self::PostReasoning(e) => HookEvent::PostReasoning(&mut **e),
            Self::PreActing(e) => HookEvent::PreActing(&mut **e),
            Self::ActingChunk(e) => HookEvent::ActingChunk(*e),
            Self::PostActing(e) => HookEvent::PostActing(&mut **e),
            Self::PreSummary(e) => HookEvent::PreSummary(&mut **e),
            Self::SummaryChunk(e) => HookEvent::SummaryChunk(*e),
            Self::PostSummary(e) => HookEvent::PostSummary(&mut **e),
        }
    }
}

/// A phase interceptor.
///
/// Implementors match on the [`HookEvent`] variants they care about and
/// ignore the rest. An error aborts the run and is reported with the hook's
/// name and the phase it failed in.
#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    /// Higher runs earlier.
    fn priority(&self) -> i32 {
        0
    }

    /// Whether this hook wants events of the given phase at all.
    fn handles(&self, _phase: HookPhase) -> bool {
        true
    }

    async fn on_event(&self, event: HookEvent<'_>) -> Result<(), HookError>;
}

/// Ordered set of hooks.
#[derive(Clone, Default)]
pub struct HookPipeline {
    hooks: Vec<Arc<dyn Hook>>,
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping descending priority; equal priorities keep registration order.
    pub fn register(&mut self, hook: Arc<dyn Hook>) {
        let at = self
            .hooks
            .iter()
            .position(|h| h.priority() < hook.priority())
            .unwrap_or(self.hooks.len());
        self.hooks.insert(at, hook);
    }

    pub fn names(&self) -> Vec<&str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// True if any hook subscribes to `phase`.
    pub fn handles(&self, phase: HookPhase) -> bool {
        self.hooks.iter().any(|h| h.handles(phase))
    }

    /// Run `event` through every interested hook in order.
    pub async fn notify(&self, mut event: HookEvent<'_>) -> Result<(), HookError> {
        let phase = event.phase();
        for hook in self.hooks.iter().filter(|h| h.handles(phase)) {
            trace!(hook = hook.name(), %phase, "Running hook");
            hook.on_event(event.reborrow())
                .await
                .map_err(|e| e.within(hook.name(), phase.to_string()))?;
        }
        Ok(())
    }
}

/// An owned chunk that can be presented to hooks.
pub trait ChunkPayload: Send + Sync + 'static {
    fn as_event(&self) -> HookEvent<'_>;
}

impl ChunkPayload for ChunkEvent {
    fn as_event(&self) -> HookEvent<'_> {
        match self.phase {
            HookPhase::SummaryChunk => HookEvent::SummaryChunk(self),
            _ => HookEvent::ReasoningChunk(self),
        }
    }
}

impl ChunkPayload for ToolChunk {
    fn as_event(&self) -> HookEvent<'_> {
        HookEvent::ActingChunk(self)
    }
}

/// Background task delivering chunk events to hooks in arrival order.
///
/// Inert when no hook subscribes to the phase. The first hook error stops
/// delivery and is returned from [`finish`](Self::finish).
pub struct ChunkDispatcher<T> {
    tx: Option<mpsc::UnboundedSender<T>>,
    handle: Option<JoinHandle<Result<(), HookError>>>,
}

impl<T: ChunkPayload> ChunkDispatcher<T> {
    pub fn spawn(pipeline: &HookPipeline, phase: HookPhase) -> Self {
        if !pipeline.handles(phase) {
            return Self {
                tx: None,
                handle: None,
            };
        }

        let pipeline = pipeline.clone();
        let (tx, mut rx) = mpsc::unbounded_channel::<T>();
        let handle = tokio::spawn(async move {
            while let Some(chunk) = rx.recv().await {
                pipeline.notify(chunk.as_event()).await?;
            }
            Ok::<(), HookError>(())
        });

        Self {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    pub fn is_active(&self) -> bool {
        self.tx.is_some()
    }

    /// A sender for producers outside the controller (tools).
    pub fn sender(&self) -> Option<mpsc::UnboundedSender<T>> {
        self.tx.clone()
    }

    pub fn dispatch(&self, chunk: T) {
        if let Some(tx) = &self.tx {
            // Closed only after a hook failed; `finish` reports that.
            let _ = tx.send(chunk);
        }
    }

    /// Wait until every queued chunk was delivered. All senders handed out
    /// through [`sender`](Self::sender) must be dropped first.
    pub async fn finish(mut self) -> Result<(), HookError> {
        drop(self.tx.take());
        match self.handle.take() {
            Some(handle) => handle
                .await
                .map_err(|e| HookError::new(format!("chunk dispatcher failed: {e}")))?,
            None => Ok(()),
        }
    }

    /// Stop delivery immediately, discarding queued chunks.
    pub fn abort(mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
