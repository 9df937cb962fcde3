//! The reasoning/acting controller.
//!
//! One call to [`ReactController::handle_input`] drives a single run:
//!
//! ```text
//!   input ──► resolve pending calls ──► Reasoning ──► Acting ──┐
//!                                         ▲   │                │
//!                                         │   └──► Done        │
//!                                         └────────────────────┘
//!                       iteration budget spent ──► Summarizing ──► Done
//! ```
//!
//! The log is the only state that survives a run. Everything the loop
//! decides is derived from it, which is what makes suspension and resumption
//! work: a run that stops with unanswered tool calls leaves them pending in
//! the log, and the next call must answer them before reasoning continues.

use crate::accumulator::StreamAccumulator;
use crate::hooks::{
    ChunkDispatcher, ChunkEvent, Hook, HookEvent, HookPhase, HookPipeline, PostActingEvent,
    PostReasoningEvent, PostSummaryEvent, PreActingEvent, PreReasoningEvent, PreSummaryEvent,
};
use crate::pending::{pending_ids, pending_invocations, validate_resumption};
use chrono::Utc;
use clawloop_core::agent::AgentConfig;
use clawloop_core::error::{Error, Result};
use clawloop_core::event::{DomainEvent, EventBus};
use clawloop_core::log::MessageLog;
use clawloop_core::message::{ContentBlock, GenerationReason, Role, Turn};
use clawloop_core::provider::{Provider, ProviderRequest};
use clawloop_core::tool::{ExecutionContext, ExecutionPolicy, ToolChunk, ToolExecutor, ToolRegistry};
use clawloop_tools::RegistryExecutor;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where the loop goes next.
#[derive(Debug)]
enum LoopStep {
    Reasoning {
        iteration: u32,
        suppress_iteration_check: bool,
    },
    Acting {
        iteration: u32,
    },
    Summarizing,
    Done(Turn),
}

/// Per-run bookkeeping.
struct RunState {
    run_id: String,
    cancel: CancellationToken,
    model_calls: u32,
}

pub struct ReactController {
    provider: Arc<dyn Provider>,
    log: Arc<dyn MessageLog>,
    tools: ToolRegistry,
    executor: Arc<dyn ToolExecutor>,
    hooks: HookPipeline,
    config: AgentConfig,
    policy: ExecutionPolicy,
    event_bus: Arc<EventBus>,
    /// Token of the run in progress, cancelled by [`interrupt`](Self::interrupt)
    current_run: Mutex<CancellationToken>,
}

impl ReactController {
    /// Build a controller over a snapshot of `tools`.
    ///
    /// Tools registered after construction are not seen by this controller.
    pub fn new(
        provider: Arc<dyn Provider>,
        log: Arc<dyn MessageLog>,
        tools: &ToolRegistry,
        config: AgentConfig,
    ) -> Self {
        let tools = tools.snapshot();
        Self {
            provider,
            log,
            executor: Arc::new(RegistryExecutor::new(tools.clone())),
            tools,
            hooks: HookPipeline::new(),
            config,
            policy: ExecutionPolicy::default(),
            event_bus: Arc::new(EventBus::default()),
            current_run: Mutex::new(CancellationToken::new()),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.register(hook);
        self
    }

    pub fn with_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = bus;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn hooks(&self) -> &HookPipeline {
        &self.hooks
    }

    pub fn log(&self) -> &Arc<dyn MessageLog> {
        &self.log
    }

    /// Run the loop on new input.
    ///
    /// If the log has pending tool calls, `input` must carry their outcomes
    /// (see [`validate_resumption`]); otherwise it is appended as-is.
    ///
    /// A model turn that calls only unregistered tools ends the run with
    /// `normal-finish`, and is logged with those calls unanswered. The next
    /// input must answer them (an error outcome will do) before plain input is
    /// accepted again.
    pub async fn handle_input(&self, input: Vec<Turn>) -> Result<Turn> {
        let cancel = CancellationToken::new();
        if let Ok(mut current) = self.current_run.lock() {
            *current = cancel.clone();
        }
        self.handle_input_with_cancel(input, cancel).await
    }

    /// Answer pending tool calls and continue. Same as [`handle_input`](Self::handle_input).
    pub async fn resume(&self, outcomes: Vec<Turn>) -> Result<Turn> {
        self.handle_input(outcomes).await
    }

    /// Interrupt the run started by the latest [`handle_input`](Self::handle_input).
    ///
    /// The run returns [`Error::Interrupted`] at its next suspension point.
    /// Text streamed so far is kept in the log.
    pub fn interrupt(&self) {
        if let Ok(current) = self.current_run.lock() {
            current.cancel();
        }
    }

    /// Run the loop under a caller-owned cancellation token.
    pub async fn handle_input_with_cancel(
        &self,
        input: Vec<Turn>,
        cancel: CancellationToken,
    ) -> Result<Turn> {
        let mut state = RunState {
            run_id: uuid::Uuid::new_v4().to_string(),
            cancel,
            model_calls: 0,
        };
        info!(
            agent = %self.config.name,
            run_id = %state.run_id,
            input_turns = input.len(),
            "Handling input"
        );

        match self.run(input, &mut state).await {
            Ok(turn) => {
                let reason = turn.reason.unwrap_or(GenerationReason::NormalFinish);
                info!(
                    agent = %self.config.name,
                    %reason,
                    model_calls = state.model_calls,
                    "Run finished"
                );
                self.event_bus.publish(DomainEvent::loop_finished(
                    &self.config.name,
                    reason,
                    state.model_calls,
                ));
                Ok(turn)
            }
            Err(e) => {
                if e.is_interrupted() {
                    warn!(agent = %self.config.name, "Run interrupted");
                } else {
                    warn!(agent = %self.config.name, error = %e, "Run failed");
                }
                self.event_bus
                    .publish(DomainEvent::error(format!("agent:{}", self.config.name), &e));
                Err(e)
            }
        }
    }

    async fn run(&self, input: Vec<Turn>, state: &mut RunState) -> Result<Turn> {
        let history = self.log.all().await?;
        let pending = pending_ids(&history);

        let mut step = if pending.is_empty() {
            self.append_all(input).await?;
            LoopStep::Reasoning {
                iteration: 0,
                suppress_iteration_check: false,
            }
        } else {
            validate_resumption(&input, &pending)?;
            self.append_all(input).await?;

            let remaining = pending_ids(&self.log.all().await?);
            if remaining.is_empty() {
                debug!(resolved = pending.len(), "All pending tool calls answered");
                LoopStep::Reasoning {
                    iteration: 0,
                    suppress_iteration_check: false,
                }
            } else {
                debug!(remaining = remaining.len(), "Executing still-pending tool calls");
                LoopStep::Acting { iteration: 0 }
            }
        };

        loop {
            step = match step {
                LoopStep::Reasoning {
                    iteration,
                    suppress_iteration_check,
                } => {
                    self.reasoning(iteration, suppress_iteration_check, state)
                        .await?
                }
                LoopStep::Acting { iteration } => self.acting(iteration, state).await?,
                LoopStep::Summarizing => self.summarizing(state).await?,
                LoopStep::Done(turn) => return Ok(turn),
            };
        }
    }

    async fn reasoning(
        &self,
        iteration: u32,
        suppress_iteration_check: bool,
        state: &mut RunState,
    ) -> Result<LoopStep> {
        if !suppress_iteration_check && iteration >= self.config.max_iterations {
            info!(
                max_iterations = self.config.max_iterations,
                "Iteration budget spent, summarizing"
            );
            return Ok(LoopStep::Summarizing);
        }
        debug!(iteration, "Reasoning");

        let mut pre = PreReasoningEvent {
            turns: self.prompt().await?,
            tools: self.tools.definitions(),
            options: self.config.options.clone(),
            iteration,
        };
        self.hooks.notify(HookEvent::PreReasoning(&mut pre)).await?;

        let request = ProviderRequest {
            turns: pre.turns,
            tools: pre.tools,
            options: pre.options,
        };
        let turn = self
            .stream_turn(request, HookPhase::ReasoningChunk, state)
            .await?;

        let mut post = PostReasoningEvent::new(turn, iteration).in_run(&state.run_id);
        self.hooks.notify(HookEvent::PostReasoning(&mut post)).await?;

        if post.stop_requested() {
            debug!(iteration, "Stop requested after reasoning");
            let turn = post
                .turn
                .unwrap_or_else(|| Turn::new(Role::Assistant, Vec::new()));
            return Ok(LoopStep::Done(
                turn.with_reason(GenerationReason::StopRequestedReasoning),
            ));
        }

        if let Some(extra) = post.take_goto() {
            debug!(iteration, injected = extra.len(), "Hook requested another reasoning round");
            self.append_all(extra).await?;
            return Ok(LoopStep::Reasoning {
                iteration: iteration + 1,
                suppress_iteration_check: true,
            });
        }

        let Some(turn) = post.turn else {
            debug!(iteration, "Model produced no content");
            return Ok(LoopStep::Done(
                Turn::new(Role::Assistant, Vec::new()).with_reason(GenerationReason::NormalFinish),
            ));
        };

        self.log.append(turn.clone()).await?;

        if turn
            .tool_invocations()
            .any(|inv| self.tools.contains(&inv.name))
        {
            Ok(LoopStep::Acting { iteration })
        } else {
            Ok(LoopStep::Done(turn.with_reason(GenerationReason::NormalFinish)))
        }
    }

    async fn acting(&self, iteration: u32, state: &mut RunState) -> Result<LoopStep> {
        let pending = pending_invocations(&self.log.all().await?);
        if pending.is_empty() {
            return Ok(LoopStep::Reasoning {
                iteration: iteration + 1,
                suppress_iteration_check: false,
            });
        }

        let mut invocations = Vec::with_capacity(pending.len());
        for invocation in pending {
            let id = invocation.id.clone();
            let mut pre = PreActingEvent { invocation };
            self.hooks.notify(HookEvent::PreActing(&mut pre)).await?;
            // The id ties the outcome to the logged call.
            pre.invocation.id = id;
            invocations.push(pre.invocation);
        }

        if state.cancel.is_cancelled() {
            return Err(Error::Interrupted);
        }

        debug!(iteration, calls = invocations.len(), "Acting");
        let dispatcher = ChunkDispatcher::<ToolChunk>::spawn(&self.hooks, HookPhase::ActingChunk);
        let mut ctx = ExecutionContext::new(self.config.name.clone(), state.cancel.clone());
        if let Some(tx) = dispatcher.sender() {
            ctx = ctx.with_chunk_sink(tx);
        }

        let started = Instant::now();
        let outcomes = tokio::select! {
            biased;
            _ = state.cancel.cancelled() => None,
            outcomes = self.executor.execute(&invocations, &self.policy, &ctx) => Some(outcomes),
        };
        drop(ctx);

        let Some(outcomes) = outcomes else {
            dispatcher.abort();
            warn!(calls = invocations.len(), "Interrupted while executing tools");
            return Err(Error::Interrupted);
        };
        dispatcher.finish().await?;

        if outcomes.len() != invocations.len() {
            return Err(Error::Internal(format!(
                "executor returned {} outcomes for {} tool calls",
                outcomes.len(),
                invocations.len()
            )));
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        for outcome in &outcomes {
            self.event_bus
                .publish(DomainEvent::tool_executed(outcome, duration_ms));
        }

        let mut suspended = Vec::new();
        let mut stop_turn = None;
        for (invocation, outcome) in invocations.into_iter().zip(outcomes) {
            if outcome.suspended {
                suspended.push(ContentBlock::ToolInvocation(invocation));
                suspended.push(ContentBlock::ToolOutcome(outcome));
                continue;
            }

            let mut post = PostActingEvent::new(invocation, Turn::tool_result(outcome));
            self.hooks.notify(HookEvent::PostActing(&mut post)).await?;
            self.log.append(post.turn.clone()).await?;
            if post.stop_requested() && stop_turn.is_none() {
                stop_turn = Some(post.turn);
            }
        }

        if let Some(turn) = stop_turn {
            debug!(iteration, "Stop requested after acting");
            return Ok(LoopStep::Done(
                turn.with_reason(GenerationReason::StopRequestedActing),
            ));
        }

        if !suspended.is_empty() {
            info!(calls = suspended.len() / 2, "Tool calls suspended, awaiting external results");
            return Ok(LoopStep::Done(
                Turn::new(Role::Assistant, suspended).with_reason(GenerationReason::ToolSuspended),
            ));
        }

        Ok(LoopStep::Reasoning {
            iteration: iteration + 1,
            suppress_iteration_check: false,
        })
    }

    async fn summarizing(&self, state: &mut RunState) -> Result<LoopStep> {
        match self.summarize(state).await {
            Ok(turn) => Ok(LoopStep::Done(turn)),
            Err(e) if e.is_interrupted() => Err(e),
            Err(e) => {
                warn!(error = %e, "Summary failed, apologizing instead");
                let turn = Turn::assistant(format!(
                    "I'm sorry, I could not finish this task within the allowed steps, \
                     and summarizing my progress failed: {e}"
                ));
                self.log.append(turn.clone()).await?;
                Ok(LoopStep::Done(turn.with_reason(GenerationReason::NormalFinish)))
            }
        }
    }

    async fn summarize(&self, state: &mut RunState) -> Result<Turn> {
        let mut turns = self.prompt().await?;
        turns.push(Turn::user(&self.config.summary_directive));

        let mut pre = PreSummaryEvent {
            turns,
            options: self.config.options.clone(),
        };
        self.hooks.notify(HookEvent::PreSummary(&mut pre)).await?;

        let request = ProviderRequest {
            turns: pre.turns,
            tools: Vec::new(),
            options: pre.options,
        };
        let turn = self
            .stream_turn(request, HookPhase::SummaryChunk, state)
            .await?;

        let mut post = PostSummaryEvent { turn };
        self.hooks.notify(HookEvent::PostSummary(&mut post)).await?;

        let Some(turn) = post.turn else {
            return Ok(Turn::new(Role::Assistant, Vec::new()).with_reason(GenerationReason::NormalFinish));
        };
        self.log.append(turn.clone()).await?;
        Ok(turn.with_reason(GenerationReason::NormalFinish))
    }

    /// Stream one model turn, feeding chunk hooks as fragments arrive.
    ///
    /// On interruption the content accumulated so far is logged before
    /// [`Error::Interrupted`] is returned.
    async fn stream_turn(
        &self,
        request: ProviderRequest,
        phase: HookPhase,
        state: &mut RunState,
    ) -> Result<Option<Turn>> {
        if state.cancel.is_cancelled() {
            return Err(Error::Interrupted);
        }

        let model = request.options.model.clone();
        state.model_calls += 1;
        let mut rx = self.provider.stream(request).await?;
        let mut acc = StreamAccumulator::new();
        let dispatcher = ChunkDispatcher::<ChunkEvent>::spawn(&self.hooks, phase);
        let mut sequence = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = state.cancel.cancelled() => None,
                fragment = rx.recv() => Some(fragment),
            };
            let Some(fragment) = next else {
                dispatcher.abort();
                return Err(self.flush_interrupted(acc).await);
            };

            match fragment {
                // Closed without an end marker: take what arrived.
                None => break,
                Some(Err(e)) => {
                    dispatcher.abort();
                    return Err(e.into());
                }
                Some(Ok(fragment)) => {
                    let end = acc.ingest(fragment);
                    if !end && dispatcher.is_active() {
                        dispatcher.dispatch(ChunkEvent {
                            phase,
                            sequence,
                            turn: acc.snapshot(),
                        });
                        sequence += 1;
                    }
                    if state.cancel.is_cancelled() {
                        dispatcher.abort();
                        return Err(self.flush_interrupted(acc).await);
                    }
                    if end {
                        break;
                    }
                }
            }
        }

        dispatcher.finish().await?;

        let usage = acc.usage().unwrap_or_default();
        debug!(
            %model,
            fragments = acc.fragments(),
            tokens = usage.total_tokens,
            "Model stream complete"
        );
        self.event_bus.publish(DomainEvent::ResponseGenerated {
            agent: self.config.name.clone(),
            model,
            tokens_used: usage.total_tokens,
            timestamp: Utc::now(),
        });

        Ok(acc.finish())
    }

    /// Log the partial turn of an interrupted stream.
    async fn flush_interrupted(&self, acc: StreamAccumulator) -> Error {
        let fragments = acc.fragments();
        if let Some(turn) = acc.finish() {
            if let Err(e) = self
                .log
                .append(turn.with_reason(GenerationReason::Interrupted))
                .await
            {
                return e.into();
            }
        }
        warn!(fragments, "Stream interrupted, partial turn kept in log");
        Error::Interrupted
    }

    /// System prompt followed by the whole log.
    async fn prompt(&self) -> Result<Vec<Turn>> {
        let history = self.log.all().await?;
        let mut turns = Vec::with_capacity(history.len() + 1);
        if !self.config.system_prompt.is_empty() {
            turns.push(Turn::system(&self.config.system_prompt));
        }
        turns.extend(history);
        Ok(turns)
    }

    async fn append_all(&self, turns: Vec<Turn>) -> Result<()> {
        for turn in turns {
            self.log.append(turn).await?;
        }
        Ok(())
    }
}
