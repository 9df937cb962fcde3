//! `clawloop replay` — Drive the controller from a scripted model.
//!
//! The script is a JSON array of model turns; each turn is an array of
//! stream fragments in their serialized form, e.g.
//!
//! ```json
//! [
//!   [{"type": "tool_invocation_delta", "id": "t1", "name": "ask_user",
//!     "arguments_delta": "{\"question\":\"Proceed?\"}"}, {"type": "end"}],
//!   [{"type": "text_delta", "text": "Done."}, {"type": "end"}]
//! ]
//! ```
//!
//! Suspended `ask_user` calls are answered from `--answer` values in order.

use async_trait::async_trait;
use clawloop_agent::{ReactController, StructuredOutputHook, TracingHook};
use clawloop_config::AppConfig;
use clawloop_core::error::ProviderError;
use clawloop_core::log::InMemoryLog;
use clawloop_core::message::{GenerationReason, ToolOutcome, Turn};
use clawloop_core::provider::{FragmentStream, Provider, ProviderRequest, StreamFragment};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub struct ReplayArgs {
    pub script: PathBuf,
    pub message: String,
    pub answers: Vec<String>,
    pub config: Option<PathBuf>,
    pub structured: bool,
    pub json: bool,
}

/// A provider that streams pre-recorded model turns in order.
pub struct ReplayProvider {
    turns: Mutex<VecDeque<Vec<StreamFragment>>>,
}

impl ReplayProvider {
    pub fn new(turns: Vec<Vec<StreamFragment>>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.turns.lock().map(|t| t.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Provider for ReplayProvider {
    fn name(&self) -> &str {
        "replay"
    }

    async fn stream(&self, _request: ProviderRequest) -> Result<FragmentStream, ProviderError> {
        let next = self
            .turns
            .lock()
            .map_err(|_| ProviderError::NotConfigured("replay script lock poisoned".into()))?
            .pop_front();
        let fragments = next.ok_or_else(|| {
            ProviderError::NotConfigured("replay script has no more model turns".into())
        })?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            for fragment in fragments {
                if tx.send(Ok(fragment)).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

pub fn load_script(path: &Path) -> Result<Vec<Vec<StreamFragment>>, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read script {}: {e}", path.display()))?;
    let turns: Vec<Vec<StreamFragment>> = serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse script {}: {e}", path.display()))?;
    Ok(turns)
}

/// Run `message` through the controller, answering suspensions from `answers`.
///
/// Returns the first terminal turn that is not a suspension, or the last
/// suspension once the answers run out.
pub async fn drive(
    controller: &ReactController,
    message: &str,
    answers: Vec<String>,
) -> clawloop_core::Result<Turn> {
    let mut answers = answers.into_iter();
    let mut input = vec![Turn::user(message)];

    loop {
        let run = controller.handle_input(input);
        tokio::pin!(run);
        let turn = tokio::select! {
            result = &mut run => result?,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupt received, stopping the loop");
                controller.interrupt();
                run.await?
            }
        };

        if turn.reason != Some(GenerationReason::ToolSuspended) {
            return Ok(turn);
        }

        let suspended: Vec<_> = turn.tool_invocations().cloned().collect();
        let mut outcomes = Vec::with_capacity(suspended.len());
        for invocation in &suspended {
            let Some(answer) = answers.next() else {
                info!(call_id = %invocation.id, "No answer left for suspended call");
                return Ok(turn);
            };
            info!(call_id = %invocation.id, tool = %invocation.name, "Answering suspended call");
            outcomes.push(Turn::tool_result(ToolOutcome::completed(
                &invocation.id,
                &invocation.name,
                answer,
            )));
        }
        input = outcomes;
    }
}

pub async fn run(args: ReplayArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    let turns = load_script(&args.script)?;
    info!(model_turns = turns.len(), script = %args.script.display(), "Loaded replay script");

    let provider = Arc::new(ReplayProvider::new(turns));
    let tools = clawloop_tools::default_registry();
    let mut controller = ReactController::new(
        provider.clone(),
        Arc::new(InMemoryLog::new()),
        &tools,
        config.to_agent_config(),
    )
    .with_policy(config.to_execution_policy())
    .with_hook(Arc::new(TracingHook));
    if args.structured {
        controller = controller.with_hook(Arc::new(StructuredOutputHook::new()));
    }

    let turn = drive(&controller, &args.message, args.answers).await?;
    if provider.remaining() > 0 {
        warn!(unused = provider.remaining(), "Replay script has unused model turns");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&turn)?);
    } else {
        print!("{}", render(&turn));
    }
    Ok(())
}

fn render(turn: &Turn) -> String {
    let mut out = String::new();
    let reasoning = turn.reasoning();
    if !reasoning.is_empty() {
        out.push_str(&format!("  (thinking) {reasoning}\n"));
    }
    for line in turn.text().lines() {
        out.push_str(&format!("  Assistant > {line}\n"));
    }
    for invocation in turn.tool_invocations() {
        out.push_str(&format!(
            "  [call {}] {}({})\n",
            invocation.id, invocation.name, invocation.arguments
        ));
    }
    for outcome in turn.tool_outcomes() {
        let state = if outcome.suspended { "suspended" } else { "result" };
        out.push_str(&format!("  [{state} {}] {}\n", outcome.id, outcome.output));
    }
    let reason = turn.reason.unwrap_or(GenerationReason::NormalFinish);
    out.push_str(&format!("  -- {reason}\n"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawloop_core::agent::AgentConfig;
    use clawloop_core::log::MessageLog;
    use std::io::Write;

    fn controller(turns: Vec<Vec<StreamFragment>>) -> ReactController {
        ReactController::new(
            Arc::new(ReplayProvider::new(turns)),
            Arc::new(InMemoryLog::new()),
            &clawloop_tools::default_registry(),
            AgentConfig::new("replay"),
        )
    }

    fn ask(id: &str) -> Vec<StreamFragment> {
        vec![
            StreamFragment::tool_start(id, "ask_user", r#"{"question":"Proceed?"}"#),
            StreamFragment::end(),
        ]
    }

    #[test]
    fn script_parses_serialized_fragments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                [{{"type": "reasoning_delta", "text": "hmm"}},
                 {{"type": "text_delta", "text": "hi"}},
                 {{"type": "end"}}],
                [{{"type": "tool_invocation_delta", "id": "t1", "name": "finish", "arguments_delta": "{{}}"}}]
            ]"#
        )
        .unwrap();

        let turns = load_script(file.path()).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0][1], StreamFragment::text("hi"));
        assert!(matches!(
            &turns[1][0],
            StreamFragment::ToolInvocationDelta { id: Some(id), .. } if id == "t1"
        ));
    }

    #[tokio::test]
    async fn plain_text_replay() {
        let c = controller(vec![vec![StreamFragment::text("hello"), StreamFragment::end()]]);
        let turn = drive(&c, "hi", vec![]).await.unwrap();
        assert_eq!(turn.text(), "hello");
        assert!(render(&turn).contains("normal-finish"));
    }

    #[tokio::test]
    async fn answers_resume_suspended_calls() {
        let c = controller(vec![
            ask("t1"),
            vec![StreamFragment::text("Proceeding."), StreamFragment::end()],
        ]);
        let turn = drive(&c, "deploy", vec!["yes".into()]).await.unwrap();
        assert_eq!(turn.text(), "Proceeding.");

        let log = c.log().all().await.unwrap();
        let answer = log.iter().flat_map(|t| t.tool_outcomes()).next().unwrap();
        assert_eq!(answer.output, "yes");
    }

    #[tokio::test]
    async fn missing_answers_leave_run_suspended() {
        let c = controller(vec![ask("t1")]);
        let turn = drive(&c, "deploy", vec![]).await.unwrap();
        assert_eq!(turn.reason, Some(GenerationReason::ToolSuspended));
        assert!(render(&turn).contains("[suspended t1]"));
    }

    #[tokio::test]
    async fn exhausted_script_is_a_provider_error() {
        let provider = ReplayProvider::new(vec![]);
        let request = ProviderRequest {
            turns: vec![],
            tools: vec![],
            options: clawloop_core::provider::GenerationOptions::new("m"),
        };
        let err = provider.stream(request).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
