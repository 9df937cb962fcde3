//! Stream accumulator — folds provider fragments into a growing [`Turn`].
//!
//! Fragments arrive in order. Text and reasoning deltas are appended to their
//! running buffers; tool-invocation deltas are merged by call id. Only a
//! named delta opens an invocation. A nameless delta whose id matches no open
//! invocation (or that has no id at all) is an argument continuation for the
//! invocation that was last seen, or (before any invocation appeared) is held
//! until the first one opens.
//!
//! [`snapshot`](StreamAccumulator::snapshot) materializes the current state
//! after every fragment; [`finish`](StreamAccumulator::finish) produces the
//! final turn, dropping continuations that never found an invocation.

use clawloop_core::message::{ContentBlock, Role, ToolInvocation, Turn};
use clawloop_core::provider::{StreamFragment, Usage};
use tracing::warn;

#[derive(Debug)]
struct PartialInvocation {
    id: String,
    name: String,
    arguments: String,
}

impl PartialInvocation {
    fn materialize(&self) -> ToolInvocation {
        ToolInvocation::new(&self.id, &self.name, parse_arguments(&self.arguments))
    }
}

#[derive(Debug)]
pub struct StreamAccumulator {
    turn_id: String,
    reasoning: String,
    text: String,
    invocations: Vec<PartialInvocation>,
    /// Index into `invocations` of the most recently touched call
    last: Option<usize>,
    /// Continuations seen before any invocation opened
    orphaned: String,
    usage: Option<Usage>,
    finish_reason: Option<String>,
    fragments: usize,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self {
            turn_id: uuid::Uuid::new_v4().to_string(),
            reasoning: String::new(),
            text: String::new(),
            invocations: Vec::new(),
            last: None,
            orphaned: String::new(),
            usage: None,
            finish_reason: None,
            fragments: 0,
        }
    }

    /// Fold one fragment in. Returns `true` if it was the end marker.
    pub fn ingest(&mut self, fragment: StreamFragment) -> bool {
        self.fragments += 1;
        match fragment {
            StreamFragment::ReasoningDelta { text } => self.reasoning.push_str(&text),
            StreamFragment::TextDelta { text } => self.text.push_str(&text),
            StreamFragment::ToolInvocationDelta {
                id,
                name,
                arguments_delta,
            } => self.ingest_tool_delta(id, name, &arguments_delta),
            StreamFragment::End {
                usage,
                finish_reason,
            } => {
                self.usage = usage.or(self.usage);
                self.finish_reason = finish_reason;
                return true;
            }
        }
        false
    }

    fn ingest_tool_delta(&mut self, id: Option<String>, name: Option<String>, arguments: &str) {
        let id = id.filter(|i| !i.is_empty());
        let name = name.filter(|n| !n.is_empty());
        let known = id
            .as_ref()
            .and_then(|id| self.invocations.iter().position(|p| &p.id == id));

        let index = match (known, name) {
            (Some(i), _) => i,
            // Named but unkeyed: some backends never send ids
            (None, Some(name)) => {
                let id = id.unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                self.open(id, name)
            }
            // Nameless with no known id: a continuation of the latest call
            (None, None) => match self.last {
                Some(i) => i,
                None => {
                    self.orphaned.push_str(arguments);
                    return;
                }
            },
        };

        self.invocations[index].arguments.push_str(arguments);
        self.last = Some(index);
    }

    fn open(&mut self, id: String, name: String) -> usize {
        let arguments = std::mem::take(&mut self.orphaned);
        self.invocations.push(PartialInvocation {
            id,
            name,
            arguments,
        });
        self.invocations.len() - 1
    }

    /// The turn as it stands after the fragments seen so far.
    pub fn snapshot(&self) -> Turn {
        self.build(self.invocations.iter().map(PartialInvocation::materialize).collect())
    }

    /// Final turn, or `None` if the stream produced nothing usable.
    pub fn finish(self) -> Option<Turn> {
        if !self.orphaned.is_empty() {
            warn!(
                bytes = self.orphaned.len(),
                "Dropping tool argument fragments that never found an invocation"
            );
        }

        let turn = self.build(self.invocations.iter().map(PartialInvocation::materialize).collect());
        (!turn.is_empty()).then_some(turn)
    }

    fn build(&self, invocations: Vec<ToolInvocation>) -> Turn {
        let mut blocks = Vec::with_capacity(invocations.len() + 2);
        if !self.reasoning.is_empty() {
            blocks.push(ContentBlock::reasoning(&self.reasoning));
        }
        if !self.text.is_empty() {
            blocks.push(ContentBlock::text(&self.text));
        }
        blocks.extend(invocations.into_iter().map(ContentBlock::ToolInvocation));

        let mut turn = Turn::new(Role::Assistant, blocks);
        turn.id = self.turn_id.clone();
        if let Some(usage) = self.usage {
            turn.metadata.insert(
                "usage".into(),
                serde_json::to_value(usage).unwrap_or_default(),
            );
        }
        if let Some(reason) = &self.finish_reason {
            turn.metadata
                .insert("finish_reason".into(), serde_json::Value::String(reason.clone()));
        }
        turn
    }

    pub fn usage(&self) -> Option<Usage> {
        self.usage
    }

    pub fn fragments(&self) -> usize {
        self.fragments
    }
}

impl Default for StreamAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort argument decoding. Empty means no arguments; text that is not
/// JSON is kept verbatim so the tool can report it.
fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed(fragments: Vec<StreamFragment>) -> StreamAccumulator {
        let mut acc = StreamAccumulator::new();
        for f in fragments {
            acc.ingest(f);
        }
        acc
    }

    #[test]
    fn text_and_reasoning_concatenate() {
        let turn = feed(vec![
            StreamFragment::reasoning("Let me "),
            StreamFragment::reasoning("think."),
            StreamFragment::text("hel"),
            StreamFragment::text("lo"),
            StreamFragment::end(),
        ])
        .finish()
        .unwrap();

        assert_eq!(turn.role, Role::Assistant);
        assert_eq!(turn.reasoning(), "Let me think.");
        assert_eq!(turn.text(), "hello");
        assert!(matches!(turn.blocks[0], ContentBlock::Reasoning { .. }));
    }

    #[test]
    fn tool_arguments_merge_across_fragments() {
        let turn = feed(vec![
            StreamFragment::tool_start("t1", "search", r#"{"q":"#),
            StreamFragment::tool_args(r#""rust"}"#),
        ])
        .finish()
        .unwrap();

        let calls: Vec<_> = turn.tool_invocations().collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "t1");
        assert_eq!(calls[0].arguments, json!({"q": "rust"}));
    }

    #[test]
    fn interleaved_invocations_keyed_by_id() {
        let turn = feed(vec![
            StreamFragment::tool_start("a", "search", r#"{"q":"#),
            StreamFragment::tool_start("b", "weather", r#"{"city":"#),
            StreamFragment::ToolInvocationDelta {
                id: Some("a".into()),
                name: None,
                arguments_delta: r#""x"}"#.into(),
            },
            StreamFragment::ToolInvocationDelta {
                id: Some("b".into()),
                name: None,
                arguments_delta: r#""Oslo"}"#.into(),
            },
        ])
        .finish()
        .unwrap();

        let calls: Vec<_> = turn.tool_invocations().collect();
        assert_eq!(calls[0].name, "search");
        assert_eq!(calls[0].arguments, json!({"q": "x"}));
        assert_eq!(calls[1].name, "weather");
        assert_eq!(calls[1].arguments, json!({"city": "Oslo"}));
    }

    #[test]
    fn leading_continuation_attaches_to_first_invocation() {
        let turn = feed(vec![
            StreamFragment::tool_args(r#"{"q":"#),
            StreamFragment::tool_start("t1", "search", r#""late"}"#),
        ])
        .finish()
        .unwrap();

        let call = turn.tool_invocations().next().unwrap();
        assert_eq!(call.arguments, json!({"q": "late"}));
    }

    #[test]
    fn nameless_delta_with_unseen_id_continues_latest_call() {
        let turn = feed(vec![
            StreamFragment::tool_start("t1", "search", r#"{"q":"#),
            StreamFragment::ToolInvocationDelta {
                id: Some("chunk-2".into()),
                name: None,
                arguments_delta: r#""rust"}"#.into(),
            },
        ])
        .finish()
        .unwrap();

        let calls: Vec<_> = turn.tool_invocations().collect();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "t1");
        assert_eq!(calls[0].arguments, json!({"q": "rust"}));
    }

    #[test]
    fn keyed_nameless_delta_waits_for_first_call() {
        let turn = feed(vec![
            StreamFragment::ToolInvocationDelta {
                id: Some("t9".into()),
                name: None,
                arguments_delta: r#"{"city":"#.into(),
            },
            StreamFragment::tool_start("t1", "weather", r#""Oslo"}"#),
        ])
        .finish()
        .unwrap();

        let call = turn.tool_invocations().next().unwrap();
        assert_eq!(call.id, "t1");
        assert_eq!(call.arguments, json!({"city": "Oslo"}));
    }

    #[test]
    fn unclaimed_continuation_dropped_at_finish() {
        let acc = feed(vec![
            StreamFragment::text("partial"),
            StreamFragment::ToolInvocationDelta {
                id: Some("t1".into()),
                name: None,
                arguments_delta: "{}".into(),
            },
        ]);

        assert_eq!(acc.snapshot().tool_invocations().count(), 0);
        let turn = acc.finish().unwrap();
        assert_eq!(turn.tool_invocations().count(), 0);
        assert_eq!(turn.text(), "partial");
    }

    #[test]
    fn unparseable_arguments_kept_as_string() {
        let turn = feed(vec![StreamFragment::tool_start("t1", "search", "{not json")])
            .finish()
            .unwrap();
        let call = turn.tool_invocations().next().unwrap();
        assert_eq!(call.arguments, json!("{not json"));
    }

    #[test]
    fn empty_arguments_become_empty_object() {
        let turn = feed(vec![StreamFragment::tool_start("t1", "list", "")])
            .finish()
            .unwrap();
        assert_eq!(turn.tool_invocations().next().unwrap().arguments, json!({}));
    }

    #[test]
    fn empty_stream_yields_nothing() {
        assert!(feed(vec![StreamFragment::end()]).finish().is_none());
        assert!(StreamAccumulator::new().finish().is_none());
    }

    #[test]
    fn snapshots_share_the_final_turn_id() {
        let mut acc = StreamAccumulator::new();
        acc.ingest(StreamFragment::text("a"));
        let first = acc.snapshot();
        acc.ingest(StreamFragment::text("b"));
        let second = acc.snapshot();
        assert_eq!(first.text(), "a");
        assert_eq!(second.text(), "ab");
        assert_eq!(first.id, second.id);
        assert_eq!(acc.finish().unwrap().id, first.id);
    }

    #[test]
    fn end_marker_records_usage() {
        let mut acc = StreamAccumulator::new();
        acc.ingest(StreamFragment::text("hi"));
        let done = acc.ingest(StreamFragment::End {
            usage: Some(Usage {
                prompt_tokens: 3,
                completion_tokens: 1,
                total_tokens: 4,
            }),
            finish_reason: Some("stop".into()),
        });
        assert!(done);
        assert_eq!(acc.usage().unwrap().total_tokens, 4);
        assert_eq!(acc.fragments(), 2);
        let turn = acc.finish().unwrap();
        assert_eq!(turn.metadata["finish_reason"], "stop");
    }
}
