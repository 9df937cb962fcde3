//! Pending-call resolution.
//!
//! A tool call is pending when it appears in the latest assistant turn of the
//! log and no later turn carries an outcome with its id. Any pending call
//! means the previous run stopped mid-acting (suspension, interruption, or a
//! stop request), so new input must resolve it before the loop may continue.

use clawloop_core::error::ResumeError;
use clawloop_core::message::{Role, ToolInvocation, Turn};
use std::collections::BTreeSet;

/// Invocations of the latest assistant turn that have no outcome yet, in call order.
pub fn pending_invocations(turns: &[Turn]) -> Vec<ToolInvocation> {
    let Some(at) = turns.iter().rposition(|t| t.role == Role::Assistant) else {
        return Vec::new();
    };

    let answered: BTreeSet<&str> = turns[at + 1..]
        .iter()
        .flat_map(Turn::tool_outcomes)
        .map(|o| o.id.as_str())
        .collect();

    turns[at]
        .tool_invocations()
        .filter(|inv| !answered.contains(inv.id.as_str()))
        .cloned()
        .collect()
}

pub fn pending_ids(turns: &[Turn]) -> BTreeSet<String> {
    pending_invocations(turns)
        .into_iter()
        .map(|inv| inv.id)
        .collect()
}

/// Check caller input against the pending set before anything is logged.
///
/// Accepts input that carries outcomes for a non-empty subset of the pending
/// ids, each exactly once. A partial subset must not be mixed with any
/// other content.
pub fn validate_resumption(input: &[Turn], pending: &BTreeSet<String>) -> Result<(), ResumeError> {
    let supplied: Vec<&str> = input
        .iter()
        .flat_map(Turn::tool_outcomes)
        .map(|o| o.id.as_str())
        .collect();

    if supplied.is_empty() {
        return Err(ResumeError::MissingToolOutcomes {
            pending: pending.iter().cloned().collect(),
        });
    }

    let mut seen = BTreeSet::new();
    for id in &supplied {
        if !seen.insert(*id) {
            return Err(ResumeError::DuplicateOutcome(id.to_string()));
        }
    }

    if let Some(foreign) = seen.iter().find(|id| !pending.contains(**id)) {
        return Err(ResumeError::UnknownOutcome(foreign.to_string()));
    }

    let partial = seen.len() < pending.len();
    let mixed = input
        .iter()
        .flat_map(|t| &t.blocks)
        .any(|b| !b.is_tool_outcome());
    if partial && mixed {
        return Err(ResumeError::AmbiguousPartialResumption {
            supplied: seen.iter().map(|s| s.to_string()).collect(),
            pending: pending.iter().cloned().collect(),
        });
    }

    Ok(())
}
