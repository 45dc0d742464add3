//! Scripted conversation flow.
//!
//! For one inbound event on one channel the engine decides whether the
//! channel's pointer moves and what gets said. It never fails: anything that
//! cannot be handled leaves the pointer where it was, so a later event can
//! still make progress.

use crate::events::Turn;
use crate::matcher::first_match;
use crate::scenario::FlowPointer;
use parley_types::{MESSAGE_EVENT_KEY, WaitKind, task_result_event_key};
use std::borrow::Cow;
use tracing::debug;

/// An event the engine reacts to.
#[derive(Debug, Clone, Copy)]
pub enum FlowEvent<'a> {
    Message { text: &'a str },
    TaskSubmit { task_id: &'a str, answer_text: &'a str },
}

impl FlowEvent<'_> {
    /// Key under which a step declares branches for this event.
    pub fn key(&self) -> Cow<'static, str> {
        match self {
            FlowEvent::Message { .. } => Cow::Borrowed(MESSAGE_EVENT_KEY),
            FlowEvent::TaskSubmit { task_id, .. } => Cow::Owned(task_result_event_key(task_id)),
        }
    }

    /// Text evaluated against branch predicates.
    pub fn text(&self) -> &str {
        match self {
            FlowEvent::Message { text } => text,
            FlowEvent::TaskSubmit { answer_text, .. } => answer_text,
        }
    }

    fn satisfies(&self, kind: WaitKind, wait_task: Option<&str>) -> bool {
        match (self, kind) {
            (FlowEvent::Message { .. }, WaitKind::CandidateMessage) => true,
            (FlowEvent::TaskSubmit { task_id, .. }, WaitKind::TaskSubmit) => {
                wait_task == Some(*task_id)
            }
            _ => false,
        }
    }
}

/// What one call to [`advance`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
    /// The channel has no script, or the session has not started.
    NoScript,
    /// The pointer is past the end of the script.
    Finished,
    /// The current step is driven by the client.
    ClientPaced,
    /// Branches exist for the event but none matched.
    Held,
    /// A branch matched.
    Branched {
        branch: usize,
        moved_to: Option<FlowPointer>,
    },
    /// The legacy `waitFor` condition was satisfied.
    Advanced { to: FlowPointer },
    /// The legacy `waitFor` condition was not satisfied.
    Waiting,
}

/// Assign tasks carried by seed lines, then point every scripted channel at
/// its first step and say it.
///
/// Returns `false` if the session had already started.
pub fn start(turn: &mut Turn<'_>) -> bool {
    if turn.record().started {
        return false;
    }
    turn.record_mut().started = true;

    let scenario = turn.scenario();
    for spec in &scenario.source().channels {
        for task_id in spec.seed.iter().filter_map(|u| u.task_id.as_deref()) {
            debug!(target: "parley::flow", "Seed of '{}' assigns task '{}'", spec.name, task_id);
            turn.assign(&spec.name, task_id);
        }
    }

    let channels: Vec<String> = turn.record().channels.iter().map(|c| c.name.clone()).collect();
    for channel in channels {
        let Some(script) = scenario.script(&channel) else {
            continue;
        };
        let Some(first) = script.first() else {
            continue;
        };
        turn.record_mut().set_pointer(&channel, first);
        if let Some(step) = script.step(first) {
            debug!(target: "parley::flow", "Channel '{}' starts at step '{}'", channel, step.id);
            turn.say(&channel, &step.say);
        }
    }
    true
}

/// React to one event on one channel.
pub fn advance(turn: &mut Turn<'_>, channel: &str, event: FlowEvent<'_>) -> FlowOutcome {
    let scenario = turn.scenario();
    let Some(script) = scenario.script(channel) else {
        return FlowOutcome::NoScript;
    };
    let Some(pointer) = turn.record().pointer(channel) else {
        return FlowOutcome::NoScript;
    };
    let Some(step) = script.step(pointer) else {
        return FlowOutcome::Finished;
    };

    if step.is_client_paced() {
        debug!(target: "parley::flow", "Step '{}' on '{}' is client-paced", step.id, channel);
        return FlowOutcome::ClientPaced;
    }

    let key = event.key();
    if let Some(branches) = step.branches(&key) {
        let Some(index) = first_match(branches, |b| &b.matcher, event.text()) else {
            debug!(target: "parley::flow", "No branch of step '{}' matched on '{}'", step.id, channel);
            return FlowOutcome::Held;
        };
        let branch = &branches[index];
        turn.say(channel, &branch.say);

        if let Some(target) = branch.next {
            turn.record_mut().set_pointer(channel, target);
            if let Some(next) = script.step(target) {
                turn.say(channel, &next.say);
            }
            debug!(target: "parley::flow", "Channel '{}' moved from '{}' via branch {}", channel, step.id, index);
        }
        return FlowOutcome::Branched {
            branch: index,
            moved_to: branch.next,
        };
    }

    let Some(wait) = &step.wait_for else {
        return FlowOutcome::Waiting;
    };
    if !event.satisfies(wait.kind, wait.task_id.as_deref()) {
        return FlowOutcome::Waiting;
    }

    turn.record_mut().set_pointer(channel, step.next);
    if let Some(next) = script.step(step.next) {
        turn.say(channel, &next.say);
    }
    FlowOutcome::Advanced { to: step.next }
}
