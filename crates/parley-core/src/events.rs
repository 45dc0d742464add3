//! Session events and the write path that produces them.

use crate::scenario::CompiledScenario;
use crate::store::SessionRecord;
use parley_types::{ChatMessage, Highlight, Task, Utterance};
use tokio::sync::broadcast;
use tracing::trace;

/// A state change fanned out to every client joined to a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    MessageAppended { channel: String, message: ChatMessage },
    TaskAssigned { channel: String, task: Box<Task> },
    TaskGraded { task_id: String, score: f64, detail: String },
    ChannelLocked { channel: String },
    HighlightAdded(Highlight),
}

/// One locked mutation pass over a session.
///
/// Every helper persists to the record first and broadcasts second, so the
/// broadcast order is the store order.
pub struct Turn<'a> {
    record: &'a mut SessionRecord,
    scenario: &'a CompiledScenario,
    events: &'a broadcast::Sender<SessionEvent>,
}

impl<'a> Turn<'a> {
    pub fn new(
        record: &'a mut SessionRecord,
        scenario: &'a CompiledScenario,
        events: &'a broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            record,
            scenario,
            events,
        }
    }

    pub fn record(&self) -> &SessionRecord {
        self.record
    }

    pub fn record_mut(&mut self) -> &mut SessionRecord {
        self.record
    }

    pub fn scenario(&self) -> &'a CompiledScenario {
        self.scenario
    }

    /// Broadcast to current subscribers. No subscribers is not an error.
    pub fn publish(&self, event: SessionEvent) {
        let receivers = self.events.send(event).unwrap_or(0);
        trace!(target: "parley::session", "Published event to {} receivers", receivers);
    }

    /// Persist and broadcast one message.
    pub fn append(&mut self, channel: &str, sender: &str, text: &str) -> Option<ChatMessage> {
        let message = self.record.add_message(channel, sender, text)?;
        self.publish(SessionEvent::MessageAppended {
            channel: channel.to_string(),
            message: message.clone(),
        });
        Some(message)
    }

    /// Emit scripted lines in order, assigning any referenced tasks.
    pub fn say(&mut self, channel: &str, lines: &[Utterance]) {
        for line in lines {
            if self.append(channel, &line.sender, &line.text).is_none() {
                continue;
            }
            if let Some(task_id) = line.task_id.as_deref() {
                self.assign(channel, task_id);
            }
        }
    }

    /// Broadcast a task assignment. Unknown task ids are skipped.
    pub fn assign(&mut self, channel: &str, task_id: &str) {
        if let Some(task) = self.scenario.task(task_id) {
            self.publish(SessionEvent::TaskAssigned {
                channel: channel.to_string(),
                task: Box::new(task.task.clone()),
            });
        }
    }
}
