//! Client-side view of channel histories.
//!
//! A joining client receives a snapshot and then live `chat_append` events.
//! The two can overlap, so messages are keyed by (sender, text, ts) and a
//! message already present is dropped.

use crate::{ChatMessage, SessionSnapshot};
use std::collections::{HashMap, HashSet};

type MessageKey = (String, String, i64);

fn key_of(message: &ChatMessage) -> MessageKey {
    (message.sender.clone(), message.text.clone(), message.ts)
}

/// Deduplicating history for one channel.
#[derive(Debug, Default, Clone)]
pub struct ChannelHistory {
    messages: Vec<ChatMessage>,
    seen: HashSet<MessageKey>,
}

impl ChannelHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append unless an identical message was already rendered.
    /// Returns whether the message was added.
    pub fn push(&mut self, message: ChatMessage) -> bool {
        if !self.seen.insert(key_of(&message)) {
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Deduplicating histories for every channel of a session.
#[derive(Debug, Default, Clone)]
pub struct SessionView {
    channels: HashMap<String, ChannelHistory>,
}

impl SessionView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a snapshot. Messages already seen via broadcast are kept once.
    pub fn apply_snapshot(&mut self, snapshot: &SessionSnapshot) {
        for channel in &snapshot.channels {
            let history = self.channels.entry(channel.name.clone()).or_default();
            for message in &channel.history {
                history.push(message.clone());
            }
        }
    }

    /// Apply a live append. Returns whether it should be rendered.
    pub fn apply_append(&mut self, channel: &str, message: ChatMessage) -> bool {
        self.channels
            .entry(channel.to_string())
            .or_default()
            .push(message)
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelHistory> {
        self.channels.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Channel;
    use uuid::Uuid;

    fn snapshot_with(messages: Vec<ChatMessage>) -> SessionSnapshot {
        SessionSnapshot {
            session_id: Uuid::nil(),
            started: true,
            locked: Default::default(),
            channels: vec![Channel {
                name: "ops".into(),
                topic: String::new(),
                history: messages,
                conversation_flow: None,
            }],
        }
    }

    #[test]
    fn test_late_join_renders_once() {
        let m = ChatMessage::new("bot:Ana", "What is the p95?", 1_000);
        let mut view = SessionView::new();

        view.apply_snapshot(&snapshot_with(vec![m.clone()]));
        assert!(!view.apply_append("ops", m));

        assert_eq!(view.channel("ops").unwrap().len(), 1);
    }

    #[test]
    fn test_broadcast_before_snapshot_renders_once() {
        let m = ChatMessage::new("candidate", "p95 is 500ms", 2_000);
        let mut view = SessionView::new();

        assert!(view.apply_append("ops", m.clone()));
        view.apply_snapshot(&snapshot_with(vec![m]));

        assert_eq!(view.channel("ops").unwrap().len(), 1);
    }

    #[test]
    fn test_same_text_different_ts_is_distinct() {
        let mut history = ChannelHistory::new();
        assert!(history.push(ChatMessage::new("candidate", "ok", 1)));
        assert!(history.push(ChatMessage::new("candidate", "ok", 2)));
        assert!(!history.push(ChatMessage::new("candidate", "ok", 2)));
        assert_eq!(history.len(), 2);
    }
}
