//! Session, channel and result records.

use crate::{ConversationFlow, Utterance};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A persisted chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `candidate`, `founder`, `system` or `bot:<name>`.
    pub sender: String,
    pub text: String,
    /// Milliseconds since Unix epoch.
    pub ts: i64,
}

impl ChatMessage {
    pub fn new(sender: impl Into<String>, text: impl Into<String>, ts: i64) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            ts,
        }
    }

    pub fn from_utterance(utterance: &Utterance, ts: i64) -> Self {
        Self::new(utterance.sender.clone(), utterance.text.clone(), ts)
    }
}

/// A named sub-conversation within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub name: String,
    pub topic: String,
    pub history: Vec<ChatMessage>,
    /// Copied from the channel's first script step.
    pub conversation_flow: Option<ConversationFlow>,
}

/// Opaque data attached to a session at creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    #[serde(default)]
    pub posting_id: Option<Value>,
    #[serde(default)]
    pub application_id: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Candidate answer to a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskAnswer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl TaskAnswer {
    pub fn choice(choice: impl Into<String>) -> Self {
        Self {
            choice: Some(Value::String(choice.into())),
            text: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            choice: None,
            text: Some(text.into()),
        }
    }

    /// Text evaluated against branch predicates: the free text if present,
    /// otherwise a string choice, otherwise empty.
    pub fn flow_text(&self) -> String {
        match (&self.text, &self.choice) {
            (Some(text), _) if !text.is_empty() => text.clone(),
            (_, Some(Value::String(choice))) => choice.clone(),
            _ => String::new(),
        }
    }
}

/// Outcome of grading one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub task_id: String,
    pub answer: TaskAnswer,
    pub score: f64,
    pub detail: String,
    pub ts: i64,
}

/// A range of a channel's history starred as a key moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    pub channel: String,
    pub idx_start: usize,
    pub idx_end: usize,
    pub reason: String,
    pub ts: i64,
}

/// Full state delivered to a client when it joins a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub started: bool,
    pub locked: BTreeSet<String>,
    pub channels: Vec<Channel>,
}

/// Snapshot plus results, for read-only HTTP access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetail {
    #[serde(flatten)]
    pub snapshot: SessionSnapshot,
    pub meta: SessionMeta,
    pub results: Vec<TaskResult>,
}
