//! WebSocket message protocol between client and server.

use serde::{Deserialize, Serialize};

use crate::{ChatMessage, Highlight, SessionSnapshot, Task, TaskAnswer};

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsClientMessage {
    /// Request a fresh snapshot of the session.
    Join,
    /// Candidate text for a channel; evaluated by the flow engine.
    Message { channel: String, text: String },
    /// Facilitator text; persisted and broadcast, never evaluated.
    Inject { channel: String, text: String },
    /// Mark a channel as closed for candidate input.
    LockChannel { channel: String },
    /// Candidate answer to an assigned task.
    SubmitTask {
        task_id: String,
        #[serde(default)]
        answer: TaskAnswer,
    },
    /// Star a range of a channel's history.
    AddHighlight {
        channel: String,
        idx_start: usize,
        idx_end: usize,
        #[serde(default)]
        reason: String,
    },
    /// Ping for keepalive.
    Ping { timestamp: u64 },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsServerMessage {
    /// Full session state, sent on join.
    SessionState(SessionSnapshot),
    /// A message was appended to a channel.
    ChatAppend {
        channel: String,
        #[serde(flatten)]
        message: ChatMessage,
    },
    /// A scripted line assigned a task.
    TaskAssign { channel: String, task: Task },
    /// Grading outcome of a submission.
    TaskResult {
        task_id: String,
        score: f64,
        detail: String,
    },
    /// A channel was locked.
    ChannelLocked { channel: String },
    /// A highlight was recorded.
    HighlightAdded(Highlight),
    /// Response to ping.
    Pong { timestamp: u64 },
    /// Error notification.
    Error { code: String, message: String },
}
