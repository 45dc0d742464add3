//! Scenario definition format.
//!
//! A scenario is authored as JSON (or YAML) and loaded once; nothing in this
//! module mutates it after deserialization.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Conversation flow type that hands turn-taking over to the client.
pub const CLIENT_PACED_FLOW: &str = "ababab";

/// Event key used for free-text candidate messages.
pub const MESSAGE_EVENT_KEY: &str = "message";

/// Event key used for a submission of the given task.
pub fn task_result_event_key(task_id: &str) -> String {
    format!("taskResult:{}", task_id)
}

/// A complete scenario: channels, per-channel scripts and tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub channels: Vec<ChannelSpec>,
    /// Channel name -> ordered steps.
    #[serde(default)]
    pub script: BTreeMap<String, Vec<Step>>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

/// A channel declared by the scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub name: String,
    #[serde(default)]
    pub topic: String,
    /// Messages present in the channel history when the session is created.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub seed: Vec<Utterance>,
}

/// One scripted beat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,
    #[serde(default)]
    pub say: Vec<Utterance>,
    /// Event key -> branches, tried in order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<BTreeMap<String, Vec<Branch>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for: Option<WaitFor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_flow: Option<ConversationFlow>,
}

/// Conditional follow-up from a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    /// Missing means "always".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when: Option<Predicate>,
    #[serde(default)]
    pub say: Vec<Utterance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// Text predicate attached to a branch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Predicate {
    #[serde(default)]
    pub otherwise: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains_any: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<String>,
}

/// A scripted line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Utterance {
    pub sender: String,
    pub text: String,
    /// Emitting this line assigns the task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

/// Legacy single-shot advance condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitFor {
    #[serde(rename = "type")]
    pub kind: WaitKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitKind {
    CandidateMessage,
    TaskSubmit,
    #[serde(other)]
    Unknown,
}

/// Turn-taking descriptor, copied onto the channel at session creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationFlow {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConversationFlow {
    pub fn is_client_paced(&self) -> bool {
        self.kind == CLIENT_PACED_FLOW
    }
}

/// A gradable exercise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Choice>,
    /// Correct choice key for multiple-choice tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<Value>,
    /// Points awarded for a correct multiple-choice answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<AnswerSpec>,
    /// Client-facing fields (asset, etc.) passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn is_mcq(&self) -> bool {
        self.kind == "mcq"
    }

    pub fn is_freeform(&self) -> bool {
        self.kind == "freeform" || self.answer.as_ref().is_some_and(|a| a.kind == "freeform")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub key: String,
    #[serde(default)]
    pub label: String,
}

/// Expected-answer description for free-form tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSpec {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_words: Option<u32>,
    #[serde(default)]
    pub rubric: Vec<RubricRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubricRule {
    #[serde(rename = "match")]
    pub pattern: RubricPattern,
    pub score: f64,
    /// Rationale appended to the grading detail when the rule matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubricPattern {
    pub regex: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<String>,
}
