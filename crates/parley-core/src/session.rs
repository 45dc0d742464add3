//! Session manager orchestrating the store, flow engine and grader.
//!
//! Every operation resolves the session, takes its lock, mutates the record
//! and broadcasts while still holding the lock. Unknown sessions, channels
//! and tasks are absorbed as no-ops; only session creation and start report
//! failures to the caller.

use crate::catalog::ScenarioCatalog;
use crate::events::{SessionEvent, Turn};
use crate::flow::{self, FlowEvent, FlowOutcome};
use crate::grader::{self, Grade};
use crate::store::{SessionHandle, SessionStore, now_ms};
use crate::{ParleyError, Result};
use parley_types::{
    Channel, Highlight, SessionDetail, SessionMeta, SessionSnapshot, TaskAnswer, TaskResult,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

/// Sender label for candidate messages.
pub const CANDIDATE_SENDER: &str = "candidate";

/// Sender label for facilitator injections.
pub const FOUNDER_SENDER: &str = "founder";

/// Options for creating a new session.
#[derive(Debug, Clone)]
pub struct CreateSessionOptions {
    pub org: String,
    pub role: String,
    pub meta: SessionMeta,
}

/// What the caller gets back from a successful create.
#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub session_id: Uuid,
    pub channels: Vec<Channel>,
}

/// Manages scripted interview sessions.
pub struct SessionManager {
    store: SessionStore,
    catalog: ScenarioCatalog,
}

impl SessionManager {
    pub fn new(catalog: ScenarioCatalog, event_capacity: usize) -> Self {
        Self {
            store: SessionStore::new(event_capacity),
            catalog,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn catalog(&self) -> &ScenarioCatalog {
        &self.catalog
    }

    fn handle(&self, session_id: Uuid) -> Option<Arc<SessionHandle>> {
        let handle = self.store.get(session_id);
        if handle.is_none() {
            debug!(target: "parley::session", "Ignoring event for unknown session {}", session_id);
        }
        handle
    }

    /// Create a session from a catalogued scenario.
    pub async fn create_session(&self, opts: CreateSessionOptions) -> Result<CreatedSession> {
        let scenario = self.catalog.resolve(&opts.org, &opts.role)?;
        let handle = self.store.create(scenario, opts.meta);
        let channels = handle.lock().await.channels.clone();

        info!(
            target: "parley::session",
            "Created session {} for {}/{} ({} channels)",
            handle.id(),
            opts.org,
            opts.role,
            channels.len()
        );
        Ok(CreatedSession {
            session_id: handle.id(),
            channels,
        })
    }

    /// Start the scripted flow. Idempotent.
    pub async fn start_session(&self, session_id: Uuid) -> Result<()> {
        let handle = self
            .store
            .get(session_id)
            .ok_or(ParleyError::SessionNotFound(session_id))?;
        let mut record = handle.lock().await;
        let mut turn = Turn::new(&mut record, handle.scenario(), handle.events());
        if flow::start(&mut turn) {
            info!(target: "parley::session", "Session {} started", session_id);
        } else {
            debug!(target: "parley::session", "Session {} already started", session_id);
        }
        Ok(())
    }

    /// Snapshot and subscribe atomically, so nothing falls between them.
    pub async fn join(
        &self,
        session_id: Uuid,
    ) -> Option<(SessionSnapshot, broadcast::Receiver<SessionEvent>)> {
        let handle = self.handle(session_id)?;
        let record = handle.lock().await;
        let rx = handle.subscribe();
        Some((record.snapshot(), rx))
    }

    pub async fn snapshot(&self, session_id: Uuid) -> Option<SessionSnapshot> {
        let handle = self.store.get(session_id)?;
        let snapshot = handle.lock().await.snapshot();
        Some(snapshot)
    }

    pub async fn detail(&self, session_id: Uuid) -> Option<SessionDetail> {
        let handle = self.store.get(session_id)?;
        let detail = handle.lock().await.detail();
        Some(detail)
    }

    pub async fn results(&self, session_id: Uuid) -> Option<Vec<TaskResult>> {
        let handle = self.store.get(session_id)?;
        let results = handle.lock().await.results.clone();
        Some(results)
    }

    pub async fn highlights(&self, session_id: Uuid) -> Option<Vec<Highlight>> {
        let handle = self.store.get(session_id)?;
        let highlights = handle.lock().await.highlights.clone();
        Some(highlights)
    }

    /// Candidate text: persist, broadcast, then let the flow react.
    pub async fn post_message(&self, session_id: Uuid, channel: &str, text: &str) -> Option<FlowOutcome> {
        let handle = self.handle(session_id)?;
        let mut record = handle.lock().await;
        if record.is_locked(channel) {
            debug!(target: "parley::session", "Message on locked channel '{}' in {}", channel, session_id);
        }

        let mut turn = Turn::new(&mut record, handle.scenario(), handle.events());
        turn.append(channel, CANDIDATE_SENDER, text)?;
        let outcome = flow::advance(&mut turn, channel, FlowEvent::Message { text });
        debug!(target: "parley::flow", "Session {} '{}': {:?}", session_id, channel, outcome);
        Some(outcome)
    }

    /// Facilitator text: persisted and broadcast, never evaluated.
    pub async fn inject(&self, session_id: Uuid, channel: &str, text: &str) {
        let Some(handle) = self.handle(session_id) else {
            return;
        };
        let mut record = handle.lock().await;
        let mut turn = Turn::new(&mut record, handle.scenario(), handle.events());
        turn.append(channel, FOUNDER_SENDER, &format!("(Founder) {}", text));
    }

    pub async fn lock_channel(&self, session_id: Uuid, channel: &str) {
        let Some(handle) = self.handle(session_id) else {
            return;
        };
        let mut record = handle.lock().await;
        if !record.lock_channel(channel) {
            debug!(target: "parley::session", "Channel '{}' unknown or already locked in {}", channel, session_id);
            return;
        }
        info!(target: "parley::session", "Locked channel '{}' in {}", channel, session_id);
        let turn = Turn::new(&mut record, handle.scenario(), handle.events());
        turn.publish(SessionEvent::ChannelLocked {
            channel: channel.to_string(),
        });
    }

    /// Grade a submission, record and broadcast the result, then feed it to
    /// every channel whose script assigns the task.
    pub async fn submit_task(
        &self,
        session_id: Uuid,
        task_id: &str,
        answer: TaskAnswer,
    ) -> Option<Grade> {
        let handle = self.handle(session_id)?;
        let scenario = handle.scenario().clone();
        let mut record = handle.lock().await;

        let grade = grader::grade(scenario.task(task_id), &answer);
        debug!(
            target: "parley::grader",
            "Session {} task {}: score {} ({})",
            session_id,
            task_id,
            grade.score,
            grade.detail
        );

        let answer_text = answer.flow_text();
        record.add_task_result(TaskResult {
            task_id: task_id.to_string(),
            answer,
            score: grade.score,
            detail: grade.detail.clone(),
            ts: now_ms(),
        });

        let mut turn = Turn::new(&mut record, &scenario, handle.events());
        turn.publish(SessionEvent::TaskGraded {
            task_id: task_id.to_string(),
            score: grade.score,
            detail: grade.detail.clone(),
        });

        for channel in scenario.channels_for_task(task_id) {
            let outcome = flow::advance(
                &mut turn,
                channel,
                FlowEvent::TaskSubmit {
                    task_id,
                    answer_text: &answer_text,
                },
            );
            debug!(target: "parley::flow", "Session {} '{}': {:?}", session_id, channel, outcome);
        }
        Some(grade)
    }

    pub async fn add_highlight(
        &self,
        session_id: Uuid,
        channel: &str,
        idx_start: usize,
        idx_end: usize,
        reason: String,
    ) -> Option<Highlight> {
        let handle = self.handle(session_id)?;
        let mut record = handle.lock().await;
        let highlight = record.add_highlight(channel, idx_start, idx_end, reason)?;
        let turn = Turn::new(&mut record, handle.scenario(), handle.events());
        turn.publish(SessionEvent::HighlightAdded(highlight.clone()));
        Some(highlight)
    }

    /// Remove sessions with no activity for `ttl`. Returns how many.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let cutoff = now_ms() - ttl.as_millis() as i64;
        let evicted = self.store.evict_idle_before(cutoff);
        for id in &evicted {
            info!(target: "parley::session", "Evicted idle session {}", id);
        }
        evicted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogEntry;
    use crate::scenario::Strictness;
    use tempfile::TempDir;

    const SCENARIO: &str = r#"{
        "channels": [
            { "name": "ops", "topic": "Incident" },
            { "name": "design", "topic": "Review" },
            { "name": "lounge", "topic": "Chat", "seed": [{ "sender": "system", "text": "Say hi" }] }
        ],
        "script": {
            "ops": [
                {
                    "id": "S0",
                    "say": [{ "sender": "bot:Ana", "text": "Check the dashboard", "taskId": "t-mcq" }],
                    "on": {
                        "taskResult:t-mcq": [
                            { "when": { "regex": "^B$" }, "say": [{ "sender": "bot:Ana", "text": "Correct path" }], "next": "S1" },
                            { "when": { "otherwise": true }, "say": [{ "sender": "bot:Ana", "text": "Look again" }] }
                        ],
                        "message": [
                            { "when": { "containsAny": ["p95"] }, "say": [{ "sender": "bot:Ana", "text": "Good eye" }] }
                        ]
                    }
                },
                { "id": "S1", "say": [{ "sender": "bot:Ana", "text": "Now write the summary" }] }
            ],
            "design": [
                {
                    "id": "D0",
                    "say": [{ "sender": "bot:Raj", "text": "Same question, different angle" }],
                    "on": {
                        "taskResult:t-mcq": [{ "say": [{ "sender": "bot:Raj", "text": "Noted" }] }]
                    }
                },
                { "id": "D1", "say": [{ "sender": "bot:Raj", "text": "unused", "taskId": "t-mcq" }] }
            ]
        },
        "tasks": [{ "id": "t-mcq", "type": "mcq", "correct": "B", "score": 5 }]
    }"#;

    fn manager() -> (SessionManager, TempDir) {
        manager_for(SCENARIO)
    }

    fn manager_for(scenario: &str) -> (SessionManager, TempDir) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("ops.json"), scenario).unwrap();
        let catalog = ScenarioCatalog::new(
            dir.path(),
            vec![CatalogEntry::new("acme", "sre", "ops.json")],
            Strictness::Strict,
        );
        (SessionManager::new(catalog, 64), dir)
    }

    async fn create(manager: &SessionManager) -> Uuid {
        manager
            .create_session(CreateSessionOptions {
                org: "acme".into(),
                role: "sre".into(),
                meta: SessionMeta::default(),
            })
            .await
            .unwrap()
            .session_id
    }

    fn texts(rx: &mut broadcast::Receiver<SessionEvent>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(match event {
                SessionEvent::MessageAppended { channel, message } => {
                    format!("{}:{}", channel, message.text)
                }
                SessionEvent::TaskAssigned { channel, task } => format!("{}:assign:{}", channel, task.id),
                SessionEvent::TaskGraded { task_id, score, .. } => format!("graded:{}:{}", task_id, score),
                SessionEvent::ChannelLocked { channel } => format!("locked:{}", channel),
                SessionEvent::HighlightAdded(h) => format!("highlight:{}", h.channel),
            });
        }
        out
    }

    #[tokio::test]
    async fn test_create_unknown_scenario_fails() {
        let (manager, _dir) = manager();
        let err = manager
            .create_session(CreateSessionOptions {
                org: "acme".into(),
                role: "pm".into(),
                meta: SessionMeta::default(),
            })
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(manager.store().is_empty());
    }

    #[tokio::test]
    async fn test_create_returns_seeded_channels() {
        let (manager, _dir) = manager();
        let created = manager
            .create_session(CreateSessionOptions {
                org: "ACME".into(),
                role: "sre".into(),
                meta: SessionMeta::default(),
            })
            .await
            .unwrap();
        assert_eq!(created.channels.len(), 3);
        assert_eq!(created.channels[2].history[0].text, "Say hi");

        let snapshot = manager.snapshot(created.session_id).await.unwrap();
        assert!(!snapshot.started);
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_assigns_tasks() {
        let (manager, _dir) = manager();
        let id = create(&manager).await;
        let (_, mut rx) = manager.join(id).await.unwrap();

        manager.start_session(id).await.unwrap();
        manager.start_session(id).await.unwrap();

        assert_eq!(
            texts(&mut rx),
            vec![
                "ops:Check the dashboard",
                "ops:assign:t-mcq",
                "design:Same question, different angle",
            ]
        );
        assert!(manager.snapshot(id).await.unwrap().started);
    }

    #[tokio::test]
    async fn test_start_unknown_session_is_error() {
        let (manager, _dir) = manager();
        let err = manager.start_session(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ParleyError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_candidate_message_precedes_reply() {
        let (manager, _dir) = manager();
        let id = create(&manager).await;
        manager.start_session(id).await.unwrap();
        let (_, mut rx) = manager.join(id).await.unwrap();

        let outcome = manager.post_message(id, "ops", "p95 looks high").await;
        assert!(matches!(outcome, Some(FlowOutcome::Branched { branch: 0, moved_to: None })));
        assert_eq!(texts(&mut rx), vec!["ops:p95 looks high", "ops:Good eye"]);

        let snapshot = manager.snapshot(id).await.unwrap();
        let ops = &snapshot.channels[0].history;
        assert_eq!(ops[ops.len() - 2].sender, CANDIDATE_SENDER);
    }

    #[tokio::test]
    async fn test_unknown_targets_are_absorbed() {
        let (manager, _dir) = manager();
        let id = create(&manager).await;

        assert!(manager.post_message(Uuid::new_v4(), "ops", "hi").await.is_none());
        assert!(manager.post_message(id, "nope", "hi").await.is_none());
        assert!(manager.submit_task(Uuid::new_v4(), "t-mcq", TaskAnswer::choice("B")).await.is_none());
        manager.inject(Uuid::new_v4(), "ops", "hello").await;
        manager.lock_channel(id, "nope").await;

        assert!(manager.snapshot(id).await.unwrap().locked.is_empty());
    }

    #[tokio::test]
    async fn test_submit_task_grades_and_reenters_flow() {
        let (manager, _dir) = manager();
        let id = create(&manager).await;
        manager.start_session(id).await.unwrap();
        let (_, mut rx) = manager.join(id).await.unwrap();

        let grade = manager.submit_task(id, "t-mcq", TaskAnswer::choice("B")).await.unwrap();
        assert_eq!(grade.score, 5.0);

        assert_eq!(
            texts(&mut rx),
            vec![
                "graded:t-mcq:5",
                "ops:Correct path",
                "ops:Now write the summary",
                "design:Noted",
            ]
        );

        let results = manager.results(id).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].detail, "Correct: B");
    }

    #[tokio::test]
    async fn test_wrong_answer_scores_zero_and_holds() {
        let (manager, _dir) = manager();
        let id = create(&manager).await;
        manager.start_session(id).await.unwrap();
        let (_, mut rx) = manager.join(id).await.unwrap();

        let grade = manager.submit_task(id, "t-mcq", TaskAnswer::choice("A")).await.unwrap();
        assert_eq!(grade.score, 0.0);
        assert_eq!(
            texts(&mut rx),
            vec!["graded:t-mcq:0", "ops:Look again", "design:Noted"]
        );
    }

    #[tokio::test]
    async fn test_unknown_task_still_records_result() {
        let (manager, _dir) = manager();
        let id = create(&manager).await;

        let grade = manager.submit_task(id, "t-nope", TaskAnswer::text("x")).await.unwrap();
        assert_eq!(grade.score, 0.0);
        assert_eq!(grade.detail, "Unknown task");
        assert_eq!(manager.results(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_inject_bypasses_flow() {
        let (manager, _dir) = manager();
        let id = create(&manager).await;
        manager.start_session(id).await.unwrap();
        let (_, mut rx) = manager.join(id).await.unwrap();

        manager.inject(id, "ops", "p95 matters").await;
        assert_eq!(texts(&mut rx), vec!["ops:(Founder) p95 matters"]);
    }

    #[tokio::test]
    async fn test_lock_is_advisory() {
        let (manager, _dir) = manager();
        let id = create(&manager).await;
        manager.start_session(id).await.unwrap();
        let (_, mut rx) = manager.join(id).await.unwrap();

        manager.lock_channel(id, "ops").await;
        manager.lock_channel(id, "ops").await;
        let outcome = manager.post_message(id, "ops", "p95").await;

        assert!(matches!(outcome, Some(FlowOutcome::Branched { .. })));
        assert_eq!(
            texts(&mut rx),
            vec!["locked:ops", "ops:p95", "ops:Good eye"]
        );
        let snapshot = manager.snapshot(id).await.unwrap();
        assert_eq!(snapshot.locked.len(), 1);
    }

    #[tokio::test]
    async fn test_join_snapshot_covers_prior_events() {
        let (manager, _dir) = manager();
        let id = create(&manager).await;
        manager.start_session(id).await.unwrap();
        manager.post_message(id, "ops", "p95").await;

        let (snapshot, mut rx) = manager.join(id).await.unwrap();
        assert!(snapshot.started);
        let ops = &snapshot.channels[0].history;
        assert_eq!(ops.last().unwrap().text, "Good eye");
        assert!(texts(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_highlights() {
        let (manager, _dir) = manager();
        let id = create(&manager).await;
        let (_, mut rx) = manager.join(id).await.unwrap();

        assert!(manager.add_highlight(id, "lounge", 0, 0, "warm".into()).await.is_some());
        assert!(manager.add_highlight(id, "lounge", 0, 5, "bad".into()).await.is_none());
        assert_eq!(texts(&mut rx), vec!["highlight:lounge"]);
        assert_eq!(manager.highlights(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_evict_idle() {
        let (manager, _dir) = manager();
        let id = create(&manager).await;

        assert_eq!(manager.evict_idle(Duration::from_secs(3600)), 0);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(manager.evict_idle(Duration::ZERO), 1);
        assert!(manager.snapshot(id).await.is_none());
    }

    #[tokio::test]
    async fn test_branch_assigned_task_does_not_reenter_channel() {
        let (manager, _dir) = manager_for(
            r#"{
                "channels": [{ "name": "a" }, { "name": "b" }],
                "script": {
                    "a": [{ "id": "A0", "say": [{ "sender": "bot", "text": "Take this", "taskId": "t" }] }],
                    "b": [{
                        "id": "B0",
                        "on": {
                            "message": [{ "say": [{ "sender": "bot", "text": "Another copy", "taskId": "t" }] }],
                            "taskResult:t": [{ "say": [{ "sender": "bot", "text": "B reacted" }] }]
                        }
                    }]
                },
                "tasks": [{ "id": "t", "type": "mcq", "correct": "A" }]
            }"#,
        );
        let id = create(&manager).await;
        manager.start_session(id).await.unwrap();
        let (_, mut rx) = manager.join(id).await.unwrap();

        manager.post_message(id, "b", "hello").await;
        assert_eq!(texts(&mut rx), vec!["b:hello", "b:Another copy", "b:assign:t"]);

        manager.submit_task(id, "t", TaskAnswer::choice("Z")).await;
        assert_eq!(texts(&mut rx), vec!["graded:t:0"]);
    }
}
