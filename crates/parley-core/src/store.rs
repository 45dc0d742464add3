//! In-memory session registry.
//!
//! Each session lives behind its own async mutex. Whoever holds the lock is
//! the single writer for that session, so the order in which mutations are
//! applied is also the order in which their events are broadcast.

use crate::events::SessionEvent;
use crate::scenario::{CompiledScenario, FlowPointer};
use chrono::Utc;
use dashmap::DashMap;
use parley_types::{
    Channel, ChatMessage, Highlight, SessionDetail, SessionMeta, SessionSnapshot, TaskResult,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::{Mutex, MutexGuard, broadcast};
use uuid::Uuid;

/// Milliseconds since Unix epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Mutable state of one session.
#[derive(Debug)]
pub struct SessionRecord {
    pub id: Uuid,
    pub started: bool,
    pub locked: BTreeSet<String>,
    pub channels: Vec<Channel>,
    pub meta: SessionMeta,
    pub results: Vec<TaskResult>,
    pub highlights: Vec<Highlight>,
    flow: HashMap<String, FlowPointer>,
}

impl SessionRecord {
    fn new(id: Uuid, scenario: &CompiledScenario, meta: SessionMeta) -> Self {
        let created = now_ms();
        let channels = scenario
            .source()
            .channels
            .iter()
            .map(|spec| Channel {
                name: spec.name.clone(),
                topic: spec.topic.clone(),
                history: spec
                    .seed
                    .iter()
                    .map(|u| ChatMessage::from_utterance(u, created))
                    .collect(),
                conversation_flow: scenario.initial_flow(&spec.name),
            })
            .collect();

        Self {
            id,
            started: false,
            locked: BTreeSet::new(),
            channels,
            meta,
            results: Vec::new(),
            highlights: Vec::new(),
            flow: HashMap::new(),
        }
    }

    pub fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channel(name).is_some()
    }

    /// Append to a channel's history, stamping it now. The timestamp never
    /// goes below the previous message's. Returns `None` for unknown channels.
    pub fn add_message(
        &mut self,
        channel: &str,
        sender: impl Into<String>,
        text: impl Into<String>,
    ) -> Option<ChatMessage> {
        self.add_message_at(channel, sender, text, now_ms())
    }

    pub fn add_message_at(
        &mut self,
        channel: &str,
        sender: impl Into<String>,
        text: impl Into<String>,
        ts: i64,
    ) -> Option<ChatMessage> {
        let ch = self.channels.iter_mut().find(|c| c.name == channel)?;
        let floor = ch.history.last().map(|m| m.ts).unwrap_or(i64::MIN);
        let message = ChatMessage::new(sender, text, ts.max(floor));
        ch.history.push(message.clone());
        Some(message)
    }

    /// Returns `true` only when the channel was not locked before.
    pub fn lock_channel(&mut self, channel: &str) -> bool {
        if !self.has_channel(channel) {
            return false;
        }
        self.locked.insert(channel.to_string())
    }

    pub fn is_locked(&self, channel: &str) -> bool {
        self.locked.contains(channel)
    }

    pub fn add_task_result(&mut self, result: TaskResult) {
        self.results.push(result);
    }

    /// Record a highlight if the range lies within the channel's history.
    pub fn add_highlight(
        &mut self,
        channel: &str,
        idx_start: usize,
        idx_end: usize,
        reason: String,
    ) -> Option<Highlight> {
        let len = self.channel(channel)?.history.len();
        if idx_start > idx_end || idx_end >= len {
            return None;
        }
        let highlight = Highlight {
            channel: channel.to_string(),
            idx_start,
            idx_end,
            reason,
            ts: now_ms(),
        };
        self.highlights.push(highlight.clone());
        Some(highlight)
    }

    pub fn pointer(&self, channel: &str) -> Option<FlowPointer> {
        self.flow.get(channel).copied()
    }

    pub fn set_pointer(&mut self, channel: &str, pointer: FlowPointer) {
        self.flow.insert(channel.to_string(), pointer);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            started: self.started,
            locked: self.locked.clone(),
            channels: self.channels.clone(),
        }
    }

    pub fn detail(&self) -> SessionDetail {
        SessionDetail {
            snapshot: self.snapshot(),
            meta: self.meta.clone(),
            results: self.results.clone(),
        }
    }
}

/// A session and its broadcast room.
pub struct SessionHandle {
    id: Uuid,
    scenario: Arc<CompiledScenario>,
    record: Mutex<SessionRecord>,
    events: broadcast::Sender<SessionEvent>,
    last_activity_ms: AtomicI64,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn scenario(&self) -> &Arc<CompiledScenario> {
        &self.scenario
    }

    /// Acquire the single-writer lock and mark the session active.
    pub async fn lock(&self) -> MutexGuard<'_, SessionRecord> {
        let guard = self.record.lock().await;
        self.touch();
        guard
    }

    pub fn events(&self) -> &broadcast::Sender<SessionEvent> {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn last_activity_ms(&self) -> i64 {
        self.last_activity_ms.load(Ordering::Relaxed)
    }

    fn touch(&self) {
        self.last_activity_ms.store(now_ms(), Ordering::Relaxed);
    }
}

/// Registry of live sessions.
pub struct SessionStore {
    sessions: DashMap<Uuid, Arc<SessionHandle>>,
    event_capacity: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(256)
    }
}

impl SessionStore {
    pub fn new(event_capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            event_capacity: event_capacity.max(1),
        }
    }

    /// Build a session from a compiled scenario. It starts unstarted.
    pub fn create(&self, scenario: Arc<CompiledScenario>, meta: SessionMeta) -> Arc<SessionHandle> {
        let id = Uuid::new_v4();
        let record = SessionRecord::new(id, &scenario, meta);
        let (events, _) = broadcast::channel(self.event_capacity);
        let handle = Arc::new(SessionHandle {
            id,
            scenario,
            record: Mutex::new(record),
            events,
            last_activity_ms: AtomicI64::new(now_ms()),
        });
        self.sessions.insert(id, handle.clone());
        handle
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<SessionHandle>> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop sessions idle since before `cutoff_ms`. Returns removed ids.
    pub fn evict_idle_before(&self, cutoff_ms: i64) -> Vec<Uuid> {
        let stale: Vec<Uuid> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().last_activity_ms() < cutoff_ms)
            .map(|entry| *entry.key())
            .collect();
        for id in &stale {
            self.sessions.remove(id);
        }
        stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Strictness;
    use parley_types::Scenario;
    use serde_json::json;

    fn compiled() -> Arc<CompiledScenario> {
        let scenario: Scenario = serde_json::from_value(json!({
            "channels": [
                { "name": "ops", "topic": "Incident", "seed": [{ "sender": "system", "text": "Welcome" }] },
                { "name": "random" }
            ],
            "script": {
                "ops": [{ "id": "S0", "say": [], "conversationFlow": { "type": "ababab" } }]
            }
        }))
        .unwrap();
        Arc::new(CompiledScenario::compile(scenario, Strictness::Strict).unwrap())
    }

    #[tokio::test]
    async fn test_create_builds_channels() {
        let store = SessionStore::default();
        let handle = store.create(compiled(), SessionMeta::default());
        let record = handle.lock().await;

        assert!(!record.started);
        assert_eq!(record.channels.len(), 2);
        assert_eq!(record.channels[0].topic, "Incident");
        assert_eq!(record.channels[0].history[0].text, "Welcome");
        assert!(record.channels[0].conversation_flow.as_ref().unwrap().is_client_paced());
        assert!(record.channels[1].conversation_flow.is_none());
        assert!(record.pointer("ops").is_none());
    }

    #[tokio::test]
    async fn test_ids_are_unique_and_resolvable() {
        let store = SessionStore::default();
        let a = store.create(compiled(), SessionMeta::default());
        let b = store.create(compiled(), SessionMeta::default());
        assert_ne!(a.id(), b.id());
        assert!(store.get(a.id()).is_some());
        assert!(store.get(Uuid::new_v4()).is_none());
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_add_message_unknown_channel_is_noop() {
        let store = SessionStore::default();
        let handle = store.create(compiled(), SessionMeta::default());
        let mut record = handle.lock().await;
        assert!(record.add_message("nope", "candidate", "hi").is_none());
        assert_eq!(record.channels.iter().map(|c| c.history.len()).sum::<usize>(), 1);
    }

    #[tokio::test]
    async fn test_timestamps_never_decrease() {
        let store = SessionStore::default();
        let handle = store.create(compiled(), SessionMeta::default());
        let mut record = handle.lock().await;

        record.add_message_at("random", "candidate", "first", 5_000).unwrap();
        let second = record.add_message_at("random", "candidate", "second", 4_000).unwrap();
        assert_eq!(second.ts, 5_000);

        let history = &record.channel("random").unwrap().history;
        assert!(history.windows(2).all(|w| w[0].ts <= w[1].ts));
    }

    #[tokio::test]
    async fn test_lock_is_idempotent() {
        let store = SessionStore::default();
        let handle = store.create(compiled(), SessionMeta::default());
        let mut record = handle.lock().await;

        assert!(record.lock_channel("ops"));
        assert!(!record.lock_channel("ops"));
        assert!(!record.lock_channel("nope"));
        assert_eq!(record.locked.len(), 1);
        assert!(record.is_locked("ops"));
    }

    #[tokio::test]
    async fn test_highlight_bounds() {
        let store = SessionStore::default();
        let handle = store.create(compiled(), SessionMeta::default());
        let mut record = handle.lock().await;

        assert!(record.add_highlight("ops", 0, 0, "good call".into()).is_some());
        assert!(record.add_highlight("ops", 0, 1, "out of range".into()).is_none());
        assert!(record.add_highlight("ops", 1, 0, "reversed".into()).is_none());
        assert!(record.add_highlight("nope", 0, 0, "unknown".into()).is_none());
        assert_eq!(record.highlights.len(), 1);
    }

    #[tokio::test]
    async fn test_evict_idle() {
        let store = SessionStore::default();
        let handle = store.create(compiled(), SessionMeta::default());
        let id = handle.id();

        assert!(store.evict_idle_before(handle.last_activity_ms()).is_empty());
        assert_eq!(store.evict_idle_before(handle.last_activity_ms() + 1), vec![id]);
        assert!(store.get(id).is_none());
    }
}
