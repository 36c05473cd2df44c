use super::activity;
use super::entity::{epoch_ms, DurableSessionRecord, LiveSession, SessionState};
use super::orphans::{self, OrphanTracker};
use super::reconcile;
use super::storage;
use crate::domains::agents::resolver::IdentityResolver;
use crate::domains::agents::{self, AgentConfig};
use crate::domains::terminal::{HandleDescriptor, HandleId, TerminalHost};
use crate::infrastructure::events::{
    EventSink, SessionEvent, SessionEventKind, SubscriberRegistry, SubscriptionToken,
};
use crate::infrastructure::store::DurableStore;
use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Coalesces bursts of near-simultaneous handle arrivals into one matching
/// pass.
pub const MATCH_DEBOUNCE: Duration = Duration::from_millis(200);

/// Owns every tracked session: the live registry, the pending/orphan set,
/// per-agent index counters and activity timestamps. All host interaction
/// goes through the injected collaborators; observers only ever see cloned
/// snapshots.
pub struct SessionManager {
    host: Arc<dyn TerminalHost>,
    store: Arc<dyn DurableStore>,
    resolver: Arc<dyn IdentityResolver>,
    live: Arc<RwLock<HashMap<HandleId, LiveSession>>>,
    counters: Arc<RwLock<HashMap<String, u32>>>,
    orphans: Arc<RwLock<OrphanTracker>>,
    activity: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
    subscribers: Arc<SubscriberRegistry>,
    // Debounce version counter; a bump invalidates scheduled passes.
    match_epoch: Arc<AtomicU64>,
    persist_task: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    // Handed to background tasks; they stop once the manager is dropped.
    weak_self: Weak<SessionManager>,
}

impl SessionManager {
    pub fn new(
        host: Arc<dyn TerminalHost>,
        store: Arc<dyn DurableStore>,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            host,
            store,
            resolver,
            live: Arc::new(RwLock::new(HashMap::new())),
            counters: Arc::new(RwLock::new(HashMap::new())),
            orphans: Arc::new(RwLock::new(OrphanTracker::new())),
            activity: Arc::new(RwLock::new(HashMap::new())),
            subscribers: Arc::new(SubscriberRegistry::new()),
            match_epoch: Arc::new(AtomicU64::new(0)),
            persist_task: std::sync::Mutex::new(None),
            weak_self: weak.clone(),
        })
    }

    /// Loads the last durable snapshot, ages it, attempts immediate
    /// reconciliation against already-live handles and starts the
    /// crash-safety persistence timer.
    pub async fn activate(&self) {
        let snapshot = storage::load_records(self.store.as_ref()).await;
        let loaded = snapshot.len();
        let survivors = orphans::age_snapshot(snapshot, epoch_ms(Utc::now()));
        info!(
            "Activated with {loaded} persisted session(s), {} pending after aging",
            survivors.len()
        );

        // Pending records keep their index reserved until claimed, dismissed
        // or evicted.
        for record in &survivors {
            self.raise_counter(&record.agent_id, record.index).await;
        }
        self.orphans.write().await.replace(survivors);

        let reclaimed = self.reconcile_now().await;
        self.persist().await;
        for id in reclaimed {
            self.notify(SessionEventKind::SessionReclaimed, Some(id));
        }
        self.notify(SessionEventKind::OrphansUpdated, None);

        let Some(manager) = self.weak_self.upgrade() else {
            return;
        };
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(storage::PERSIST_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manager.persist().await;
            }
        });
        *self.persist_task.lock().unwrap() = Some(task);
    }

    /// Cancels timers, invalidates scheduled matching passes and drops all
    /// subscriptions.
    pub fn shutdown(&self) {
        self.match_epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.persist_task.lock().unwrap().take() {
            task.abort();
        }
        self.subscribers.clear();
    }

    // ---- registry operations ----

    pub async fn launch(&self, agent: &AgentConfig, custom_name: Option<&str>) -> HandleId {
        let index = {
            let mut counters = self.counters.write().await;
            let entry = counters.entry(agent.id.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        let display_name = custom_name
            .map(str::to_string)
            .unwrap_or_else(|| agents::session_display_name(agent, index));

        let handle = self
            .host
            .create(&display_name, agent.working_directory.as_deref())
            .await;
        self.host.send_text(&handle, &agent.launch_command).await;

        let session = LiveSession {
            id: Uuid::new_v4().to_string(),
            label_key: format!("{}:{index}", agent.id),
            display_name: display_name.clone(),
            original_name: display_name,
            agent_id: agent.id.clone(),
            agent_name: agent.name.clone(),
            agent_icon: agent.icon.clone(),
            index,
            created_at: Utc::now(),
            agent_session_id: None,
            launch_command: Some(agent.launch_command.clone()),
            working_directory: agent.working_directory.clone(),
            extra: serde_json::Map::new(),
        };
        let id = session.id.clone();
        info!(
            "Launched session {id} ('{}') for agent {} in handle {handle}",
            session.display_name, agent.id
        );
        self.live.write().await.insert(handle.clone(), session);

        self.persist().await;
        self.notify(SessionEventKind::SessionAdded, Some(id));
        handle
    }

    /// Mutates the display name only; id, index and original name are
    /// untouched. Untracked handles are silently ignored.
    pub async fn rename(&self, handle: &HandleId, new_display_name: &str) {
        let session_id = {
            let mut live = self.live.write().await;
            match live.get_mut(handle) {
                Some(session) if session.display_name != new_display_name => {
                    session.display_name = new_display_name.to_string();
                    Some(session.id.clone())
                }
                _ => None,
            }
        };
        let Some(id) = session_id else {
            return;
        };
        self.persist().await;
        self.notify(SessionEventKind::SessionRenamed, Some(id));
    }

    pub async fn focus(&self, handle: &HandleId) {
        self.host.show(handle).await;
    }

    pub async fn close(&self, handle: &HandleId) {
        self.host.dispose(handle).await;
        self.remove(handle).await;
    }

    /// Invoked when the host reports the handle closed. Idempotent; a closed
    /// session is dropped from the next snapshot, never moved to pending.
    pub async fn remove(&self, handle: &HandleId) {
        let removed = self.live.write().await.remove(handle);
        let Some(session) = removed else {
            return;
        };
        self.activity.write().await.remove(&session.id);
        info!("Session {} closed (handle {handle})", session.id);
        self.persist().await;
        self.notify(SessionEventKind::SessionRemoved, Some(session.id));
    }

    pub async fn sessions(&self) -> Vec<LiveSession> {
        let mut sessions: Vec<LiveSession> = self.live.read().await.values().cloned().collect();
        sessions.sort_by(|a, b| a.agent_id.cmp(&b.agent_id).then(a.index.cmp(&b.index)));
        sessions
    }

    pub async fn sessions_for_agent(&self, agent_id: &str) -> Vec<LiveSession> {
        let mut sessions: Vec<LiveSession> = self
            .live
            .read()
            .await
            .values()
            .filter(|s| s.agent_id == agent_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.index);
        sessions
    }

    pub async fn session_for_handle(&self, handle: &HandleId) -> Option<LiveSession> {
        self.live.read().await.get(handle).cloned()
    }

    // ---- host lifecycle notifications ----

    /// A new live handle appeared. Matching is debounced so a burst of
    /// restored terminals triggers a single pass.
    pub fn handle_opened(&self, handle: &HandleId) {
        debug!("Handle {handle} opened; scheduling reconciliation");
        let epoch = self.match_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let Some(manager) = self.weak_self.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            tokio::time::sleep(MATCH_DEBOUNCE).await;
            if manager.match_epoch.load(Ordering::SeqCst) != epoch {
                return;
            }
            let reclaimed = manager.reconcile_now().await;
            if reclaimed.is_empty() {
                return;
            }
            manager.persist().await;
            for id in reclaimed {
                manager.notify(SessionEventKind::SessionReclaimed, Some(id));
            }
            manager.notify(SessionEventKind::OrphansUpdated, None);
        });
    }

    pub async fn handle_closed(&self, handle: &HandleId) {
        self.remove(handle).await;
    }

    pub async fn shell_started(&self, handle: &HandleId) {
        self.touch_activity(handle).await;
    }

    pub async fn shell_ended(&self, handle: &HandleId) {
        self.touch_activity(handle).await;
    }

    async fn touch_activity(&self, handle: &HandleId) {
        let session_id = self.live.read().await.get(handle).map(|s| s.id.clone());
        if let Some(id) = session_id {
            self.activity.write().await.insert(id, Utc::now());
        }
    }

    // ---- orphan operations ----

    pub async fn orphaned(&self) -> Vec<DurableSessionRecord> {
        self.orphans.read().await.records_by_age()
    }

    /// Brings a pending record back: reconnects to a live handle when the
    /// matching rules find one, otherwise spawns a fresh terminal and
    /// re-sends the launch command with a resume directive when the agent's
    /// session id is known.
    pub async fn relaunch(&self, record_id: &str) -> Result<HandleId> {
        let record = self
            .orphans
            .write()
            .await
            .take(record_id)
            .ok_or_else(|| anyhow!("No pending session record with id {record_id}"))?;

        let unclaimed = self.unclaimed_handles().await;
        let handle = if let Some(found) = reconcile::match_single(&record, &unclaimed) {
            info!(
                "Relaunch of session {} reconnected to existing handle {found}",
                record.id
            );
            self.adopt_record(record, found.clone()).await;
            found
        } else {
            let handle = self
                .host
                .create(&record.display_name, record.working_directory.as_deref())
                .await;
            if let Some(command) = agents::build_relaunch_command(
                record.launch_command.as_deref(),
                record.agent_session_id.as_deref(),
            ) {
                self.host.send_text(&handle, &command).await;
            }
            let mut session = LiveSession::from_durable(&record);
            session.created_at = Utc::now();
            self.raise_counter(&session.agent_id, session.index).await;
            info!("Relaunched session {} in new handle {handle}", session.id);
            self.live.write().await.insert(handle.clone(), session);
            handle
        };

        self.persist().await;
        self.notify(SessionEventKind::SessionReclaimed, Some(record_id.to_string()));
        self.notify(SessionEventKind::OrphansUpdated, None);
        Ok(handle)
    }

    pub async fn relaunch_all(&self) -> Result<Vec<HandleId>> {
        let ids: Vec<String> = self
            .orphans
            .read()
            .await
            .records_by_age()
            .into_iter()
            .map(|r| r.id)
            .collect();
        let mut handles = Vec::with_capacity(ids.len());
        for id in ids {
            handles.push(self.relaunch(&id).await?);
        }
        Ok(handles)
    }

    /// Explicit user action; never automatic. Returns false for unknown ids.
    pub async fn dismiss(&self, record_id: &str) -> bool {
        if self.orphans.write().await.take(record_id).is_none() {
            return false;
        }
        info!("Dismissed session record {record_id}");
        self.persist().await;
        self.notify(SessionEventKind::OrphansUpdated, None);
        true
    }

    // ---- classification ----

    /// None for handles this registry does not track.
    pub async fn classify(&self, handle: &HandleId) -> Option<SessionState> {
        if !self.live.read().await.contains_key(handle) {
            return None;
        }
        Some(activity::classify_live(
            self.host.is_shell_busy(handle).await,
        ))
    }

    /// Orphaned applies to pending records only, queried by record id.
    pub async fn orphan_state(&self, record_id: &str) -> Option<SessionState> {
        self.orphans
            .read()
            .await
            .contains(record_id)
            .then_some(SessionState::Orphaned)
    }

    pub async fn describe_handle(&self, handle: &HandleId) -> Option<String> {
        let session_id = self.live.read().await.get(handle).map(|s| s.id.clone())?;
        let state = activity::classify_live(self.host.is_shell_busy(handle).await);
        let last = self.activity.read().await.get(&session_id).copied();
        Some(activity::describe(state, last, Utc::now()))
    }

    // ---- persistence ----

    /// Synchronous flush point for callers that read persisted state
    /// elsewhere, e.g. integration tests.
    pub async fn persist_now(&self) -> Result<()> {
        self.write_snapshot().await.map_err(|e| anyhow!(e))
    }

    async fn persist(&self) {
        // Eventually consistent: the next mutation or timer tick writes again.
        if let Err(e) = self.write_snapshot().await {
            warn!("Session persistence failed: {e}");
        }
    }

    async fn write_snapshot(&self) -> Result<(), String> {
        self.enrich_identities().await;

        let live: Vec<(HandleId, LiveSession)> = self
            .live
            .read()
            .await
            .iter()
            .map(|(h, s)| (h.clone(), s.clone()))
            .collect();
        let mut handle_names = HashMap::new();
        for (handle, _) in &live {
            if let Some(name) = self.host.handle_name(handle).await {
                handle_names.insert(handle.clone(), name);
            }
        }
        let activity = self.activity.read().await.clone();
        let pending = self.orphans.read().await.records_by_age();

        let records = storage::build_snapshot(
            &live,
            &handle_names,
            &activity,
            &pending,
            epoch_ms(Utc::now()),
        );
        let value = serde_json::to_value(&records)
            .map_err(|e| format!("Failed to serialize session snapshot: {e}"))?;
        self.store.update(storage::SESSIONS_KEY, value).await
    }

    async fn enrich_identities(&self) {
        let sessions: Vec<(HandleId, LiveSession)> = self
            .live
            .read()
            .await
            .iter()
            .map(|(h, s)| (h.clone(), s.clone()))
            .collect();
        let dirs: Vec<PathBuf> = sessions
            .iter()
            .filter(|(_, s)| s.agent_session_id.is_none())
            .filter_map(|(_, s)| s.working_directory.clone())
            .collect();
        if dirs.is_empty() {
            return;
        }
        let resolved = self.resolver.resolve_all(&dirs).await;
        if resolved.is_empty() {
            return;
        }
        let claims = storage::select_identity_claims(&sessions, &resolved);
        if claims.is_empty() {
            return;
        }
        let mut live = self.live.write().await;
        for (handle, session_id) in claims {
            if let Some(session) = live.get_mut(&handle) {
                debug!(
                    "Session {} adopted agent session id '{session_id}'",
                    session.id
                );
                session.agent_session_id = Some(session_id);
            }
        }
    }

    // ---- matching ----

    async fn unclaimed_handles(&self) -> Vec<HandleDescriptor> {
        let handles = self.host.live_handles().await;
        let live = self.live.read().await;
        handles
            .into_iter()
            .filter(|h| !live.contains_key(&h.id))
            .collect()
    }

    async fn reconcile_now(&self) -> Vec<String> {
        let unclaimed = self.unclaimed_handles().await;
        if unclaimed.is_empty() {
            return Vec::new();
        }
        let records = self.orphans.read().await.records_by_age();
        if records.is_empty() {
            return Vec::new();
        }

        let outcomes = reconcile::pair_records(&records, &unclaimed);
        let mut reclaimed = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            let Some(record) = self.orphans.write().await.take(&outcome.record_id) else {
                continue;
            };
            reclaimed.push(self.adopt_record(record, outcome.handle).await);
        }
        reclaimed
    }

    /// Folds a claimed record into the live registry. `created_at` comes
    /// from the record; the reboot counter does not carry over.
    async fn adopt_record(&self, record: DurableSessionRecord, handle: HandleId) -> String {
        let session = LiveSession::from_durable(&record);
        if let Some(ts_ms) = record.last_activity_at {
            if let Some(ts) = Utc.timestamp_millis_opt(ts_ms).single() {
                self.activity.write().await.insert(session.id.clone(), ts);
            }
        }
        self.raise_counter(&session.agent_id, session.index).await;
        let id = session.id.clone();
        info!("Session {id} reconnected to handle {handle}");
        self.live.write().await.insert(handle, session);
        id
    }

    async fn raise_counter(&self, agent_id: &str, index: u32) {
        let mut counters = self.counters.write().await;
        let entry = counters.entry(agent_id.to_string()).or_insert(0);
        if index > *entry {
            *entry = index;
        }
    }

    // ---- observers ----

    pub fn subscribe(&self, sink: Arc<dyn EventSink>) -> SubscriptionToken {
        self.subscribers.subscribe(sink)
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) {
        self.subscribers.unsubscribe(token)
    }

    fn notify(&self, kind: SessionEventKind, session_id: Option<String>) {
        self.subscribers.emit(&SessionEvent { kind, session_id });
    }
}
