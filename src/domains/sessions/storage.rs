use super::entity::{epoch_ms, DurableSessionRecord, LiveSession};
use crate::domains::agents::resolver::ResolvedIdentity;
use crate::domains::terminal::HandleId;
use crate::infrastructure::store::DurableStore;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

/// Workspace-scoped slot holding the serialized session array.
pub const SESSIONS_KEY: &str = "sessions";

/// Crash-safety net; every mutation also writes synchronously.
pub const PERSIST_INTERVAL: Duration = Duration::from_secs(30);

/// Loads the last durable snapshot. A missing or undecodable slot is an
/// empty history, never an error.
pub async fn load_records(store: &dyn DurableStore) -> Vec<DurableSessionRecord> {
    let Some(value) = store.get(SESSIONS_KEY).await else {
        return Vec::new();
    };
    match serde_json::from_value(value) {
        Ok(records) => records,
        Err(e) => {
            warn!("Discarding undecodable session snapshot: {e}");
            Vec::new()
        }
    }
}

/// Builds the full durable snapshot: every live session serialized with the
/// handle's current name as `terminal_name`, plus pending records not
/// already represented. Output order is deterministic so back-to-back
/// writes differ only in `last_seen_at`.
pub fn build_snapshot(
    live: &[(HandleId, LiveSession)],
    handle_names: &HashMap<HandleId, String>,
    activity: &HashMap<String, DateTime<Utc>>,
    pending: &[DurableSessionRecord],
    now_ms: i64,
) -> Vec<DurableSessionRecord> {
    let mut records: Vec<DurableSessionRecord> = Vec::with_capacity(live.len() + pending.len());

    for (handle, session) in live {
        let terminal_name = handle_names
            .get(handle)
            .cloned()
            .unwrap_or_else(|| session.display_name.clone());
        let last_activity_at = activity.get(&session.id).map(|ts| epoch_ms(*ts));
        records.push(session.to_durable(terminal_name, now_ms, last_activity_at));
    }

    let represented: HashSet<String> = records.iter().map(|r| r.id.clone()).collect();
    for record in pending {
        if !represented.contains(&record.id) {
            records.push(record.clone());
        }
    }

    records.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    records
}

/// Decides which live sessions may adopt a resolved external identity.
///
/// A candidate is rejected when its reported creation time predates the live
/// session (it belongs to an older conversation in the same directory) or
/// when another live session already claims the same external id.
pub fn select_identity_claims(
    sessions: &[(HandleId, LiveSession)],
    resolved: &HashMap<PathBuf, ResolvedIdentity>,
) -> Vec<(HandleId, String)> {
    let mut claimed: HashSet<String> = sessions
        .iter()
        .filter_map(|(_, s)| s.agent_session_id.clone())
        .collect();

    let mut ordered: Vec<&(HandleId, LiveSession)> = sessions.iter().collect();
    ordered.sort_by(|(_, a), (_, b)| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut claims = Vec::new();
    for (handle, session) in ordered {
        if session.agent_session_id.is_some() {
            continue;
        }
        let Some(dir) = &session.working_directory else {
            continue;
        };
        let Some(identity) = resolved.get(dir) else {
            continue;
        };
        if identity.created_at < session.created_at {
            debug!(
                "Identity '{}' predates session {}; not adopted",
                identity.session_id, session.id
            );
            continue;
        }
        if claimed.contains(&identity.session_id) {
            warn!(
                "Identity '{}' already claimed; session {} keeps none",
                identity.session_id, session.id
            );
            continue;
        }
        claimed.insert(identity.session_id.clone());
        claims.push((handle.clone(), identity.session_id.clone()));
    }
    claims
}
