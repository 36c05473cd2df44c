use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::str::FromStr;

/// Tracked metadata for one live terminal handle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveSession {
    pub id: String,
    // Stable key used by external label storage; survives renames.
    pub label_key: String,
    pub display_name: String,
    // Name at creation time, before any rename.
    pub original_name: String,
    pub agent_id: String,
    pub agent_name: String,
    pub agent_icon: String,
    pub index: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
    // Durable fields this build does not know about ride along so a
    // claim-then-rewrite cycle never drops them.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Persisted, restart-surviving description of a session.
///
/// `terminal_name` is the handle's display name at last observation and the
/// strongest reconciliation signal after restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DurableSessionRecord {
    pub id: String,
    pub label_key: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    pub agent_id: String,
    pub agent_name: String,
    pub agent_icon: String,
    pub index: u32,
    pub created_at: DateTime<Utc>,
    pub terminal_name: String,
    // Epoch milliseconds of the last successful persistence.
    #[serde(default)]
    pub last_seen_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity_at: Option<i64>,
    // Reconciliation cycles survived without a matching handle.
    #[serde(default)]
    pub reboot_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Active,
    Inactive,
    Orphaned,
}

impl SessionState {
    pub fn as_str(&self) -> &str {
        match self {
            SessionState::Active => "active",
            SessionState::Inactive => "inactive",
            SessionState::Orphaned => "orphaned",
        }
    }
}

impl FromStr for SessionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SessionState::Active),
            "inactive" => Ok(SessionState::Inactive),
            "orphaned" => Ok(SessionState::Orphaned),
            _ => Err(format!("Invalid session state: {s}")),
        }
    }
}

pub fn epoch_ms(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

impl LiveSession {
    /// Explicit durable → live conversion used when a record is claimed.
    /// `created_at` is restored from the record, never reset to "now".
    pub fn from_durable(record: &DurableSessionRecord) -> Self {
        Self {
            id: record.id.clone(),
            label_key: record.label_key.clone(),
            display_name: record.display_name.clone(),
            original_name: record
                .original_name
                .clone()
                .unwrap_or_else(|| record.display_name.clone()),
            agent_id: record.agent_id.clone(),
            agent_name: record.agent_name.clone(),
            agent_icon: record.agent_icon.clone(),
            index: record.index,
            created_at: record.created_at,
            agent_session_id: record.agent_session_id.clone(),
            launch_command: record.launch_command.clone(),
            working_directory: record.working_directory.clone(),
            extra: record.extra.clone(),
        }
    }

    pub fn to_durable(
        &self,
        terminal_name: String,
        last_seen_at: i64,
        last_activity_at: Option<i64>,
    ) -> DurableSessionRecord {
        DurableSessionRecord {
            id: self.id.clone(),
            label_key: self.label_key.clone(),
            display_name: self.display_name.clone(),
            original_name: Some(self.original_name.clone()),
            agent_id: self.agent_id.clone(),
            agent_name: self.agent_name.clone(),
            agent_icon: self.agent_icon.clone(),
            index: self.index,
            created_at: self.created_at,
            terminal_name,
            last_seen_at,
            last_activity_at,
            reboot_count: 0,
            agent_session_id: self.agent_session_id.clone(),
            launch_command: self.launch_command.clone(),
            working_directory: self.working_directory.clone(),
            extra: self.extra.clone(),
        }
    }
}
