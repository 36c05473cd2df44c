use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod resolver;

/// A configured agent profile on whose behalf sessions are launched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub launch_command: String,
    pub working_directory: Option<PathBuf>,
}

/// Generated name for a new session when no custom name is given.
pub fn session_display_name(agent: &AgentConfig, index: u32) -> String {
    format!("{} {} #{}", agent.icon, agent.name, index)
}

/// Command sent to a relaunched terminal. When the agent CLI reported a
/// session id before the restart, a resume directive is appended so the
/// agent reattaches to its conversation instead of starting fresh.
pub fn build_relaunch_command(
    launch_command: Option<&str>,
    agent_session_id: Option<&str>,
) -> Option<String> {
    let base = launch_command?;
    match agent_session_id {
        Some(session) => {
            log::info!("Relaunch command builder: resuming agent session '{session}'");
            Some(format!("{base} --resume {session}"))
        }
        None => Some(base.to_string()),
    }
}
