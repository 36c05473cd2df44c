use serde::{Deserialize, Serialize};
use std::path::Path;

/// Opaque reference to a live terminal owned by the host. Handle identity
/// does NOT survive a host restart; reconciliation re-pairs by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleId(pub String);

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleDescriptor {
    pub id: HandleId,
    pub name: String,
}

/// Host terminal subsystem the core drives. Failures of the underlying
/// process layer are surfaced by the host itself, not through this seam,
/// so creation and writes are modeled as ambient effects.
#[async_trait::async_trait]
pub trait TerminalHost: Send + Sync {
    async fn create(&self, name: &str, cwd: Option<&Path>) -> HandleId;
    async fn send_text(&self, id: &HandleId, text: &str);
    async fn show(&self, id: &HandleId);
    async fn dispose(&self, id: &HandleId);
    /// All currently live handles, in the host's enumeration order.
    async fn live_handles(&self) -> Vec<HandleDescriptor>;
    /// Current display name of a handle, if it is still live.
    async fn handle_name(&self, id: &HandleId) -> Option<String>;
    /// Whether a shell command is currently executing on the handle.
    async fn is_shell_busy(&self, id: &HandleId) -> bool;
}

#[cfg(test)]
pub mod testing {
    use super::{HandleDescriptor, HandleId, TerminalHost};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct ScriptedTerminal {
        name: String,
        cwd: Option<PathBuf>,
        sent: Vec<String>,
        busy: bool,
        shown: u32,
    }

    /// In-memory host: records every interaction and lets tests inject
    /// "pre-existing" handles the way a restarted host would.
    #[derive(Default)]
    pub struct ScriptedHost {
        next: AtomicU64,
        terminals: Mutex<Vec<(HandleId, ScriptedTerminal)>>,
    }

    impl ScriptedHost {
        pub fn new() -> Self {
            Self::default()
        }

        fn allocate(&self, name: &str, cwd: Option<PathBuf>) -> HandleId {
            let id = HandleId(format!("term-{}", self.next.fetch_add(1, Ordering::SeqCst) + 1));
            self.terminals.lock().unwrap().push((
                id.clone(),
                ScriptedTerminal {
                    name: name.to_string(),
                    cwd,
                    sent: Vec::new(),
                    busy: false,
                    shown: 0,
                },
            ));
            id
        }

        /// Simulates a handle the host restored on its own, e.g. after an
        /// application restart.
        pub fn preexisting(&self, name: &str) -> HandleId {
            self.allocate(name, None)
        }

        pub fn sent_text(&self, id: &HandleId) -> Vec<String> {
            self.terminals
                .lock()
                .unwrap()
                .iter()
                .find(|(tid, _)| tid == id)
                .map(|(_, t)| t.sent.clone())
                .unwrap_or_default()
        }

        pub fn cwd_of(&self, id: &HandleId) -> Option<PathBuf> {
            self.terminals
                .lock()
                .unwrap()
                .iter()
                .find(|(tid, _)| tid == id)
                .and_then(|(_, t)| t.cwd.clone())
        }

        pub fn shown_count(&self, id: &HandleId) -> u32 {
            self.terminals
                .lock()
                .unwrap()
                .iter()
                .find(|(tid, _)| tid == id)
                .map(|(_, t)| t.shown)
                .unwrap_or(0)
        }

        pub fn set_busy(&self, id: &HandleId, busy: bool) {
            if let Some((_, t)) = self
                .terminals
                .lock()
                .unwrap()
                .iter_mut()
                .find(|(tid, _)| tid == id)
            {
                t.busy = busy;
            }
        }

        pub fn rename_handle(&self, id: &HandleId, name: &str) {
            if let Some((_, t)) = self
                .terminals
                .lock()
                .unwrap()
                .iter_mut()
                .find(|(tid, _)| tid == id)
            {
                t.name = name.to_string();
            }
        }
    }

    #[async_trait::async_trait]
    impl TerminalHost for ScriptedHost {
        async fn create(&self, name: &str, cwd: Option<&Path>) -> HandleId {
            self.allocate(name, cwd.map(Path::to_path_buf))
        }

        async fn send_text(&self, id: &HandleId, text: &str) {
            if let Some((_, t)) = self
                .terminals
                .lock()
                .unwrap()
                .iter_mut()
                .find(|(tid, _)| tid == id)
            {
                t.sent.push(text.to_string());
            }
        }

        async fn show(&self, id: &HandleId) {
            if let Some((_, t)) = self
                .terminals
                .lock()
                .unwrap()
                .iter_mut()
                .find(|(tid, _)| tid == id)
            {
                t.shown += 1;
            }
        }

        async fn dispose(&self, id: &HandleId) {
            self.terminals.lock().unwrap().retain(|(tid, _)| tid != id);
        }

        async fn live_handles(&self) -> Vec<HandleDescriptor> {
            self.terminals
                .lock()
                .unwrap()
                .iter()
                .map(|(id, t)| HandleDescriptor {
                    id: id.clone(),
                    name: t.name.clone(),
                })
                .collect()
        }

        async fn handle_name(&self, id: &HandleId) -> Option<String> {
            self.terminals
                .lock()
                .unwrap()
                .iter()
                .find(|(tid, _)| tid == id)
                .map(|(_, t)| t.name.clone())
        }

        async fn is_shell_busy(&self, id: &HandleId) -> bool {
            self.terminals
                .lock()
                .unwrap()
                .iter()
                .find(|(tid, _)| tid == id)
                .map(|(_, t)| t.busy)
                .unwrap_or(false)
        }
    }
}
