use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// External session identity reported by an agent CLI for one working
/// directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIdentity {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

/// Discovers agent-reported session identifiers. The core consumes this
/// opportunistically before persistence; resolution failure is never an
/// error, just an empty map.
#[async_trait::async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve_all(&self, dirs: &[PathBuf]) -> HashMap<PathBuf, ResolvedIdentity>;
}

/// Resolver that never finds anything. For hosts whose agent CLI keeps no
/// local journal.
pub struct NullResolver;

#[async_trait::async_trait]
impl IdentityResolver for NullResolver {
    async fn resolve_all(&self, _dirs: &[PathBuf]) -> HashMap<PathBuf, ResolvedIdentity> {
        HashMap::new()
    }
}

/// Resolves identities from the agent CLI's on-disk session journals.
///
/// Agent CLIs keep one journal file per conversation under a per-project
/// directory named after the sanitized working directory path. The newest
/// `.jsonl` file's stem is the external session id.
pub struct JournalIdentityResolver {
    journal_root: PathBuf,
}

impl JournalIdentityResolver {
    pub fn new(journal_root: PathBuf) -> Self {
        Self { journal_root }
    }

    /// Conventional root under the user's home directory, e.g.
    /// `~/.alpha/projects`.
    pub fn for_agent_dir(dir_name: &str) -> Option<Self> {
        let home = std::env::var("HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(dirs::home_dir)?;
        Some(Self::new(home.join(dir_name).join("projects")))
    }

    fn project_dir(&self, cwd: &Path) -> PathBuf {
        self.journal_root.join(sanitize_project_path(cwd))
    }

    fn newest_journal(&self, cwd: &Path) -> Option<ResolvedIdentity> {
        let project_dir = self.project_dir(cwd);
        let entries = fs::read_dir(&project_dir).ok()?;

        let mut newest: Option<(std::time::SystemTime, String)> = None;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map(|ext| ext == "jsonl") != Some(true) {
                continue;
            }
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
                continue;
            };
            match &newest {
                Some((best, _)) if *best >= modified => {}
                _ => newest = Some((modified, stem)),
            }
        }

        let (modified, session_id) = newest?;
        log::debug!(
            "Identity resolver: journal '{session_id}' found for {}",
            cwd.display()
        );
        Some(ResolvedIdentity {
            session_id,
            created_at: DateTime::<Utc>::from(modified),
        })
    }
}

#[async_trait::async_trait]
impl IdentityResolver for JournalIdentityResolver {
    async fn resolve_all(&self, dirs: &[PathBuf]) -> HashMap<PathBuf, ResolvedIdentity> {
        let mut resolved = HashMap::new();
        for dir in dirs {
            if let Some(identity) = self.newest_journal(dir) {
                resolved.insert(dir.clone(), identity);
            }
        }
        resolved
    }
}

fn sanitize_project_path(path: &Path) -> String {
    path.to_string_lossy().replace(['/', '.', '_'], "-")
}
