use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Workspace-scoped durable key-value slot. Writes are fire-and-forget from
/// the core's perspective: a failed write is logged by the caller and the
/// next timer tick or mutation writes again.
#[async_trait::async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;
    async fn update(&self, key: &str, value: Value) -> Result<(), String>;
}

/// Single JSON document on disk, one top-level entry per key.
pub struct FileDurableStore {
    path: PathBuf,
    // Serializes read-modify-write cycles on the document.
    write_lock: Mutex<()>,
}

impl FileDurableStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    fn read_document(&self) -> serde_json::Map<String, Value> {
        let Ok(contents) = fs::read_to_string(&self.path) else {
            return serde_json::Map::new();
        };
        serde_json::from_str(&contents).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl DurableStore for FileDurableStore {
    async fn get(&self, key: &str) -> Option<Value> {
        self.read_document().get(key).cloned()
    }

    async fn update(&self, key: &str, value: Value) -> Result<(), String> {
        let _guard = self.write_lock.lock().await;

        let mut document = self.read_document();
        document.insert(key.to_string(), value);

        let contents = serde_json::to_string_pretty(&document)
            .map_err(|e| format!("Failed to serialize store document: {e}"))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create store directory: {e}"))?;
        }
        fs::write(&self.path, contents)
            .map_err(|e| format!("Failed to write store file {:?}: {e}", self.path))
    }
}

/// In-memory store for tests and embedders that bring their own durability.
#[derive(Default)]
pub struct MemoryDurableStore {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DurableStore for MemoryDurableStore {
    async fn get(&self, key: &str) -> Option<Value> {
        self.entries.lock().await.get(key).cloned()
    }

    async fn update(&self, key: &str, value: Value) -> Result<(), String> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }
}
