use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SessionEventKind {
    SessionAdded,
    SessionRenamed,
    SessionRemoved,
    SessionReclaimed,
    OrphansUpdated,
}

impl SessionEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionEventKind::SessionAdded => "ankerwerk:session-added",
            SessionEventKind::SessionRenamed => "ankerwerk:session-renamed",
            SessionEventKind::SessionRemoved => "ankerwerk:session-removed",
            SessionEventKind::SessionReclaimed => "ankerwerk:session-reclaimed",
            SessionEventKind::OrphansUpdated => "ankerwerk:orphans-updated",
        }
    }
}

/// Change notification. Emitted strictly after the mutation and its
/// persistence write, so observers that re-read on notification always see
/// the latest state.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub session_id: Option<String>,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &SessionEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionToken(u64);

/// Synchronous observer list. Subscribers receive events on the emitting
/// task; heavy observers should hand off to their own channel.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_token: AtomicU64,
    sinks: RwLock<Vec<(u64, Arc<dyn EventSink>)>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, sink: Arc<dyn EventSink>) -> SubscriptionToken {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut sinks) = self.sinks.write() {
            sinks.push((token, sink));
        }
        SubscriptionToken(token)
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) {
        if let Ok(mut sinks) = self.sinks.write() {
            sinks.retain(|(t, _)| *t != token.0);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut sinks) = self.sinks.write() {
            sinks.clear();
        }
    }

    pub fn emit(&self, event: &SessionEvent) {
        let sinks: Vec<Arc<dyn EventSink>> = match self.sinks.read() {
            Ok(guard) => guard.iter().map(|(_, s)| Arc::clone(s)).collect(),
            Err(_) => return,
        };
        for sink in sinks {
            sink.emit(event);
        }
    }
}
