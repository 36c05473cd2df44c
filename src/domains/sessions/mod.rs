pub mod activity;
pub mod entity;
pub mod orphans;
pub mod reconcile;
pub mod service;
pub mod storage;


pub use entity::{DurableSessionRecord, LiveSession, SessionState};
pub use orphans::ORPHAN_EVICTION_REBOOTS;
pub use service::{SessionManager, MATCH_DEBOUNCE};
