pub mod domains;
pub mod infrastructure;

pub use domains::agents::resolver::{
    IdentityResolver, JournalIdentityResolver, NullResolver, ResolvedIdentity,
};
pub use domains::agents::AgentConfig;
pub use domains::sessions::{
    DurableSessionRecord, LiveSession, SessionManager, SessionState,
};
pub use domains::terminal::{HandleDescriptor, HandleId, TerminalHost};
pub use infrastructure::events::{EventSink, SessionEvent, SessionEventKind};
pub use infrastructure::store::{DurableStore, FileDurableStore, MemoryDurableStore};
