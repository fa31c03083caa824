//! Per-call session state machine and the registry that owns sessions.

mod error;
mod events;
mod registry;
#[allow(clippy::module_inception)]
mod session;

pub use error::{SessionError, SessionResult};
pub use events::{ConversationStats, EndReason, EventBus, SessionEvent};
pub use registry::SessionRegistry;
pub use session::{
    CallProfile, Session, SessionInfo, SessionKey, SessionSettings, SessionState, SessionStatus,
};
