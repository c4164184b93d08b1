//! Operation routing
//!
//! Submitted operations flow to the one worker that owns a session, and its
//! results flow back as an ordered stream of typed events.

mod dispatcher;
mod manager;
mod relay;
mod types;

pub use dispatcher::{
    spawn_session_worker, DispatcherOptions, OperationTicket, SessionController, SessionStatus,
    DEFAULT_QUEUE_CAPACITY,
};
pub use manager::SessionManager;
pub use relay::{event_relay, EventRelay, EventStream};
pub use types::*;
