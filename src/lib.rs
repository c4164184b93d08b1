//! RemoteDeck - remote session manager over SSH/SFTP
//!
//! One worker task owns each session and runs its operations in submission
//! order; outcomes come back as an ordered stream of typed events.

pub mod commands;
pub mod config;
pub mod router;
pub mod session;
pub mod sftp;
pub mod ssh;

pub use router::{
    spawn_session_worker, DispatcherOptions, Event, EventEnvelope, EventStream, Operation,
    OperationOutput, OperationTicket, SessionController, SessionManager,
};
pub use session::{ErrorKind, Session, SessionError, SessionState};
pub use ssh::{AuthMethod, ConnectConfig, HostKeyPolicy, KnownHostsStore, RusshTransport};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging.
///
/// `RUST_LOG` wins over `default_filter`; output goes to stderr so it does
/// not interleave with rendered events on stdout.
pub fn init_logging(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_filter))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
