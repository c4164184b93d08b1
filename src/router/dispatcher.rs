//! Session worker
//!
//! Implements the "single owner" pattern for a `Session`: one task owns it
//! and runs submitted operations strictly one at a time, in submission order.
//! Everything else talks to that task through a cloneable `SessionController`.
//!
//! # Usage
//!
//! ```ignore
//! let (controller, mut events) = spawn_session_worker(session, id, DispatcherOptions::default());
//!
//! let ticket = controller.connect(config)?;
//! controller.list_directory(None)?;
//! ticket.await?;
//!
//! while let Some(envelope) = events.recv().await { /* render */ }
//! ```

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::relay::{event_relay, EventRelay, EventStream};
use super::types::{Event, Operation, OperationOutput};
use crate::session::{Session, SessionError, SessionState};
use crate::ssh::ConnectConfig;

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Worker tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherOptions {
    /// Operations that may wait behind the running one
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Follow mutations and connects with a listing of the working directory
    #[serde(default = "default_auto_refresh")]
    pub auto_refresh: bool,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_auto_refresh() -> bool {
    true
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            auto_refresh: true,
        }
    }
}

/// Last known state of the session, published by the worker after each job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub cwd: String,
    pub target: Option<String>,
}

type Reply = oneshot::Sender<Result<OperationOutput, SessionError>>;

struct Job {
    id: u64,
    operation: Operation,
    reply: Reply,
}

enum WorkerCommand {
    Run(Job),
    Shutdown,
}

/// Flags shared by every controller clone and the worker
struct Shared {
    session_id: String,
    next_operation: AtomicU64,
    /// Disconnects submitted but not finished yet
    pending_disconnects: AtomicUsize,
    connect_pending: AtomicBool,
    status: RwLock<SessionStatus>,
}

impl Shared {
    fn disconnecting(&self) -> bool {
        self.pending_disconnects.load(Ordering::SeqCst) > 0
    }
}

/// Spawn the worker that owns `session`
pub fn spawn_session_worker(
    session: Session,
    session_id: impl Into<String>,
    options: DispatcherOptions,
) -> (SessionController, EventStream) {
    let session_id = session_id.into();
    let (cmd_tx, cmd_rx) = mpsc::channel(options.queue_capacity.max(1));
    let (relay, stream) = event_relay(session_id.clone());

    let shared = Arc::new(Shared {
        session_id: session_id.clone(),
        next_operation: AtomicU64::new(0),
        pending_disconnects: AtomicUsize::new(0),
        connect_pending: AtomicBool::new(false),
        status: RwLock::new(SessionStatus {
            state: session.state(),
            cwd: session.cwd().to_string(),
            target: None,
        }),
    });

    let worker = SessionWorker {
        session,
        relay,
        shared: shared.clone(),
        options,
        cmd_rx,
    };
    tokio::spawn(worker.run());

    info!("Session worker started for {}", session_id);
    (SessionController { cmd_tx, shared }, stream)
}

// ============================================================================
// Controller
// ============================================================================

/// Submits operations to one session worker.
///
/// Cloning is cheap; the worker stops once every clone is dropped.
#[derive(Clone)]
pub struct SessionController {
    cmd_tx: mpsc::Sender<WorkerCommand>,
    shared: Arc<Shared>,
}

impl SessionController {
    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    pub fn status(&self) -> SessionStatus {
        self.shared.status.read().clone()
    }

    pub fn is_disconnecting(&self) -> bool {
        self.shared.disconnecting()
    }

    pub fn is_stopped(&self) -> bool {
        self.cmd_tx.is_closed()
    }

    /// Queue an operation without waiting for it.
    ///
    /// Rejections happen here and produce no event.
    pub fn submit(&self, operation: Operation) -> Result<OperationTicket, SessionError> {
        if self.cmd_tx.is_closed() {
            return Err(SessionError::WorkerStopped);
        }

        let is_connect = operation.is_connect();
        let is_disconnect = operation.is_disconnect();

        if is_disconnect {
            self.shared.pending_disconnects.fetch_add(1, Ordering::SeqCst);
        } else if self.shared.disconnecting() {
            return Err(SessionError::Disconnecting);
        }

        if is_connect
            && self
                .shared
                .connect_pending
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
        {
            return Err(SessionError::ConnectInProgress);
        }

        let id = self.shared.next_operation.fetch_add(1, Ordering::SeqCst) + 1;
        let (reply, rx) = oneshot::channel();
        let job = Job {
            id,
            operation,
            reply,
        };

        if let Err(e) = self.cmd_tx.try_send(WorkerCommand::Run(job)) {
            if is_disconnect {
                self.shared.pending_disconnects.fetch_sub(1, Ordering::SeqCst);
            }
            if is_connect {
                self.shared.connect_pending.store(false, Ordering::SeqCst);
            }
            return Err(match e {
                TrySendError::Full(_) => SessionError::QueueFull,
                TrySendError::Closed(_) => SessionError::WorkerStopped,
            });
        }

        Ok(OperationTicket { id, rx })
    }

    pub fn connect(&self, config: ConnectConfig) -> Result<OperationTicket, SessionError> {
        self.submit(Operation::Connect(config))
    }

    pub fn disconnect(&self) -> Result<OperationTicket, SessionError> {
        self.submit(Operation::Disconnect)
    }

    pub fn list_directory(&self, path: Option<&str>) -> Result<OperationTicket, SessionError> {
        self.submit(Operation::ListDirectory {
            path: path.map(str::to_string),
        })
    }

    pub fn change_directory(&self, path: &str) -> Result<OperationTicket, SessionError> {
        self.submit(Operation::ChangeDirectory {
            path: path.to_string(),
        })
    }

    pub fn upload(
        &self,
        local: impl Into<PathBuf>,
        remote: &str,
    ) -> Result<OperationTicket, SessionError> {
        self.submit(Operation::Upload {
            local: local.into(),
            remote: remote.to_string(),
        })
    }

    pub fn download(
        &self,
        remote: &str,
        local: impl Into<PathBuf>,
    ) -> Result<OperationTicket, SessionError> {
        self.submit(Operation::Download {
            remote: remote.to_string(),
            local: local.into(),
        })
    }

    pub fn make_directory(&self, name: &str) -> Result<OperationTicket, SessionError> {
        self.submit(Operation::MakeDirectory {
            name: name.to_string(),
        })
    }

    pub fn remove(&self, name: &str, is_directory: bool) -> Result<OperationTicket, SessionError> {
        self.submit(Operation::Remove {
            name: name.to_string(),
            is_directory,
        })
    }

    pub fn rename(&self, from: &str, to: &str) -> Result<OperationTicket, SessionError> {
        self.submit(Operation::Rename {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    pub fn execute(&self, command: &str) -> Result<OperationTicket, SessionError> {
        self.submit(Operation::Execute {
            command: command.to_string(),
        })
    }

    pub fn stat(&self, name: &str) -> Result<OperationTicket, SessionError> {
        self.submit(Operation::Stat {
            name: name.to_string(),
        })
    }

    pub fn system_info(&self) -> Result<OperationTicket, SessionError> {
        self.submit(Operation::SystemInfo)
    }

    /// Ask the worker to stop after the operations already queued.
    ///
    /// The session is disconnected before the worker exits.
    pub async fn shutdown(&self) {
        if self.cmd_tx.send(WorkerCommand::Shutdown).await.is_err() {
            debug!("Worker for {} already stopped", self.shared.session_id);
        }
    }
}

/// Resolves with the outcome of one submitted operation.
///
/// All events of the operation are published before the ticket resolves.
/// Dropping the ticket does not cancel the operation.
pub struct OperationTicket {
    id: u64,
    rx: oneshot::Receiver<Result<OperationOutput, SessionError>>,
}

impl OperationTicket {
    /// Matches `EventEnvelope::operation_id` of the events this operation produces
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Future for OperationTicket {
    type Output = Result<OperationOutput, SessionError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(SessionError::WorkerStopped)))
    }
}

// ============================================================================
// Worker
// ============================================================================

struct SessionWorker {
    session: Session,
    relay: EventRelay,
    shared: Arc<Shared>,
    options: DispatcherOptions,
    cmd_rx: mpsc::Receiver<WorkerCommand>,
}

impl SessionWorker {
    async fn run(mut self) {
        while let Some(command) = self.cmd_rx.recv().await {
            match command {
                WorkerCommand::Run(job) => self.handle(job).await,
                WorkerCommand::Shutdown => {
                    info!("Shutdown requested for {}", self.shared.session_id);
                    break;
                }
            }
        }

        // Anything still queued resolves as WorkerStopped when dropped here
        self.cmd_rx.close();
        if self.session.disconnect().await {
            info!("Released connection of {} on worker exit", self.shared.session_id);
        }
        self.publish_status();
        info!("Session worker stopped for {}", self.shared.session_id);
    }

    async fn handle(&mut self, job: Job) {
        let Job {
            id,
            operation,
            reply,
        } = job;
        let is_connect = operation.is_connect();
        let is_disconnect = operation.is_disconnect();

        let outcome = if !is_disconnect && self.shared.disconnecting() {
            debug!(
                "Cancelling {} #{} on {}: disconnect pending",
                operation.name(),
                id,
                self.shared.session_id
            );
            let err = SessionError::Cancelled;
            self.relay.publish(id, Event::error(&err));
            Err(err)
        } else {
            self.run_operation(id, operation).await
        };

        if is_connect {
            self.shared.connect_pending.store(false, Ordering::SeqCst);
        }
        if is_disconnect {
            self.shared.pending_disconnects.fetch_sub(1, Ordering::SeqCst);
        }
        self.publish_status();

        if reply.send(outcome).is_err() {
            debug!("Ticket #{} was dropped before completion", id);
        }
    }

    async fn run_operation(
        &mut self,
        id: u64,
        operation: Operation,
    ) -> Result<OperationOutput, SessionError> {
        let name = operation.name();
        debug!("Running {} #{} on {}", name, id, self.shared.session_id);

        if let Some(message) = operation.status_message() {
            self.relay.publish(id, Event::status(message));
        }

        match self.execute(operation).await {
            Ok(output) => {
                self.relay.publish(id, output.to_event());
                if self.options.auto_refresh && output.changes_listing() {
                    self.refresh(id).await;
                }
                Ok(output)
            }
            Err(e) => {
                warn!("{} #{} failed on {}: {}", name, id, self.shared.session_id, e);
                self.relay.publish(id, Event::error(&e));
                Err(e)
            }
        }
    }

    async fn execute(&mut self, operation: Operation) -> Result<OperationOutput, SessionError> {
        let session = &mut self.session;
        match operation {
            Operation::Connect(config) => {
                let target = format!("{}@{}:{}", config.username, config.host, config.port);
                let cwd = session.connect(config).await?;
                Ok(OperationOutput::Connected { target, cwd })
            }
            Operation::Disconnect => Ok(OperationOutput::Disconnected {
                released: session.disconnect().await,
            }),
            Operation::ListDirectory { path } => session
                .list_directory(path.as_deref())
                .await
                .map(OperationOutput::Listing),
            Operation::ChangeDirectory { path } => session
                .change_directory(&path)
                .await
                .map(OperationOutput::Listing),
            Operation::Upload { local, remote } => {
                let bytes = session.upload(&local, &remote).await?;
                Ok(OperationOutput::Uploaded { remote, bytes })
            }
            Operation::Download { remote, local } => {
                let bytes = session.download(&remote, &local).await?;
                Ok(OperationOutput::Downloaded { local, bytes })
            }
            Operation::MakeDirectory { name } => session
                .make_directory(&name)
                .await
                .map(|path| OperationOutput::Created { path }),
            Operation::Remove { name, is_directory } => session
                .remove(&name, is_directory)
                .await
                .map(|path| OperationOutput::Removed { path }),
            Operation::Rename { from, to } => session
                .rename(&from, &to)
                .await
                .map(|(from, to)| OperationOutput::Renamed { from, to }),
            Operation::Execute { command } => session
                .execute(&command)
                .await
                .map(OperationOutput::Command),
            Operation::Stat { name } => session
                .stat(&name)
                .await
                .map(OperationOutput::Properties),
            Operation::SystemInfo => session
                .system_info()
                .await
                .map(OperationOutput::SystemInfo),
        }
    }

    /// Re-list the working directory after a change
    async fn refresh(&mut self, id: u64) {
        match self.session.list_directory(None).await {
            Ok(snapshot) => {
                self.relay.publish(id, Event::DirectorySnapshot(snapshot));
            }
            Err(e) => warn!(
                "Refresh of {} failed on {}: {}",
                self.session.cwd(),
                self.shared.session_id,
                e
            ),
        }
    }

    fn publish_status(&self) {
        *self.shared.status.write() = SessionStatus {
            state: self.session.state(),
            cwd: self.session.cwd().to_string(),
            target: self.session.identity().map(|i| i.display()),
        };
    }
}
