//! Operations submitted to a session worker, and the events it publishes

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::session::{CommandResult, ErrorKind, SessionError, SystemReport};
use crate::sftp::{format_size, DirectorySnapshot, EntryProperties};
use crate::ssh::ConnectConfig;

// ============================================================================
// Operations
// ============================================================================

/// A unit of work for one session
#[derive(Debug, Clone)]
pub enum Operation {
    Connect(ConnectConfig),
    Disconnect,
    /// Working directory when `path` is `None`
    ListDirectory { path: Option<String> },
    ChangeDirectory { path: String },
    Upload { local: PathBuf, remote: String },
    Download { remote: String, local: PathBuf },
    MakeDirectory { name: String },
    Remove { name: String, is_directory: bool },
    Rename { from: String, to: String },
    Execute { command: String },
    Stat { name: String },
    SystemInfo,
}

impl Operation {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Connect(_) => "connect",
            Operation::Disconnect => "disconnect",
            Operation::ListDirectory { .. } => "list_directory",
            Operation::ChangeDirectory { .. } => "change_directory",
            Operation::Upload { .. } => "upload",
            Operation::Download { .. } => "download",
            Operation::MakeDirectory { .. } => "make_directory",
            Operation::Remove { .. } => "remove",
            Operation::Rename { .. } => "rename",
            Operation::Execute { .. } => "execute",
            Operation::Stat { .. } => "stat",
            Operation::SystemInfo => "system_info",
        }
    }

    pub fn is_connect(&self) -> bool {
        matches!(self, Operation::Connect(_))
    }

    pub fn is_disconnect(&self) -> bool {
        matches!(self, Operation::Disconnect)
    }

    /// Progress note published before slow operations start
    pub fn status_message(&self) -> Option<String> {
        match self {
            Operation::Connect(config) => Some(format!(
                "Connecting to {}@{}:{}...",
                config.username, config.host, config.port
            )),
            Operation::Upload { local, remote } => {
                Some(format!("Uploading {} to {}...", local.display(), remote))
            }
            Operation::Download { remote, local } => {
                Some(format!("Downloading {} to {}...", remote, local.display()))
            }
            Operation::SystemInfo => Some("Collecting system information...".to_string()),
            _ => None,
        }
    }
}

/// What a successful operation produced; resolves the ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutput {
    Connected { target: String, cwd: String },
    Disconnected { released: bool },
    Listing(DirectorySnapshot),
    Uploaded { remote: String, bytes: u64 },
    Downloaded { local: PathBuf, bytes: u64 },
    Created { path: String },
    Removed { path: String },
    Renamed { from: String, to: String },
    Command(CommandResult),
    Properties(EntryProperties),
    SystemInfo(SystemReport),
}

impl OperationOutput {
    /// Whether the working directory listing may be stale afterwards
    pub fn changes_listing(&self) -> bool {
        matches!(
            self,
            OperationOutput::Connected { .. }
                | OperationOutput::Uploaded { .. }
                | OperationOutput::Created { .. }
                | OperationOutput::Removed { .. }
                | OperationOutput::Renamed { .. }
        )
    }

    /// The event reporting this output
    pub fn to_event(&self) -> Event {
        match self {
            OperationOutput::Connected { target, .. } => {
                Event::success(format!("Connected to {}", target))
            }
            OperationOutput::Disconnected { released: true } => Event::success("Disconnected"),
            OperationOutput::Disconnected { released: false } => {
                Event::success("Already disconnected")
            }
            OperationOutput::Listing(snapshot) => Event::DirectorySnapshot(snapshot.clone()),
            OperationOutput::Uploaded { remote, bytes } => Event::success(format!(
                "Uploaded {} ({})",
                remote,
                format_size(*bytes)
            )),
            OperationOutput::Downloaded { local, bytes } => Event::success(format!(
                "Downloaded {} ({})",
                local.display(),
                format_size(*bytes)
            )),
            OperationOutput::Created { path } => {
                Event::success(format!("Created directory {}", path))
            }
            OperationOutput::Removed { path } => Event::success(format!("Removed {}", path)),
            OperationOutput::Renamed { from, to } => {
                Event::success(format!("Renamed {} to {}", from, to))
            }
            OperationOutput::Command(result) => Event::CommandResult(result.clone()),
            OperationOutput::Properties(props) => Event::PropertiesResult(props.clone()),
            OperationOutput::SystemInfo(report) => Event::SystemInfo(report.clone()),
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// Typed result delivered to the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    StatusUpdate { message: String },
    Success { message: String },
    Error { kind: ErrorKind, message: String },
    DirectorySnapshot(DirectorySnapshot),
    CommandResult(CommandResult),
    PropertiesResult(EntryProperties),
    SystemInfo(SystemReport),
}

impl Event {
    pub fn status(message: impl Into<String>) -> Self {
        Event::StatusUpdate {
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Event::Success {
            message: message.into(),
        }
    }

    pub fn error(err: &SessionError) -> Self {
        Event::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Event::Error { .. })
    }
}

/// An event plus where it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub session_id: String,
    /// Starts at 1, increases by one per event of this session
    pub seq: u64,
    /// Operation that produced the event
    pub operation_id: u64,
    pub event: Event,
}
