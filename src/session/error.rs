//! Session error types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ssh::{SshError, ValidationError};

/// Failure of a session operation or of a submission to its worker
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("A connection attempt is already in progress")]
    ConnectInProgress,

    #[error("{}", remote_io_message(.path, .message, .stderr.as_deref()))]
    RemoteIo {
        path: String,
        message: String,
        /// Captured stderr when the failure came from a remote command
        stderr: Option<String>,
    },

    #[error("Local I/O error on {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid connection settings: {0}")]
    Validation(#[from] ValidationError),

    #[error("Session is disconnecting")]
    Disconnecting,

    #[error("Cancelled by disconnect")]
    Cancelled,

    #[error("Work queue is full")]
    QueueFull,

    #[error("Session worker has stopped")]
    WorkerStopped,
}

fn remote_io_message(path: &str, message: &str, stderr: Option<&str>) -> String {
    match stderr.map(str::trim).filter(|s| !s.is_empty()) {
        Some(stderr) => format!("{}: {} ({})", path, message, stderr),
        None => format!("{}: {}", path, message),
    }
}

/// Error category carried by error events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Authentication,
    Transport,
    Timeout,
    NotConnected,
    AlreadyConnected,
    ConnectInProgress,
    RemoteIo,
    LocalIo,
    Validation,
    Disconnecting,
    Cancelled,
    QueueFull,
    WorkerStopped,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Authentication => "authentication",
            ErrorKind::Transport => "transport",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NotConnected => "not_connected",
            ErrorKind::AlreadyConnected => "already_connected",
            ErrorKind::ConnectInProgress => "connect_in_progress",
            ErrorKind::RemoteIo => "remote_io",
            ErrorKind::LocalIo => "local_io",
            ErrorKind::Validation => "validation",
            ErrorKind::Disconnecting => "disconnecting",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::QueueFull => "queue_full",
            ErrorKind::WorkerStopped => "worker_stopped",
        }
    }
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Authentication(_) => ErrorKind::Authentication,
            SessionError::Transport(_) => ErrorKind::Transport,
            SessionError::Timeout(_) => ErrorKind::Timeout,
            SessionError::NotConnected => ErrorKind::NotConnected,
            SessionError::AlreadyConnected => ErrorKind::AlreadyConnected,
            SessionError::ConnectInProgress => ErrorKind::ConnectInProgress,
            SessionError::RemoteIo { .. } => ErrorKind::RemoteIo,
            SessionError::LocalIo { .. } => ErrorKind::LocalIo,
            SessionError::Validation(_) => ErrorKind::Validation,
            SessionError::Disconnecting => ErrorKind::Disconnecting,
            SessionError::Cancelled => ErrorKind::Cancelled,
            SessionError::QueueFull => ErrorKind::QueueFull,
            SessionError::WorkerStopped => ErrorKind::WorkerStopped,
        }
    }

    pub fn remote(path: impl Into<String>, message: impl Into<String>) -> Self {
        SessionError::RemoteIo {
            path: path.into(),
            message: message.into(),
            stderr: None,
        }
    }

    pub fn local(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SessionError::LocalIo {
            path: path.into(),
            source,
        }
    }
}

impl From<SshError> for SessionError {
    fn from(err: SshError) -> Self {
        match err {
            SshError::AuthenticationFailed(msg) => SessionError::Authentication(msg),
            SshError::KeyError(msg) => {
                SessionError::Authentication(format!("could not load private key: {}", msg))
            }
            SshError::Timeout(msg) => SessionError::Timeout(msg),
            SshError::NotFound(path) => {
                SessionError::remote(path, "No such file or directory")
            }
            SshError::PermissionDenied(path) => SessionError::remote(path, "Permission denied"),
            SshError::Sftp { path, message } => SessionError::remote(path, message),
            SshError::LocalIo { path, source } => SessionError::LocalIo { path, source },
            other @ (SshError::ConnectionFailed(_)
            | SshError::HostKeyRejected(_)
            | SshError::ChannelError(_)
            | SshError::SubsystemNotAvailable(_)
            | SshError::IoError(_)
            | SshError::ProtocolError(_)
            | SshError::Disconnected) => SessionError::Transport(other.to_string()),
        }
    }
}

// Drivers that serialize events see the message only
impl Serialize for SessionError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
