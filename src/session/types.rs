//! Session Types and Data Structures

use serde::{Deserialize, Serialize};

use crate::ssh::{AuthKind, ConnectConfig, RawCommandOutput};

/// Who a session connects as; never holds the secret itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth_kind: AuthKind,
}

impl SessionIdentity {
    pub fn display(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

impl From<&ConnectConfig> for SessionIdentity {
    fn from(config: &ConnectConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            auth_kind: config.auth.kind(),
        }
    }
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Exit code reported when the server sends no exit status
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Captured outcome of a remote command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn from_raw(command: impl Into<String>, raw: RawCommandOutput) -> Self {
        Self {
            command: command.into(),
            stdout: String::from_utf8_lossy(&raw.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&raw.stderr).into_owned(),
            exit_code: raw
                .exit_status
                .and_then(|code| i32::try_from(code).ok())
                .unwrap_or(UNKNOWN_EXIT_CODE),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One titled block of a system report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSection {
    pub title: String,
    pub output: String,
}

/// Host overview gathered from a fixed list of commands
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemReport {
    pub sections: Vec<ReportSection>,
}

impl SystemReport {
    pub fn section(&self, title: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.title == title)
            .map(|s| s.output.as_str())
    }
}
