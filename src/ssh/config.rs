//! SSH Configuration

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default connect/handshake bound in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// SSH connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectConfig {
    /// Remote host address
    pub host: String,

    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for authentication
    pub username: String,

    /// Authentication method
    pub auth: AuthMethod,

    /// Bound on the whole handshake (TCP, SSH, auth, SFTP subsystem)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// What to do with hosts missing from known_hosts
    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,
}

/// Host key policy for hosts that are not in known_hosts yet.
///
/// A key that differs from a stored one is rejected under every policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyPolicy {
    /// Reject unknown hosts
    #[default]
    Strict,
    /// Trust on first use and remember the key
    AcceptNew,
}

/// Authentication methods supported
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthMethod {
    /// Password authentication
    Password { password: String },

    /// Private key file authentication
    Key {
        /// Path to private key file
        key_path: String,
        /// Optional passphrase for encrypted keys
        passphrase: Option<String>,
    },
}

/// Credential kind, without the secret
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    Password,
    PrivateKey,
}

impl AuthMethod {
    pub fn password(password: impl Into<String>) -> Self {
        Self::Password {
            password: password.into(),
        }
    }

    pub fn key(key_path: impl Into<String>, passphrase: Option<String>) -> Self {
        Self::Key {
            key_path: key_path.into(),
            passphrase,
        }
    }

    pub fn kind(&self) -> AuthKind {
        match self {
            AuthMethod::Password { .. } => AuthKind::Password,
            AuthMethod::Key { .. } => AuthKind::PrivateKey,
        }
    }
}

// Secrets never reach logs
impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Password { .. } => f
                .debug_struct("Password")
                .field("password", &"<redacted>")
                .finish(),
            AuthMethod::Key {
                key_path,
                passphrase,
            } => f
                .debug_struct("Key")
                .field("key_path", key_path)
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

/// Rejected connection parameters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("host must not be empty")]
    EmptyHost,

    #[error("username must not be empty")]
    EmptyUsername,

    #[error("port must be an integer between 1 and 65535, got {0:?}")]
    InvalidPort(String),

    #[error("private key path must not be empty")]
    EmptyKeyPath,

    #[error("private key file does not exist: {0}")]
    MissingKeyFile(String),

    #[error("timeout must be at least one second")]
    InvalidTimeout,
}

impl ConnectConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        auth: AuthMethod,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            auth,
            timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            host_key_policy: HostKeyPolicy::default(),
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_host_key_policy(mut self, policy: HostKeyPolicy) -> Self {
        self.host_key_policy = policy;
        self
    }

    /// Check the parameters before any network traffic
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.trim().is_empty() {
            return Err(ValidationError::EmptyHost);
        }
        if self.username.trim().is_empty() {
            return Err(ValidationError::EmptyUsername);
        }
        if self.port == 0 {
            return Err(ValidationError::InvalidPort(self.port.to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        if let AuthMethod::Key { key_path, .. } = &self.auth {
            if key_path.trim().is_empty() {
                return Err(ValidationError::EmptyKeyPath);
            }
            if !Path::new(key_path).is_file() {
                return Err(ValidationError::MissingKeyFile(key_path.clone()));
            }
        }
        Ok(())
    }
}

/// Parse a user-supplied port string (1-65535)
pub fn parse_port(input: &str) -> Result<u16, ValidationError> {
    match input.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ValidationError::InvalidPort(input.trim().to_string())),
    }
}

fn default_port() -> u16 {
    22
}

fn default_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}
