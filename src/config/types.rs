//! Configuration Types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::router::DispatcherOptions;
use crate::ssh::{HostKeyPolicy, KnownHostsStore, DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONNECT_TIMEOUT_SECS};

/// Current config format version
pub const CONFIG_VERSION: u32 = 1;

/// Root of `config.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Config format version
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub connection: ConnectionDefaults,

    /// Overrides `~/.ssh/known_hosts`
    #[serde(default)]
    pub known_hosts_path: Option<PathBuf>,

    #[serde(default)]
    pub dispatcher: DispatcherOptions,

    /// `tracing` filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            connection: ConnectionDefaults::default(),
            known_hosts_path: None,
            dispatcher: DispatcherOptions::default(),
            log_filter: default_log_filter(),
        }
    }
}

impl AppConfig {
    pub fn known_hosts_path(&self) -> PathBuf {
        self.known_hosts_path
            .clone()
            .unwrap_or_else(KnownHostsStore::default_path)
    }
}

/// Defaults applied to new connections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDefaults {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,

    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_port() -> u16 {
    22
}

fn default_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_command_timeout_secs() -> u64 {
    DEFAULT_COMMAND_TIMEOUT.as_secs()
}

impl Default for ConnectionDefaults {
    fn default() -> Self {
        Self {
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            host_key_policy: HostKeyPolicy::default(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}
