//! SSH module - handles SSH connections
//!
//! This module provides the transport layer using the russh library.
//!
//! # Features
//! - Password and private key authentication
//! - Host key verification via ~/.ssh/known_hosts (strict or accept-new)
//! - Remote command execution with captured output and exit status
//! - The `Transport` seam the session layer is written against

mod client;
mod config;
mod error;
pub mod known_hosts;
mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use client::{establish, ClientHandler};
pub use config::{
    parse_port, AuthKind, AuthMethod, ConnectConfig, HostKeyPolicy, ValidationError,
    DEFAULT_CONNECT_TIMEOUT_SECS,
};
pub use error::SshError;
pub use known_hosts::{HostKeyVerification, KnownHostsStore};
pub use transport::{
    Connection, FileChannel, RawCommandOutput, RusshConnection, RusshTransport, Transport,
    DEFAULT_COMMAND_TIMEOUT,
};
