//! Transport collaborator contract
//!
//! The session layer only ever talks to these traits. `RusshTransport` is the
//! production implementation; tests drive the same contract with an
//! in-memory transport.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::Handle;
use russh::ChannelMsg;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::client::{establish, ClientHandler};
use super::config::ConnectConfig;
use super::error::SshError;
use super::known_hosts::KnownHostsStore;
use crate::sftp::channel::RusshFileChannel;
use crate::sftp::types::{RemoteAttributes, RemoteEntry};

/// Default bound on a single remote command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Raw output of a remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawCommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the channel closed without an exit-status message
    pub exit_status: Option<u32>,
}

/// Opens authenticated connections
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, config: &ConnectConfig) -> Result<Box<dyn Connection>, SshError>;
}

/// One authenticated SSH connection
#[async_trait]
pub trait Connection: Send {
    /// Open the SFTP subchannel
    async fn open_file_channel(&mut self) -> Result<Box<dyn FileChannel>, SshError>;

    /// Run a command on a fresh exec channel
    async fn run_command(&mut self, command: &str) -> Result<RawCommandOutput, SshError>;

    async fn close(&mut self);
}

/// SFTP operations on absolute remote paths
#[async_trait]
pub trait FileChannel: Send {
    /// Canonical form of the server's default directory
    async fn home_directory(&mut self) -> Result<String, SshError>;

    async fn list_directory(&mut self, path: &str) -> Result<Vec<RemoteEntry>, SshError>;

    async fn stat_entry(&mut self, path: &str) -> Result<RemoteAttributes, SshError>;

    /// Copy `remote` into a newly created local file; returns bytes written
    async fn get_file(&mut self, remote: &str, local: &Path) -> Result<u64, SshError>;

    /// Copy a local file to `remote`, truncating it; returns bytes written
    async fn put_file(&mut self, local: &Path, remote: &str) -> Result<u64, SshError>;

    async fn make_directory(&mut self, path: &str) -> Result<(), SshError>;

    async fn remove_file(&mut self, path: &str) -> Result<(), SshError>;

    async fn remove_directory(&mut self, path: &str) -> Result<(), SshError>;

    async fn close(&mut self);
}

/// russh-backed transport
pub struct RusshTransport {
    known_hosts: Arc<KnownHostsStore>,
    command_timeout: Duration,
}

impl RusshTransport {
    pub fn new(known_hosts: KnownHostsStore) -> Self {
        Self {
            known_hosts: Arc::new(known_hosts),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }
}

#[async_trait]
impl Transport for RusshTransport {
    async fn connect(&self, config: &ConnectConfig) -> Result<Box<dyn Connection>, SshError> {
        let handle = establish(config, self.known_hosts.clone()).await?;
        Ok(Box::new(RusshConnection {
            handle,
            command_timeout: self.command_timeout,
            label: format!("{}@{}:{}", config.username, config.host, config.port),
        }))
    }
}

/// Owns the russh `Handle`
pub struct RusshConnection {
    handle: Handle<ClientHandler>,
    command_timeout: Duration,
    label: String,
}

#[async_trait]
impl Connection for RusshConnection {
    async fn open_file_channel(&mut self) -> Result<Box<dyn FileChannel>, SshError> {
        info!("Opening SFTP subsystem for {}", self.label);

        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::ChannelError(e.to_string()))?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| SshError::SubsystemNotAvailable(e.to_string()))?;

        let sftp = russh_sftp::client::SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| SshError::SubsystemNotAvailable(e.to_string()))?;

        info!("SFTP subsystem opened for {}", self.label);
        Ok(Box::new(RusshFileChannel::new(sftp)))
    }

    async fn run_command(&mut self, command: &str) -> Result<RawCommandOutput, SshError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| SshError::ChannelError(format!("Failed to open exec channel: {}", e)))?;

        debug!("exec on {}: {}", self.label, command);

        channel
            .exec(true, command)
            .await
            .map_err(|e| SshError::ChannelError(format!("Failed to execute command: {}", e)))?;

        let mut output = RawCommandOutput::default();

        // exit-status may arrive after EOF, so only Close ends the loop
        let drained = timeout(self.command_timeout, async {
            loop {
                match channel.wait().await {
                    Some(ChannelMsg::Data { data }) => output.stdout.extend_from_slice(&data),
                    Some(ChannelMsg::ExtendedData { data, ext: 1 }) => {
                        output.stderr.extend_from_slice(&data)
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        output.exit_status = Some(exit_status)
                    }
                    Some(ChannelMsg::Close) | None => break,
                    Some(_) => {}
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "Command timed out after {:?} on {}: {}",
                self.command_timeout, self.label, command
            );
            let _ = channel.close().await;
            return Err(SshError::Timeout(format!(
                "command did not finish within {} seconds",
                self.command_timeout.as_secs()
            )));
        }

        debug!(
            "exec completed: exit={:?} stdout_len={} stderr_len={}",
            output.exit_status,
            output.stdout.len(),
            output.stderr.len()
        );
        Ok(output)
    }

    async fn close(&mut self) {
        let _ = self
            .handle
            .disconnect(russh::Disconnect::ByApplication, "Session closed", "en")
            .await;
        info!("SSH connection closed for {}", self.label);
    }
}
