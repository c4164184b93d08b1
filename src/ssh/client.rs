//! SSH Client implementation using russh

use std::sync::Arc;
use std::time::Duration;

use russh::client;
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::PublicKey;
use tracing::{debug, info, warn};

use super::config::{AuthMethod, ConnectConfig, HostKeyPolicy};
use super::error::SshError;
use super::known_hosts::{HostKeyVerification, KnownHostsStore};

/// Open the TCP connection, run the SSH handshake and authenticate.
///
/// No timeout is applied here; the caller bounds the whole handshake.
pub async fn establish(
    config: &ConnectConfig,
    known_hosts: Arc<KnownHostsStore>,
) -> Result<client::Handle<ClientHandler>, SshError> {
    info!(
        "Connecting to SSH server at {}:{}",
        config.host, config.port
    );

    let ssh_config = client::Config {
        inactivity_timeout: None,
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        ..Default::default()
    };

    let handler = ClientHandler::new(
        config.host.clone(),
        config.port,
        config.host_key_policy,
        known_hosts,
    );

    let mut handle = client::connect(
        Arc::new(ssh_config),
        (config.host.as_str(), config.port),
        handler,
    )
    .await
    .map_err(|e| match e {
        SshError::HostKeyRejected(_) => e,
        SshError::IoError(io) => SshError::ConnectionFailed(io.to_string()),
        other => SshError::ConnectionFailed(other.to_string()),
    })?;

    debug!("SSH handshake completed");

    let authenticated = match &config.auth {
        AuthMethod::Password { password } => handle
            .authenticate_password(&config.username, password)
            .await
            .map_err(|e| SshError::ConnectionFailed(e.to_string()))?,
        AuthMethod::Key {
            key_path,
            passphrase,
        } => {
            let key = russh::keys::load_secret_key(key_path, passphrase.as_deref())
                .map_err(|e| SshError::KeyError(e.to_string()))?;

            let key_with_hash = PrivateKeyWithHashAlg::new(Arc::new(key), None);

            handle
                .authenticate_publickey(&config.username, key_with_hash)
                .await
                .map_err(|e| SshError::ConnectionFailed(e.to_string()))?
        }
    };

    if !authenticated.success() {
        return Err(SshError::AuthenticationFailed(format!(
            "server rejected credentials for {}",
            config.username
        )));
    }

    info!(
        "SSH authentication successful for {}@{}:{}",
        config.username, config.host, config.port
    );

    Ok(handle)
}

/// Client handler for russh callbacks
///
/// Only host key verification is handled; this client never accepts
/// server-initiated channels.
pub struct ClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts: Arc<KnownHostsStore>,
}

impl ClientHandler {
    pub fn new(
        host: String,
        port: u16,
        policy: HostKeyPolicy,
        known_hosts: Arc<KnownHostsStore>,
    ) -> Self {
        Self {
            host,
            port,
            policy,
            known_hosts,
        }
    }
}

impl ClientHandler {
    /// Apply the host-key policy to an encoded server key.
    ///
    /// Known keys pass; unknown keys pass (and are remembered) only under
    /// `AcceptNew`; a changed key never passes.
    pub fn admit_encoded(&self, key_type: &str, key_b64: &str) -> Result<(), SshError> {
        match self
            .known_hosts
            .verify_encoded(&self.host, self.port, key_type, key_b64)
        {
            HostKeyVerification::Verified => {
                info!("Host key verified for {}:{}", self.host, self.port);
                Ok(())
            }
            HostKeyVerification::Unknown { fingerprint } => match self.policy {
                HostKeyPolicy::AcceptNew => {
                    info!(
                        "New host {}:{}, trusting on first use (fingerprint: {})",
                        self.host, self.port, fingerprint
                    );
                    if let Err(e) =
                        self.known_hosts
                            .add_encoded(&self.host, self.port, key_type, key_b64)
                    {
                        warn!("Failed to save host key: {}", e);
                    }
                    Ok(())
                }
                HostKeyPolicy::Strict => {
                    warn!(
                        "Unknown host key for {}:{} (fingerprint: {}), strict policy rejects it",
                        self.host, self.port, fingerprint
                    );
                    Err(SshError::HostKeyRejected(format!(
                        "unknown host {}:{} with fingerprint {}; add it to {} or use the accept-new policy",
                        self.host,
                        self.port,
                        fingerprint,
                        self.known_hosts.path().display()
                    )))
                }
            },
            HostKeyVerification::Changed {
                expected_fingerprint,
                actual_fingerprint,
            } => {
                warn!(
                    "HOST KEY CHANGED for {}:{}! Expected {}, got {}",
                    self.host, self.port, expected_fingerprint, actual_fingerprint
                );
                Err(SshError::HostKeyRejected(format!(
                    "key for {}:{} has changed (expected {}, got {}); remove the stale entry from {} if the change is legitimate",
                    self.host,
                    self.port,
                    expected_fingerprint,
                    actual_fingerprint,
                    self.known_hosts.path().display()
                )))
            }
        }
    }
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let (key_type, key_b64) = KnownHostsStore::encode_key(server_public_key);
        self.admit_encoded(&key_type, &key_b64)?;
        Ok(true)
    }
}
