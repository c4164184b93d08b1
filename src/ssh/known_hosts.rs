//! Known hosts management for SSH host key verification
//!
//! Reads and appends OpenSSH `known_hosts` files. Hashed entries (`|1|...`)
//! are skipped; they are never matched and never rewritten.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use parking_lot::RwLock;
use russh::keys::{PublicKey, PublicKeyBase64};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::error::SshError;

/// Result of host key verification
#[derive(Debug, Clone, PartialEq)]
pub enum HostKeyVerification {
    /// Key matches known_hosts entry
    Verified,
    /// No key of this type stored for the host
    Unknown { fingerprint: String },
    /// Key changed from known_hosts entry (potential MITM)
    Changed {
        expected_fingerprint: String,
        actual_fingerprint: String,
    },
}

#[derive(Clone, Debug)]
struct HostKeyEntry {
    key_type: String,
    key_data: String,
}

/// In-memory view of one known_hosts file
pub struct KnownHostsStore {
    hosts: RwLock<HashMap<String, Vec<HostKeyEntry>>>,
    path: PathBuf,
}

impl KnownHostsStore {
    /// `~/.ssh/known_hosts`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".ssh").join("known_hosts"))
            .unwrap_or_else(|| PathBuf::from(".ssh/known_hosts"))
    }

    /// Open the store at `path`; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let store = Self {
            hosts: RwLock::new(HashMap::new()),
            path: path.into(),
        };

        if let Err(e) = store.load() {
            warn!("Failed to load known_hosts {:?}: {}", store.path, e);
        }

        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<(), SshError> {
        if !self.path.exists() {
            debug!("known_hosts {:?} not found, starting empty", self.path);
            return Ok(());
        }

        let file = fs::File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut hosts = self.hosts.write();
        let mut entry_count = 0;

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // hostname[,alias] keytype base64key [comment]
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 3 {
                continue;
            }

            // Marker lines (@cert-authority, @revoked) are not plain host keys
            if parts[0].starts_with('@') {
                continue;
            }

            let entry = HostKeyEntry {
                key_type: parts[1].to_string(),
                key_data: parts[2].to_string(),
            };

            for hostname in parts[0].split(',') {
                if hostname.starts_with('|') {
                    continue;
                }
                hosts
                    .entry(Self::normalize_hostname(hostname))
                    .or_default()
                    .push(entry.clone());
                entry_count += 1;
            }
        }

        info!(
            "Loaded {} known host entries ({} unique hosts) from {:?}",
            entry_count,
            hosts.len(),
            self.path
        );
        Ok(())
    }

    /// `[host]:port` and `host` both normalize to the lowercase lookup key
    fn normalize_hostname(host: &str) -> String {
        let lowered = host.to_lowercase();
        if let Some(rest) = lowered.strip_prefix('[') {
            if let Some((name, port)) = rest.split_once("]:") {
                return Self::make_key(name, port.parse().unwrap_or(22));
            }
            return rest.trim_end_matches(']').to_string();
        }
        lowered
    }

    /// Lookup key for host:port, matching the known_hosts spelling
    fn make_key(host: &str, port: u16) -> String {
        let host = host.to_lowercase();
        if port == 22 {
            host
        } else {
            format!("[{}]:{}", host, port)
        }
    }

    /// SHA256 fingerprint of raw public key bytes
    pub fn fingerprint_bytes(key_bytes: &[u8]) -> String {
        let hash = Sha256::digest(key_bytes);
        format!("SHA256:{}", BASE64.encode(hash).trim_end_matches('='))
    }

    /// `(key type, base64 blob)` as they appear in a known_hosts line
    pub fn encode_key(key: &PublicKey) -> (String, String) {
        (
            key.algorithm().as_str().to_string(),
            BASE64.encode(key.public_key_bytes()),
        )
    }

    fn fingerprint_b64(stored_b64: &str) -> String {
        BASE64
            .decode(stored_b64)
            .map(|bytes| Self::fingerprint_bytes(&bytes))
            .unwrap_or_else(|_| "unknown".to_string())
    }

    /// Verify an already base64-encoded key of `key_type`
    pub fn verify_encoded(
        &self,
        host: &str,
        port: u16,
        key_type: &str,
        key_b64: &str,
    ) -> HostKeyVerification {
        let lookup_key = Self::make_key(host, port);
        let fingerprint = Self::fingerprint_b64(key_b64);
        let hosts = self.hosts.read();

        let Some(entries) = hosts.get(&lookup_key) else {
            debug!("Unknown host: {}", lookup_key);
            return HostKeyVerification::Unknown { fingerprint };
        };

        for entry in entries.iter().filter(|e| e.key_type == key_type) {
            if entry.key_data == key_b64 {
                debug!("Host key verified for {} ({})", lookup_key, key_type);
                return HostKeyVerification::Verified;
            }
        }

        if let Some(entry) = entries.iter().find(|e| e.key_type == key_type) {
            let expected_fingerprint = Self::fingerprint_b64(&entry.key_data);
            warn!(
                "HOST KEY CHANGED for {} ({})! Expected {}, got {}",
                lookup_key, key_type, expected_fingerprint, fingerprint
            );
            return HostKeyVerification::Changed {
                expected_fingerprint,
                actual_fingerprint: fingerprint,
            };
        }

        debug!(
            "Host {} known but no {} key stored, treating as new",
            lookup_key, key_type
        );
        HostKeyVerification::Unknown { fingerprint }
    }

    /// Remember a server key and append it to the file
    pub fn add_encoded(
        &self,
        host: &str,
        port: u16,
        key_type: &str,
        key_b64: &str,
    ) -> Result<(), SshError> {
        let lookup_key = Self::make_key(host, port);

        self.append_to_file(&lookup_key, key_type, key_b64)?;

        self.hosts
            .write()
            .entry(lookup_key.clone())
            .or_default()
            .push(HostKeyEntry {
                key_type: key_type.to_string(),
                key_data: key_b64.to_string(),
            });

        info!("Added host key for {} ({}) to known_hosts", lookup_key, key_type);
        Ok(())
    }

    fn append_to_file(&self, host: &str, key_type: &str, key_b64: &str) -> Result<(), SshError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        writeln!(file, "{} {} {}", host, key_type, key_b64)?;
        Ok(())
    }
}
