//! SFTP channel backed by russh-sftp

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use russh_sftp::client::error::Error as SftpErrorInner;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::FileAttributes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::types::{RemoteAttributes, RemoteEntry};
use crate::ssh::{FileChannel, SshError};

/// Bound on a single chunk read/write so a dead connection cannot stall a transfer forever
const SFTP_IO_TIMEOUT: Duration = Duration::from_secs(300);

const CHUNK_SIZE: usize = 64 * 1024;

pub struct RusshFileChannel {
    sftp: SftpSession,
}

impl RusshFileChannel {
    pub fn new(sftp: SftpSession) -> Self {
        Self { sftp }
    }
}

impl From<FileAttributes> for RemoteAttributes {
    fn from(attrs: FileAttributes) -> Self {
        Self {
            size: attrs.size,
            permissions: attrs.permissions,
            mtime: attrs.mtime,
            atime: attrs.atime,
        }
    }
}

#[async_trait]
impl FileChannel for RusshFileChannel {
    async fn home_directory(&mut self) -> Result<String, SshError> {
        self.sftp
            .canonicalize(".")
            .await
            .map_err(|e| map_sftp_error(e, "."))
    }

    async fn list_directory(&mut self, path: &str) -> Result<Vec<RemoteEntry>, SshError> {
        debug!("Listing directory: {}", path);

        let read_dir = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| map_sftp_error(e, path))?;

        Ok(read_dir
            .filter_map(|entry| {
                let name = entry.file_name();
                if name == "." || name == ".." {
                    return None;
                }
                Some(RemoteEntry {
                    attrs: entry.metadata().into(),
                    name,
                })
            })
            .collect())
    }

    async fn stat_entry(&mut self, path: &str) -> Result<RemoteAttributes, SshError> {
        debug!("Getting file info: {}", path);
        self.sftp
            .metadata(path)
            .await
            .map(RemoteAttributes::from)
            .map_err(|e| map_sftp_error(e, path))
    }

    async fn get_file(&mut self, remote: &str, local: &Path) -> Result<u64, SshError> {
        let mut remote_file = self
            .sftp
            .open(remote)
            .await
            .map_err(|e| map_sftp_error(e, remote))?;

        let mut local_file = tokio::fs::File::create(local)
            .await
            .map_err(|e| SshError::local_io(local, e))?;

        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut transferred: u64 = 0;

        loop {
            let bytes_read = match timeout(SFTP_IO_TIMEOUT, remote_file.read(&mut buffer)).await {
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    return Err(SshError::Sftp {
                        path: remote.to_string(),
                        message: e.to_string(),
                    })
                }
                Err(_) => {
                    warn!(
                        "SFTP download read timeout after {:?} at {} bytes",
                        SFTP_IO_TIMEOUT, transferred
                    );
                    return Err(SshError::Timeout(format!(
                        "read from {} stalled for {:?}",
                        remote, SFTP_IO_TIMEOUT
                    )));
                }
            };

            if bytes_read == 0 {
                break;
            }

            local_file
                .write_all(&buffer[..bytes_read])
                .await
                .map_err(|e| SshError::local_io(local, e))?;

            transferred += bytes_read as u64;
        }

        local_file
            .flush()
            .await
            .map_err(|e| SshError::local_io(local, e))?;

        info!("Downloaded {} ({} bytes)", remote, transferred);
        Ok(transferred)
    }

    async fn put_file(&mut self, local: &Path, remote: &str) -> Result<u64, SshError> {
        let mut local_file = tokio::fs::File::open(local)
            .await
            .map_err(|e| SshError::local_io(local, e))?;

        let mut remote_file = self
            .sftp
            .create(remote)
            .await
            .map_err(|e| map_sftp_error(e, remote))?;

        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut transferred: u64 = 0;

        loop {
            let bytes_read = local_file
                .read(&mut buffer)
                .await
                .map_err(|e| SshError::local_io(local, e))?;

            if bytes_read == 0 {
                break;
            }

            match timeout(
                SFTP_IO_TIMEOUT,
                AsyncWriteExt::write_all(&mut remote_file, &buffer[..bytes_read]),
            )
            .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    return Err(SshError::Sftp {
                        path: remote.to_string(),
                        message: e.to_string(),
                    })
                }
                Err(_) => {
                    warn!(
                        "SFTP upload write timeout after {:?} at {} bytes",
                        SFTP_IO_TIMEOUT, transferred
                    );
                    return Err(SshError::Timeout(format!(
                        "write to {} stalled for {:?}",
                        remote, SFTP_IO_TIMEOUT
                    )));
                }
            }

            transferred += bytes_read as u64;
        }

        match timeout(SFTP_IO_TIMEOUT, AsyncWriteExt::shutdown(&mut remote_file)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(SshError::Sftp {
                    path: remote.to_string(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                return Err(SshError::Timeout(format!(
                    "closing {} stalled for {:?}",
                    remote, SFTP_IO_TIMEOUT
                )))
            }
        }

        info!("Uploaded {} ({} bytes)", remote, transferred);
        Ok(transferred)
    }

    async fn make_directory(&mut self, path: &str) -> Result<(), SshError> {
        self.sftp
            .create_dir(path)
            .await
            .map_err(|e| map_sftp_error(e, path))
    }

    async fn remove_file(&mut self, path: &str) -> Result<(), SshError> {
        self.sftp
            .remove_file(path)
            .await
            .map_err(|e| map_sftp_error(e, path))
    }

    async fn remove_directory(&mut self, path: &str) -> Result<(), SshError> {
        self.sftp
            .remove_dir(path)
            .await
            .map_err(|e| map_sftp_error(e, path))
    }

    async fn close(&mut self) {
        if let Err(e) = self.sftp.close().await {
            debug!("SFTP close returned an error: {}", e);
        }
    }
}

/// russh-sftp only exposes status codes through the message text
fn map_sftp_error(err: SftpErrorInner, path: &str) -> SshError {
    classify_sftp_message(&err.to_string(), path)
}

fn classify_sftp_message(message: &str, path: &str) -> SshError {
    if message.contains("No such file") || message.contains("not found") {
        SshError::NotFound(path.to_string())
    } else if message.contains("Permission denied") {
        SshError::PermissionDenied(path.to_string())
    } else {
        SshError::Sftp {
            path: path.to_string(),
            message: message.to_string(),
        }
    }
}
