//! Session: one connection plus one SFTP channel, and the operations on them
//!
//! A `Session` is owned by exactly one task at a time (see
//! `router::dispatcher`), so nothing in here is locked.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::error::SessionError;
use super::types::{CommandResult, ReportSection, SessionIdentity, SessionState, SystemReport};
use crate::sftp::path_utils::{
    normalize_remote_path, partial_download_path, partial_upload_path, remote_file_name,
    resolve_remote_path,
};
use crate::sftp::{DirectoryEntry, DirectorySnapshot, EntryProperties};
use crate::ssh::{ConnectConfig, Connection, FileChannel, Transport};

/// Commands behind `system_info`, in report order
const SYSTEM_PROBES: &[(&str, &str)] = &[
    ("System", "uname -a"),
    ("Disk usage", "df -h"),
    ("Memory", "free -h"),
    ("CPU", "grep -m1 'model name' /proc/cpuinfo"),
    ("Load", "uptime"),
];

/// Handles that only exist together, while connected
struct Link {
    connection: Box<dyn Connection>,
    files: Box<dyn FileChannel>,
}

pub struct Session {
    transport: Arc<dyn Transport>,
    identity: Option<SessionIdentity>,
    state: SessionState,
    cwd: String,
    link: Option<Link>,
}

impl Session {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            identity: None,
            state: SessionState::Disconnected,
            cwd: "/".to_string(),
            link: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Current remote working directory (always absolute)
    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    /// Identity of the current or last connection
    pub fn identity(&self) -> Option<&SessionIdentity> {
        self.identity.as_ref()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Connect, authenticate and open the SFTP channel.
    ///
    /// Returns the initial working directory. On any failure the session is
    /// left disconnected without handles.
    pub async fn connect(&mut self, config: ConnectConfig) -> Result<String, SessionError> {
        match self.state {
            SessionState::Connected => return Err(SessionError::AlreadyConnected),
            SessionState::Connecting => return Err(SessionError::ConnectInProgress),
            SessionState::Disconnected => {}
        }

        config.validate()?;

        let identity = SessionIdentity::from(&config);
        info!("Connecting session to {}", identity.display());
        self.state = SessionState::Connecting;
        self.identity = Some(identity.clone());

        let bound = Duration::from_secs(config.timeout_secs);
        let attempt = timeout(bound, open_link(self.transport.as_ref(), &config)).await;

        match attempt {
            Ok(Ok((link, cwd))) => {
                self.link = Some(link);
                self.cwd = cwd.clone();
                self.state = SessionState::Connected;
                info!("Session connected to {} (cwd {})", identity.display(), cwd);
                Ok(cwd)
            }
            Ok(Err(e)) => {
                self.state = SessionState::Disconnected;
                warn!("Connection to {} failed: {}", identity.display(), e);
                Err(e)
            }
            Err(_) => {
                self.state = SessionState::Disconnected;
                warn!(
                    "Connection to {} timed out after {}s",
                    identity.display(),
                    config.timeout_secs
                );
                Err(SessionError::Timeout(format!(
                    "could not connect to {} within {} seconds",
                    identity.display(),
                    config.timeout_secs
                )))
            }
        }
    }

    /// Release both handles. Idempotent; returns whether anything was open.
    pub async fn disconnect(&mut self) -> bool {
        let Some(mut link) = self.link.take() else {
            self.state = SessionState::Disconnected;
            self.cwd = "/".to_string();
            return false;
        };

        link.files.close().await;
        link.connection.close().await;

        self.state = SessionState::Disconnected;
        self.cwd = "/".to_string();
        if let Some(identity) = &self.identity {
            info!("Session disconnected from {}", identity.display());
        }
        true
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// List `path` (working directory when `None`)
    pub async fn list_directory(
        &mut self,
        path: Option<&str>,
    ) -> Result<DirectorySnapshot, SessionError> {
        let target = match path {
            Some(p) => resolve_remote_path(&self.cwd, p),
            None => self.cwd.clone(),
        };
        self.read_snapshot(target).await
    }

    /// Change the working directory after checking the target can be listed.
    ///
    /// Returns the listing of the new directory; the working directory is
    /// unchanged on failure.
    pub async fn change_directory(
        &mut self,
        target: &str,
    ) -> Result<DirectorySnapshot, SessionError> {
        let resolved = resolve_remote_path(&self.cwd, target);
        let snapshot = self.read_snapshot(resolved.clone()).await?;
        debug!("cwd {} -> {}", self.cwd, resolved);
        self.cwd = resolved;
        Ok(snapshot)
    }

    async fn read_snapshot(&mut self, path: String) -> Result<DirectorySnapshot, SessionError> {
        let files = &mut self.link_mut()?.files;
        let entries = files.list_directory(&path).await?;
        debug!("Listed {} entries in {}", entries.len(), path);
        Ok(DirectorySnapshot::new(
            path,
            entries.into_iter().map(DirectoryEntry::from_remote).collect(),
        ))
    }

    // ========================================================================
    // Transfers
    // ========================================================================

    /// Copy a local regular file to `remote_name`; returns the byte count.
    ///
    /// Data lands in `<remote>.part` and is moved over the target with `mv`
    /// only once complete, so a failed upload never touches an existing file.
    pub async fn upload(&mut self, local: &Path, remote_name: &str) -> Result<u64, SessionError> {
        let remote = resolve_remote_path(&self.cwd, remote_name);
        let part = partial_upload_path(&remote);
        let link = self.link_mut()?;

        let metadata = tokio::fs::metadata(local)
            .await
            .map_err(|e| SessionError::local(local, e))?;
        if !metadata.is_file() {
            return Err(SessionError::local(
                local,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        info!("Uploading {} -> {}", local.display(), remote);
        let bytes = match link.files.put_file(local, &part).await {
            Ok(bytes) => bytes,
            Err(e) => {
                discard_remote_partial(link.files.as_mut(), &part).await;
                warn!("Upload of {} failed: {}", local.display(), e);
                return Err(e.into());
            }
        };

        let command = format!("mv {} {}", shell_escape(&part), shell_escape(&remote));
        let moved = match link.connection.run_command(&command).await {
            Ok(raw) => CommandResult::from_raw(command, raw),
            Err(e) => {
                discard_remote_partial(link.files.as_mut(), &part).await;
                return Err(e.into());
            }
        };
        if !moved.success() {
            discard_remote_partial(link.files.as_mut(), &part).await;
            return Err(SessionError::RemoteIo {
                path: remote,
                message: format!(
                    "could not move upload into place (exit code {})",
                    moved.exit_code
                ),
                stderr: Some(moved.stderr),
            });
        }
        Ok(bytes)
    }

    /// Copy `remote_name` to `local`; returns the byte count.
    ///
    /// Data lands in `<local>.part` first and is renamed into place only once
    /// complete, so a failed download never clobbers an existing file. When
    /// `local` is a directory the remote file name is kept.
    pub async fn download(&mut self, remote_name: &str, local: &Path) -> Result<u64, SessionError> {
        let remote = resolve_remote_path(&self.cwd, remote_name);
        let files = &mut self.link_mut()?.files;

        let destination: PathBuf = if tokio::fs::metadata(local)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            local.join(remote_file_name(&remote))
        } else {
            local.to_path_buf()
        };
        let part = partial_download_path(&destination);

        info!("Downloading {} -> {}", remote, destination.display());
        let bytes = match files.get_file(&remote, &part).await {
            Ok(bytes) => bytes,
            Err(e) => {
                discard_partial(&part).await;
                warn!("Download of {} failed: {}", remote, e);
                return Err(e.into());
            }
        };

        if let Err(e) = tokio::fs::rename(&part, &destination).await {
            discard_partial(&part).await;
            return Err(SessionError::local(destination, e));
        }
        Ok(bytes)
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Create a directory; returns its absolute path
    pub async fn make_directory(&mut self, name: &str) -> Result<String, SessionError> {
        let path = resolve_remote_path(&self.cwd, name);
        self.link_mut()?.files.make_directory(&path).await?;
        info!("Created directory {}", path);
        Ok(path)
    }

    /// Remove a file, or an empty directory when `is_directory`; returns the path
    pub async fn remove(&mut self, name: &str, is_directory: bool) -> Result<String, SessionError> {
        let path = resolve_remote_path(&self.cwd, name);
        let files = &mut self.link_mut()?.files;
        if is_directory {
            files.remove_directory(&path).await?;
        } else {
            files.remove_file(&path).await?;
        }
        info!("Removed {}", path);
        Ok(path)
    }

    /// Rename through the remote shell's `mv`
    pub async fn rename(&mut self, old: &str, new: &str) -> Result<(String, String), SessionError> {
        let from = resolve_remote_path(&self.cwd, old);
        let to = resolve_remote_path(&self.cwd, new);
        let command = format!("mv {} {}", shell_escape(&from), shell_escape(&to));

        let raw = self.link_mut()?.connection.run_command(&command).await?;
        let result = CommandResult::from_raw(command, raw);
        if !result.success() {
            return Err(SessionError::RemoteIo {
                path: from,
                message: format!("rename to {} failed with exit code {}", to, result.exit_code),
                stderr: Some(result.stderr),
            });
        }

        info!("Renamed {} -> {}", from, to);
        Ok((from, to))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Run a command verbatim; the caller is trusted
    pub async fn execute(&mut self, command: &str) -> Result<CommandResult, SessionError> {
        let raw = self.link_mut()?.connection.run_command(command).await?;
        let result = CommandResult::from_raw(command, raw);
        debug!("`{}` exited with {}", command, result.exit_code);
        Ok(result)
    }

    pub async fn stat(&mut self, name: &str) -> Result<EntryProperties, SessionError> {
        let path = normalize_remote_path(&resolve_remote_path(&self.cwd, name));
        let attrs = self.link_mut()?.files.stat_entry(&path).await?;
        Ok(EntryProperties::from_attributes(
            remote_file_name(&path),
            path,
            &attrs,
        ))
    }

    /// Overview of the remote host; probes with no output are left out
    pub async fn system_info(&mut self) -> Result<SystemReport, SessionError> {
        let connection = &mut self.link_mut()?.connection;
        let mut report = SystemReport::default();

        for (title, command) in SYSTEM_PROBES {
            let raw = connection.run_command(command).await?;
            let output = String::from_utf8_lossy(&raw.stdout).trim().to_string();
            if output.is_empty() {
                debug!("System probe `{}` produced no output", command);
                continue;
            }
            report.sections.push(ReportSection {
                title: (*title).to_string(),
                output,
            });
        }
        Ok(report)
    }

    fn link_mut(&mut self) -> Result<&mut Link, SessionError> {
        self.link.as_mut().ok_or(SessionError::NotConnected)
    }
}

async fn open_link(
    transport: &dyn Transport,
    config: &ConnectConfig,
) -> Result<(Link, String), SessionError> {
    let mut connection = transport.connect(config).await?;

    let mut files = match connection.open_file_channel().await {
        Ok(files) => files,
        Err(e) => {
            connection.close().await;
            return Err(e.into());
        }
    };

    let cwd = match files.home_directory().await {
        Ok(home) if !home.trim().is_empty() => normalize_remote_path(&home),
        Ok(_) => "/".to_string(),
        Err(e) => {
            debug!("Could not resolve home directory, using /: {}", e);
            "/".to_string()
        }
    };

    Ok((Link { connection, files }, cwd))
}

async fn discard_partial(part: &Path) {
    if let Err(e) = tokio::fs::remove_file(part).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("Could not remove partial download {}: {}", part.display(), e);
        }
    }
}

async fn discard_remote_partial(files: &mut dyn FileChannel, part: &str) {
    if let Err(e) = files.remove_file(part).await {
        debug!("No partial upload to remove at {}: {}", part, e);
    }
}

/// Quote for a POSIX shell: wrap in single quotes, escape embedded ones
fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::error::ErrorKind;
    use crate::ssh::mock::{MockOp, MockTransport, MOCK_MTIME};
    use crate::ssh::AuthMethod;
    use crate::sftp::EntryKind;
    use tempfile::tempdir;

    async fn connected(mock: &MockTransport) -> Session {
        let mut session = Session::new(Arc::new(mock.clone()));
        session.connect(mock.password_config()).await.unwrap();
        session
    }

    #[test]
    fn test_shell_escape() {
        assert_eq!(shell_escape("/tmp/a b"), "'/tmp/a b'");
        assert_eq!(shell_escape("it's"), "'it'\\''s'");
    }

    #[tokio::test]
    async fn test_connect_sets_home_as_cwd() {
        let mock = MockTransport::new();
        let mut session = Session::new(Arc::new(mock.clone()));
        assert_eq!(session.state(), SessionState::Disconnected);

        let cwd = session.connect(mock.password_config()).await.unwrap();
        assert_eq!(cwd, "/home/alice");
        assert_eq!(session.cwd(), "/home/alice");
        assert!(session.is_connected());
        assert_eq!(mock.open_connections(), 1);
        assert_eq!(session.identity().unwrap().display(), "alice@mock.example.com:22");
    }

    #[tokio::test]
    async fn test_connect_falls_back_to_root_without_home() {
        let mock = MockTransport::new();
        mock.set_home("");
        let session = connected(&mock).await;
        assert_eq!(session.cwd(), "/");
    }

    #[tokio::test]
    async fn test_connect_twice_is_rejected() {
        let mock = MockTransport::new();
        let mut session = connected(&mock).await;
        let err = session.connect(mock.password_config()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyConnected);
        assert_eq!(mock.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_connect_bad_password() {
        let mock = MockTransport::new();
        let mut session = Session::new(Arc::new(mock.clone()));
        let config = ConnectConfig::new("mock.example.com", 22, "alice", AuthMethod::password("wrong"));

        let err = session.connect(config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(mock.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_connect_validation_happens_before_transport() {
        let mock = MockTransport::new();
        let mut session = Session::new(Arc::new(mock.clone()));
        let config = ConnectConfig::new("", 22, "alice", AuthMethod::password("secret"));

        let err = session.connect(config).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(mock.connect_attempts(), 0);

        let missing_key = ConnectConfig::new(
            "mock.example.com",
            22,
            "alice",
            AuthMethod::key("/definitely/not/here/id_ed25519", None),
        );
        let err = session.connect(missing_key).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_connect_unreachable_is_transport_error() {
        let mock = MockTransport::new();
        mock.set_unreachable(true);
        let mut session = Session::new(Arc::new(mock.clone()));
        let err = session.connect(mock.password_config()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_missing_sftp_subsystem_releases_connection() {
        let mock = MockTransport::new();
        mock.set_subsystem_missing(true);
        let mut session = Session::new(Arc::new(mock.clone()));

        let err = session.connect(mock.password_config()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(!session.is_connected());
        assert_eq!(mock.open_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let mock = MockTransport::new();
        mock.set_delay(MockOp::OpenChannel, Duration::from_secs(60));
        let mut session = Session::new(Arc::new(mock.clone()));

        let err = session
            .connect(mock.password_config().with_timeout(2))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(session.state(), SessionState::Disconnected);
        // The abandoned attempt dropped its connection
        assert_eq!(mock.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let mock = MockTransport::new();
        let mut session = Session::new(Arc::new(mock));

        assert_eq!(
            session.list_directory(None).await.unwrap_err().kind(),
            ErrorKind::NotConnected
        );
        assert_eq!(
            session.execute("true").await.unwrap_err().kind(),
            ErrorKind::NotConnected
        );
        assert_eq!(
            session.make_directory("x").await.unwrap_err().kind(),
            ErrorKind::NotConnected
        );
        assert_eq!(
            session.upload(Path::new("/nope"), "x").await.unwrap_err().kind(),
            ErrorKind::NotConnected
        );
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let mock = MockTransport::new();
        let mut session = connected(&mock).await;

        assert!(session.disconnect().await);
        assert!(!session.disconnect().await);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.cwd(), "/");
        assert_eq!(mock.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_list_directory_sorted() {
        let mock = MockTransport::new()
            .with_dir("/home/alice/zdir")
            .with_dir("/home/alice/Adir")
            .with_file("/home/alice/b.txt", b"bb")
            .with_file("/home/alice/A.txt", b"a");
        let mut session = connected(&mock).await;

        let snapshot = session.list_directory(None).await.unwrap();
        assert_eq!(snapshot.path, "/home/alice");
        assert_eq!(snapshot.names(), vec!["Adir", "zdir", "A.txt", "b.txt"]);

        let b = snapshot.find("b.txt").unwrap();
        assert_eq!(b.size, 2);
        assert_eq!(b.kind, EntryKind::File);
        assert_eq!(b.permissions, "-rw-r--r--");
        assert_eq!(b.modified.unwrap().timestamp(), i64::from(MOCK_MTIME));

        let root = session.list_directory(Some("/")).await.unwrap();
        assert_eq!(root.names(), vec!["home", "tmp"]);
    }

    #[tokio::test]
    async fn test_change_directory_variants() {
        let mock = MockTransport::new().with_dir("/home/alice/docs");
        let mut session = connected(&mock).await;

        session.change_directory("docs").await.unwrap();
        assert_eq!(session.cwd(), "/home/alice/docs");

        session.change_directory("..").await.unwrap();
        assert_eq!(session.cwd(), "/home/alice");

        let snapshot = session.change_directory("/tmp").await.unwrap();
        assert_eq!(session.cwd(), "/tmp");
        assert_eq!(snapshot.path, "/tmp");

        session.change_directory("/").await.unwrap();
        session.change_directory("..").await.unwrap();
        assert_eq!(session.cwd(), "/");
    }

    #[tokio::test]
    async fn test_change_directory_failure_keeps_cwd() {
        let mock = MockTransport::new().with_file("/home/alice/file.txt", b"x");
        let mut session = connected(&mock).await;

        let err = session.change_directory("missing").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteIo);
        assert_eq!(session.cwd(), "/home/alice");

        let err = session.change_directory("file.txt").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteIo);
        assert_eq!(session.cwd(), "/home/alice");
    }

    #[tokio::test]
    async fn test_upload_and_download_are_byte_exact() {
        let mock = MockTransport::new();
        let mut session = connected(&mock).await;
        let dir = tempdir().unwrap();

        let payload: Vec<u8> = (0..=255u8).cycle().take(200_000).collect();
        let local = dir.path().join("data.bin");
        std::fs::write(&local, &payload).unwrap();

        let sent = session.upload(&local, "data.bin").await.unwrap();
        assert_eq!(sent, payload.len() as u64);
        assert_eq!(mock.file("/home/alice/data.bin").unwrap(), payload);

        let back = dir.path().join("back.bin");
        let received = session.download("data.bin", &back).await.unwrap();
        assert_eq!(received, payload.len() as u64);
        assert_eq!(std::fs::read(&back).unwrap(), payload);
        assert!(!partial_download_path(&back).exists());
    }

    #[tokio::test]
    async fn test_download_into_directory_keeps_name() {
        let mock = MockTransport::new().with_file("/tmp/report.txt", b"report");
        let mut session = connected(&mock).await;
        let dir = tempdir().unwrap();

        session.download("/tmp/report.txt", dir.path()).await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("report.txt")).unwrap(), b"report");
    }

    #[tokio::test]
    async fn test_failed_download_preserves_existing_file() {
        let mock = MockTransport::new().with_file("/home/alice/big.bin", &[7u8; 4096]);
        mock.fail_get_after(1000);
        let mut session = connected(&mock).await;
        let dir = tempdir().unwrap();
        let local = dir.path().join("big.bin");
        std::fs::write(&local, b"previous contents").unwrap();

        let err = session.download("big.bin", &local).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteIo);
        assert_eq!(std::fs::read(&local).unwrap(), b"previous contents");
        assert!(!partial_download_path(&local).exists());
    }

    #[tokio::test]
    async fn test_download_missing_remote() {
        let mock = MockTransport::new();
        let mut session = connected(&mock).await;
        let dir = tempdir().unwrap();
        let local = dir.path().join("nothing");

        let err = session.download("nothing", &local).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteIo);
        assert!(!local.exists());
    }

    #[tokio::test]
    async fn test_download_to_unwritable_location_is_local_error() {
        let mock = MockTransport::new().with_file("/tmp/a", b"a");
        let mut session = connected(&mock).await;
        let dir = tempdir().unwrap();
        let local = dir.path().join("no").join("such").join("dir").join("a");

        let err = session.download("/tmp/a", &local).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LocalIo);
    }

    #[tokio::test]
    async fn test_upload_local_failures() {
        let mock = MockTransport::new();
        let mut session = connected(&mock).await;
        let dir = tempdir().unwrap();

        let err = session
            .upload(&dir.path().join("missing.txt"), "missing.txt")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LocalIo);

        let err = session.upload(dir.path(), "dir").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LocalIo);
        assert!(mock.file("/home/alice/dir").is_none());
    }

    #[tokio::test]
    async fn test_failed_upload_removes_partial_remote_file() {
        let mock = MockTransport::new();
        mock.fail_put_after(10);
        let mut session = connected(&mock).await;
        let dir = tempdir().unwrap();
        let local = dir.path().join("up.txt");
        std::fs::write(&local, vec![1u8; 100]).unwrap();

        let err = session.upload(&local, "up.txt").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteIo);
        assert!(mock.file("/home/alice/up.txt").is_none());
        assert!(mock.file("/home/alice/up.txt.part").is_none());
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_existing_remote_file() {
        let dir = tempdir().unwrap();
        let local = dir.path().join("important.db");
        std::fs::write(&local, vec![9u8; 100]).unwrap();

        // Connection drops part-way through the write
        let mock = MockTransport::new().with_file("/home/alice/important.db", b"original");
        mock.fail_put_after(10);
        let mut session = connected(&mock).await;
        session.upload(&local, "important.db").await.unwrap_err();
        assert_eq!(mock.file("/home/alice/important.db").unwrap(), b"original");
        assert!(mock.file("/home/alice/important.db.part").is_none());

        // Server refuses the write before any byte is sent
        let mock = MockTransport::new().with_file("/home/alice/important.db", b"original");
        mock.set_put_denied(true);
        let mut session = connected(&mock).await;
        let err = session.upload(&local, "important.db").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteIo);
        assert_eq!(mock.file("/home/alice/important.db").unwrap(), b"original");
        assert!(mock.commands().is_empty());
    }

    #[tokio::test]
    async fn test_upload_replaces_existing_file_once_complete() {
        let mock = MockTransport::new().with_file("/home/alice/notes.txt", b"old");
        let mut session = connected(&mock).await;
        let dir = tempdir().unwrap();
        let local = dir.path().join("notes.txt");
        std::fs::write(&local, b"new contents").unwrap();

        assert_eq!(session.upload(&local, "notes.txt").await.unwrap(), 12);
        assert_eq!(mock.file("/home/alice/notes.txt").unwrap(), b"new contents");
        assert!(mock.file("/home/alice/notes.txt.part").is_none());
        assert_eq!(
            mock.commands(),
            vec!["mv '/home/alice/notes.txt.part' '/home/alice/notes.txt'"]
        );
    }

    #[tokio::test]
    async fn test_mutations() {
        let mock = MockTransport::new().with_file("/home/alice/old.txt", b"x");
        let mut session = connected(&mock).await;

        assert_eq!(session.make_directory("new").await.unwrap(), "/home/alice/new");
        assert!(mock.has_dir("/home/alice/new"));
        assert_eq!(
            session.make_directory("new").await.unwrap_err().kind(),
            ErrorKind::RemoteIo
        );

        session.rename("old.txt", "new/moved.txt").await.unwrap();
        assert!(mock.file("/home/alice/old.txt").is_none());
        assert_eq!(mock.file("/home/alice/new/moved.txt").unwrap(), b"x");
        assert_eq!(
            mock.commands().last().unwrap(),
            "mv '/home/alice/old.txt' '/home/alice/new/moved.txt'"
        );

        // Directory not empty
        assert_eq!(
            session.remove("new", true).await.unwrap_err().kind(),
            ErrorKind::RemoteIo
        );
        session.remove("new/moved.txt", false).await.unwrap();
        session.remove("new", true).await.unwrap();
        assert!(!mock.has_dir("/home/alice/new"));
    }

    #[tokio::test]
    async fn test_rename_failure_carries_stderr() {
        let mock = MockTransport::new();
        let mut session = connected(&mock).await;

        let err = session.rename("ghost", "spirit").await.unwrap_err();
        match err {
            SessionError::RemoteIo { path, stderr, .. } => {
                assert_eq!(path, "/home/alice/ghost");
                assert!(stderr.unwrap().contains("No such file or directory"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_rename_with_quotes_in_name() {
        let mock = MockTransport::new().with_file("/tmp/it's.txt", b"q");
        let mut session = connected(&mock).await;

        session.rename("/tmp/it's.txt", "/tmp/plain.txt").await.unwrap();
        assert_eq!(mock.file("/tmp/plain.txt").unwrap(), b"q");
    }

    #[tokio::test]
    async fn test_execute_captures_output() {
        let mock = MockTransport::new();
        let mut session = connected(&mock).await;

        let result = session.execute("true").await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(result.stderr.is_empty());
        assert!(result.success());

        let result = session.execute("false").await.unwrap();
        assert_ne!(result.exit_code, 0);
        assert!(!result.success());

        let result = session.execute("echo hello world").await.unwrap();
        assert_eq!(result.stdout, "hello world\n");
        assert_eq!(result.exit_code, 0);

        let result = session.execute("warn careful").await.unwrap();
        assert_eq!(result.stderr, "careful\n");
        assert_eq!(result.exit_code, 2);

        let result = session.execute("crash").await.unwrap();
        assert_eq!(result.exit_code, -1);

        let result = session.execute("no-such-tool").await.unwrap();
        assert_eq!(result.exit_code, 127);
    }

    #[tokio::test]
    async fn test_stat() {
        let mock = MockTransport::new().with_file("/home/alice/notes.md", b"12345");
        let mut session = connected(&mock).await;

        let props = session.stat("notes.md").await.unwrap();
        assert_eq!(props.name, "notes.md");
        assert_eq!(props.path, "/home/alice/notes.md");
        assert_eq!(props.size, 5);
        assert_eq!(props.kind, EntryKind::File);
        assert!(props.accessed.is_some());

        let dir = session.stat("..").await.unwrap();
        assert_eq!(dir.path, "/home");
        assert_eq!(dir.kind, EntryKind::Directory);

        assert_eq!(
            session.stat("missing").await.unwrap_err().kind(),
            ErrorKind::RemoteIo
        );
    }

    #[tokio::test]
    async fn test_system_info_skips_empty_probes() {
        let mock = MockTransport::new();
        let mut session = connected(&mock).await;

        let report = session.system_info().await.unwrap();
        let titles: Vec<&str> = report.sections.iter().map(|s| s.title.as_str()).collect();
        // The mock has no grep, so the CPU probe is empty
        assert_eq!(titles, vec!["System", "Disk usage", "Memory", "Load"]);
        assert!(report.section("System").unwrap().starts_with("Linux"));
    }
}
