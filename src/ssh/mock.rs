//! In-memory transport for tests
//!
//! Implements the collaborator traits over a fake filesystem shared by every
//! connection the transport hands out. Tests keep a clone of `MockTransport`
//! to seed files, inject delays and failures, and inspect the result.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::config::{AuthMethod, ConnectConfig};
use super::error::SshError;
use super::transport::{Connection, FileChannel, RawCommandOutput, Transport};
use crate::sftp::path_utils::{normalize_remote_path, parent_remote_path};
use crate::sftp::types::{RemoteAttributes, RemoteEntry};

pub(crate) const MOCK_PASSWORD: &str = "secret";
pub(crate) const MOCK_MTIME: u32 = 1_700_000_000;
pub(crate) const MOCK_ATIME: u32 = 1_700_000_600;

/// Operations a delay can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum MockOp {
    Connect,
    OpenChannel,
    List,
    Stat,
    Get,
    Put,
    Mkdir,
    Remove,
    Command,
}

struct MockState {
    password: String,
    home: String,
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    delays: HashMap<MockOp, Duration>,
    unreachable: bool,
    subsystem_missing: bool,
    fail_get_after: Option<usize>,
    fail_put_after: Option<usize>,
    put_denied: bool,
    connect_attempts: usize,
    open_connections: usize,
    commands: Vec<String>,
}

impl MockState {
    fn is_dir(&self, path: &str) -> bool {
        self.dirs.contains(path)
    }

    fn exists(&self, path: &str) -> bool {
        self.is_dir(path) || self.files.contains_key(path)
    }

    fn children(&self, dir: &str) -> Vec<RemoteEntry> {
        let is_child = |path: &str| path != dir && parent_remote_path(path) == dir;
        let mut entries: Vec<RemoteEntry> = self
            .dirs
            .iter()
            .filter(|p| is_child(p))
            .map(|p| RemoteEntry {
                name: file_name(p),
                attrs: dir_attrs(),
            })
            .collect();
        entries.extend(
            self.files
                .iter()
                .filter(|(p, _)| is_child(p))
                .map(|(p, data)| RemoteEntry {
                    name: file_name(p),
                    attrs: file_attrs(data.len()),
                }),
        );
        entries
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), String> {
        if !self.exists(from) {
            return Err(format!(
                "mv: cannot stat '{}': No such file or directory\n",
                from
            ));
        }
        if !self.is_dir(&parent_remote_path(to)) {
            return Err(format!(
                "mv: cannot move '{}' to '{}': No such file or directory\n",
                from, to
            ));
        }

        if let Some(data) = self.files.remove(from) {
            self.files.insert(to.to_string(), data);
            return Ok(());
        }

        let prefix = format!("{}/", from);
        let moved_dirs: Vec<String> = self
            .dirs
            .iter()
            .filter(|d| *d == from || d.starts_with(&prefix))
            .cloned()
            .collect();
        for dir in moved_dirs {
            self.dirs.remove(&dir);
            self.dirs.insert(format!("{}{}", to, &dir[from.len()..]));
        }
        let moved_files: Vec<String> = self
            .files
            .keys()
            .filter(|f| f.starts_with(&prefix))
            .cloned()
            .collect();
        for file in moved_files {
            if let Some(data) = self.files.remove(&file) {
                self.files
                    .insert(format!("{}{}", to, &file[from.len()..]), data);
            }
        }
        Ok(())
    }
}

fn file_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or_default().to_string()
}

fn dir_attrs() -> RemoteAttributes {
    RemoteAttributes {
        size: Some(4096),
        permissions: Some(0o040755),
        mtime: Some(MOCK_MTIME),
        atime: Some(MOCK_ATIME),
    }
}

fn file_attrs(len: usize) -> RemoteAttributes {
    RemoteAttributes {
        size: Some(len as u64),
        permissions: Some(0o100644),
        mtime: Some(MOCK_MTIME),
        atime: Some(MOCK_ATIME),
    }
}

/// Transport whose connections all share one fake server
#[derive(Clone)]
pub(crate) struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        let dirs = ["/", "/home", "/home/alice", "/tmp"]
            .into_iter()
            .map(String::from)
            .collect();
        Self {
            state: Arc::new(Mutex::new(MockState {
                password: MOCK_PASSWORD.to_string(),
                home: "/home/alice".to_string(),
                dirs,
                files: BTreeMap::new(),
                delays: HashMap::new(),
                unreachable: false,
                subsystem_missing: false,
                fail_get_after: None,
                fail_put_after: None,
                put_denied: false,
                connect_attempts: 0,
                open_connections: 0,
                commands: Vec::new(),
            })),
        }
    }

    pub fn with_file(self, path: &str, data: &[u8]) -> Self {
        self.add_file(path, data);
        self
    }

    pub fn with_dir(self, path: &str) -> Self {
        self.state.lock().dirs.insert(normalize_remote_path(path));
        self
    }

    pub fn add_file(&self, path: &str, data: &[u8]) {
        self.state
            .lock()
            .files
            .insert(normalize_remote_path(path), data.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state.lock().is_dir(path)
    }

    pub fn set_home(&self, home: &str) {
        self.state.lock().home = home.to_string();
    }

    pub fn set_delay(&self, op: MockOp, delay: Duration) {
        self.state.lock().delays.insert(op, delay);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    pub fn set_subsystem_missing(&self, missing: bool) {
        self.state.lock().subsystem_missing = missing;
    }

    /// Downloads fail after writing `bytes` bytes locally
    pub fn fail_get_after(&self, bytes: usize) {
        self.state.lock().fail_get_after = Some(bytes);
    }

    /// Uploads fail after storing `bytes` bytes remotely
    pub fn fail_put_after(&self, bytes: usize) {
        self.state.lock().fail_put_after = Some(bytes);
    }

    /// Uploads are refused at open, before anything is written
    pub fn set_put_denied(&self, denied: bool) {
        self.state.lock().put_denied = denied;
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.lock().connect_attempts
    }

    pub fn open_connections(&self) -> usize {
        self.state.lock().open_connections
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    pub fn password_config(&self) -> ConnectConfig {
        ConnectConfig::new(
            "mock.example.com",
            22,
            "alice",
            AuthMethod::password(MOCK_PASSWORD),
        )
    }
}

async fn pause(state: &Arc<Mutex<MockState>>, op: MockOp) {
    let delay = state.lock().delays.get(&op).copied();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, config: &ConnectConfig) -> Result<Box<dyn Connection>, SshError> {
        self.state.lock().connect_attempts += 1;
        pause(&self.state, MockOp::Connect).await;

        let mut state = self.state.lock();
        if state.unreachable {
            return Err(SshError::ConnectionFailed(format!(
                "{}:{}: connection refused",
                config.host, config.port
            )));
        }
        if let AuthMethod::Password { password } = &config.auth {
            if *password != state.password {
                return Err(SshError::AuthenticationFailed(format!(
                    "server rejected credentials for {}",
                    config.username
                )));
            }
        }
        state.open_connections += 1;

        Ok(Box::new(MockConnection {
            state: self.state.clone(),
            open: true,
        }))
    }
}

struct MockConnection {
    state: Arc<Mutex<MockState>>,
    open: bool,
}

#[async_trait]
impl Connection for MockConnection {
    async fn open_file_channel(&mut self) -> Result<Box<dyn FileChannel>, SshError> {
        pause(&self.state, MockOp::OpenChannel).await;
        if self.state.lock().subsystem_missing {
            return Err(SshError::SubsystemNotAvailable(
                "subsystem request failed".to_string(),
            ));
        }
        Ok(Box::new(MockFileChannel {
            state: self.state.clone(),
        }))
    }

    async fn run_command(&mut self, command: &str) -> Result<RawCommandOutput, SshError> {
        pause(&self.state, MockOp::Command).await;
        let mut state = self.state.lock();
        state.commands.push(command.to_string());
        Ok(interpret(&mut state, command))
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            self.state.lock().open_connections -= 1;
        }
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        if self.open {
            self.state.lock().open_connections -= 1;
        }
    }
}

fn output(stdout: &str, stderr: &str, exit_status: Option<u32>) -> RawCommandOutput {
    RawCommandOutput {
        stdout: stdout.as_bytes().to_vec(),
        stderr: stderr.as_bytes().to_vec(),
        exit_status,
    }
}

fn interpret(state: &mut MockState, command: &str) -> RawCommandOutput {
    let words = shell_words(command);
    let Some(program) = words.first() else {
        return output("", "", Some(0));
    };

    match program.as_str() {
        "true" => output("", "", Some(0)),
        "false" => output("", "", Some(1)),
        "echo" => output(&format!("{}\n", words[1..].join(" ")), "", Some(0)),
        "warn" => output("", &format!("{}\n", words[1..].join(" ")), Some(2)),
        // Simulates a process killed by a signal: no exit-status message
        "crash" => output("partial", "", None),
        "uname" => output("Linux mock 6.1.0-13-amd64 x86_64 GNU/Linux\n", "", Some(0)),
        "uptime" => output(" 10:00:00 up 3 days,  2 users,  load average: 0.00\n", "", Some(0)),
        "df" => output("Filesystem  Size  Used Avail Use% Mounted on\n/dev/sda1  20G  5G  15G  25% /\n", "", Some(0)),
        "free" => output("Mem:  2.0Gi  1.0Gi  1.0Gi\n", "", Some(0)),
        "mv" if words.len() == 3 => match state.rename(&words[1], &words[2]) {
            Ok(()) => output("", "", Some(0)),
            Err(stderr) => output("", &stderr, Some(1)),
        },
        other => output("", &format!("sh: 1: {}: not found\n", other), Some(127)),
    }
}

/// Minimal POSIX word splitting: single quotes, double quotes, backslashes
fn shell_words(command: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                for q in chars.by_ref() {
                    if q == '\'' {
                        break;
                    }
                    current.push(q);
                }
            }
            '"' => {
                in_word = true;
                while let Some(q) = chars.next() {
                    match q {
                        '"' => break,
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                current.push(escaped);
                            }
                        }
                        other => current.push(other),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            other => {
                in_word = true;
                current.push(other);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

struct MockFileChannel {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl FileChannel for MockFileChannel {
    async fn home_directory(&mut self) -> Result<String, SshError> {
        Ok(self.state.lock().home.clone())
    }

    async fn list_directory(&mut self, path: &str) -> Result<Vec<RemoteEntry>, SshError> {
        pause(&self.state, MockOp::List).await;
        let state = self.state.lock();
        if !state.is_dir(path) {
            return Err(SshError::NotFound(path.to_string()));
        }
        Ok(state.children(path))
    }

    async fn stat_entry(&mut self, path: &str) -> Result<RemoteAttributes, SshError> {
        pause(&self.state, MockOp::Stat).await;
        let state = self.state.lock();
        if state.is_dir(path) {
            Ok(dir_attrs())
        } else if let Some(data) = state.files.get(path) {
            Ok(file_attrs(data.len()))
        } else {
            Err(SshError::NotFound(path.to_string()))
        }
    }

    async fn get_file(&mut self, remote: &str, local: &Path) -> Result<u64, SshError> {
        pause(&self.state, MockOp::Get).await;
        let (data, fail_after) = {
            let state = self.state.lock();
            let data = state
                .files
                .get(remote)
                .cloned()
                .ok_or_else(|| SshError::NotFound(remote.to_string()))?;
            (data, state.fail_get_after)
        };

        let written = fail_after.map_or(data.len(), |n| n.min(data.len()));
        tokio::fs::write(local, &data[..written])
            .await
            .map_err(|e| SshError::local_io(local, e))?;

        if fail_after.is_some() {
            return Err(SshError::Sftp {
                path: remote.to_string(),
                message: "connection lost during read".to_string(),
            });
        }
        Ok(data.len() as u64)
    }

    async fn put_file(&mut self, local: &Path, remote: &str) -> Result<u64, SshError> {
        pause(&self.state, MockOp::Put).await;
        let data = tokio::fs::read(local)
            .await
            .map_err(|e| SshError::local_io(local, e))?;

        let mut state = self.state.lock();
        if state.put_denied {
            return Err(SshError::PermissionDenied(remote.to_string()));
        }
        if !state.is_dir(&parent_remote_path(remote)) {
            return Err(SshError::NotFound(remote.to_string()));
        }
        if state.is_dir(remote) {
            return Err(SshError::Sftp {
                path: remote.to_string(),
                message: "Failure".to_string(),
            });
        }

        if let Some(n) = state.fail_put_after {
            let partial = data[..n.min(data.len())].to_vec();
            state.files.insert(remote.to_string(), partial);
            return Err(SshError::Sftp {
                path: remote.to_string(),
                message: "connection lost during write".to_string(),
            });
        }

        let len = data.len() as u64;
        state.files.insert(remote.to_string(), data);
        Ok(len)
    }

    async fn make_directory(&mut self, path: &str) -> Result<(), SshError> {
        pause(&self.state, MockOp::Mkdir).await;
        let mut state = self.state.lock();
        if state.exists(path) {
            return Err(SshError::Sftp {
                path: path.to_string(),
                message: "Failure".to_string(),
            });
        }
        if !state.is_dir(&parent_remote_path(path)) {
            return Err(SshError::NotFound(path.to_string()));
        }
        state.dirs.insert(path.to_string());
        Ok(())
    }

    async fn remove_file(&mut self, path: &str) -> Result<(), SshError> {
        pause(&self.state, MockOp::Remove).await;
        self.state
            .lock()
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| SshError::NotFound(path.to_string()))
    }

    async fn remove_directory(&mut self, path: &str) -> Result<(), SshError> {
        pause(&self.state, MockOp::Remove).await;
        let mut state = self.state.lock();
        if !state.is_dir(path) {
            return Err(SshError::NotFound(path.to_string()));
        }
        if path == "/" || !state.children(path).is_empty() {
            return Err(SshError::Sftp {
                path: path.to_string(),
                message: "Failure".to_string(),
            });
        }
        state.dirs.remove(path);
        Ok(())
    }

    async fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_words() {
        assert_eq!(shell_words("mv 'a b' c"), vec!["mv", "a b", "c"]);
        assert_eq!(shell_words(r#"echo "x \"y\"" z"#), vec!["echo", "x \"y\"", "z"]);
        assert_eq!(shell_words(r"mv 'it'\''s' x"), vec!["mv", "it's", "x"]);
        assert_eq!(shell_words("echo ''"), vec!["echo", ""]);
        assert!(shell_words("   ").is_empty());
    }

    #[tokio::test]
    async fn test_mock_rename_moves_directory_tree() {
        let mock = MockTransport::new()
            .with_dir("/tmp/src")
            .with_file("/tmp/src/a.txt", b"a");
        let mut conn = mock.connect(&mock.password_config()).await.unwrap();

        let out = conn.run_command("mv '/tmp/src' '/tmp/dst'").await.unwrap();
        assert_eq!(out.exit_status, Some(0));
        assert!(mock.has_dir("/tmp/dst"));
        assert_eq!(mock.file("/tmp/dst/a.txt"), Some(b"a".to_vec()));
        assert!(mock.file("/tmp/src/a.txt").is_none());

        conn.close().await;
        assert_eq!(mock.open_connections(), 0);
    }
}
