//! Remote path utilities
//!
//! Remote SFTP paths always use `/` as separator, even on Windows servers.
//! Everything here is lexical; nothing touches the network.

use std::path::{Path, PathBuf};

/// Check if a remote SFTP path is absolute.
pub fn is_absolute_remote_path(path: &str) -> bool {
    path.starts_with('/')
}

/// Join remote SFTP path components using `/` separator.
pub fn join_remote_path(base: &str, component: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, component)
    } else {
        format!("{}/{}", base, component)
    }
}

/// Collapse `.`, `..` and repeated slashes of an absolute path.
///
/// `..` never climbs above `/`.
pub fn normalize_remote_path(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Parent directory, clamped at `/`
pub fn parent_remote_path(path: &str) -> String {
    let normalized = normalize_remote_path(path);
    match normalized.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => normalized[..idx].to_string(),
    }
}

/// Resolve `target` against the working directory `cwd`.
///
/// Absolute targets replace `cwd`, relative ones are joined to it.
pub fn resolve_remote_path(cwd: &str, target: &str) -> String {
    let target = target.trim();
    if target.is_empty() {
        normalize_remote_path(cwd)
    } else if is_absolute_remote_path(target) {
        normalize_remote_path(target)
    } else {
        normalize_remote_path(&join_remote_path(cwd, target))
    }
}

/// Final component of a remote path (`/` for the root)
pub fn remote_file_name(path: &str) -> String {
    let normalized = normalize_remote_path(path);
    match normalized.rsplit('/').next() {
        Some("") | None => "/".to_string(),
        Some(name) => name.to_string(),
    }
}

/// Sibling temporary path a download is written to before it is renamed
/// into place: `dir/name` becomes `dir/name.part`.
pub fn partial_download_path(local: &Path) -> PathBuf {
    let mut name = local
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "download".into());
    name.push(".part");
    local.with_file_name(name)
}

/// Remote counterpart of `partial_download_path`
pub fn partial_upload_path(remote: &str) -> String {
    format!("{}.part", remote.trim_end_matches('/'))
}
