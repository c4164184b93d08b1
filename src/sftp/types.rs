//! SFTP data types

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File type bits of a POSIX mode
const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFREG: u32 = 0o100000;
const S_IFLNK: u32 = 0o120000;
const S_IFCHR: u32 = 0o020000;
const S_IFBLK: u32 = 0o060000;
const S_IFIFO: u32 = 0o010000;
const S_IFSOCK: u32 = 0o140000;

/// Attributes as reported by the server
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoteAttributes {
    pub size: Option<u64>,
    /// Full POSIX mode, type bits included
    pub permissions: Option<u32>,
    pub mtime: Option<u32>,
    pub atime: Option<u32>,
}

impl RemoteAttributes {
    pub fn is_dir(&self) -> bool {
        self.permissions
            .map(|mode| mode & S_IFMT == S_IFDIR)
            .unwrap_or(false)
    }

    pub fn kind(&self) -> EntryKind {
        if self.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }

    pub fn permission_string(&self) -> String {
        self.permissions
            .map(format_mode)
            .unwrap_or_else(|| "?---------".to_string())
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.mtime.and_then(unix_time)
    }

    pub fn accessed(&self) -> Option<DateTime<Utc>> {
        self.atime.and_then(unix_time)
    }
}

/// One raw directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub attrs: RemoteAttributes,
}

/// Entry kind; carried as data from the listing through to every consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

impl EntryKind {
    pub fn is_dir(self) -> bool {
        self == EntryKind::Directory
    }
}

/// One row of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub size: u64,
    pub kind: EntryKind,
    /// `ls -l` style, e.g. `drwxr-xr-x`
    pub permissions: String,
    pub modified: Option<DateTime<Utc>>,
}

impl DirectoryEntry {
    pub fn from_remote(entry: RemoteEntry) -> Self {
        Self {
            size: entry.attrs.size.unwrap_or(0),
            kind: entry.attrs.kind(),
            permissions: entry.attrs.permission_string(),
            modified: entry.attrs.modified(),
            name: entry.name,
        }
    }
}

/// Listing of one directory at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    /// Absolute path that was listed
    pub path: String,
    pub entries: Vec<DirectoryEntry>,
}

impl DirectorySnapshot {
    /// Build a snapshot, sorting directories first then by name ignoring case
    pub fn new(path: impl Into<String>, mut entries: Vec<DirectoryEntry>) -> Self {
        entries.sort_by(compare_entries);
        Self {
            path: path.into(),
            entries,
        }
    }

    pub fn find(&self, name: &str) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }
}

/// Listing order: directories first, then case-insensitive name, then exact name
pub fn compare_entries(a: &DirectoryEntry, b: &DirectoryEntry) -> Ordering {
    b.kind
        .is_dir()
        .cmp(&a.kind.is_dir())
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}

/// Properties of a single entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryProperties {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub kind: EntryKind,
    pub permissions: String,
    pub modified: Option<DateTime<Utc>>,
    pub accessed: Option<DateTime<Utc>>,
}

impl EntryProperties {
    pub fn from_attributes(name: String, path: String, attrs: &RemoteAttributes) -> Self {
        Self {
            name,
            path,
            size: attrs.size.unwrap_or(0),
            kind: attrs.kind(),
            permissions: attrs.permission_string(),
            modified: attrs.modified(),
            accessed: attrs.accessed(),
        }
    }
}

/// Human-readable size: `0 B`, `512 B`, `1.5 KB`, `2.0 GB`
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

fn unix_time(secs: u32) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(i64::from(secs), 0)
}

/// Render a POSIX mode the way `ls -l` does
pub fn format_mode(mode: u32) -> String {
    let type_char = match mode & S_IFMT {
        S_IFDIR => 'd',
        S_IFLNK => 'l',
        S_IFCHR => 'c',
        S_IFBLK => 'b',
        S_IFIFO => 'p',
        S_IFSOCK => 's',
        S_IFREG => '-',
        _ => '?',
    };

    let mut out = String::with_capacity(10);
    out.push(type_char);

    // (read, write, exec, special bit, special char when exec set, when unset)
    let triads = [
        (0o400, 0o200, 0o100, 0o4000, 's', 'S'),
        (0o040, 0o020, 0o010, 0o2000, 's', 'S'),
        (0o004, 0o002, 0o001, 0o1000, 't', 'T'),
    ];
    for (r, w, x, special, set_exec, set_noexec) in triads {
        out.push(if mode & r != 0 { 'r' } else { '-' });
        out.push(if mode & w != 0 { 'w' } else { '-' });
        let exec = mode & x != 0;
        out.push(match (mode & special != 0, exec) {
            (true, true) => set_exec,
            (true, false) => set_noexec,
            (false, true) => 'x',
            (false, false) => '-',
        });
    }
    out
}
