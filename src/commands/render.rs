//! Plain-text rendering of session events

use std::fmt::Write;

use chrono::{DateTime, Local, Utc};

use crate::router::{Event, EventEnvelope};
use crate::session::{CommandResult, SystemReport};
use crate::sftp::{format_size, DirectorySnapshot, EntryProperties};

pub fn render_envelope(envelope: &EventEnvelope) -> String {
    render_event(&envelope.event)
}

pub fn render_event(event: &Event) -> String {
    match event {
        Event::StatusUpdate { message } => format!("... {}", message),
        Event::Success { message } => format!("ok: {}", message),
        Event::Error { kind, message } => format!("error [{}]: {}", kind.as_str(), message),
        Event::DirectorySnapshot(snapshot) => render_snapshot(snapshot),
        Event::CommandResult(result) => render_command(result),
        Event::PropertiesResult(props) => render_properties(props),
        Event::SystemInfo(report) => render_report(report),
    }
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn render_snapshot(snapshot: &DirectorySnapshot) -> String {
    let mut out = format!("{} ({} entries)", snapshot.path, snapshot.entries.len());
    for entry in &snapshot.entries {
        let size = if entry.kind.is_dir() {
            "-".to_string()
        } else {
            format_size(entry.size)
        };
        let suffix = if entry.kind.is_dir() { "/" } else { "" };
        let _ = write!(
            out,
            "\n{}  {:>10}  {:<16}  {}{}",
            entry.permissions,
            size,
            format_time(entry.modified),
            entry.name,
            suffix
        );
    }
    out
}

fn render_command(result: &CommandResult) -> String {
    let mut out = format!("$ {}", result.command);
    for stream in [&result.stdout, &result.stderr] {
        let text = stream.trim_end();
        if !text.is_empty() {
            out.push('\n');
            out.push_str(text);
        }
    }
    let _ = write!(out, "\n[exit {}]", result.exit_code);
    out
}

fn render_properties(props: &EntryProperties) -> String {
    format!(
        "Name:        {}\nPath:        {}\nType:        {}\nSize:        {} ({} bytes)\nPermissions: {}\nModified:    {}\nAccessed:    {}",
        props.name,
        props.path,
        if props.kind.is_dir() { "directory" } else { "file" },
        format_size(props.size),
        props.size,
        props.permissions,
        format_time(props.modified),
        format_time(props.accessed),
    )
}

fn render_report(report: &SystemReport) -> String {
    let mut out = String::from("Remote system information\n");
    out.push_str(&"=".repeat(50));
    for section in &report.sections {
        let _ = write!(out, "\n\n{}:\n{}", section.title, section.output);
    }
    out
}
