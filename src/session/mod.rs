//! Session Management Module
//!
//! A session is one authenticated connection plus its SFTP channel, with:
//! - An explicit state machine (disconnected, connecting, connected)
//! - A remote working directory that relative names resolve against
//! - Directory, transfer, mutation and command operations

mod ops;
pub mod error;
pub mod types;

pub use ops::Session;
pub use error::{ErrorKind, SessionError};
pub use types::{
    CommandResult, ReportSection, SessionIdentity, SessionState, SystemReport, UNKNOWN_EXIT_CODE,
};
