//! SFTP file management module
//!
//! Directory listings, entry properties and whole-file transfers over the
//! SFTP subsystem of an established connection.

pub mod channel;
pub mod path_utils;
pub mod types;

pub use channel::RusshFileChannel;
pub use types::*;
