//! Configuration Management Module
//!
//! Persistent application settings: connection defaults, host key policy,
//! worker tuning and the log filter.

pub mod storage;
pub mod types;

pub use storage::{config_dir, config_file, ConfigStorage, StorageError};
pub use types::{AppConfig, ConnectionDefaults, CONFIG_VERSION};
