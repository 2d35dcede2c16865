//! salvage - find and restore deleted files
//!
//! Enumerates volumes, sweeps raw device bytes for known file signatures,
//! streams each bounded candidate to the consumer and restores selected
//! candidates to a destination directory.

pub mod application;
pub mod bridge;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use bridge::{Bridge, BridgeError, FolderPicker, NoFolderPicker};
pub use config::{Config, ConfigError, LogLevel};
