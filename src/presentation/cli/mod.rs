//! CLI module

mod commands;
mod progress;

pub use commands::{Cli, Commands, ModeArg};
pub use progress::ProgressReporter;
