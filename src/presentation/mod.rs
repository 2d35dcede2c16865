//! Presentation layer
//!
//! Command-line front end over the command bridge.

pub mod cli;
