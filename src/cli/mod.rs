//! CLI components.

pub mod runner;

pub use runner::{parse_command, Command, SessionRunner};
