pub mod completions;
pub mod config;
pub mod service;
pub mod timers;

/// Error type returned by every command.
pub type CmdResult = Result<(), Box<dyn std::error::Error>>;
