//! Command-line interface: argument parsing and configuration resolution

pub mod args;
pub mod config;

pub use args::{Args, Command, DEFAULT_QUEUE};
pub use config::{AppConfig, ConfigError, QueueBackend};

#[cfg(test)]
mod tests;
