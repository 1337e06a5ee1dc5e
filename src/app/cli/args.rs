//! Command-line arguments
//!
//! Global flags override the configuration file and the environment; each
//! subcommand carries only what it needs.

use crate::app::cli::config::QueueBackend;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const DEFAULT_QUEUE: &str = "messages";

#[derive(Parser, Debug, Clone)]
#[command(name = "courier")]
#[command(about = "Publish and consume messages over an in-process or AMQP-backed queue")]
#[command(version, long_version = crate::core::version::long_version())]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config-file", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Queue backend
    #[arg(short = 'b', long = "backend", value_name = "BACKEND", global = true)]
    pub backend: Option<QueueBackend>,

    /// AMQP broker URL (overrides RABBITMQ_URL)
    #[arg(short = 'u', long = "broker-url", value_name = "URL", global = true)]
    pub broker_url: Option<String>,

    /// Log level
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL", global = true,
          value_parser = ["trace", "debug", "info", "warn", "error", "off"])]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(short = 'o', long = "log-format", value_name = "FORMAT", global = true,
          value_parser = ["text", "ext", "json"])]
    pub log_format: Option<String>,

    /// Log file path (use 'none' to log to the terminal)
    #[arg(short = 'f', long = "log-file", value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Disable coloured log output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Publish one message
    Publish {
        /// Target queue
        #[arg(short = 'q', long = "queue", default_value = DEFAULT_QUEUE)]
        queue: String,

        #[arg(short = 's', long = "sender")]
        sender: String,

        #[arg(short = 'r', long = "recipient")]
        recipient: String,

        /// Message text
        content: String,
    },

    /// Consume and log messages until interrupted
    Consume {
        #[arg(short = 'q', long = "queue", default_value = DEFAULT_QUEUE)]
        queue: String,
    },

    /// Start a consumer and send three sample messages through it
    Demo,

    /// Check that the message broker is reachable
    Check,
}

impl Args {
    /// Name of the selected subcommand, for log lines
    pub fn command_name(&self) -> &'static str {
        match self.command {
            Command::Publish { .. } => "publish",
            Command::Consume { .. } => "consume",
            Command::Demo => "demo",
            Command::Check => "check",
        }
    }
}
