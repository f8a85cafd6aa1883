//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Container entrypoint for a dedicated SPT server
///
/// Builds or reuses the server, installs mods, generates and patches its
/// configuration, links persistent data, and runs it in the foreground.
#[derive(Parser, Debug)]
#[command(name = "spt-entrypoint")]
#[command(about, long_about = None, disable_version_flag = true)]
pub struct Cli {
    /// Subcommand to execute (defaults to pre-entrypoint)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Settings file path
    #[arg(short, long, global = true, env = "ENTRYPOINT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run the boot pipeline and the server as the current user
    Entrypoint,

    /// Reconcile the unprivileged account, then run the entrypoint as it
    PreEntrypoint,

    /// Print the entrypoint version
    Version,
}

/// Log line format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Flag value accepted by `--log-format`
    pub fn as_str(self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        }
    }
}

impl Cli {
    /// The subcommand to run, `pre-entrypoint` when none was given
    pub fn subcommand(&self) -> Commands {
        self.command.unwrap_or(Commands::PreEntrypoint)
    }
}
