//! spt-entrypoint - container entrypoint for SPT dedicated servers
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use spt_entrypoint::cli::{commands, Cli, Commands, LogFormat};
use spt_entrypoint::error::EntrypointResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            println!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                println!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> EntrypointResult<i32> {
    let cli = Cli::parse();

    // Version output is consumed by scripts; keep it free of log lines
    if cli.subcommand() == Commands::Version {
        commands::version();
        return Ok(0);
    }

    init_logging(cli.log_format);

    let config_path = cli.config.as_deref();
    match cli.subcommand() {
        Commands::Version => unreachable!("Version handled above"),
        Commands::Entrypoint => commands::entrypoint(config_path).await.map(|()| 0),
        Commands::PreEntrypoint => commands::pre_entrypoint(config_path, cli.log_format).await,
    }
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("spt_entrypoint=info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_target(false);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
