//! Pre-entrypoint command - drop privileges, then run the entrypoint

use super::Context;
use crate::cli::LogFormat;
use crate::error::EntrypointResult;
use crate::orchestrator::Orchestrator;
use crate::privilege::{is_root, NixAccountDb, Supervisor, WorkerCommand};
use crate::process::SystemExecutor;
use std::path::Path;
use tracing::info;

/// Execute the pre-entrypoint command, returning the exit code to use
pub async fn execute(config_path: Option<&Path>, log_format: LogFormat) -> EntrypointResult<i32> {
    let ctx = Context::load(config_path).await?;

    if !is_root() {
        info!("Not running as root, skipping account reconciliation");
        Orchestrator::new(&ctx.config, &ctx.settings, &ctx.dirs, &ctx.base)
            .run()
            .await?;
        return Ok(0);
    }

    let worker = WorkerCommand::current(worker_args(&ctx.base, config_path, log_format))?;

    Supervisor::new(
        &ctx.config.account.user,
        &ctx.settings,
        &ctx.dirs,
        &NixAccountDb,
        &SystemExecutor,
    )
    .run(&worker)
    .await
}

/// Global flags the worker must see to behave like this process
fn worker_args(base: &Path, config_path: Option<&Path>, log_format: LogFormat) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(path) = config_path {
        args.push("--config".to_string());
        args.push(base.join(path).display().to_string());
    }
    args.push("--log-format".to_string());
    args.push(log_format.as_str().to_string());
    args
}
