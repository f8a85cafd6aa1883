//! Entrypoint command - run the boot pipeline and the server

use super::Context;
use crate::error::EntrypointResult;
use crate::orchestrator::Orchestrator;
use std::path::Path;

/// Execute the entrypoint command
pub async fn execute(config_path: Option<&Path>) -> EntrypointResult<()> {
    let ctx = Context::load(config_path).await?;
    Orchestrator::new(&ctx.config, &ctx.settings, &ctx.dirs, &ctx.base)
        .run()
        .await
}
