//! External command execution
//!
//! Tool chains (git, npm, unzip, usermod, ...) are described as ordered
//! [`Step`]s and handed to a [`CommandExecutor`]. The system executor runs
//! them with captured output; tests substitute a recording executor.

use crate::error::{EntrypointError, EntrypointResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// A named external command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Human-readable name used in logs and errors
    pub name: String,
    /// Program to execute (resolved through PATH)
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory, inherited when unset
    pub cwd: Option<PathBuf>,
}

impl Step {
    /// Create a step with no arguments
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Add a single argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add a path as an argument
    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    /// Set the working directory
    pub fn cwd(mut self, dir: &Path) -> Self {
        self.cwd = Some(dir.to_path_buf());
        self
    }

    /// Command line as a single string, for logs
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Runs steps to completion
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run a step, returning its stdout.
    ///
    /// A non-zero exit is an [`EntrypointError::Subprocess`] carrying stderr.
    async fn run(&self, step: &Step) -> EntrypointResult<String>;
}

/// Executes steps as real child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn run(&self, step: &Step) -> EntrypointResult<String> {
        debug!("Running {}: {}", step.name, step.command_line());

        let mut cmd = Command::new(&step.program);
        cmd.args(&step.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref dir) = step.cwd {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| EntrypointError::command_failed(step.command_line(), e))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(EntrypointError::subprocess(
                &step.name,
                step.command_line(),
                output.status.code().unwrap_or(-1),
                stderr.trim(),
            ))
        }
    }
}

/// Run steps in order, stopping at the first failure
pub async fn run_steps(executor: &dyn CommandExecutor, steps: &[Step]) -> EntrypointResult<()> {
    for step in steps {
        executor.run(step).await?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    type Handler = Box<dyn Fn(&Step) -> EntrypointResult<String> + Send + Sync>;

    /// Records every step; an optional handler simulates side effects or failures
    pub struct RecordingExecutor {
        steps: Mutex<Vec<Step>>,
        handler: Option<Handler>,
    }

    impl RecordingExecutor {
        pub fn new() -> Self {
            Self {
                steps: Mutex::new(Vec::new()),
                handler: None,
            }
        }

        pub fn with_handler<F>(handler: F) -> Self
        where
            F: Fn(&Step) -> EntrypointResult<String> + Send + Sync + 'static,
        {
            Self {
                steps: Mutex::new(Vec::new()),
                handler: Some(Box::new(handler)),
            }
        }

        pub fn steps(&self) -> Vec<Step> {
            self.steps.lock().unwrap().clone()
        }

        pub fn names(&self) -> Vec<String> {
            self.steps().into_iter().map(|s| s.name).collect()
        }
    }

    #[async_trait]
    impl CommandExecutor for RecordingExecutor {
        async fn run(&self, step: &Step) -> EntrypointResult<String> {
            self.steps.lock().unwrap().push(step.clone());
            match self.handler {
                Some(ref handler) => handler(step),
                None => Ok(String::new()),
            }
        }
    }
}
