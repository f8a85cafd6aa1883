//! Privilege de-escalation
//!
//! When started as root the supervisor aligns the unprivileged account with
//! the requested uid/gid, hands it ownership of the working roots, and runs
//! the worker pipeline as that account in a child process.

use crate::config::{DirectorySet, Settings};
use crate::error::{EntrypointError, EntrypointResult};
use crate::process::{CommandExecutor, Step};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Stdio;
use tracing::{debug, info};

/// Numeric user and group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub uid: u32,
    pub gid: u32,
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.uid, self.gid)
    }
}

/// An OS account and its primary group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub user: String,
    pub group: String,
    pub identity: Identity,
}

/// Account database lookups
pub trait AccountDb: Send + Sync {
    fn lookup(&self, user: &str) -> EntrypointResult<Account>;
}

/// Reads the live system account database
#[derive(Debug, Default, Clone, Copy)]
pub struct NixAccountDb;

impl AccountDb for NixAccountDb {
    fn lookup(&self, user: &str) -> EntrypointResult<Account> {
        let entry = nix::unistd::User::from_name(user)
            .map_err(|e| EntrypointError::Privilege(format!("looking up user {}: {}", user, e)))?
            .ok_or_else(|| EntrypointError::AccountNotFound(user.to_string()))?;
        let group = nix::unistd::Group::from_gid(entry.gid)
            .map_err(|e| EntrypointError::Privilege(format!("looking up group {}: {}", entry.gid, e)))?
            .ok_or_else(|| EntrypointError::AccountNotFound(format!("group {}", entry.gid)))?;

        Ok(Account {
            user: entry.name,
            group: group.name,
            identity: Identity {
                uid: entry.uid.as_raw(),
                gid: entry.gid.as_raw(),
            },
        })
    }
}

/// Whether the process runs with effective uid 0
pub fn is_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Reconciles identity and ownership, then launches the worker
pub struct Supervisor<'a> {
    user: &'a str,
    settings: &'a Settings,
    dirs: &'a DirectorySet,
    accounts: &'a dyn AccountDb,
    executor: &'a dyn CommandExecutor,
}

impl<'a> Supervisor<'a> {
    pub fn new(
        user: &'a str,
        settings: &'a Settings,
        dirs: &'a DirectorySet,
        accounts: &'a dyn AccountDb,
        executor: &'a dyn CommandExecutor,
    ) -> Self {
        Self {
            user,
            settings,
            dirs,
            accounts,
            executor,
        }
    }

    /// Align the account with the requested ids and chown the working roots.
    ///
    /// A requested uid of 0 is refused before anything else happens.
    pub async fn reconcile(&self) -> EntrypointResult<Identity> {
        if self.settings.uid == Some(0) {
            return Err(EntrypointError::RootUidRefused {
                user: self.user.to_string(),
            });
        }

        let account = self.accounts.lookup(self.user)?;
        let desired = Identity {
            uid: self.settings.uid.unwrap_or(account.identity.uid),
            gid: self.settings.gid.unwrap_or(account.identity.gid),
        };
        if desired.uid == 0 {
            return Err(EntrypointError::RootUidRefused {
                user: self.user.to_string(),
            });
        }

        if desired.uid != account.identity.uid {
            info!("Setting {} uid to {}", account.user, desired.uid);
            self.executor
                .run(
                    &Step::new("update uid", "usermod")
                        .arg("-u")
                        .arg(desired.uid.to_string())
                        .arg(&account.user),
                )
                .await?;
        }
        if desired.gid != account.identity.gid {
            info!("Setting {} gid to {}", account.group, desired.gid);
            self.executor
                .run(
                    &Step::new("update gid", "groupmod")
                        .arg("-g")
                        .arg(desired.gid.to_string())
                        .arg(&account.group),
                )
                .await?;
        }

        self.dirs.ensure().await?;
        for dir in self.dirs.all() {
            debug!("Taking ownership of {}", dir.display());
            self.executor
                .run(
                    &Step::new("chown", "chown")
                        .arg("-R")
                        .arg(desired.to_string())
                        .arg_path(dir),
                )
                .await?;
        }

        Ok(desired)
    }

    /// Reconcile, then run the worker as the unprivileged account and return its exit code
    pub async fn run(&self, worker: &WorkerCommand) -> EntrypointResult<i32> {
        let identity = self.reconcile().await?;
        worker.spawn_as(identity).await
    }
}

/// How to re-invoke this binary as the worker
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    /// The current executable with the `entrypoint` subcommand
    pub fn current(extra_args: Vec<String>) -> EntrypointResult<Self> {
        let program = std::env::current_exe()
            .map_err(|e| EntrypointError::io("resolving current executable", e))?;
        let mut args = extra_args;
        args.push("entrypoint".to_string());
        Ok(Self { program, args })
    }

    /// Run with `identity`, inherited environment and stdio, until exit
    pub async fn spawn_as(&self, identity: Identity) -> EntrypointResult<i32> {
        info!("Starting worker as {}", identity);
        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .uid(identity.uid)
            .gid(identity.gid)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| EntrypointError::command_failed(self.program.display().to_string(), e))?;

        let code = status
            .code()
            .or_else(|| status.signal().map(|s| 128 + s))
            .unwrap_or(1);
        debug!("Worker exited with {}", code);
        Ok(code)
    }
}
