//! Remote host access.
//!
//! This module provides the abstraction the orchestrator uses to reach the
//! machines a chain runs on. The primary implementation shells out to the
//! OpenSSH client tools.

mod ssh;

pub use ssh::SshRemote;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{DeployError, DeployResult};
use crate::process::ExecOutput;

/// Trait for remote host implementations.
#[async_trait]
pub trait RemoteHost: Send + Sync {
    /// Check that the host accepts an SSH session.
    async fn connect(&self, ip: &str) -> bool;

    /// Run a shell command on the host.
    async fn exec(&self, ip: &str, command: &str) -> DeployResult<ExecOutput>;

    /// Copy a local file or directory into `remote_dir`, creating it first.
    async fn upload(&self, ip: &str, local: &Path, remote_dir: &str) -> DeployResult<()>;

    /// Move a directory on the host, creating the destination's parent.
    async fn move_dir(&self, ip: &str, src: &str, dst: &str) -> DeployResult<()>;
}

/// Quote a value for a POSIX shell.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// A call recorded by [`MockRemote`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    /// Connectivity check.
    Connect {
        /// Host address.
        ip: String,
    },
    /// Remote command.
    Exec {
        /// Host address.
        ip: String,
        /// Command line.
        command: String,
    },
    /// File transfer.
    Upload {
        /// Host address.
        ip: String,
        /// Local source.
        local: PathBuf,
        /// Remote target directory.
        remote_dir: String,
    },
    /// Directory move.
    MoveDir {
        /// Host address.
        ip: String,
        /// Source path.
        src: String,
        /// Destination path.
        dst: String,
    },
}

impl RemoteCall {
    /// Host the call targeted.
    #[must_use]
    pub fn ip(&self) -> &str {
        match self {
            Self::Connect { ip }
            | Self::Exec { ip, .. }
            | Self::Upload { ip, .. }
            | Self::MoveDir { ip, .. } => ip,
        }
    }
}

/// Mock remote host for testing.
///
/// Every host is reachable and every command succeeds unless configured
/// otherwise.
#[derive(Debug, Default)]
pub struct MockRemote {
    calls: RwLock<Vec<RemoteCall>>,
    unreachable: RwLock<HashSet<String>>,
    failing: RwLock<HashSet<String>>,
}

impl MockRemote {
    /// Create a new mock where every host is healthy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make connectivity checks to `ip` fail.
    pub fn mark_unreachable(&self, ip: &str) {
        if let Ok(mut set) = self.unreachable.write() {
            set.insert(ip.to_owned());
        }
    }

    /// Make commands, transfers and moves on `ip` fail.
    pub fn mark_failing(&self, ip: &str) {
        if let Ok(mut set) = self.failing.write() {
            set.insert(ip.to_owned());
        }
    }

    /// Every call recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.read().map(|c| c.clone()).unwrap_or_default()
    }

    /// Commands executed on `ip`, in order.
    #[must_use]
    pub fn commands_on(&self, ip: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                RemoteCall::Exec { ip: host, command } if host == ip => Some(command),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: RemoteCall) -> DeployResult<()> {
        let ip = call.ip().to_owned();
        self.calls
            .write()
            .map_err(|_| DeployError::internal("lock poisoned"))?
            .push(call);

        let failing = self
            .failing
            .read()
            .map_err(|_| DeployError::internal("lock poisoned"))?;
        if failing.contains(&ip) {
            return Err(DeployError::remote(ip, "mock failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteHost for MockRemote {
    async fn connect(&self, ip: &str) -> bool {
        if self
            .record(RemoteCall::Connect { ip: ip.to_owned() })
            .is_err()
        {
            return false;
        }
        self.unreachable
            .read()
            .map(|set| !set.contains(ip))
            .unwrap_or(false)
    }

    async fn exec(&self, ip: &str, command: &str) -> DeployResult<ExecOutput> {
        self.record(RemoteCall::Exec {
            ip: ip.to_owned(),
            command: command.to_owned(),
        })?;
        Ok(ExecOutput::ok(""))
    }

    async fn upload(&self, ip: &str, local: &Path, remote_dir: &str) -> DeployResult<()> {
        self.record(RemoteCall::Upload {
            ip: ip.to_owned(),
            local: local.to_path_buf(),
            remote_dir: remote_dir.to_owned(),
        })
    }

    async fn move_dir(&self, ip: &str, src: &str, dst: &str) -> DeployResult<()> {
        self.record(RemoteCall::MoveDir {
            ip: ip.to_owned(),
            src: src.to_owned(),
            dst: dst.to_owned(),
        })
    }
}
