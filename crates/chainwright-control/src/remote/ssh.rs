//! OpenSSH-backed remote host.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::config::SshConfig;
use crate::error::{DeployError, DeployResult};
use crate::process::{run_command, ExecOutput};

use super::{shell_quote, RemoteHost};

/// Remote host reached through the `ssh` and `scp` binaries.
///
/// Every invocation runs in batch mode so a missing key fails instead of
/// prompting, and is bounded by the configured timeouts.
#[derive(Debug, Clone)]
pub struct SshRemote {
    config: SshConfig,
}

impl SshRemote {
    /// Create a new SSH remote.
    #[must_use]
    pub const fn new(config: SshConfig) -> Self {
        Self { config }
    }

    fn target(&self, ip: &str) -> String {
        format!("{}@{ip}", self.config.user)
    }

    fn common_options(&self, cmd: &mut Command) {
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.config.connect_timeout_secs));
    }

    fn ssh(&self, ip: &str, command: &str) -> Command {
        let mut cmd = Command::new("ssh");
        self.common_options(&mut cmd);
        cmd.arg("-p")
            .arg(self.config.port.to_string())
            .arg(self.target(ip))
            .arg(command);
        cmd
    }

    async fn run_ssh(&self, ip: &str, command: &str, limit: Duration) -> DeployResult<ExecOutput> {
        debug!(ip, command, "running remote command");
        run_command(self.ssh(ip, command), "ssh", limit).await
    }

    async fn run_checked(&self, ip: &str, command: &str) -> DeployResult<()> {
        let result = self
            .run_ssh(ip, command, self.config.command_timeout())
            .await?;
        if result.success {
            Ok(())
        } else {
            Err(DeployError::remote(ip, format!("`{command}` failed: {}", result.output)))
        }
    }
}

#[async_trait]
impl RemoteHost for SshRemote {
    #[instrument(skip(self))]
    async fn connect(&self, ip: &str) -> bool {
        match self
            .run_ssh(ip, "exit 0", self.config.connect_timeout())
            .await
        {
            Ok(result) if result.success => true,
            Ok(result) => {
                warn!(ip, output = %result.output, "ssh connectivity check failed");
                false
            }
            Err(e) => {
                warn!(ip, error = %e, "ssh connectivity check failed");
                false
            }
        }
    }

    async fn exec(&self, ip: &str, command: &str) -> DeployResult<ExecOutput> {
        self.run_ssh(ip, command, self.config.command_timeout()).await
    }

    #[instrument(skip(self), fields(local = %local.display()))]
    async fn upload(&self, ip: &str, local: &Path, remote_dir: &str) -> DeployResult<()> {
        self.run_checked(ip, &format!("mkdir -p {}", shell_quote(remote_dir)))
            .await?;

        let mut cmd = Command::new("scp");
        self.common_options(&mut cmd);
        cmd.arg("-r")
            .arg("-P")
            .arg(self.config.port.to_string())
            .arg(local)
            .arg(format!("{}:{remote_dir}", self.target(ip)));

        let result = run_command(cmd, "scp", self.config.transfer_timeout()).await?;
        if result.success {
            Ok(())
        } else {
            Err(DeployError::remote(ip, format!("scp failed: {}", result.output)))
        }
    }

    #[instrument(skip(self))]
    async fn move_dir(&self, ip: &str, src: &str, dst: &str) -> DeployResult<()> {
        let parent = Path::new(dst)
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "/".to_owned());
        let command = format!(
            "mkdir -p {} && mv {} {}",
            shell_quote(&parent),
            shell_quote(src),
            shell_quote(dst)
        );
        self.run_checked(ip, &command).await
    }
}
