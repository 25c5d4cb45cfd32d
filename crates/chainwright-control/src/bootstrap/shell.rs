//! Bootstrap tool driven through its shell scripts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, instrument, warn};

use crate::config::BootstrapConfig;
use crate::error::DeployResult;
use crate::process::{run_command, ExecOutput};
use crate::types::EncryptionScheme;

use super::ChainBootstrapper;

const AGENCY_SCRIPT: &str = "gen_agency_cert.sh";
const NODE_SCRIPT: &str = "gen_node_cert.sh";

/// Runs `build_chain.sh` and its companion certificate scripts.
///
/// The companion scripts are expected next to the configured build script.
#[derive(Debug, Clone)]
pub struct ShellBootstrapper {
    script: PathBuf,
    timeout: Duration,
}

impl ShellBootstrapper {
    /// Create a bootstrapper from configuration.
    #[must_use]
    pub fn new(config: &BootstrapConfig) -> Self {
        Self {
            script: config.script.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn command(&self, script: &Path, scheme: EncryptionScheme) -> Command {
        let mut cmd = Command::new("bash");
        cmd.arg(script);
        if let Some(dir) = self.script.parent() {
            cmd.current_dir(dir);
        }
        if scheme == EncryptionScheme::Sm {
            cmd.arg("-g");
        }
        cmd
    }

    fn companion(&self, name: &str) -> PathBuf {
        self.script.with_file_name(name)
    }

    async fn run(&self, cmd: Command, operation: &str) -> DeployResult<ExecOutput> {
        let result = run_command(cmd, operation, self.timeout).await?;
        if !result.success {
            warn!(operation, output = %result.output, "bootstrap tool reported failure");
        }
        Ok(result)
    }
}

#[async_trait]
impl ChainBootstrapper for ShellBootstrapper {
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    async fn build_chain(
        &self,
        scheme: EncryptionScheme,
        lines: &[String],
        chain_name: &str,
        out_dir: &Path,
    ) -> DeployResult<ExecOutput> {
        std::fs::create_dir_all(out_dir)?;
        let ipconf = out_dir.join(format!(".{chain_name}.ipconf"));
        std::fs::write(&ipconf, lines.join("\n"))?;

        let mut cmd = self.command(&self.script, scheme);
        cmd.arg("-f").arg(&ipconf).arg("-o").arg(out_dir.join(chain_name));

        info!(script = %self.script.display(), "running build_chain");
        let result = self.run(cmd, "build_chain").await;

        if let Err(e) = std::fs::remove_file(&ipconf) {
            warn!(path = %ipconf.display(), error = %e, "failed to remove ipconf");
        }
        result
    }

    async fn gen_agency_cert(
        &self,
        scheme: EncryptionScheme,
        chain_name: &str,
        agency_name: &str,
        out_dir: &Path,
    ) -> DeployResult<ExecOutput> {
        let mut cmd = self.command(&self.companion(AGENCY_SCRIPT), scheme);
        cmd.arg("-c")
            .arg(chain_name)
            .arg("-a")
            .arg(agency_name)
            .arg("-o")
            .arg(out_dir);
        self.run(cmd, "gen_agency_cert").await
    }

    async fn gen_node_cert(
        &self,
        scheme: EncryptionScheme,
        chain_name: &str,
        agency_name: &str,
        node_dir: &Path,
    ) -> DeployResult<ExecOutput> {
        let mut cmd = self.command(&self.companion(NODE_SCRIPT), scheme);
        cmd.arg("-c")
            .arg(chain_name)
            .arg("-a")
            .arg(agency_name)
            .arg("-o")
            .arg(node_dir);
        self.run(cmd, "gen_node_cert").await
    }

    async fn gen_sdk_cert(
        &self,
        scheme: EncryptionScheme,
        chain_name: &str,
        agency_name: &str,
        sdk_dir: &Path,
    ) -> DeployResult<ExecOutput> {
        let mut cmd = self.command(&self.companion(NODE_SCRIPT), scheme);
        cmd.arg("-c")
            .arg(chain_name)
            .arg("-a")
            .arg(agency_name)
            .arg("-o")
            .arg(sdk_dir)
            .arg("-s");
        self.run(cmd, "gen_sdk_cert").await
    }
}
