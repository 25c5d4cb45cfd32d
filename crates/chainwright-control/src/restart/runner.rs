//! Starting and stopping front processes on their hosts.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::{DeployError, DeployResult};
use crate::paths::PathLayout;
use crate::remote::{shell_quote, RemoteHost};
use crate::types::{ChainRecord, FrontRecord, RunMode};

/// Issues start and stop commands for fronts.
#[derive(Clone)]
pub struct FrontRunner {
    remote: Arc<dyn RemoteHost>,
}

impl std::fmt::Debug for FrontRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrontRunner").finish_non_exhaustive()
    }
}

impl FrontRunner {
    /// Create a runner that reaches hosts through `remote`.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteHost>) -> Self {
        Self { remote }
    }

    /// Shell command that (re)starts a front.
    #[must_use]
    pub fn start_command(chain: &ChainRecord, front: &FrontRecord) -> String {
        let node_dir = PathLayout::remote_node_dir(&chain.root_dir, &chain.name, front.host_index);
        match front.run_mode {
            RunMode::Docker => format!(
                "docker rm -f {name} >/dev/null 2>&1; \
                 docker run -d --restart=always --net=host --name {name} -v {dir}:/data {image}",
                name = shell_quote(&front.container_name),
                dir = shell_quote(&node_dir),
                image = shell_quote(&front.image_tag),
            ),
            RunMode::Host => format!("bash {}/start.sh", shell_quote(&node_dir)),
        }
    }

    /// Shell command that stops a front.
    #[must_use]
    pub fn stop_command(chain: &ChainRecord, front: &FrontRecord) -> String {
        match front.run_mode {
            RunMode::Docker => format!("docker rm -f {}", shell_quote(&front.container_name)),
            RunMode::Host => {
                let node_dir =
                    PathLayout::remote_node_dir(&chain.root_dir, &chain.name, front.host_index);
                format!("bash {}/stop.sh", shell_quote(&node_dir))
            }
        }
    }

    /// Start (or restart) a front's process.
    #[instrument(skip_all, fields(ip = %front.ip, node = %front.node_id.short()))]
    pub async fn start(&self, chain: &ChainRecord, front: &FrontRecord) -> DeployResult<()> {
        self.run(&front.ip, &Self::start_command(chain, front)).await
    }

    /// Stop a front's process.
    #[instrument(skip_all, fields(ip = %front.ip, node = %front.node_id.short()))]
    pub async fn stop(&self, chain: &ChainRecord, front: &FrontRecord) -> DeployResult<()> {
        self.run(&front.ip, &Self::stop_command(chain, front)).await
    }

    async fn run(&self, ip: &str, command: &str) -> DeployResult<()> {
        let result = self.remote.exec(ip, command).await?;
        if !result.success {
            return Err(DeployError::remote(ip, result.output));
        }
        debug!(command, "front command succeeded");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::remote::MockRemote;
    use crate::status::{ChainStatus, FrontStatus};
    use crate::types::{AgencyId, ChainId, EncryptionScheme, FrontId, HostId, NodeId};
    use chrono::Utc;

    fn chain() -> ChainRecord {
        ChainRecord {
            id: ChainId::new(1),
            name: "c1".to_owned(),
            description: String::new(),
            version: "fiscoorg/fisco-webase:v2.7.2".to_owned(),
            encryption: EncryptionScheme::Ecdsa,
            status: ChainStatus::Initialized,
            root_dir: "/opt/fisco".to_owned(),
            run_mode: RunMode::Docker,
            signer_addr: "127.0.0.1:5004".to_owned(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn front(run_mode: RunMode) -> FrontRecord {
        FrontRecord {
            id: FrontId::new(7),
            node_id: NodeId::new("abcdef0123456789"),
            ip: "10.0.0.1".to_owned(),
            front_port: 5003,
            agency_id: AgencyId::new(2),
            agency_name: "agencyA".to_owned(),
            host_id: HostId::new(3),
            host_index: 1,
            image_tag: "fiscoorg/fisco-webase:v2.7.2".to_owned(),
            run_mode,
            container_name: "optfisco-c1-node1".to_owned(),
            rpc_port: 8546,
            p2p_port: 30301,
            channel_port: 20201,
            chain_id: ChainId::new(1),
            chain_name: "c1".to_owned(),
            status: FrontStatus::Initialized,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn docker_start_replaces_container() {
        let cmd = FrontRunner::start_command(&chain(), &front(RunMode::Docker));
        assert!(cmd.starts_with("docker rm -f 'optfisco-c1-node1'"));
        assert!(cmd.contains("-v '/opt/fisco/c1/node1':/data"));
        assert!(cmd.ends_with("'fiscoorg/fisco-webase:v2.7.2'"));
    }

    #[test]
    fn host_mode_uses_scripts() {
        let f = front(RunMode::Host);
        assert_eq!(
            FrontRunner::start_command(&chain(), &f),
            "bash '/opt/fisco/c1/node1'/start.sh"
        );
        assert_eq!(
            FrontRunner::stop_command(&chain(), &f),
            "bash '/opt/fisco/c1/node1'/stop.sh"
        );
    }

    #[tokio::test]
    async fn failing_host_is_an_error() {
        let remote = Arc::new(MockRemote::new());
        remote.mark_failing("10.0.0.1");
        let runner = FrontRunner::new(remote.clone());

        let err = runner
            .start(&chain(), &front(RunMode::Docker))
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Remote { .. }));
        assert_eq!(remote.commands_on("10.0.0.1").len(), 1);
    }
}
