//! Deterministic in-process bootstrapper for tests and dry runs.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use crate::config::PortsConfig;
use crate::entity::offset_port;
use crate::error::DeployResult;
use crate::paths::{NodeConfig, NODE_CONFIG_FILE};
use crate::process::ExecOutput;
use crate::render::{BuiltinRenderer, ConfigRenderer, Template};
use crate::topology::ConfigLine;
use crate::types::{EncryptionScheme, GroupId, NodeId};

use super::ChainBootstrapper;

/// Mock bootstrapper that writes a plausible chain tree.
///
/// Node ids are generated from a counter, so two runs with the same input
/// produce the same tree.
#[derive(Debug)]
pub struct MockBootstrapper {
    ports: PortsConfig,
    renderer: BuiltinRenderer,
    seq: AtomicU64,
    builds: AtomicUsize,
    fail_build: RwLock<Option<String>>,
    corrupt: RwLock<HashSet<(String, u32)>>,
}

impl Default for MockBootstrapper {
    fn default() -> Self {
        Self::new(PortsConfig::default())
    }
}

struct PlannedNode {
    ip: String,
    index: u32,
    node_id: NodeId,
    groups: BTreeSet<GroupId>,
}

impl MockBootstrapper {
    /// Create a mock that allocates ports from `ports`.
    #[must_use]
    pub fn new(ports: PortsConfig) -> Self {
        Self {
            ports,
            renderer: BuiltinRenderer::new(),
            seq: AtomicU64::new(0),
            builds: AtomicUsize::new(0),
            fail_build: RwLock::new(None),
            corrupt: RwLock::new(HashSet::new()),
        }
    }

    /// Make every later `build_chain` report failure with `output`.
    pub fn fail_build_with(&self, output: impl Into<String>) {
        if let Ok(mut slot) = self.fail_build.write() {
            *slot = Some(output.into());
        }
    }

    /// Leave `config.ini` out of the node directory `ip/node<index>`.
    pub fn corrupt_node(&self, ip: &str, index: u32) {
        if let Ok(mut set) = self.corrupt.write() {
            set.insert((ip.to_owned(), index));
        }
    }

    /// Number of `build_chain` calls so far.
    #[must_use]
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    fn next_node_id(&self) -> NodeId {
        let n = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
        NodeId::new(format!("{n:0128x}"))
    }

    fn write_node(
        &self,
        node_dir: &Path,
        node: &PlannedNode,
        scheme: EncryptionScheme,
        peers: &[String],
        genesis: &BTreeMap<GroupId, String>,
    ) -> DeployResult<()> {
        std::fs::create_dir_all(node_dir.join("conf"))?;
        std::fs::write(NodeConfig::node_id_path(node_dir), node.node_id.as_str())?;

        let skip = self
            .corrupt
            .read()
            .map(|set| set.contains(&(node.ip.clone(), node.index)))
            .unwrap_or(false);
        if !skip {
            let mut values = vec![
                ("channel_port", offset_port(self.ports.channel_base, node.index)?.to_string()),
                ("rpc_port", offset_port(self.ports.rpc_base, node.index)?.to_string()),
                ("p2p_port", offset_port(self.ports.p2p_base, node.index)?.to_string()),
                ("sm_crypto", (scheme == EncryptionScheme::Sm).to_string()),
            ];
            values.extend(peers.iter().map(|p| ("peer", p.clone())));
            let rendered = self.renderer.render(Template::NodeConfig, &values)?;
            std::fs::write(node_dir.join(NODE_CONFIG_FILE), rendered)?;
        }

        for group_id in &node.groups {
            if let Some(text) = genesis.get(group_id) {
                std::fs::write(NodeConfig::genesis_path(node_dir, *group_id), text)?;
            }
            let ini = self
                .renderer
                .render(Template::GroupConfig, &[("group_id", group_id.to_string())])?;
            std::fs::write(NodeConfig::group_ini_path(node_dir, *group_id), ini)?;
        }
        Ok(())
    }
}

#[async_trait]
impl ChainBootstrapper for MockBootstrapper {
    async fn build_chain(
        &self,
        scheme: EncryptionScheme,
        lines: &[String],
        chain_name: &str,
        out_dir: &Path,
    ) -> DeployResult<ExecOutput> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if let Some(output) = self.fail_build.read().ok().and_then(|slot| slot.clone()) {
            return Ok(ExecOutput::failed(output));
        }

        let mut next_index: BTreeMap<String, u32> = BTreeMap::new();
        let mut planned = Vec::new();
        for line in lines.iter().filter_map(|l| ConfigLine::parse(l)) {
            let count = u32::try_from(line.node_count).unwrap_or(0);
            for _ in 0..count {
                let index = next_index.entry(line.ip.clone()).or_insert(0);
                planned.push(PlannedNode {
                    ip: line.ip.clone(),
                    index: *index,
                    node_id: self.next_node_id(),
                    groups: line.group_ids.clone(),
                });
                *index += 1;
            }
        }

        let mut peers = Vec::with_capacity(planned.len());
        for node in &planned {
            peers.push(format!(
                "{}:{}",
                node.ip,
                offset_port(self.ports.p2p_base, node.index)?
            ));
        }

        let mut sealers: BTreeMap<GroupId, Vec<(&str, String)>> = BTreeMap::new();
        for node in &planned {
            for group_id in &node.groups {
                sealers
                    .entry(*group_id)
                    .or_default()
                    .push(("sealer", node.node_id.to_string()));
            }
        }
        let timestamp = Utc::now().timestamp_millis().to_string();
        let mut genesis = BTreeMap::new();
        for (group_id, mut values) in sealers {
            values.push(("group_id", group_id.to_string()));
            values.push(("timestamp", timestamp.clone()));
            genesis.insert(group_id, self.renderer.render(Template::GroupGenesis, &values)?);
        }

        let chain_dir = out_dir.join(chain_name);
        for node in &planned {
            let node_dir = chain_dir.join(&node.ip).join(format!("node{}", node.index));
            self.write_node(&node_dir, node, scheme, &peers, &genesis)?;
        }
        for ip in next_index.keys() {
            let sdk = chain_dir.join(ip).join("sdk");
            std::fs::create_dir_all(&sdk)?;
            std::fs::write(sdk.join("sdk.crt"), scheme.as_str())?;
        }

        Ok(ExecOutput::ok(format!(
            "generated {} nodes on {} hosts for {chain_name}",
            planned.len(),
            next_index.len()
        )))
    }

    async fn gen_agency_cert(
        &self,
        scheme: EncryptionScheme,
        _chain_name: &str,
        agency_name: &str,
        out_dir: &Path,
    ) -> DeployResult<ExecOutput> {
        std::fs::create_dir_all(out_dir)?;
        std::fs::write(out_dir.join("agency.crt"), format!("{agency_name}:{scheme}"))?;
        Ok(ExecOutput::ok(format!("agency {agency_name} certificate generated")))
    }

    async fn gen_node_cert(
        &self,
        _scheme: EncryptionScheme,
        _chain_name: &str,
        _agency_name: &str,
        node_dir: &Path,
    ) -> DeployResult<ExecOutput> {
        std::fs::create_dir_all(node_dir.join("conf"))?;
        let node_id = self.next_node_id();
        std::fs::write(NodeConfig::node_id_path(node_dir), node_id.as_str())?;
        Ok(ExecOutput::ok(format!("node {} generated", node_id.short())))
    }

    async fn gen_sdk_cert(
        &self,
        scheme: EncryptionScheme,
        _chain_name: &str,
        _agency_name: &str,
        sdk_dir: &Path,
    ) -> DeployResult<ExecOutput> {
        std::fs::create_dir_all(sdk_dir)?;
        std::fs::write(sdk_dir.join("sdk.crt"), scheme.as_str())?;
        Ok(ExecOutput::ok("sdk certificate generated"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn builds_readable_tree() {
        let dir = TempDir::new().unwrap();
        let bootstrapper = MockBootstrapper::default();
        let lines = vec![
            "10.0.0.1:2 agencyA 1".to_owned(),
            "10.0.0.2:1 agencyA 1,2".to_owned(),
        ];

        let result = bootstrapper
            .build_chain(EncryptionScheme::Ecdsa, &lines, "c1", dir.path())
            .await
            .unwrap();
        assert!(result.success);

        let node = NodeConfig::read(&dir.path().join("c1/10.0.0.1/node1")).unwrap();
        assert_eq!(node.host_index, 1);
        assert_eq!(node.p2p_port, 30301);

        let groups = NodeConfig::group_ids(&dir.path().join("c1/10.0.0.2/node0")).unwrap();
        assert_eq!(groups.len(), 2);
        assert!(dir.path().join("c1/10.0.0.2/sdk/sdk.crt").exists());
    }

    #[tokio::test]
    async fn corrupt_node_is_unreadable() {
        let dir = TempDir::new().unwrap();
        let bootstrapper = MockBootstrapper::default();
        bootstrapper.corrupt_node("10.0.0.1", 0);

        bootstrapper
            .build_chain(
                EncryptionScheme::Ecdsa,
                &["10.0.0.1:1 agencyA 1".to_owned()],
                "c1",
                dir.path(),
            )
            .await
            .unwrap();

        assert!(NodeConfig::read(&dir.path().join("c1/10.0.0.1/node0")).is_err());
    }
}
