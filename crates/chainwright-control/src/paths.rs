//! On-disk layout of generated chain trees.
//!
//! The local tree is a derived projection of the catalog:
//!
//! ```text
//! <nodes_root>/<chain>/<ip>/node<index>/
//!     conf/node.nodeid
//!     conf/group.<gid>.genesis
//!     conf/group.<gid>.ini
//!     config.ini
//!     application.yml
//! <nodes_root>/<chain>/<ip>/sdk/
//! ```
//!
//! Remote hosts mirror one host directory under `<root_dir>/<chain>/`.
//! Deleted node directories are moved into quarantine, never removed.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::debug;

use crate::config::PathsConfig;
use crate::error::{DeployError, DeployResult};
use crate::types::{GroupId, NodeId};

/// File name of the front process config inside a node directory.
pub const APPLICATION_FILE: &str = "application.yml";

/// File name of the node process config inside a node directory.
pub const NODE_CONFIG_FILE: &str = "config.ini";

const CERT_DIR: &str = "cert";
const CONF_DIR: &str = "conf";
const NODE_ID_FILE: &str = "node.nodeid";
const NODE_DIR_PREFIX: &str = "node";
const SDK_DIR: &str = "sdk";

/// Resolves every local and remote path the control plane touches.
#[derive(Debug, Clone)]
pub struct PathLayout {
    nodes_root: PathBuf,
    quarantine_root: PathBuf,
    remote_quarantine_dir: String,
}

impl PathLayout {
    /// Create a layout from configuration.
    #[must_use]
    pub fn new(config: &PathsConfig) -> Self {
        Self {
            nodes_root: config.nodes_root.clone(),
            quarantine_root: config.quarantine_root.clone(),
            remote_quarantine_dir: config.remote_quarantine_dir.clone(),
        }
    }

    /// Root of every generated chain tree.
    #[must_use]
    pub fn nodes_root(&self) -> &Path {
        &self.nodes_root
    }

    /// `<nodes_root>/<chain>`
    #[must_use]
    pub fn chain_dir(&self, chain: &str) -> PathBuf {
        self.nodes_root.join(chain)
    }

    /// `<nodes_root>/<chain>/<ip>`
    #[must_use]
    pub fn host_dir(&self, chain: &str, ip: &str) -> PathBuf {
        self.chain_dir(chain).join(ip)
    }

    /// `<nodes_root>/<chain>/<ip>/node<index>`
    #[must_use]
    pub fn node_dir(&self, chain: &str, ip: &str, index: u32) -> PathBuf {
        self.host_dir(chain, ip)
            .join(format!("{NODE_DIR_PREFIX}{index}"))
    }

    /// `<nodes_root>/<chain>/<ip>/sdk`
    #[must_use]
    pub fn sdk_dir(&self, chain: &str, ip: &str) -> PathBuf {
        self.host_dir(chain, ip).join(SDK_DIR)
    }

    /// `<nodes_root>/<chain>/cert/<agency>`
    #[must_use]
    pub fn agency_cert_dir(&self, chain: &str, agency: &str) -> PathBuf {
        self.chain_dir(chain).join(CERT_DIR).join(agency)
    }

    /// Node directories generated for a host, ordered by host index.
    pub fn list_host_nodes(&self, chain: &str, ip: &str) -> DeployResult<Vec<PathBuf>> {
        let host_dir = self.host_dir(chain, ip);
        if !host_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut nodes = Vec::new();
        for entry in std::fs::read_dir(&host_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if let Some(index) = name.to_str().and_then(parse_node_index) {
                nodes.push((index, entry.path()));
            }
        }
        nodes.sort_by_key(|(index, _)| *index);

        Ok(nodes.into_iter().map(|(_, path)| path).collect())
    }

    /// The lowest host index not yet used on a host.
    pub fn next_host_index(&self, chain: &str, ip: &str) -> DeployResult<u32> {
        let used = self
            .list_host_nodes(chain, ip)?
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()).and_then(parse_node_index))
            .max();
        Ok(used.map_or(0, |max| max + 1))
    }

    /// Move a node directory into local quarantine.
    ///
    /// Returns the quarantine path.
    pub fn quarantine_node(
        &self,
        chain: &str,
        ip: &str,
        index: u32,
        node_id: &NodeId,
    ) -> std::io::Result<PathBuf> {
        let src = self.node_dir(chain, ip, index);
        let dst = self
            .quarantine_root
            .join(chain)
            .join(ip)
            .join(format!("{NODE_DIR_PREFIX}{index}_{node_id}_{}", timestamp()));

        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(&src, &dst)?;
        debug!(src = %src.display(), dst = %dst.display(), "node directory quarantined");

        Ok(dst)
    }

    /// Remove a chain's generated tree. Missing trees are not an error.
    pub fn delete_chain(&self, chain: &str) -> std::io::Result<()> {
        let dir = self.chain_dir(chain);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    /// `<root_dir>/<chain>/node<index>` on a remote host.
    #[must_use]
    pub fn remote_node_dir(root_dir: &str, chain: &str, index: u32) -> String {
        format!("{}/{chain}/{NODE_DIR_PREFIX}{index}", root_dir.trim_end_matches('/'))
    }

    /// `<root_dir>/<chain>` on a remote host.
    #[must_use]
    pub fn remote_chain_dir(root_dir: &str, chain: &str) -> String {
        format!("{}/{chain}", root_dir.trim_end_matches('/'))
    }

    /// Fresh quarantine destination for a node directory on a remote host.
    #[must_use]
    pub fn remote_quarantine_path(
        &self,
        root_dir: &str,
        chain: &str,
        ip: &str,
        index: u32,
        node_id: &NodeId,
    ) -> String {
        format!(
            "{}/{}/{chain}/{ip}_{NODE_DIR_PREFIX}{index}_{node_id}_{}",
            root_dir.trim_end_matches('/'),
            self.remote_quarantine_dir,
            timestamp()
        )
    }
}

/// Container name for a node: `<root_dir without slashes>-<chain>-node<index>`.
#[must_use]
pub fn container_name(root_dir: &str, chain: &str, index: u32) -> String {
    let prefix: String = root_dir.chars().filter(|c| *c != '/').collect();
    format!("{prefix}-{chain}-{NODE_DIR_PREFIX}{index}")
}

/// Parse the host index out of a `node<index>` directory name.
#[must_use]
pub fn parse_node_index(name: &str) -> Option<u32> {
    name.strip_prefix(NODE_DIR_PREFIX)?.parse().ok()
}

fn timestamp() -> String {
    Utc::now().format("%Y%m%d%H%M%S").to_string()
}

/// Identity and ports of one generated node directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Node directory.
    pub dir: PathBuf,
    /// Host-local index.
    pub host_index: u32,
    /// Node identity.
    pub node_id: NodeId,
    /// JSON-RPC port.
    pub rpc_port: u16,
    /// Peer-to-peer port.
    pub p2p_port: u16,
    /// SDK channel port.
    pub channel_port: u16,
}

impl NodeConfig {
    /// Read a generated node directory.
    pub fn read(node_dir: &Path) -> DeployResult<Self> {
        let host_index = node_dir
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_node_index)
            .ok_or_else(|| DeployError::artifact(node_dir, "not a node<index> directory"))?;

        let id_path = node_dir.join(CONF_DIR).join(NODE_ID_FILE);
        let node_id = std::fs::read_to_string(&id_path)
            .map_err(|e| DeployError::artifact(&id_path, e.to_string()))?;
        let node_id = node_id.trim();
        if node_id.is_empty() {
            return Err(DeployError::artifact(&id_path, "empty node id"));
        }

        let ini_path = node_dir.join(NODE_CONFIG_FILE);
        let text = std::fs::read_to_string(&ini_path)
            .map_err(|e| DeployError::artifact(&ini_path, e.to_string()))?;
        let ini = Ini::parse(&text);

        let port = |section: &str, key: &str| -> DeployResult<u16> {
            ini.get(section, key)
                .ok_or_else(|| DeployError::artifact(&ini_path, format!("missing [{section}] {key}")))?
                .parse()
                .map_err(|_| DeployError::artifact(&ini_path, format!("bad [{section}] {key}")))
        };

        Ok(Self {
            dir: node_dir.to_path_buf(),
            host_index,
            node_id: NodeId::new(node_id),
            rpc_port: port("rpc", "jsonrpc_listen_port")?,
            p2p_port: port("p2p", "listen_port")?,
            channel_port: port("rpc", "channel_listen_port")?,
        })
    }

    /// Group ids a node directory carries genesis files for.
    pub fn group_ids(node_dir: &Path) -> DeployResult<BTreeSet<GroupId>> {
        let conf = node_dir.join(CONF_DIR);
        let mut groups = BTreeSet::new();
        if !conf.is_dir() {
            return Ok(groups);
        }
        for entry in std::fs::read_dir(&conf)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = name
                .strip_prefix("group.")
                .and_then(|rest| rest.strip_suffix(".genesis"))
                .and_then(|id| id.parse().ok())
            {
                groups.insert(GroupId::new(id));
            }
        }
        Ok(groups)
    }

    /// Path of a group's genesis file inside a node directory.
    #[must_use]
    pub fn genesis_path(node_dir: &Path, group_id: GroupId) -> PathBuf {
        node_dir.join(CONF_DIR).join(format!("group.{group_id}.genesis"))
    }

    /// Path of a group's config file inside a node directory.
    #[must_use]
    pub fn group_ini_path(node_dir: &Path, group_id: GroupId) -> PathBuf {
        node_dir.join(CONF_DIR).join(format!("group.{group_id}.ini"))
    }

    /// Path of the node id file inside a node directory.
    #[must_use]
    pub fn node_id_path(node_dir: &Path) -> PathBuf {
        node_dir.join(CONF_DIR).join(NODE_ID_FILE)
    }
}

/// Minimal reader for the INI files the bootstrap tool emits.
#[derive(Debug, Default)]
struct Ini {
    entries: Vec<(String, String, String)>,
}

impl Ini {
    fn parse(text: &str) -> Self {
        let mut section = String::new();
        let mut entries = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                name.trim().clone_into(&mut section);
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                entries.push((section.clone(), key.trim().to_owned(), value.trim().to_owned()));
            }
        }
        Self { entries }
    }

    fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(s, k, _)| s == section && k == key)
            .map(|(_, _, v)| v.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout(dir: &TempDir) -> PathLayout {
        PathLayout::new(&PathsConfig {
            nodes_root: dir.path().join("nodes"),
            quarantine_root: dir.path().join("deleted"),
            remote_quarantine_dir: "deleted-tmp".to_owned(),
        })
    }

    fn write_node(dir: &Path, node_id: &str, p2p: u16, groups: &[i32]) {
        std::fs::create_dir_all(dir.join("conf")).unwrap();
        std::fs::write(dir.join("conf/node.nodeid"), format!("{node_id}\n")).unwrap();
        for g in groups {
            std::fs::write(dir.join(format!("conf/group.{g}.genesis")), "").unwrap();
        }
        std::fs::write(
            dir.join("config.ini"),
            format!(
                "[rpc]\n    channel_listen_port=20200\n    jsonrpc_listen_port=8545\n\
                 ; comment\n[p2p]\n    listen_port={p2p}\n    node.0=10.0.0.1:{p2p}\n"
            ),
        )
        .unwrap();
    }

    #[test]
    fn host_nodes_sorted_by_index() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        for index in [10, 2, 0] {
            std::fs::create_dir_all(layout.node_dir("c1", "10.0.0.1", index)).unwrap();
        }
        std::fs::create_dir_all(layout.sdk_dir("c1", "10.0.0.1")).unwrap();

        let nodes = layout.list_host_nodes("c1", "10.0.0.1").unwrap();
        let names: Vec<_> = nodes
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_owned())
            .collect();
        assert_eq!(names, vec!["node0", "node2", "node10"]);
        assert_eq!(layout.next_host_index("c1", "10.0.0.1").unwrap(), 11);
        assert_eq!(layout.next_host_index("c1", "10.0.0.2").unwrap(), 0);
    }

    #[test]
    fn node_config_reads_identity_and_ports() {
        let dir = TempDir::new().unwrap();
        let node_dir = dir.path().join("node3");
        write_node(&node_dir, "abcdef0123", 30303, &[1, 2]);

        let config = NodeConfig::read(&node_dir).unwrap();
        assert_eq!(config.host_index, 3);
        assert_eq!(config.node_id.as_str(), "abcdef0123");
        assert_eq!(config.p2p_port, 30303);
        assert_eq!(config.channel_port, 20200);
        assert_eq!(config.rpc_port, 8545);

        let groups: Vec<_> = NodeConfig::group_ids(&node_dir)
            .unwrap()
            .into_iter()
            .map(GroupId::get)
            .collect();
        assert_eq!(groups, vec![1, 2]);
    }

    #[test]
    fn malformed_node_dir_is_artifact_error() {
        let dir = TempDir::new().unwrap();
        let node_dir = dir.path().join("node0");
        std::fs::create_dir_all(&node_dir).unwrap();

        let err = NodeConfig::read(&node_dir).unwrap_err();
        assert!(matches!(err, DeployError::Artifact { .. }));
    }

    #[test]
    fn quarantine_moves_directory() {
        let dir = TempDir::new().unwrap();
        let layout = layout(&dir);
        let node_dir = layout.node_dir("c1", "10.0.0.1", 1);
        write_node(&node_dir, "abcdef0123", 30301, &[1]);

        let dst = layout
            .quarantine_node("c1", "10.0.0.1", 1, &NodeId::new("abcdef0123"))
            .unwrap();
        assert!(!node_dir.exists());
        assert!(dst.join("config.ini").exists());
        assert!(dst.starts_with(dir.path().join("deleted/c1/10.0.0.1")));
    }

    #[test]
    fn remote_names() {
        assert_eq!(container_name("/opt/chains", "c1", 2), "optchains-c1-node2");
        assert_eq!(
            PathLayout::remote_node_dir("/opt/chains/", "c1", 0),
            "/opt/chains/c1/node0"
        );
        assert_eq!(parse_node_index("node12"), Some(12));
        assert_eq!(parse_node_index("sdk"), None);
    }
}
