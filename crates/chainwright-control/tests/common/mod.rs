//! Common test utilities for workflow integration tests.

#![allow(dead_code, clippy::unwrap_used)]

pub mod fixtures;

use std::path::PathBuf;
use std::sync::Arc;

use chainwright_control::bootstrap::MockBootstrapper;
use chainwright_control::config::{ControlConfig, PathsConfig};
use chainwright_control::remote::MockRemote;
use chainwright_control::render::BuiltinRenderer;
use chainwright_control::restart::RecordingDispatcher;
use chainwright_control::service::seed_images;
use chainwright_control::{
    CatalogStore, ChainRecord, DeployContext, DeploymentManager, FrontRecord, MemoryStore, NodeId,
};
use tempfile::TempDir;

pub const IMAGE_V1: &str = "fiscoorg/fisco-webase:v2.7.2";
pub const IMAGE_V2: &str = "fiscoorg/fisco-webase:v2.8.0";
pub const IMAGE_SM: &str = "fiscoorg/fisco-webase:v2.8.0-gm";

/// Manager wired to in-process collaborators.
pub struct TestControl {
    pub dir: TempDir,
    pub config: ControlConfig,
    pub store: Arc<MemoryStore>,
    pub remote: Arc<MockRemote>,
    pub bootstrapper: Arc<MockBootstrapper>,
    pub restarts: Arc<RecordingDispatcher>,
    pub manager: DeploymentManager,
}

impl TestControl {
    /// Creates a manager over an empty catalog seeded with three image tags.
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = ControlConfig {
            paths: PathsConfig {
                nodes_root: dir.path().join("nodes"),
                quarantine_root: dir.path().join("deleted-tmp"),
                ..PathsConfig::default()
            },
            images: vec![
                fixtures::image(1, IMAGE_V1),
                fixtures::image(2, IMAGE_V2),
                fixtures::image(3, IMAGE_SM),
                fixtures::image(9, "  "),
            ],
            ..ControlConfig::default()
        };
        config.bootstrap.sm_suffix = "-gm".to_owned();

        let store = Arc::new(MemoryStore::new());
        seed_images(store.as_ref(), &config.images).await.unwrap();

        let remote = Arc::new(MockRemote::new());
        let bootstrapper = Arc::new(MockBootstrapper::new(config.ports));
        let restarts = Arc::new(RecordingDispatcher::new());

        let ctx = DeployContext::new(
            &config,
            bootstrapper.clone(),
            remote.clone(),
            Arc::new(BuiltinRenderer::new()),
        );
        let manager = DeploymentManager::new(store.clone(), ctx, restarts.clone());

        Self {
            dir,
            config,
            store,
            remote,
            bootstrapper,
            restarts,
            manager,
        }
    }

    /// Creates a manager with the two-host scenario chain already deployed.
    pub async fn with_chain() -> Self {
        let control = Self::new().await;
        control
            .manager
            .deploy_chain(&fixtures::scenario_request("chain0"))
            .await
            .unwrap();
        control
    }

    pub fn chain_dir(&self, chain: &str) -> PathBuf {
        self.config.paths.nodes_root.join(chain)
    }

    pub fn node_dir(&self, chain: &str, ip: &str, index: u32) -> PathBuf {
        self.chain_dir(chain).join(ip).join(format!("node{index}"))
    }

    /// Point-in-time row counts.
    pub async fn snapshot(&self) -> fixtures::Snapshot {
        fixtures::Snapshot::take(self.store.as_ref()).await
    }

    pub async fn chain(&self, name: &str) -> Option<ChainRecord> {
        let mut tx = self.store.begin().await.unwrap();
        tx.get_chain_by_name(name).await.unwrap()
    }

    pub async fn fronts(&self, chain: &str) -> Vec<FrontRecord> {
        let Some(record) = self.chain(chain).await else {
            return Vec::new();
        };
        let mut tx = self.store.begin().await.unwrap();
        tx.list_fronts(record.id).await.unwrap()
    }

    pub async fn front(&self, node_id: &NodeId) -> Option<FrontRecord> {
        let mut tx = self.store.begin().await.unwrap();
        tx.get_front_by_node_id(node_id).await.unwrap()
    }

    /// Node id of the front at `ip`/`node<index>`.
    pub async fn node_at(&self, chain: &str, ip: &str, index: u32) -> NodeId {
        self.fronts(chain)
            .await
            .into_iter()
            .find(|f| f.ip == ip && f.host_index == index)
            .map(|f| f.node_id)
            .unwrap()
    }
}
