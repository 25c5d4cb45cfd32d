//! Test fixtures for workflow integration tests.

use chainwright_control::types::ImageConfig;
use chainwright_control::{
    AddNodesRequest, CatalogStore, DeployChainRequest, GroupId, RunMode,
};

pub fn image(id: i32, value: &str) -> ImageConfig {
    ImageConfig {
        id,
        config_type: "docker_image".to_owned(),
        value: value.to_owned(),
    }
}

/// Two hosts under one agency: three nodes in group 1, one of which also
/// serves group 2.
pub fn scenario_lines() -> Vec<String> {
    vec![
        "10.0.0.1:agencyA:2:{1}".to_owned(),
        "10.0.0.2:agencyA:1:{1,2}".to_owned(),
    ]
}

pub fn scenario_request(chain: &str) -> DeployChainRequest {
    DeployChainRequest {
        chain_name: chain.to_owned(),
        tag_id: 1,
        lines: scenario_lines(),
        root_dir: "/opt/chains".to_owned(),
        signer_addr: "10.0.0.9:5004".to_owned(),
        run_mode: RunMode::Docker,
    }
}

/// Builder for grow-group requests against `chain0`.
pub struct AddNodes {
    request: AddNodesRequest,
}

impl AddNodes {
    pub fn new(group_id: i32, ip: &str, count: i64) -> Self {
        Self {
            request: AddNodesRequest {
                chain_name: "chain0".to_owned(),
                group_id,
                ip: ip.to_owned(),
                agency_name: None,
                count,
            },
        }
    }

    pub fn agency(mut self, name: &str) -> Self {
        self.request.agency_name = Some(name.to_owned());
        self
    }

    pub fn chain(mut self, name: &str) -> Self {
        self.request.chain_name = name.to_owned();
        self
    }

    pub fn build(self) -> AddNodesRequest {
        self.request
    }
}

/// Row counts across the whole catalog.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    pub chains: usize,
    pub agencies: usize,
    pub hosts: usize,
    pub fronts: usize,
    pub links: usize,
    pub nodes: usize,
    /// `(group, node_count)` per group, ordered by chain then group.
    pub groups: Vec<(GroupId, u32)>,
}

impl Snapshot {
    #[allow(clippy::unwrap_used)]
    pub async fn take(store: &dyn CatalogStore) -> Self {
        let mut tx = store.begin().await.unwrap();
        let mut snapshot = Self::default();

        for chain in tx.list_chains().await.unwrap() {
            snapshot.chains += 1;
            snapshot.agencies += tx.list_agencies(chain.id).await.unwrap().len();
            snapshot.hosts += tx.list_hosts(chain.id).await.unwrap().len();
            for group in tx.list_groups(chain.id).await.unwrap() {
                snapshot.nodes += tx
                    .list_nodes_by_group(chain.id, group.group_id)
                    .await
                    .unwrap()
                    .len();
                snapshot.groups.push((group.group_id, group.node_count));
            }
            for front in tx.list_fronts(chain.id).await.unwrap() {
                snapshot.fronts += 1;
                snapshot.links += tx.list_front_groups(front.id).await.unwrap().len();
            }
        }

        tx.rollback().await.unwrap();
        snapshot
    }

    /// Node count of `group_id`, if the group exists.
    pub fn group(&self, group_id: i32) -> Option<u32> {
        self.groups
            .iter()
            .find(|(g, _)| *g == GroupId::new(group_id))
            .map(|(_, count)| *count)
    }
}
