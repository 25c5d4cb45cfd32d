//! In-memory catalog store for testing.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{DeployError, DeployResult};
use crate::status::{ChainStatus, FrontStatus, GroupStatus, NodeStatus};
use crate::types::{
    AgencyId, AgencyRecord, ChainId, ChainRecord, EncryptionScheme, FrontGroupRecord, FrontId,
    FrontRecord, GroupId, GroupRecord, HostId, HostRecord, ImageConfig, NewChain, NewFront,
    NewHost, NodeId, NodeRecord,
};

use super::{CatalogStore, CatalogTx};

#[derive(Debug, Clone, Default)]
struct CatalogState {
    next_id: i64,
    images: BTreeMap<i32, ImageConfig>,
    chains: BTreeMap<ChainId, ChainRecord>,
    agencies: BTreeMap<AgencyId, AgencyRecord>,
    hosts: BTreeMap<HostId, HostRecord>,
    groups: BTreeMap<(ChainId, GroupId), GroupRecord>,
    fronts: BTreeMap<FrontId, FrontRecord>,
    front_groups: Vec<FrontGroupRecord>,
    nodes: Vec<NodeRecord>,
}

impl CatalogState {
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory catalog store.
///
/// A transaction works on a private copy of the catalog and holds the
/// store's write lock until it commits or is dropped, so writers are
/// serialised and a dropped transaction leaves no trace. Data is lost when
/// the process exits.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<CatalogState>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn begin(&self) -> DeployResult<Box<dyn CatalogTx>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<CatalogState>,
    working: CatalogState,
}

fn duplicate(entity: &'static str, key: impl Into<String>) -> DeployError {
    DeployError::Duplicate {
        entity,
        key: key.into(),
    }
}

fn group_missing(chain_id: ChainId, group_id: GroupId) -> DeployError {
    DeployError::GroupNotFound {
        chain_id: chain_id.get(),
        group_id: group_id.get(),
    }
}

#[async_trait]
impl CatalogTx for MemoryTx {
    async fn commit(self: Box<Self>) -> DeployResult<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DeployResult<()> {
        Ok(())
    }

    async fn upsert_image_config(&mut self, config: &ImageConfig) -> DeployResult<()> {
        self.working.images.insert(config.id, config.clone());
        Ok(())
    }

    async fn get_image_config(&mut self, id: i32) -> DeployResult<Option<ImageConfig>> {
        Ok(self.working.images.get(&id).cloned())
    }

    async fn insert_chain(&mut self, chain: &NewChain) -> DeployResult<ChainRecord> {
        if self.working.chains.values().any(|c| c.name == chain.name) {
            return Err(duplicate("chain", &chain.name));
        }
        let now = Utc::now();
        let record = ChainRecord {
            id: ChainId::new(self.working.allocate()),
            name: chain.name.clone(),
            description: chain.description.clone(),
            version: chain.version.clone(),
            encryption: chain.encryption,
            status: chain.status,
            root_dir: chain.root_dir.clone(),
            run_mode: chain.run_mode,
            signer_addr: chain.signer_addr.clone(),
            created_at: now,
            updated_at: now,
        };
        self.working.chains.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_chain(&mut self, id: ChainId) -> DeployResult<Option<ChainRecord>> {
        Ok(self.working.chains.get(&id).cloned())
    }

    async fn get_chain_by_name(&mut self, name: &str) -> DeployResult<Option<ChainRecord>> {
        Ok(self.working.chains.values().find(|c| c.name == name).cloned())
    }

    async fn list_chains(&mut self) -> DeployResult<Vec<ChainRecord>> {
        Ok(self.working.chains.values().cloned().collect())
    }

    async fn update_chain_version(
        &mut self,
        id: ChainId,
        version: &str,
        encryption: EncryptionScheme,
    ) -> DeployResult<()> {
        let chain = self
            .working
            .chains
            .get_mut(&id)
            .ok_or_else(|| DeployError::ChainNotFound(id.to_string()))?;
        chain.version = version.to_owned();
        chain.encryption = encryption;
        chain.updated_at = Utc::now();
        Ok(())
    }

    async fn update_chain_status(&mut self, id: ChainId, status: ChainStatus) -> DeployResult<()> {
        let chain = self
            .working
            .chains
            .get_mut(&id)
            .ok_or_else(|| DeployError::ChainNotFound(id.to_string()))?;
        chain.status = status;
        chain.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_chain(&mut self, id: ChainId) -> DeployResult<()> {
        self.working
            .chains
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| DeployError::ChainNotFound(id.to_string()))
    }

    async fn insert_agency(
        &mut self,
        chain_id: ChainId,
        chain_name: &str,
        name: &str,
    ) -> DeployResult<AgencyRecord> {
        if self
            .working
            .agencies
            .values()
            .any(|a| a.chain_id == chain_id && a.name.eq_ignore_ascii_case(name))
        {
            return Err(duplicate("agency", name));
        }
        let record = AgencyRecord {
            id: AgencyId::new(self.working.allocate()),
            name: name.to_owned(),
            chain_id,
            chain_name: chain_name.to_owned(),
            created_at: Utc::now(),
        };
        self.working.agencies.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_agency(&mut self, id: AgencyId) -> DeployResult<Option<AgencyRecord>> {
        Ok(self.working.agencies.get(&id).cloned())
    }

    async fn get_agency_by_name(
        &mut self,
        chain_id: ChainId,
        name: &str,
    ) -> DeployResult<Option<AgencyRecord>> {
        Ok(self
            .working
            .agencies
            .values()
            .find(|a| a.chain_id == chain_id && a.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn list_agencies(&mut self, chain_id: ChainId) -> DeployResult<Vec<AgencyRecord>> {
        Ok(self
            .working
            .agencies
            .values()
            .filter(|a| a.chain_id == chain_id)
            .cloned()
            .collect())
    }

    async fn delete_agency(&mut self, id: AgencyId) -> DeployResult<()> {
        self.working
            .agencies
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| DeployError::AgencyNotFound(id.to_string()))
    }

    async fn insert_host(&mut self, host: &NewHost) -> DeployResult<HostRecord> {
        if self
            .working
            .hosts
            .values()
            .any(|h| h.chain_id == host.chain_id && h.ip == host.ip)
        {
            return Err(duplicate("host", &host.ip));
        }
        let record = HostRecord {
            id: HostId::new(self.working.allocate()),
            ip: host.ip.clone(),
            agency_id: host.agency_id,
            agency_name: host.agency_name.clone(),
            chain_id: host.chain_id,
            root_dir: host.root_dir.clone(),
            created_at: Utc::now(),
        };
        self.working.hosts.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_host(&mut self, id: HostId) -> DeployResult<Option<HostRecord>> {
        Ok(self.working.hosts.get(&id).cloned())
    }

    async fn get_host_by_ip(
        &mut self,
        chain_id: ChainId,
        ip: &str,
    ) -> DeployResult<Option<HostRecord>> {
        Ok(self
            .working
            .hosts
            .values()
            .find(|h| h.chain_id == chain_id && h.ip == ip)
            .cloned())
    }

    async fn list_hosts(&mut self, chain_id: ChainId) -> DeployResult<Vec<HostRecord>> {
        Ok(self
            .working
            .hosts
            .values()
            .filter(|h| h.chain_id == chain_id)
            .cloned()
            .collect())
    }

    async fn list_hosts_by_agency(
        &mut self,
        agency_id: AgencyId,
    ) -> DeployResult<Vec<HostRecord>> {
        Ok(self
            .working
            .hosts
            .values()
            .filter(|h| h.agency_id == agency_id)
            .cloned()
            .collect())
    }

    async fn delete_host(&mut self, id: HostId) -> DeployResult<()> {
        self.working
            .hosts
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| DeployError::HostNotFound(id.to_string()))
    }

    async fn insert_group(
        &mut self,
        chain_id: ChainId,
        group_id: GroupId,
        node_count: u32,
        status: GroupStatus,
    ) -> DeployResult<GroupRecord> {
        let key = (chain_id, group_id);
        if self.working.groups.contains_key(&key) {
            return Err(duplicate("group", format!("{chain_id}/{group_id}")));
        }
        let now = Utc::now();
        let record = GroupRecord {
            chain_id,
            group_id,
            node_count,
            status,
            description: String::new(),
            created_at: now,
            updated_at: now,
        };
        self.working.groups.insert(key, record.clone());
        Ok(record)
    }

    async fn get_group(
        &mut self,
        chain_id: ChainId,
        group_id: GroupId,
    ) -> DeployResult<Option<GroupRecord>> {
        Ok(self.working.groups.get(&(chain_id, group_id)).cloned())
    }

    async fn list_groups(&mut self, chain_id: ChainId) -> DeployResult<Vec<GroupRecord>> {
        Ok(self
            .working
            .groups
            .range((chain_id, GroupId::new(i32::MIN))..=(chain_id, GroupId::new(i32::MAX)))
            .map(|(_, g)| g.clone())
            .collect())
    }

    async fn update_group_count(
        &mut self,
        chain_id: ChainId,
        group_id: GroupId,
        node_count: u32,
    ) -> DeployResult<()> {
        let group = self
            .working
            .groups
            .get_mut(&(chain_id, group_id))
            .ok_or_else(|| group_missing(chain_id, group_id))?;
        group.node_count = node_count;
        group.updated_at = Utc::now();
        Ok(())
    }

    async fn update_group_status(
        &mut self,
        chain_id: ChainId,
        group_id: GroupId,
        status: GroupStatus,
    ) -> DeployResult<()> {
        let group = self
            .working
            .groups
            .get_mut(&(chain_id, group_id))
            .ok_or_else(|| group_missing(chain_id, group_id))?;
        group.status = status;
        group.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_group(&mut self, chain_id: ChainId, group_id: GroupId) -> DeployResult<()> {
        self.working
            .groups
            .remove(&(chain_id, group_id))
            .map(|_| ())
            .ok_or_else(|| group_missing(chain_id, group_id))
    }

    async fn insert_front(&mut self, front: &NewFront) -> DeployResult<FrontRecord> {
        if self
            .working
            .fronts
            .values()
            .any(|f| f.chain_id == front.chain_id && f.node_id == front.node_id)
        {
            return Err(duplicate("front", front.node_id.as_str()));
        }
        let now = Utc::now();
        let record = FrontRecord {
            id: FrontId::new(self.working.allocate()),
            node_id: front.node_id.clone(),
            ip: front.ip.clone(),
            front_port: front.front_port,
            agency_id: front.agency_id,
            agency_name: front.agency_name.clone(),
            host_id: front.host_id,
            host_index: front.host_index,
            image_tag: front.image_tag.clone(),
            run_mode: front.run_mode,
            container_name: front.container_name.clone(),
            rpc_port: front.rpc_port,
            p2p_port: front.p2p_port,
            channel_port: front.channel_port,
            chain_id: front.chain_id,
            chain_name: front.chain_name.clone(),
            status: front.status,
            created_at: now,
            updated_at: now,
        };
        self.working.fronts.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_front(&mut self, id: FrontId) -> DeployResult<Option<FrontRecord>> {
        Ok(self.working.fronts.get(&id).cloned())
    }

    async fn get_front_by_node_id(
        &mut self,
        node_id: &NodeId,
    ) -> DeployResult<Option<FrontRecord>> {
        Ok(self
            .working
            .fronts
            .values()
            .find(|f| &f.node_id == node_id)
            .cloned())
    }

    async fn list_fronts(&mut self, chain_id: ChainId) -> DeployResult<Vec<FrontRecord>> {
        Ok(self
            .working
            .fronts
            .values()
            .filter(|f| f.chain_id == chain_id)
            .cloned()
            .collect())
    }

    async fn list_fronts_by_host(&mut self, host_id: HostId) -> DeployResult<Vec<FrontRecord>> {
        let mut fronts: Vec<_> = self
            .working
            .fronts
            .values()
            .filter(|f| f.host_id == host_id)
            .cloned()
            .collect();
        fronts.sort_by_key(|f| f.host_index);
        Ok(fronts)
    }

    async fn list_fronts_by_group(
        &mut self,
        chain_id: ChainId,
        group_id: GroupId,
    ) -> DeployResult<Vec<FrontRecord>> {
        let linked: Vec<FrontId> = self
            .working
            .front_groups
            .iter()
            .filter(|l| l.chain_id == chain_id && l.group_id == group_id)
            .map(|l| l.front_id)
            .collect();
        Ok(self
            .working
            .fronts
            .values()
            .filter(|f| linked.contains(&f.id))
            .cloned()
            .collect())
    }

    async fn update_front_status(
        &mut self,
        id: FrontId,
        status: FrontStatus,
    ) -> DeployResult<()> {
        let front = self
            .working
            .fronts
            .get_mut(&id)
            .ok_or_else(|| DeployError::NodeNotFound(id.to_string()))?;
        front.status = status;
        front.updated_at = Utc::now();
        Ok(())
    }

    async fn update_front_images(&mut self, chain_id: ChainId, image: &str) -> DeployResult<()> {
        let now = Utc::now();
        for front in self
            .working
            .fronts
            .values_mut()
            .filter(|f| f.chain_id == chain_id)
        {
            front.image_tag = image.to_owned();
            front.updated_at = now;
        }
        Ok(())
    }

    async fn delete_front(&mut self, id: FrontId) -> DeployResult<()> {
        self.working
            .fronts
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| DeployError::NodeNotFound(id.to_string()))
    }

    async fn insert_front_group(&mut self, link: &FrontGroupRecord) -> DeployResult<()> {
        if self
            .working
            .front_groups
            .iter()
            .any(|l| l.front_id == link.front_id && l.group_id == link.group_id)
        {
            return Err(duplicate(
                "front_group",
                format!("{}/{}", link.front_id, link.group_id),
            ));
        }
        self.working.front_groups.push(link.clone());
        Ok(())
    }

    async fn list_front_groups(
        &mut self,
        front_id: FrontId,
    ) -> DeployResult<Vec<FrontGroupRecord>> {
        let mut links: Vec<_> = self
            .working
            .front_groups
            .iter()
            .filter(|l| l.front_id == front_id)
            .cloned()
            .collect();
        links.sort_by_key(|l| l.group_id);
        Ok(links)
    }

    async fn update_front_group_status(
        &mut self,
        front_id: FrontId,
        group_id: GroupId,
        status: GroupStatus,
    ) -> DeployResult<()> {
        let link = self
            .working
            .front_groups
            .iter_mut()
            .find(|l| l.front_id == front_id && l.group_id == group_id)
            .ok_or_else(|| DeployError::NodeNotFound(front_id.to_string()))?;
        link.status = status;
        Ok(())
    }

    async fn delete_front_groups(&mut self, front_id: FrontId) -> DeployResult<()> {
        self.working.front_groups.retain(|l| l.front_id != front_id);
        Ok(())
    }

    async fn insert_node(&mut self, node: &NodeRecord) -> DeployResult<()> {
        if self.working.nodes.iter().any(|n| {
            n.chain_id == node.chain_id && n.node_id == node.node_id && n.group_id == node.group_id
        }) {
            return Err(duplicate("node", node.name.clone()));
        }
        self.working.nodes.push(node.clone());
        Ok(())
    }

    async fn list_nodes_by_group(
        &mut self,
        chain_id: ChainId,
        group_id: GroupId,
    ) -> DeployResult<Vec<NodeRecord>> {
        let mut nodes: Vec<_> = self
            .working
            .nodes
            .iter()
            .filter(|n| n.chain_id == chain_id && n.group_id == group_id)
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Ok(nodes)
    }

    async fn list_nodes_by_node_id(
        &mut self,
        chain_id: ChainId,
        node_id: &NodeId,
    ) -> DeployResult<Vec<NodeRecord>> {
        let mut nodes: Vec<_> = self
            .working
            .nodes
            .iter()
            .filter(|n| n.chain_id == chain_id && &n.node_id == node_id)
            .cloned()
            .collect();
        nodes.sort_by_key(|n| n.group_id);
        Ok(nodes)
    }

    async fn update_node_status(
        &mut self,
        chain_id: ChainId,
        node_id: &NodeId,
        status: NodeStatus,
    ) -> DeployResult<()> {
        for node in self
            .working
            .nodes
            .iter_mut()
            .filter(|n| n.chain_id == chain_id && &n.node_id == node_id)
        {
            node.status = status;
        }
        Ok(())
    }

    async fn delete_nodes_by_node_id(
        &mut self,
        chain_id: ChainId,
        node_id: &NodeId,
    ) -> DeployResult<()> {
        self.working
            .nodes
            .retain(|n| !(n.chain_id == chain_id && &n.node_id == node_id));
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::RunMode;

    fn test_chain(name: &str) -> NewChain {
        NewChain {
            name: name.to_owned(),
            description: String::new(),
            version: "fiscoorg/fisco-webase:v2.7.2".to_owned(),
            encryption: EncryptionScheme::Ecdsa,
            status: ChainStatus::Initialized,
            root_dir: "/opt/chains".to_owned(),
            run_mode: RunMode::Docker,
            signer_addr: "10.0.0.9:5004".to_owned(),
        }
    }

    #[tokio::test]
    async fn commit_makes_writes_visible() {
        let store = MemoryStore::new();

        let mut tx = store.begin().await.expect("begin failed");
        let chain = tx.insert_chain(&test_chain("c1")).await.expect("insert failed");
        tx.commit().await.expect("commit failed");

        let mut tx = store.begin().await.expect("begin failed");
        let found = tx
            .get_chain_by_name("c1")
            .await
            .expect("get failed")
            .expect("chain not found");
        assert_eq!(found.id, chain.id);
        assert_eq!(found.status, ChainStatus::Initialized);
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = MemoryStore::new();

        {
            let mut tx = store.begin().await.expect("begin failed");
            let chain = tx.insert_chain(&test_chain("c1")).await.expect("insert failed");
            tx.insert_agency(chain.id, "c1", "agencyA")
                .await
                .expect("insert failed");
        }

        let mut tx = store.begin().await.expect("begin failed");
        assert!(tx.get_chain_by_name("c1").await.expect("get failed").is_none());
        assert!(tx.list_chains().await.expect("list failed").is_empty());

        // Id allocation restarts too.
        let chain = tx.insert_chain(&test_chain("c2")).await.expect("insert failed");
        assert_eq!(chain.id, ChainId::new(1));
    }

    #[tokio::test]
    async fn duplicate_chain_name_fails() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.expect("begin failed");

        tx.insert_chain(&test_chain("c1")).await.expect("first insert failed");
        let err = tx.insert_chain(&test_chain("c1")).await.unwrap_err();
        assert!(matches!(err, DeployError::Duplicate { entity: "chain", .. }));
    }

    #[tokio::test]
    async fn agency_names_ignore_case() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.expect("begin failed");
        let chain = tx.insert_chain(&test_chain("c1")).await.expect("insert failed");
        let agency = tx
            .insert_agency(chain.id, "c1", "agencyA")
            .await
            .expect("insert failed");

        let found = tx
            .get_agency_by_name(chain.id, "AGENCYA")
            .await
            .expect("get failed")
            .expect("agency not found");
        assert_eq!(found.id, agency.id);

        let err = tx.insert_agency(chain.id, "c1", "Agencya").await.unwrap_err();
        assert!(matches!(err, DeployError::Duplicate { entity: "agency", .. }));
    }

    #[tokio::test]
    async fn group_count_and_status() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.expect("begin failed");
        let chain = tx.insert_chain(&test_chain("c1")).await.expect("insert failed");

        tx.insert_group(chain.id, GroupId::new(2), 1, GroupStatus::Maintaining)
            .await
            .expect("insert failed");
        tx.insert_group(chain.id, GroupId::new(1), 3, GroupStatus::Maintaining)
            .await
            .expect("insert failed");
        tx.update_group_count(chain.id, GroupId::new(1), 4)
            .await
            .expect("update failed");
        tx.update_group_status(chain.id, GroupId::new(2), GroupStatus::Normal)
            .await
            .expect("update failed");

        let groups = tx.list_groups(chain.id).await.expect("list failed");
        let summary: Vec<_> = groups
            .iter()
            .map(|g| (g.group_id.get(), g.node_count, g.status))
            .collect();
        assert_eq!(
            summary,
            vec![(1, 4, GroupStatus::Maintaining), (2, 1, GroupStatus::Normal)]
        );

        let err = tx
            .update_group_count(chain.id, GroupId::new(9), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::GroupNotFound { group_id: 9, .. }));
    }

    #[tokio::test]
    async fn fronts_by_group_follow_links() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.expect("begin failed");
        let chain = tx.insert_chain(&test_chain("c1")).await.expect("insert failed");
        let agency = tx
            .insert_agency(chain.id, "c1", "agencyA")
            .await
            .expect("insert failed");
        let host = tx
            .insert_host(&NewHost {
                agency_id: agency.id,
                agency_name: agency.name.clone(),
                chain_id: chain.id,
                ip: "10.0.0.1".to_owned(),
                root_dir: "/opt/chains".to_owned(),
            })
            .await
            .expect("insert failed");

        let mut front_ids = Vec::new();
        for index in 0..2u16 {
            let front = tx
                .insert_front(&NewFront {
                    node_id: NodeId::new(format!("node{index}")),
                    ip: host.ip.clone(),
                    front_port: 5002 + index,
                    agency_id: agency.id,
                    agency_name: agency.name.clone(),
                    host_id: host.id,
                    host_index: u32::from(index),
                    image_tag: chain.version.clone(),
                    run_mode: RunMode::Docker,
                    container_name: format!("optchains-c1-node{index}"),
                    rpc_port: 8545 + index,
                    p2p_port: 30300 + index,
                    channel_port: 20200 + index,
                    chain_id: chain.id,
                    chain_name: chain.name.clone(),
                    status: FrontStatus::Initialized,
                })
                .await
                .expect("insert failed");
            front_ids.push(front.id);
        }

        tx.insert_front_group(&FrontGroupRecord {
            front_id: front_ids[1],
            chain_id: chain.id,
            group_id: GroupId::new(1),
            status: GroupStatus::Maintaining,
        })
        .await
        .expect("link failed");

        let fronts = tx
            .list_fronts_by_group(chain.id, GroupId::new(1))
            .await
            .expect("list failed");
        assert_eq!(fronts.len(), 1);
        assert_eq!(fronts[0].id, front_ids[1]);

        tx.delete_front_groups(front_ids[1]).await.expect("delete failed");
        assert!(tx
            .list_fronts_by_group(chain.id, GroupId::new(1))
            .await
            .expect("list failed")
            .is_empty());
    }
}
