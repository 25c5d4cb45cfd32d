//! Catalog storage backends.
//!
//! The catalog is the single source of truth for chain topology. Every
//! read and write happens inside a [`CatalogTx`] obtained from
//! [`CatalogStore::begin`]; nothing is visible to other transactions until
//! [`CatalogTx::commit`], and dropping a transaction discards its writes.
//!
//! The primary implementation uses PostgreSQL. An in-memory implementation
//! with the same isolation behaviour is provided for testing and dry runs.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use async_trait::async_trait;

use crate::error::DeployResult;
use crate::status::{ChainStatus, FrontStatus, GroupStatus, NodeStatus};
use crate::types::{
    AgencyId, AgencyRecord, ChainId, ChainRecord, EncryptionScheme, FrontGroupRecord, FrontId,
    FrontRecord, GroupId, GroupRecord, HostId, HostRecord, ImageConfig, NewChain, NewFront,
    NewHost, NodeId, NodeRecord,
};

/// Backend that hands out catalog transactions.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Start a new transaction.
    async fn begin(&self) -> DeployResult<Box<dyn CatalogTx>>;
}

/// One catalog transaction.
///
/// Each call is atomic and participates in the transaction. Writers that
/// touch a row that does not exist return the matching not-found error;
/// inserts that collide with a natural key return
/// [`DeployError::Duplicate`](crate::error::DeployError::Duplicate).
#[async_trait]
pub trait CatalogTx: Send {
    /// Make every write in this transaction durable.
    async fn commit(self: Box<Self>) -> DeployResult<()>;

    /// Discard every write in this transaction.
    async fn rollback(self: Box<Self>) -> DeployResult<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Image configs
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace an image config.
    async fn upsert_image_config(&mut self, config: &ImageConfig) -> DeployResult<()>;

    /// Resolve an image tag id.
    async fn get_image_config(&mut self, id: i32) -> DeployResult<Option<ImageConfig>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Chains
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a chain.
    async fn insert_chain(&mut self, chain: &NewChain) -> DeployResult<ChainRecord>;

    /// Get a chain by id.
    async fn get_chain(&mut self, id: ChainId) -> DeployResult<Option<ChainRecord>>;

    /// Get a chain by its unique name.
    async fn get_chain_by_name(&mut self, name: &str) -> DeployResult<Option<ChainRecord>>;

    /// List every chain, ordered by id.
    async fn list_chains(&mut self) -> DeployResult<Vec<ChainRecord>>;

    /// Replace a chain's image reference and key scheme.
    async fn update_chain_version(
        &mut self,
        id: ChainId,
        version: &str,
        encryption: EncryptionScheme,
    ) -> DeployResult<()>;

    /// Write a chain's status.
    async fn update_chain_status(&mut self, id: ChainId, status: ChainStatus) -> DeployResult<()>;

    /// Delete a chain row.
    async fn delete_chain(&mut self, id: ChainId) -> DeployResult<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Agencies
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert an agency.
    async fn insert_agency(
        &mut self,
        chain_id: ChainId,
        chain_name: &str,
        name: &str,
    ) -> DeployResult<AgencyRecord>;

    /// Get an agency by id.
    async fn get_agency(&mut self, id: AgencyId) -> DeployResult<Option<AgencyRecord>>;

    /// Get an agency by name within a chain.
    async fn get_agency_by_name(
        &mut self,
        chain_id: ChainId,
        name: &str,
    ) -> DeployResult<Option<AgencyRecord>>;

    /// List a chain's agencies, ordered by id.
    async fn list_agencies(&mut self, chain_id: ChainId) -> DeployResult<Vec<AgencyRecord>>;

    /// Delete an agency row.
    async fn delete_agency(&mut self, id: AgencyId) -> DeployResult<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Hosts
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a host.
    async fn insert_host(&mut self, host: &NewHost) -> DeployResult<HostRecord>;

    /// Get a host by id.
    async fn get_host(&mut self, id: HostId) -> DeployResult<Option<HostRecord>>;

    /// Get a host by address within a chain.
    async fn get_host_by_ip(
        &mut self,
        chain_id: ChainId,
        ip: &str,
    ) -> DeployResult<Option<HostRecord>>;

    /// List a chain's hosts, ordered by id.
    async fn list_hosts(&mut self, chain_id: ChainId) -> DeployResult<Vec<HostRecord>>;

    /// List an agency's hosts, ordered by id.
    async fn list_hosts_by_agency(&mut self, agency_id: AgencyId)
        -> DeployResult<Vec<HostRecord>>;

    /// Delete a host row.
    async fn delete_host(&mut self, id: HostId) -> DeployResult<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Groups
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a group.
    async fn insert_group(
        &mut self,
        chain_id: ChainId,
        group_id: GroupId,
        node_count: u32,
        status: GroupStatus,
    ) -> DeployResult<GroupRecord>;

    /// Get a group.
    async fn get_group(
        &mut self,
        chain_id: ChainId,
        group_id: GroupId,
    ) -> DeployResult<Option<GroupRecord>>;

    /// List a chain's groups, ordered by group id.
    async fn list_groups(&mut self, chain_id: ChainId) -> DeployResult<Vec<GroupRecord>>;

    /// Write a group's node count.
    async fn update_group_count(
        &mut self,
        chain_id: ChainId,
        group_id: GroupId,
        node_count: u32,
    ) -> DeployResult<()>;

    /// Write a group's status.
    async fn update_group_status(
        &mut self,
        chain_id: ChainId,
        group_id: GroupId,
        status: GroupStatus,
    ) -> DeployResult<()>;

    /// Delete a group row.
    async fn delete_group(&mut self, chain_id: ChainId, group_id: GroupId) -> DeployResult<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Fronts
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a front.
    async fn insert_front(&mut self, front: &NewFront) -> DeployResult<FrontRecord>;

    /// Get a front by id.
    async fn get_front(&mut self, id: FrontId) -> DeployResult<Option<FrontRecord>>;

    /// Get the front serving a node identity.
    async fn get_front_by_node_id(&mut self, node_id: &NodeId)
        -> DeployResult<Option<FrontRecord>>;

    /// List a chain's fronts, ordered by id.
    async fn list_fronts(&mut self, chain_id: ChainId) -> DeployResult<Vec<FrontRecord>>;

    /// List a host's fronts, ordered by host index.
    async fn list_fronts_by_host(&mut self, host_id: HostId) -> DeployResult<Vec<FrontRecord>>;

    /// List the fronts linked to a group, ordered by id.
    async fn list_fronts_by_group(
        &mut self,
        chain_id: ChainId,
        group_id: GroupId,
    ) -> DeployResult<Vec<FrontRecord>>;

    /// Write a front's status.
    async fn update_front_status(&mut self, id: FrontId, status: FrontStatus)
        -> DeployResult<()>;

    /// Point every front of a chain at a new image reference.
    async fn update_front_images(&mut self, chain_id: ChainId, image: &str) -> DeployResult<()>;

    /// Delete a front row.
    async fn delete_front(&mut self, id: FrontId) -> DeployResult<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Front ↔ group links
    // ─────────────────────────────────────────────────────────────────────────

    /// Link a front to a group.
    async fn insert_front_group(&mut self, link: &FrontGroupRecord) -> DeployResult<()>;

    /// List a front's group links, ordered by group id.
    async fn list_front_groups(&mut self, front_id: FrontId)
        -> DeployResult<Vec<FrontGroupRecord>>;

    /// Write a link's status.
    async fn update_front_group_status(
        &mut self,
        front_id: FrontId,
        group_id: GroupId,
        status: GroupStatus,
    ) -> DeployResult<()>;

    /// Delete every link of a front.
    async fn delete_front_groups(&mut self, front_id: FrontId) -> DeployResult<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Nodes
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a node membership.
    async fn insert_node(&mut self, node: &NodeRecord) -> DeployResult<()>;

    /// List a group's node memberships, ordered by node id.
    async fn list_nodes_by_group(
        &mut self,
        chain_id: ChainId,
        group_id: GroupId,
    ) -> DeployResult<Vec<NodeRecord>>;

    /// List every membership of one node identity.
    async fn list_nodes_by_node_id(
        &mut self,
        chain_id: ChainId,
        node_id: &NodeId,
    ) -> DeployResult<Vec<NodeRecord>>;

    /// Write the status of every membership of one node identity.
    async fn update_node_status(
        &mut self,
        chain_id: ChainId,
        node_id: &NodeId,
        status: NodeStatus,
    ) -> DeployResult<()>;

    /// Delete every membership of one node identity.
    async fn delete_nodes_by_node_id(
        &mut self,
        chain_id: ChainId,
        node_id: &NodeId,
    ) -> DeployResult<()>;
}
