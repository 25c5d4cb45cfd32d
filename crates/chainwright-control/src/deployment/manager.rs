//! Core deployment orchestration logic.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::{debug, error, info, instrument};

use super::{AddNodesRequest, DeployChainRequest, GroupLocks, Staged};
use crate::entity::{agency, chain, front, group, host, node, DeployContext};
use crate::error::{DeployError, DeployResult, WorkflowOutcome};
use crate::paths::NodeConfig;
use crate::restart::{FrontRunner, RestartDispatcher, RestartScope};
use crate::status::ChainStatus;
use crate::store::{CatalogStore, CatalogTx};
use crate::topology::{parse_topology, ConfigLine};
use crate::types::{
    AgencyRecord, ChainRecord, EncryptionScheme, FrontRecord, GroupId, HostRecord, NewChain,
    NodeId,
};

/// Exclusive upper bound on nodes added in one grow-group call.
const MAX_NEW_NODES: i64 = 200;

/// Orchestrates chain topology workflows.
pub struct DeploymentManager {
    store: Arc<dyn CatalogStore>,
    ctx: DeployContext,
    restarts: Arc<dyn RestartDispatcher>,
    runner: FrontRunner,
    locks: GroupLocks,
}

impl DeploymentManager {
    /// Create a new deployment manager.
    pub fn new(
        store: Arc<dyn CatalogStore>,
        ctx: DeployContext,
        restarts: Arc<dyn RestartDispatcher>,
    ) -> Self {
        let runner = FrontRunner::new(Arc::clone(&ctx.remote));
        Self {
            store,
            ctx,
            restarts,
            runner,
            locks: GroupLocks::new(),
        }
    }

    async fn commit<T>(&self, tx: Box<dyn CatalogTx>, staged: Staged<T>) -> DeployResult<T> {
        tx.commit().await?;
        for scope in staged.restarts {
            debug!(%scope, "publishing restart");
            self.restarts.dispatch(scope);
        }
        Ok(staged.value)
    }

    fn remove_chain_tree(&self, chain_name: &str) {
        if let Err(e) = self.ctx.layout.delete_chain(chain_name) {
            error!(chain = chain_name, error = %e, "failed to remove generated chain tree");
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Create chain
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a chain from topology lines.
    ///
    /// All-or-nothing: on failure after the bootstrap tool ran, the catalog
    /// transaction is rolled back and the generated tree removed.
    #[instrument(skip(self, request), fields(chain = %request.chain_name))]
    pub async fn deploy_chain(&self, request: &DeployChainRequest) -> DeployResult<WorkflowOutcome> {
        let mut tx = self.store.begin().await?;
        let staged = self.deploy_chain_within(tx.as_mut(), request).await?;

        if let Err(e) = tx.commit().await {
            self.remove_chain_tree(request.chain_name.trim());
            return Err(e.into_deploy_failed());
        }
        for scope in staged.restarts {
            self.restarts.dispatch(scope);
        }
        Ok(staged.value)
    }

    /// [`deploy_chain`](Self::deploy_chain) inside a caller's transaction.
    ///
    /// On error the caller must roll back; the generated tree has already
    /// been removed.
    pub async fn deploy_chain_within(
        &self,
        tx: &mut dyn CatalogTx,
        request: &DeployChainRequest,
    ) -> DeployResult<Staged<WorkflowOutcome>> {
        let name = request.chain_name.trim();
        chain::ensure_unused(tx, name).await?;
        if request.root_dir.trim().is_empty() {
            return Err(DeployError::InvalidParameter("root dir is blank".to_owned()));
        }
        let image = chain::resolve_image(tx, request.tag_id).await?;
        let encryption = EncryptionScheme::from_image(&image, &self.ctx.sm_suffix);

        let lines = parse_topology(&request.lines, self.ctx.remote.as_ref()).await?;
        let tool_lines: Vec<String> = lines.iter().map(ConfigLine::to_tool_line).collect();

        info!(lines = lines.len(), %encryption, %image, "running bootstrap tool");
        let result = match self
            .ctx
            .bootstrapper
            .build_chain(encryption, &tool_lines, name, self.ctx.layout.nodes_root())
            .await
        {
            Ok(result) => result,
            Err(e) => {
                self.remove_chain_tree(name);
                return Err(e.into_deploy_failed());
            }
        };
        if !result.success {
            self.remove_chain_tree(name);
            return Err(DeployError::BootstrapFailed {
                output: result.output,
            });
        }

        let new_chain = NewChain {
            name: name.to_owned(),
            description: String::new(),
            version: image,
            encryption,
            status: ChainStatus::Initialized,
            root_dir: request.root_dir.trim().to_owned(),
            run_mode: request.run_mode,
            signer_addr: request.signer_addr.clone(),
        };

        match self.record_chain(tx, &new_chain, &lines).await {
            Ok(()) => Ok(Staged::new(WorkflowOutcome::success(result.output))),
            Err(e) => {
                error!(chain = name, error = %e, "chain creation failed, removing generated tree");
                self.remove_chain_tree(name);
                Err(e.into_deploy_failed())
            }
        }
    }

    async fn record_chain(
        &self,
        tx: &mut dyn CatalogTx,
        new_chain: &NewChain,
        lines: &[ConfigLine],
    ) -> DeployResult<()> {
        let record = chain::insert(tx, new_chain).await?;

        let mut agencies: HashMap<String, AgencyRecord> = HashMap::new();
        let mut host_slots: HashMap<String, usize> = HashMap::new();
        let mut hosts: Vec<(HostRecord, BTreeSet<GroupId>)> = Vec::new();
        let mut group_counts: BTreeMap<GroupId, u32> = BTreeMap::new();

        for line in lines {
            let key = line.agency_name.to_ascii_lowercase();
            let owner = match agencies.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let created = agency::insert(tx, &record, &line.agency_name).await?;
                    agencies.insert(key, created.clone());
                    created
                }
            };

            let slot = match host_slots.get(&line.ip) {
                Some(slot) => *slot,
                None => {
                    let created = host::insert(tx, &record, &owner, &line.ip).await?;
                    hosts.push((created, BTreeSet::new()));
                    host_slots.insert(line.ip.clone(), hosts.len() - 1);
                    hosts.len() - 1
                }
            };
            hosts[slot].1.extend(line.group_ids.iter().copied());

            let count = u32::try_from(line.node_count)
                .map_err(|_| DeployError::node_count(line.node_count, "does not fit a group count"))?;
            for group_id in &line.group_ids {
                match group_counts.get_mut(group_id) {
                    Some(total) => *total += count,
                    None => {
                        group::save_group(tx, record.id, *group_id, count).await?;
                        group_counts.insert(*group_id, count);
                    }
                }
            }
        }

        let mut fronts = 0usize;
        for (host_record, groups) in &hosts {
            for dir in self.ctx.layout.list_host_nodes(&record.name, &host_record.ip)? {
                let node_config = NodeConfig::read(&dir)?;
                let mut node_groups = NodeConfig::group_ids(&dir)?;
                if node_groups.is_empty() {
                    node_groups.clone_from(groups);
                }
                front::insert_from_node_config(
                    tx,
                    &self.ctx,
                    &record,
                    host_record,
                    &node_config,
                    &node_groups,
                )
                .await?;
                fronts += 1;
            }
        }

        for (group_id, count) in &group_counts {
            group::update_node_count(tx, record.id, *group_id, *count).await?;
        }

        let host_records: Vec<HostRecord> = hosts.into_iter().map(|(h, _)| h).collect();
        host::init_host_list(&self.ctx, &record, &host_records).await;

        info!(
            chain = %record.name,
            agencies = agencies.len(),
            hosts = host_records.len(),
            groups = group_counts.len(),
            fronts,
            "chain recorded"
        );
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Grow group
    // ─────────────────────────────────────────────────────────────────────────

    /// Add nodes on one host to a group, creating the group if needed.
    #[instrument(skip(self, request), fields(chain = %request.chain_name, group = request.group_id, ip = %request.ip))]
    pub async fn deploy_nodes(&self, request: &AddNodesRequest) -> DeployResult<WorkflowOutcome> {
        let (group_id, _) = validate_add_nodes(request)?;
        let _guard = self
            .locks
            .acquire(request.chain_name.trim(), [group_id])
            .await;

        let mut tx = self.store.begin().await?;
        let staged = self.deploy_nodes_within(tx.as_mut(), request).await?;
        self.commit(tx, staged).await
    }

    /// [`deploy_nodes`](Self::deploy_nodes) inside a caller's transaction.
    ///
    /// Files already written for the new nodes are not removed on error.
    pub async fn deploy_nodes_within(
        &self,
        tx: &mut dyn CatalogTx,
        request: &AddNodesRequest,
    ) -> DeployResult<Staged<WorkflowOutcome>> {
        let (group_id, count) = validate_add_nodes(request)?;
        let record = chain::require_chain(tx, request.chain_name.trim()).await?;
        let ip = request.ip.trim();

        let host_record = match tx.get_host_by_ip(record.id, ip).await? {
            Some(existing) => {
                debug!(ip, agency = %existing.agency_name, "reusing known host");
                existing
            }
            None => {
                let agency_name = request
                    .agency_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| DeployError::AgencyNameRequired(ip.to_owned()))?;
                if !self.ctx.remote.connect(ip).await {
                    return Err(DeployError::HostUnreachable(ip.to_owned()));
                }
                let owner = agency::init_agency_if_new(tx, &self.ctx, &record, agency_name).await?;
                host::init_host(tx, &self.ctx, &record, &owner, ip).await?
            }
        };

        let (group_record, fresh_group) =
            group::save_or_update_node_count(tx, record.id, group_id, count).await?;

        let created = self
            .grow_group(tx, &record, &host_record, group_id, fresh_group, count)
            .await
            .map_err(DeployError::into_add_node_failed)?;

        info!(
            chain = %record.name,
            group = %group_id,
            fresh_group,
            node_count = group_record.node_count,
            "group grown"
        );
        let ids: Vec<&str> = created.iter().map(|n| n.node_id.as_str()).collect();
        Ok(Staged::new(WorkflowOutcome::success(ids.join(",")))
            .with_restart(RestartScope::Group(record.id, group_id)))
    }

    async fn grow_group(
        &self,
        tx: &mut dyn CatalogTx,
        record: &ChainRecord,
        host_record: &HostRecord,
        group_id: GroupId,
        fresh_group: bool,
        count: u32,
    ) -> DeployResult<Vec<NodeConfig>> {
        let created =
            front::init_front_and_node(tx, &self.ctx, record, host_record, group_id, count).await?;
        let new_ids: Vec<NodeId> = created.iter().map(|n| n.node_id.clone()).collect();
        front::update_node_config_by_groups(
            tx,
            &self.ctx,
            record,
            &BTreeSet::from([group_id]),
            None,
            &new_ids,
        )
        .await?;
        group::generate_new_nodes_group_configs_and_scp(
            tx,
            &self.ctx,
            record,
            &host_record.ip,
            group_id,
            fresh_group,
            &created,
        )
        .await?;
        Ok(created)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Delete node
    // ─────────────────────────────────────────────────────────────────────────

    /// Remove a stopped node, optionally reclaiming its host and agency.
    #[instrument(skip(self), fields(node = %node_id.short()))]
    pub async fn delete_node(
        &self,
        node_id: &NodeId,
        delete_host: bool,
        delete_agency: bool,
    ) -> DeployResult<WorkflowOutcome> {
        let (chain_name, groups) = self.delete_lock_set(node_id).await?;
        let _guard = self.locks.acquire(&chain_name, groups.iter().copied()).await;

        let mut tx = self.store.begin().await?;
        let staged = self
            .delete_node_locked(tx.as_mut(), node_id, delete_host, delete_agency, Some(&groups))
            .await?;
        self.commit(tx, staged).await
    }

    /// Chain name and every group `node_id` belongs to, on disk or in the
    /// catalog.
    async fn delete_lock_set(&self, node_id: &NodeId) -> DeployResult<(String, BTreeSet<GroupId>)> {
        let mut tx = self.store.begin().await?;
        let target = front::require_by_node_id(tx.as_mut(), node_id).await?;
        let record = tx
            .get_chain(target.chain_id)
            .await?
            .ok_or_else(|| DeployError::ChainNotFound(target.chain_name.clone()))?;
        let groups = node::memberships(tx.as_mut(), &self.ctx, &record, &target).await?;
        tx.rollback().await?;
        Ok((record.name, groups))
    }

    /// [`delete_node`](Self::delete_node) inside a caller's transaction.
    pub async fn delete_node_within(
        &self,
        tx: &mut dyn CatalogTx,
        node_id: &NodeId,
        delete_host: bool,
        delete_agency: bool,
    ) -> DeployResult<Staged<WorkflowOutcome>> {
        self.delete_node_locked(tx, node_id, delete_host, delete_agency, None)
            .await
    }

    async fn delete_node_locked(
        &self,
        tx: &mut dyn CatalogTx,
        node_id: &NodeId,
        delete_host: bool,
        delete_agency: bool,
        locked: Option<&BTreeSet<GroupId>>,
    ) -> DeployResult<Staged<WorkflowOutcome>> {
        let target = front::require_by_node_id(tx, node_id).await?;
        if target.status.is_running() {
            return Err(DeployError::NodeStillRunning(node_id.to_string()));
        }
        let record = tx
            .get_chain(target.chain_id)
            .await?
            .ok_or_else(|| DeployError::ChainNotFound(target.chain_name.clone()))?;
        let host_record = tx
            .get_host(target.host_id)
            .await?
            .ok_or_else(|| DeployError::HostNotFound(target.ip.clone()))?;

        let groups = node::memberships(tx, &self.ctx, &record, &target).await?;
        if let Some(locked) = locked {
            if !groups.is_subset(locked) {
                return Err(DeployError::internal(format!(
                    "memberships of node {node_id} changed while locking its groups"
                )));
            }
        }

        front::update_node_config_by_groups(
            tx,
            &self.ctx,
            &record,
            &groups,
            Some(node_id),
            &[],
        )
        .await
        .map_err(|e| DeployError::ConfigUpdateFailed(Box::new(e)))?;

        let quarantined = self
            .ctx
            .layout
            .quarantine_node(&record.name, &target.ip, target.host_index, node_id)
            .map_err(DeployError::NodeDirDeleteFailed)?;
        debug!(path = %quarantined.display(), "local node directory quarantined");
        node::move_node_on_remote_host(&self.ctx, &record, &host_record, &target).await;

        front::remove(tx, &target).await?;
        for group_id in &groups {
            group::release_node(tx, record.id, *group_id).await?;
        }

        let host_deleted =
            delete_host && host::delete_host_with_no_front(tx, host_record.id).await?;
        let agency_deleted =
            delete_agency && agency::delete_agency_with_no_host(tx, host_record.agency_id).await?;

        info!(
            chain = %record.name,
            ip = %target.ip,
            groups = groups.len(),
            host_deleted,
            agency_deleted,
            "node deleted"
        );

        let staged = Staged::new(WorkflowOutcome::success(format!("node {node_id} deleted")));
        Ok(if groups.is_empty() {
            staged
        } else {
            staged.with_restart(RestartScope::Groups(record.id, groups))
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Upgrade
    // ─────────────────────────────────────────────────────────────────────────

    /// Move a chain to a new image and restart all of its fronts.
    #[instrument(skip(self))]
    pub async fn upgrade(&self, chain_name: &str, tag_id: i32) -> DeployResult<WorkflowOutcome> {
        let mut tx = self.store.begin().await?;
        let staged = self.upgrade_within(tx.as_mut(), chain_name, tag_id).await?;
        self.commit(tx, staged).await
    }

    /// [`upgrade`](Self::upgrade) inside a caller's transaction.
    pub async fn upgrade_within(
        &self,
        tx: &mut dyn CatalogTx,
        chain_name: &str,
        tag_id: i32,
    ) -> DeployResult<Staged<WorkflowOutcome>> {
        let record = chain::require_chain(tx, chain_name.trim()).await?;
        let image = chain::resolve_image(tx, tag_id).await?;
        if record.version.eq_ignore_ascii_case(&image) {
            return Err(DeployError::SameVersion {
                chain: record.name,
                version: record.version,
            });
        }

        let encryption = EncryptionScheme::from_image(&image, &self.ctx.sm_suffix);
        chain::upgrade(tx, &record, &image, encryption).await?;

        Ok(Staged::new(WorkflowOutcome::success(format!(
            "chain {} upgraded from {} to {image}",
            record.name, record.version
        )))
        .with_restart(RestartScope::Chain(record.id)))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Delete chain
    // ─────────────────────────────────────────────────────────────────────────

    /// Delete a chain with no running fronts, then its generated tree.
    #[instrument(skip(self))]
    pub async fn delete_chain(&self, chain_name: &str) -> DeployResult<WorkflowOutcome> {
        let mut tx = self.store.begin().await?;
        let staged = self.delete_chain_within(tx.as_mut(), chain_name).await?;
        let outcome = self.commit(tx, staged).await?;
        self.remove_chain_tree(chain_name.trim());
        Ok(outcome)
    }

    /// Catalog part of [`delete_chain`](Self::delete_chain).
    ///
    /// The generated tree is left for the caller to remove after commit.
    pub async fn delete_chain_within(
        &self,
        tx: &mut dyn CatalogTx,
        chain_name: &str,
    ) -> DeployResult<Staged<WorkflowOutcome>> {
        let record = chain::require_chain(tx, chain_name.trim()).await?;
        if let Some(running) = tx
            .list_fronts(record.id)
            .await?
            .into_iter()
            .find(|f| f.status.is_running())
        {
            return Err(DeployError::NodeStillRunning(running.node_id.to_string()));
        }

        chain::delete(tx, &record).await?;
        info!(chain = %record.name, "chain deleted");
        Ok(Staged::new(WorkflowOutcome::success(format!(
            "chain {} deleted",
            record.name
        ))))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Start / stop
    // ─────────────────────────────────────────────────────────────────────────

    /// Start one node's front on its host and record it running.
    #[instrument(skip(self), fields(node = %node_id.short()))]
    pub async fn start_node(&self, node_id: &NodeId) -> DeployResult<WorkflowOutcome> {
        let (record, target) = self.resolve_front(node_id).await?;
        self.runner.start(&record, &target).await?;

        let mut tx = self.store.begin().await?;
        let groups = front::mark_running(tx.as_mut(), &target).await?;
        for group_id in groups {
            group::settle(tx.as_mut(), record.id, group_id).await?;
        }
        chain::mark_running(tx.as_mut(), &record).await?;
        tx.commit().await?;

        info!(ip = %target.ip, container = %target.container_name, "node started");
        Ok(WorkflowOutcome::success(format!("node {node_id} started")))
    }

    /// Stop one node's front and record it stopped.
    #[instrument(skip(self), fields(node = %node_id.short()))]
    pub async fn stop_node(&self, node_id: &NodeId) -> DeployResult<WorkflowOutcome> {
        let (record, target) = self.resolve_front(node_id).await?;
        front::ensure_running(&target)?;
        self.runner.stop(&record, &target).await?;

        let mut tx = self.store.begin().await?;
        front::mark_stopped(tx.as_mut(), &target).await?;
        tx.commit().await?;

        info!(ip = %target.ip, container = %target.container_name, "node stopped");
        Ok(WorkflowOutcome::success(format!("node {node_id} stopped")))
    }

    async fn resolve_front(
        &self,
        node_id: &NodeId,
    ) -> DeployResult<(ChainRecord, FrontRecord)> {
        let mut tx = self.store.begin().await?;
        let target = front::require_by_node_id(tx.as_mut(), node_id).await?;
        let record = tx
            .get_chain(target.chain_id)
            .await?
            .ok_or_else(|| DeployError::ChainNotFound(target.chain_name.clone()))?;
        tx.rollback().await?;
        Ok((record, target))
    }
}

/// Validate grow-group input before anything is written.
fn validate_add_nodes(request: &AddNodesRequest) -> DeployResult<(GroupId, u32)> {
    if request.count <= 0 || request.count >= MAX_NEW_NODES {
        return Err(DeployError::node_count(
            request.count,
            format!("must be between 1 and {}", MAX_NEW_NODES - 1),
        ));
    }
    if request.ip.trim().parse::<Ipv4Addr>().is_err() {
        return Err(DeployError::InvalidIp(request.ip.clone()));
    }
    if request.group_id <= 0 {
        return Err(DeployError::InvalidParameter(format!(
            "group id must be positive, got {}",
            request.group_id
        )));
    }
    let count = u32::try_from(request.count)
        .map_err(|_| DeployError::node_count(request.count, "out of range"))?;
    Ok((GroupId::new(request.group_id), count))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::bootstrap::MockBootstrapper;
    use crate::config::{ControlConfig, PathsConfig};
    use crate::remote::MockRemote;
    use crate::render::BuiltinRenderer;
    use crate::restart::RecordingDispatcher;
    use crate::service::seed_images;
    use crate::store::MemoryStore;
    use crate::types::{ImageConfig, RunMode};
    use rstest::rstest;
    use tempfile::TempDir;

    fn request(count: i64, ip: &str, group_id: i32) -> AddNodesRequest {
        AddNodesRequest {
            chain_name: "c1".to_owned(),
            group_id,
            ip: ip.to_owned(),
            agency_name: None,
            count,
        }
    }

    #[rstest]
    #[case(0)]
    #[case(-3)]
    #[case(200)]
    #[case(1_000)]
    fn count_out_of_range(#[case] count: i64) {
        let err = validate_add_nodes(&request(count, "10.0.0.1", 1)).unwrap_err();
        assert!(matches!(err, DeployError::InvalidNodeCount { .. }));
    }

    #[rstest]
    #[case("10.0.0")]
    #[case("host-a")]
    #[case("::1")]
    fn ip_must_be_ipv4(#[case] ip: &str) {
        let err = validate_add_nodes(&request(1, ip, 1)).unwrap_err();
        assert!(matches!(err, DeployError::InvalidIp(_)));
    }

    #[test]
    fn accepts_boundaries() {
        let (group, count) = validate_add_nodes(&request(199, " 10.0.0.9 ", 3)).unwrap();
        assert_eq!(group, GroupId::new(3));
        assert_eq!(count, 199);
        assert!(validate_add_nodes(&request(1, "10.0.0.9", 0)).is_err());
    }

    async fn deployed_manager(dir: &TempDir) -> DeploymentManager {
        let config = ControlConfig {
            paths: PathsConfig {
                nodes_root: dir.path().join("nodes"),
                quarantine_root: dir.path().join("deleted-tmp"),
                ..PathsConfig::default()
            },
            ..ControlConfig::default()
        };
        let store = Arc::new(MemoryStore::new());
        let image = ImageConfig {
            id: 1,
            config_type: "docker_image".to_owned(),
            value: "fiscoorg/fisco-webase:v2.7.2".to_owned(),
        };
        seed_images(store.as_ref(), &[image]).await.unwrap();

        let ctx = DeployContext::new(
            &config,
            Arc::new(MockBootstrapper::new(config.ports)),
            Arc::new(MockRemote::new()),
            Arc::new(BuiltinRenderer::new()),
        );
        let manager = DeploymentManager::new(store, ctx, Arc::new(RecordingDispatcher::new()));
        manager
            .deploy_chain(&DeployChainRequest {
                chain_name: "c1".to_owned(),
                tag_id: 1,
                lines: vec!["10.0.0.1:agencyA:2:{1}".to_owned()],
                root_dir: "/opt/chains".to_owned(),
                signer_addr: "10.0.0.9:5004".to_owned(),
                run_mode: RunMode::Docker,
            })
            .await
            .unwrap();
        manager
    }

    #[tokio::test]
    async fn delete_locks_groups_found_on_disk() {
        let dir = TempDir::new().unwrap();
        let manager = deployed_manager(&dir).await;
        let node_dir = manager.ctx.layout.node_dir("c1", "10.0.0.1", 1);
        let node_id = NodeConfig::read(&node_dir).unwrap().node_id;
        std::fs::write(NodeConfig::genesis_path(&node_dir, GroupId::new(7)), "genesis").unwrap();

        let (chain, groups) = manager.delete_lock_set(&node_id).await.unwrap();

        assert_eq!(chain, "c1");
        assert_eq!(groups, BTreeSet::from([GroupId::new(1), GroupId::new(7)]));
    }

    #[tokio::test]
    async fn delete_refuses_groups_it_did_not_lock() {
        let dir = TempDir::new().unwrap();
        let manager = deployed_manager(&dir).await;
        let node_dir = manager.ctx.layout.node_dir("c1", "10.0.0.1", 1);
        let node_id = NodeConfig::read(&node_dir).unwrap().node_id;

        let mut tx = manager.store.begin().await.unwrap();
        let err = manager
            .delete_node_locked(
                tx.as_mut(),
                &node_id,
                false,
                false,
                Some(&BTreeSet::new()),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Internal(_)));
        assert!(node_dir.exists());
    }
}
