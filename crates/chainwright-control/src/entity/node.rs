//! Node memberships and node directories.

use std::collections::BTreeSet;

use tracing::{info, warn};

use super::DeployContext;
use crate::error::DeployResult;
use crate::paths::{NodeConfig, PathLayout};
use crate::store::CatalogTx;
use crate::types::{ChainId, ChainRecord, FrontRecord, GroupId, HostRecord, NodeId};

/// Groups a node belongs to, per its directory and the catalog.
pub(crate) async fn memberships(
    tx: &mut dyn CatalogTx,
    ctx: &DeployContext,
    chain: &ChainRecord,
    front: &FrontRecord,
) -> DeployResult<BTreeSet<GroupId>> {
    let node_dir = ctx.layout.node_dir(&chain.name, &front.ip, front.host_index);
    let mut groups = NodeConfig::group_ids(&node_dir)?;
    groups.extend(
        tx.list_front_groups(front.id)
            .await?
            .into_iter()
            .map(|link| link.group_id),
    );
    Ok(groups)
}

/// `ip:p2p_port` of every node in `groups`, minus `exclude`.
///
/// Sorted and deduplicated, so a node sharing several groups appears once.
pub(crate) async fn peers(
    tx: &mut dyn CatalogTx,
    chain_id: ChainId,
    groups: &BTreeSet<GroupId>,
    exclude: Option<&NodeId>,
) -> DeployResult<Vec<String>> {
    let mut peers = BTreeSet::new();
    for group_id in groups {
        for node in tx.list_nodes_by_group(chain_id, *group_id).await? {
            if exclude == Some(&node.node_id) {
                continue;
            }
            peers.insert(format!("{}:{}", node.ip, node.p2p_port));
        }
    }
    Ok(peers.into_iter().collect())
}

/// Move a node directory on its host into the remote quarantine.
///
/// Best effort: failures are logged and never fail the caller.
pub(crate) async fn move_node_on_remote_host(
    ctx: &DeployContext,
    chain: &ChainRecord,
    host: &HostRecord,
    front: &FrontRecord,
) {
    let src = PathLayout::remote_node_dir(&host.root_dir, &chain.name, front.host_index);
    let dst = ctx.layout.remote_quarantine_path(
        &host.root_dir,
        &chain.name,
        &host.ip,
        front.host_index,
        &front.node_id,
    );

    match ctx.remote.move_dir(&host.ip, &src, &dst).await {
        Ok(()) => info!(ip = %host.ip, src, dst, "remote node directory quarantined"),
        Err(e) => warn!(ip = %host.ip, src, error = %e, "remote quarantine failed"),
    }
}
