//! Group rows and group membership artifacts.

use chrono::Utc;
use tracing::{debug, info};

use super::DeployContext;
use crate::error::{DeployError, DeployResult};
use crate::paths::{NodeConfig, PathLayout};
use crate::render::Template;
use crate::status::{GroupStatus, StatusMachine};
use crate::store::CatalogTx;
use crate::types::{ChainId, ChainRecord, GroupId, GroupRecord};

/// Create a group that is still settling.
pub(crate) async fn save_group(
    tx: &mut dyn CatalogTx,
    chain_id: ChainId,
    group_id: GroupId,
    node_count: u32,
) -> DeployResult<GroupRecord> {
    let group = tx
        .insert_group(chain_id, group_id, node_count, GroupStatus::Maintaining)
        .await?;
    debug!(chain = %chain_id, group = %group_id, node_count, "group created");
    Ok(group)
}

/// Add `added` nodes to a group, creating it if needed.
///
/// Returns the group's new state and whether it starts from scratch: either
/// created here or emptied by earlier deletions, so no member can hand over
/// a genesis.
pub(crate) async fn save_or_update_node_count(
    tx: &mut dyn CatalogTx,
    chain_id: ChainId,
    group_id: GroupId,
    added: u32,
) -> DeployResult<(GroupRecord, bool)> {
    let Some(mut group) = tx.get_group(chain_id, group_id).await? else {
        return Ok((save_group(tx, chain_id, group_id, added).await?, true));
    };

    let fresh = group.node_count == 0;
    group.node_count = group.node_count.saturating_add(added);
    tx.update_group_count(chain_id, group_id, group.node_count)
        .await?;
    if group.status != GroupStatus::Maintaining {
        group.status = group.status.transition(GroupStatus::Maintaining)?;
        tx.update_group_status(chain_id, group_id, group.status)
            .await?;
    }
    info!(chain = %chain_id, group = %group_id, node_count = group.node_count, fresh, "group grown");
    Ok((group, fresh))
}

/// Write a group's node count.
pub(crate) async fn update_node_count(
    tx: &mut dyn CatalogTx,
    chain_id: ChainId,
    group_id: GroupId,
    node_count: u32,
) -> DeployResult<()> {
    tx.update_group_count(chain_id, group_id, node_count).await
}

/// Take one departing node off a group's count.
pub(crate) async fn release_node(
    tx: &mut dyn CatalogTx,
    chain_id: ChainId,
    group_id: GroupId,
) -> DeployResult<()> {
    if let Some(group) = tx.get_group(chain_id, group_id).await? {
        tx.update_group_count(chain_id, group_id, group.node_count.saturating_sub(1))
            .await?;
    }
    Ok(())
}

/// Write genesis and group config into new node directories and ship them.
///
/// A new or emptied group gets a fresh genesis sealed by the new nodes. A
/// group with members hands its current genesis to the new ones.
pub(crate) async fn generate_new_nodes_group_configs_and_scp(
    tx: &mut dyn CatalogTx,
    ctx: &DeployContext,
    chain: &ChainRecord,
    ip: &str,
    group_id: GroupId,
    new_group: bool,
    new_nodes: &[NodeConfig],
) -> DeployResult<()> {
    let genesis = if new_group {
        let mut values = vec![
            ("group_id", group_id.to_string()),
            ("timestamp", Utc::now().timestamp_millis().to_string()),
        ];
        values.extend(new_nodes.iter().map(|n| ("sealer", n.node_id.to_string())));
        ctx.renderer.render(Template::GroupGenesis, &values)?
    } else {
        existing_genesis(tx, ctx, chain, group_id, new_nodes).await?
    };
    let group_ini = ctx
        .renderer
        .render(Template::GroupConfig, &[("group_id", group_id.to_string())])?;

    let remote_dir = PathLayout::remote_chain_dir(&chain.root_dir, &chain.name);
    for node in new_nodes {
        std::fs::write(NodeConfig::genesis_path(&node.dir, group_id), &genesis)?;
        std::fs::write(NodeConfig::group_ini_path(&node.dir, group_id), &group_ini)?;
        ctx.remote.upload(ip, &node.dir, &remote_dir).await?;
    }

    info!(
        chain = %chain.name,
        group = %group_id,
        new_group,
        nodes = new_nodes.len(),
        "group configs distributed"
    );
    Ok(())
}

async fn existing_genesis(
    tx: &mut dyn CatalogTx,
    ctx: &DeployContext,
    chain: &ChainRecord,
    group_id: GroupId,
    new_nodes: &[NodeConfig],
) -> DeployResult<String> {
    let member = tx
        .list_fronts_by_group(chain.id, group_id)
        .await?
        .into_iter()
        .find(|f| !new_nodes.iter().any(|n| n.node_id == f.node_id))
        .ok_or(DeployError::GroupNotFound {
            chain_id: chain.id.get(),
            group_id: group_id.get(),
        })?;

    let dir = ctx.layout.node_dir(&chain.name, &member.ip, member.host_index);
    let path = NodeConfig::genesis_path(&dir, group_id);
    std::fs::read_to_string(&path).map_err(|e| DeployError::artifact(&path, e.to_string()))
}

/// Mark a group normal once every member front is running.
///
/// Returns whether the group is normal afterwards.
pub(crate) async fn settle(
    tx: &mut dyn CatalogTx,
    chain_id: ChainId,
    group_id: GroupId,
) -> DeployResult<bool> {
    let Some(group) = tx.get_group(chain_id, group_id).await? else {
        return Ok(false);
    };
    let fronts = tx.list_fronts_by_group(chain_id, group_id).await?;
    if fronts.is_empty() || !fronts.iter().all(|f| f.status.is_running()) {
        return Ok(false);
    }

    if group.status != GroupStatus::Normal {
        let status = group.status.transition(GroupStatus::Normal)?;
        tx.update_group_status(chain_id, group_id, status).await?;
        info!(chain = %chain_id, group = %group_id, "group settled");
    }
    Ok(true)
}
