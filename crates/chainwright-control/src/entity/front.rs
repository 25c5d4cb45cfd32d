//! Front (node-agent) rows, their node memberships, and per-node config.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{node, offset_port, tool_result, DeployContext};
use crate::error::{DeployError, DeployResult};
use crate::paths::{container_name, NodeConfig, PathLayout, APPLICATION_FILE, NODE_CONFIG_FILE};
use crate::render::Template;
use crate::status::{FrontStatus, GroupStatus, NodeStatus, StatusMachine};
use crate::store::CatalogTx;
use crate::types::{
    ChainRecord, EncryptionScheme, FrontGroupRecord, FrontRecord, GroupId, HostRecord, NewFront,
    NodeId, NodeRecord,
};

/// Record a generated node directory: front row, node rows, group links
/// and the front's `application.yml`.
pub(crate) async fn insert_from_node_config(
    tx: &mut dyn CatalogTx,
    ctx: &DeployContext,
    chain: &ChainRecord,
    host: &HostRecord,
    node: &NodeConfig,
    groups: &BTreeSet<GroupId>,
) -> DeployResult<FrontRecord> {
    let front_port = offset_port(ctx.ports.front_base, node.host_index)?;
    let front = tx
        .insert_front(&NewFront {
            node_id: node.node_id.clone(),
            ip: host.ip.clone(),
            front_port,
            agency_id: host.agency_id,
            agency_name: host.agency_name.clone(),
            host_id: host.id,
            host_index: node.host_index,
            image_tag: chain.version.clone(),
            run_mode: chain.run_mode,
            container_name: container_name(&chain.root_dir, &chain.name, node.host_index),
            rpc_port: node.rpc_port,
            p2p_port: node.p2p_port,
            channel_port: node.channel_port,
            chain_id: chain.id,
            chain_name: chain.name.clone(),
            status: FrontStatus::Initialized,
        })
        .await?;

    for group_id in groups {
        tx.insert_node(&NodeRecord {
            chain_id: chain.id,
            node_id: node.node_id.clone(),
            name: NodeRecord::name_for(*group_id, &node.node_id),
            group_id: *group_id,
            ip: host.ip.clone(),
            p2p_port: node.p2p_port,
            status: NodeStatus::Dead,
        })
        .await?;
        tx.insert_front_group(&FrontGroupRecord {
            front_id: front.id,
            chain_id: chain.id,
            group_id: *group_id,
            status: GroupStatus::Maintaining,
        })
        .await?;
    }

    let application = ctx.renderer.render(
        Template::FrontApplication,
        &[
            ("encrypt_type", chain.encryption.flag().to_string()),
            ("channel_port", node.channel_port.to_string()),
            ("front_port", front_port.to_string()),
            ("signer_addr", chain.signer_addr.clone()),
        ],
    )?;
    std::fs::write(node.dir.join(APPLICATION_FILE), application)?;

    debug!(
        ip = %host.ip,
        index = node.host_index,
        node = %node.node_id.short(),
        groups = groups.len(),
        "front inserted"
    );
    Ok(front)
}

/// Generate `count` new nodes on `host` for `group_id` and record them.
///
/// Returns the new node directories in creation order.
pub(crate) async fn init_front_and_node(
    tx: &mut dyn CatalogTx,
    ctx: &DeployContext,
    chain: &ChainRecord,
    host: &HostRecord,
    group_id: GroupId,
    count: u32,
) -> DeployResult<Vec<NodeConfig>> {
    let mut created = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let index = ctx.layout.next_host_index(&chain.name, &host.ip)?;
        let dir = ctx.layout.node_dir(&chain.name, &host.ip, index);
        std::fs::create_dir_all(&dir)?;
        tool_result(
            ctx.bootstrapper
                .gen_node_cert(chain.encryption, &chain.name, &host.agency_name, &dir)
                .await?,
        )?;

        created.push(NodeConfig {
            node_id: read_node_id(&dir)?,
            host_index: index,
            rpc_port: offset_port(ctx.ports.rpc_base, index)?,
            p2p_port: offset_port(ctx.ports.p2p_base, index)?,
            channel_port: offset_port(ctx.ports.channel_base, index)?,
            dir,
        });
    }

    let groups = BTreeSet::from([group_id]);
    let mut peers = node::peers(tx, chain.id, &groups, None).await?;
    peers.extend(created.iter().map(|n| format!("{}:{}", host.ip, n.p2p_port)));
    peers.sort();
    peers.dedup();

    for node in &created {
        write_node_config(&node.dir, ctx, chain.encryption, node, &peers)?;
        insert_from_node_config(tx, ctx, chain, host, node, &groups).await?;
    }

    info!(chain = %chain.name, ip = %host.ip, group = %group_id, count, "nodes created");
    Ok(created)
}

fn read_node_id(dir: &Path) -> DeployResult<NodeId> {
    let path = NodeConfig::node_id_path(dir);
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| DeployError::artifact(&path, e.to_string()))?;
    let id = raw.trim();
    if id.is_empty() {
        return Err(DeployError::artifact(&path, "empty node id"));
    }
    Ok(NodeId::new(id))
}

fn write_node_config(
    dir: &Path,
    ctx: &DeployContext,
    encryption: EncryptionScheme,
    node: &NodeConfig,
    peers: &[String],
) -> DeployResult<PathBuf> {
    let mut values = vec![
        ("channel_port", node.channel_port.to_string()),
        ("rpc_port", node.rpc_port.to_string()),
        ("p2p_port", node.p2p_port.to_string()),
        ("sm_crypto", (encryption == EncryptionScheme::Sm).to_string()),
    ];
    values.extend(peers.iter().map(|p| ("peer", p.clone())));
    let rendered = ctx.renderer.render(Template::NodeConfig, &values)?;

    std::fs::create_dir_all(dir)?;
    let path = dir.join(NODE_CONFIG_FILE);
    std::fs::write(&path, rendered)?;
    Ok(path)
}

/// Regenerate `config.ini` for every node in `groups`, locally and on its
/// host, leaving out `exclude`.
///
/// Nodes in `skip` stay in peer lists but get no regenerated config; their
/// directories are shipped whole by the caller.
///
/// Returns the number of nodes regenerated.
pub(crate) async fn update_node_config_by_groups(
    tx: &mut dyn CatalogTx,
    ctx: &DeployContext,
    chain: &ChainRecord,
    groups: &BTreeSet<GroupId>,
    exclude: Option<&NodeId>,
    skip: &[NodeId],
) -> DeployResult<usize> {
    let mut done = BTreeSet::new();
    for group_id in groups {
        for front in tx.list_fronts_by_group(chain.id, *group_id).await? {
            if exclude == Some(&front.node_id)
                || skip.contains(&front.node_id)
                || !done.insert(front.id)
            {
                continue;
            }

            let front_groups: BTreeSet<GroupId> = tx
                .list_front_groups(front.id)
                .await?
                .into_iter()
                .map(|link| link.group_id)
                .collect();
            let peers = node::peers(tx, chain.id, &front_groups, exclude).await?;

            let dir = ctx.layout.node_dir(&chain.name, &front.ip, front.host_index);
            let config = NodeConfig {
                dir: dir.clone(),
                host_index: front.host_index,
                node_id: front.node_id.clone(),
                rpc_port: front.rpc_port,
                p2p_port: front.p2p_port,
                channel_port: front.channel_port,
            };
            let path = write_node_config(&dir, ctx, chain.encryption, &config, &peers)?;
            ctx.remote
                .upload(
                    &front.ip,
                    &path,
                    &PathLayout::remote_node_dir(&chain.root_dir, &chain.name, front.host_index),
                )
                .await?;
        }
    }

    debug!(chain = %chain.name, nodes = done.len(), "node configs regenerated");
    Ok(done.len())
}

/// Look up the front serving a node identity.
pub(crate) async fn require_by_node_id(
    tx: &mut dyn CatalogTx,
    node_id: &NodeId,
) -> DeployResult<FrontRecord> {
    tx.get_front_by_node_id(node_id)
        .await?
        .ok_or_else(|| DeployError::NodeNotFound(node_id.to_string()))
}

/// Delete a front with its node rows and group links.
pub(crate) async fn remove(tx: &mut dyn CatalogTx, front: &FrontRecord) -> DeployResult<()> {
    tx.delete_nodes_by_node_id(front.chain_id, &front.node_id).await?;
    tx.delete_front_groups(front.id).await?;
    tx.delete_front(front.id).await
}

/// Record a front whose process came up.
///
/// Returns the groups the front serves.
pub(crate) async fn mark_running(
    tx: &mut dyn CatalogTx,
    front: &FrontRecord,
) -> DeployResult<Vec<GroupId>> {
    let status = front.status.transition(FrontStatus::Running)?;
    tx.update_front_status(front.id, status).await?;

    for node in tx.list_nodes_by_node_id(front.chain_id, &front.node_id).await? {
        node.status.transition(NodeStatus::Running)?;
    }
    tx.update_node_status(front.chain_id, &front.node_id, NodeStatus::Running)
        .await?;

    let mut groups = Vec::new();
    for link in tx.list_front_groups(front.id).await? {
        let status = link.status.transition(GroupStatus::Normal)?;
        tx.update_front_group_status(front.id, link.group_id, status)
            .await?;
        groups.push(link.group_id);
    }
    Ok(groups)
}

/// Fail unless the front's process is running.
pub(crate) fn ensure_running(front: &FrontRecord) -> DeployResult<()> {
    if front.status.is_running() {
        return Ok(());
    }
    Err(DeployError::InvalidStatusTransition {
        entity: FrontStatus::ENTITY,
        from: front.status.as_str(),
        to: FrontStatus::Stopped.as_str(),
    })
}

/// Record a front whose process was stopped.
pub(crate) async fn mark_stopped(tx: &mut dyn CatalogTx, front: &FrontRecord) -> DeployResult<()> {
    ensure_running(front)?;
    let status = front.status.transition(FrontStatus::Stopped)?;
    tx.update_front_status(front.id, status).await?;

    for node in tx.list_nodes_by_node_id(front.chain_id, &front.node_id).await? {
        node.status.transition(NodeStatus::Dead)?;
    }
    tx.update_node_status(front.chain_id, &front.node_id, NodeStatus::Dead)
        .await
}
