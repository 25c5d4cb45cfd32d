//! Chain rows.

use tracing::{debug, info};

use crate::error::{DeployError, DeployResult};
use crate::status::{ChainStatus, StatusMachine};
use crate::store::CatalogTx;
use crate::types::{ChainRecord, EncryptionScheme, NewChain};

/// Resolve an image tag id to a non-blank image reference.
pub(crate) async fn resolve_image(tx: &mut dyn CatalogTx, tag_id: i32) -> DeployResult<String> {
    match tx.get_image_config(tag_id).await? {
        Some(config) if !config.value.trim().is_empty() => Ok(config.value),
        _ => Err(DeployError::InvalidImageTag(tag_id)),
    }
}

fn check_name(name: &str) -> DeployResult<()> {
    if name.trim().is_empty() {
        return Err(DeployError::InvalidChainName(name.to_owned()));
    }
    Ok(())
}

/// Fail unless `name` is non-blank and unused.
pub(crate) async fn ensure_unused(tx: &mut dyn CatalogTx, name: &str) -> DeployResult<()> {
    check_name(name)?;
    if tx.get_chain_by_name(name).await?.is_some() {
        return Err(DeployError::ChainExists(name.to_owned()));
    }
    Ok(())
}

/// Look up a chain by name.
pub(crate) async fn require_chain(tx: &mut dyn CatalogTx, name: &str) -> DeployResult<ChainRecord> {
    check_name(name)?;
    tx.get_chain_by_name(name)
        .await?
        .ok_or_else(|| DeployError::ChainNotFound(name.to_owned()))
}

pub(crate) async fn insert(tx: &mut dyn CatalogTx, chain: &NewChain) -> DeployResult<ChainRecord> {
    let record = tx.insert_chain(chain).await?;
    info!(chain = %record.name, id = %record.id, version = %record.version, "chain inserted");
    Ok(record)
}

/// Point a chain and all of its fronts at a new image.
pub(crate) async fn upgrade(
    tx: &mut dyn CatalogTx,
    chain: &ChainRecord,
    image: &str,
    encryption: EncryptionScheme,
) -> DeployResult<()> {
    tx.update_chain_version(chain.id, image, encryption).await?;
    tx.update_front_images(chain.id, image).await?;
    info!(chain = %chain.name, from = %chain.version, to = %image, "chain version updated");
    Ok(())
}

/// Move a chain to running after one of its fronts came up.
pub(crate) async fn mark_running(tx: &mut dyn CatalogTx, chain: &ChainRecord) -> DeployResult<()> {
    if chain.status == ChainStatus::Running {
        return Ok(());
    }
    let status = chain.status.transition(ChainStatus::Running)?;
    tx.update_chain_status(chain.id, status).await
}

/// Delete a chain and every row beneath it, children first.
pub(crate) async fn delete(tx: &mut dyn CatalogTx, chain: &ChainRecord) -> DeployResult<()> {
    for front in tx.list_fronts(chain.id).await? {
        tx.delete_nodes_by_node_id(chain.id, &front.node_id).await?;
        tx.delete_front_groups(front.id).await?;
        tx.delete_front(front.id).await?;
    }
    for group in tx.list_groups(chain.id).await? {
        tx.delete_group(chain.id, group.group_id).await?;
    }
    for host in tx.list_hosts(chain.id).await? {
        tx.delete_host(host.id).await?;
    }
    for agency in tx.list_agencies(chain.id).await? {
        tx.delete_agency(agency.id).await?;
    }
    tx.delete_chain(chain.id).await?;
    debug!(chain = %chain.name, "chain rows deleted");
    Ok(())
}
