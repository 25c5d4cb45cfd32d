//! Host rows and host environment setup.

use tracing::{info, warn};

use super::{tool_result, DeployContext};
use crate::error::DeployResult;
use crate::paths::PathLayout;
use crate::store::CatalogTx;
use crate::types::{AgencyRecord, ChainRecord, HostId, HostRecord, NewHost};

pub(crate) async fn insert(
    tx: &mut dyn CatalogTx,
    chain: &ChainRecord,
    agency: &AgencyRecord,
    ip: &str,
) -> DeployResult<HostRecord> {
    let host = tx
        .insert_host(&NewHost {
            agency_id: agency.id,
            agency_name: agency.name.clone(),
            chain_id: chain.id,
            ip: ip.to_owned(),
            root_dir: chain.root_dir.clone(),
        })
        .await?;
    info!(chain = %chain.name, ip, agency = %agency.name, id = %host.id, "host inserted");
    Ok(host)
}

/// Insert a host joining a running chain and ship its SDK material.
pub(crate) async fn init_host(
    tx: &mut dyn CatalogTx,
    ctx: &DeployContext,
    chain: &ChainRecord,
    agency: &AgencyRecord,
    ip: &str,
) -> DeployResult<HostRecord> {
    let host = insert(tx, chain, agency, ip).await?;

    let sdk_dir = ctx.layout.sdk_dir(&chain.name, ip);
    tool_result(
        ctx.bootstrapper
            .gen_sdk_cert(chain.encryption, &chain.name, &agency.name, &sdk_dir)
            .await?,
    )?;
    ctx.remote
        .upload(ip, &sdk_dir, &PathLayout::remote_chain_dir(&host.root_dir, &chain.name))
        .await?;

    Ok(host)
}

/// Ship each host's generated tree to the host.
///
/// Failures are logged; the chain is already recorded and the tree can be
/// regenerated from the catalog.
pub(crate) async fn init_host_list(ctx: &DeployContext, chain: &ChainRecord, hosts: &[HostRecord]) {
    for host in hosts {
        let remote_dir = PathLayout::remote_chain_dir(&host.root_dir, &chain.name);
        let entries = match std::fs::read_dir(ctx.layout.host_dir(&chain.name, &host.ip)) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(ip = %host.ip, error = %e, "cannot list generated host tree");
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if let Err(e) = ctx.remote.upload(&host.ip, &path, &remote_dir).await {
                warn!(ip = %host.ip, path = %path.display(), error = %e, "host init transfer failed");
            }
        }
        info!(chain = %chain.name, ip = %host.ip, "host environment initialised");
    }
}

/// Delete a host that no longer runs any front.
///
/// Returns whether the host was deleted.
pub(crate) async fn delete_host_with_no_front(
    tx: &mut dyn CatalogTx,
    host_id: HostId,
) -> DeployResult<bool> {
    if !tx.list_fronts_by_host(host_id).await?.is_empty() {
        return Ok(false);
    }
    tx.delete_host(host_id).await?;
    info!(host = %host_id, "host without fronts deleted");
    Ok(true)
}
