//! Agency rows.

use tracing::info;

use super::{tool_result, DeployContext};
use crate::error::DeployResult;
use crate::store::CatalogTx;
use crate::types::{AgencyId, AgencyRecord, ChainRecord};

/// Insert an agency whose certificates already exist on disk.
pub(crate) async fn insert(
    tx: &mut dyn CatalogTx,
    chain: &ChainRecord,
    name: &str,
) -> DeployResult<AgencyRecord> {
    let agency = tx.insert_agency(chain.id, &chain.name, name).await?;
    info!(chain = %chain.name, agency = %agency.name, id = %agency.id, "agency inserted");
    Ok(agency)
}

/// Reuse the named agency, or create it together with its certificate.
pub(crate) async fn init_agency_if_new(
    tx: &mut dyn CatalogTx,
    ctx: &DeployContext,
    chain: &ChainRecord,
    name: &str,
) -> DeployResult<AgencyRecord> {
    if let Some(existing) = tx.get_agency_by_name(chain.id, name).await? {
        return Ok(existing);
    }

    let cert_dir = ctx.layout.agency_cert_dir(&chain.name, name);
    tool_result(
        ctx.bootstrapper
            .gen_agency_cert(chain.encryption, &chain.name, name, &cert_dir)
            .await?,
    )?;
    insert(tx, chain, name).await
}

/// Delete an agency that no longer owns any host.
///
/// Returns whether the agency was deleted.
pub(crate) async fn delete_agency_with_no_host(
    tx: &mut dyn CatalogTx,
    agency_id: AgencyId,
) -> DeployResult<bool> {
    if !tx.list_hosts_by_agency(agency_id).await?.is_empty() {
        return Ok(false);
    }
    tx.delete_agency(agency_id).await?;
    info!(agency = %agency_id, "agency without hosts deleted");
    Ok(true)
}
