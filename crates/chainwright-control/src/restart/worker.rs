//! Restart worker implementation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::{FrontRunner, RestartScope};
use crate::config::RestartConfig;
use crate::entity::{chain, front, group};
use crate::error::{DeployError, DeployResult, ErrorKind};
use crate::store::{CatalogStore, CatalogTx};
use crate::types::FrontRecord;

/// Restarts the fronts in a [`RestartScope`] and records their status.
pub struct RestartWorker {
    store: Arc<dyn CatalogStore>,
    runner: FrontRunner,
    max_attempts: u32,
    initial_backoff: Duration,
}

impl RestartWorker {
    /// Create a new restart worker.
    #[must_use]
    pub fn new(store: Arc<dyn CatalogStore>, runner: FrontRunner, config: &RestartConfig) -> Self {
        Self {
            store,
            runner,
            max_attempts: config.max_attempts.max(1),
            initial_backoff: config.initial_backoff(),
        }
    }

    /// Run the worker loop until the queue closes or `cancel` fires.
    pub async fn run(
        &self,
        id: usize,
        rx: Arc<Mutex<mpsc::Receiver<RestartScope>>>,
        cancel: CancellationToken,
    ) {
        info!(worker_id = id, "restart worker started");

        loop {
            let next = tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    info!(worker_id = id, "restart worker shutting down");
                    break;
                }

                scope = async { rx.lock().await.recv().await } => scope,
            };

            let Some(scope) = next else { break };
            self.process(&scope, &cancel).await;
        }

        info!(worker_id = id, "restart worker stopped");
    }

    /// Restart a scope, retrying with exponential backoff.
    pub async fn process(&self, scope: &RestartScope, cancel: &CancellationToken) {
        let mut backoff = self.initial_backoff;

        for attempt in 1..=self.max_attempts {
            let err = match self.restart(scope).await {
                Ok(started) => {
                    info!(%scope, started, attempt, "restart completed");
                    return;
                }
                Err(e) => e,
            };

            if attempt == self.max_attempts || err.kind() == ErrorKind::NotFound {
                error!(%scope, attempts = attempt, error = %err, "restart abandoned");
                return;
            }
            warn!(%scope, attempt, error = %err, "restart failed, retrying");

            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(backoff) => {}
            }
            backoff = backoff.saturating_mul(2);
        }
    }

    /// One restart pass. Returns the number of fronts started.
    pub async fn restart(&self, scope: &RestartScope) -> DeployResult<usize> {
        let mut tx = self.store.begin().await?;
        let record = tx
            .get_chain(scope.chain_id())
            .await?
            .ok_or_else(|| DeployError::ChainNotFound(scope.chain_id().to_string()))?;
        let fronts = fronts_in_scope(tx.as_mut(), scope).await?;
        tx.rollback().await?;

        let mut started = Vec::with_capacity(fronts.len());
        let mut first_failure = None;
        for f in fronts {
            match self.runner.start(&record, &f).await {
                Ok(()) => started.push(f),
                Err(e) => {
                    warn!(ip = %f.ip, node = %f.node_id.short(), error = %e, "front start failed");
                    first_failure.get_or_insert(e);
                }
            }
        }

        let mut tx = self.store.begin().await?;
        let mut groups = BTreeSet::new();
        for f in &started {
            // The front may have been deleted while its container started.
            let Some(current) = tx.get_front(f.id).await? else {
                continue;
            };
            groups.extend(front::mark_running(tx.as_mut(), &current).await?);
        }
        for group_id in groups {
            group::settle(tx.as_mut(), record.id, group_id).await?;
        }
        if !started.is_empty() {
            chain::mark_running(tx.as_mut(), &record).await?;
        }
        tx.commit().await?;

        match first_failure {
            Some(e) => Err(e),
            None => Ok(started.len()),
        }
    }
}

async fn fronts_in_scope(
    tx: &mut dyn CatalogTx,
    scope: &RestartScope,
) -> DeployResult<Vec<FrontRecord>> {
    match scope {
        RestartScope::Chain(chain_id) => tx.list_fronts(*chain_id).await,
        RestartScope::Group(chain_id, group_id) => tx.list_fronts_by_group(*chain_id, *group_id).await,
        RestartScope::Groups(chain_id, group_ids) => {
            let mut fronts = BTreeMap::new();
            for group_id in group_ids {
                for f in tx.list_fronts_by_group(*chain_id, *group_id).await? {
                    fronts.entry(f.id).or_insert(f);
                }
            }
            Ok(fronts.into_values().collect())
        }
    }
}
