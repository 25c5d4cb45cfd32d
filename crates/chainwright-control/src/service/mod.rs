//! Service lifecycle management.
//!
//! Wires the catalog, the external tools and the restart queue into a
//! [`DeploymentManager`], and drains queued restarts on shutdown.

use std::sync::Arc;

use tokio::signal;
use tracing::{error, info, warn};

use crate::bootstrap::ShellBootstrapper;
use crate::config::ControlConfig;
use crate::deployment::DeploymentManager;
use crate::entity::DeployContext;
use crate::error::DeployResult;
use crate::remote::SshRemote;
use crate::render::BuiltinRenderer;
use crate::restart::{FrontRunner, RestartQueue, RestartWorker};
use crate::store::{CatalogStore, MemoryStore, PostgresStore};
use crate::types::ImageConfig;

/// Which catalog backend the service runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// PostgreSQL at `database.url`.
    #[default]
    Postgres,
    /// Process-local catalog; nothing survives exit.
    Memory,
}

/// The control service.
///
/// Owns:
/// - the catalog store
/// - the restart queue and its workers
/// - the deployment manager that publishes into that queue
pub struct ControlService {
    store: Arc<dyn CatalogStore>,
    queue: Arc<RestartQueue>,
    manager: DeploymentManager,
}

impl ControlService {
    /// Connect the catalog and start the restart workers.
    ///
    /// Image tags from `config.images` are upserted into the catalog.
    pub async fn start(config: &ControlConfig, backend: StoreBackend) -> DeployResult<Self> {
        let store = create_store(config, backend).await?;
        seed_images(store.as_ref(), &config.images).await?;

        let remote = Arc::new(SshRemote::new(config.ssh.clone()));
        let ctx = DeployContext::new(
            config,
            Arc::new(ShellBootstrapper::new(&config.bootstrap)),
            remote.clone(),
            Arc::new(BuiltinRenderer::new()),
        );

        let worker = RestartWorker::new(
            Arc::clone(&store),
            FrontRunner::new(remote),
            &config.restart,
        );
        let queue = Arc::new(RestartQueue::start(&config.restart, Arc::new(worker)));

        let manager = DeploymentManager::new(Arc::clone(&store), ctx, queue.clone());
        info!(
            nodes_root = %config.paths.nodes_root.display(),
            images = config.images.len(),
            "control service initialised"
        );

        Ok(Self {
            store,
            queue,
            manager,
        })
    }

    /// The deployment manager.
    #[must_use]
    pub fn manager(&self) -> &DeploymentManager {
        &self.manager
    }

    /// The catalog store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    /// Wait for queued restarts to finish.
    ///
    /// Ctrl+C or SIGTERM abandons whatever is still queued.
    pub async fn shutdown(&self) {
        tokio::select! {
            () = self.queue.shutdown() => {
                info!("control service shutdown complete");
            }
            () = shutdown_signal() => {
                warn!("abandoning queued restarts");
                self.queue.abort();
            }
        }
    }
}

async fn create_store(
    config: &ControlConfig,
    backend: StoreBackend,
) -> DeployResult<Arc<dyn CatalogStore>> {
    match backend {
        StoreBackend::Postgres => match PostgresStore::new(&config.database).await {
            Ok(store) => {
                info!(url = %config.database.url, "connected to PostgreSQL");
                Ok(Arc::new(store))
            }
            Err(e) => {
                error!(error = %e, url = %config.database.url, "failed to connect to PostgreSQL");
                Err(e)
            }
        },
        StoreBackend::Memory => {
            info!("using in-memory catalog");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Upsert image tags into the catalog in one transaction.
pub async fn seed_images(store: &dyn CatalogStore, images: &[ImageConfig]) -> DeployResult<()> {
    if images.is_empty() {
        return Ok(());
    }
    let mut tx = store.begin().await?;
    for image in images {
        tx.upsert_image_config(image).await?;
    }
    tx.commit().await?;
    info!(count = images.len(), "image tags seeded");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            info!("received SIGTERM, initiating shutdown");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn image(id: i32, value: &str) -> ImageConfig {
        ImageConfig {
            id,
            config_type: "docker_image".to_owned(),
            value: value.to_owned(),
        }
    }

    #[tokio::test]
    async fn memory_service_seeds_images() {
        let config = ControlConfig {
            images: vec![image(1, "fiscoorg/fisco-webase:v2.7.2")],
            ..ControlConfig::default()
        };

        let service = ControlService::start(&config, StoreBackend::Memory)
            .await
            .unwrap();

        let mut tx = service.store().begin().await.unwrap();
        let seeded = tx.get_image_config(1).await.unwrap().unwrap();
        assert_eq!(seeded.value, "fiscoorg/fisco-webase:v2.7.2");
        assert!(tx.get_image_config(2).await.unwrap().is_none());
        tx.rollback().await.unwrap();

        service.shutdown().await;
    }

    #[tokio::test]
    async fn seeding_replaces_existing_tag() {
        let store = MemoryStore::new();
        seed_images(&store, &[image(1, "a:v1")]).await.unwrap();
        seed_images(&store, &[image(1, "a:v2")]).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.get_image_config(1).await.unwrap().unwrap().value, "a:v2");
    }
}
