//! Entity services.
//!
//! Each submodule owns creation, lookup and update of one entity type
//! against a [`CatalogTx`](crate::store::CatalogTx). Cross-entity
//! orchestration lives in [`deployment`](crate::deployment).

pub(crate) mod agency;
pub(crate) mod chain;
pub(crate) mod front;
pub(crate) mod group;
pub(crate) mod host;
pub(crate) mod node;

use std::sync::Arc;

use crate::bootstrap::ChainBootstrapper;
use crate::config::{ControlConfig, PortsConfig};
use crate::error::{DeployError, DeployResult};
use crate::paths::PathLayout;
use crate::process::ExecOutput;
use crate::remote::RemoteHost;
use crate::render::ConfigRenderer;

/// Collaborators and layout shared by every workflow.
#[derive(Clone)]
pub struct DeployContext {
    /// Local and remote path layout.
    pub layout: PathLayout,
    /// Port bases for new nodes.
    pub ports: PortsConfig,
    /// Image suffix selecting the SM scheme.
    pub sm_suffix: String,
    /// Chain-bootstrap tool.
    pub bootstrapper: Arc<dyn ChainBootstrapper>,
    /// Remote host access.
    pub remote: Arc<dyn RemoteHost>,
    /// Config file renderer.
    pub renderer: Arc<dyn ConfigRenderer>,
}

impl DeployContext {
    /// Build a context from configuration and collaborators.
    #[must_use]
    pub fn new(
        config: &ControlConfig,
        bootstrapper: Arc<dyn ChainBootstrapper>,
        remote: Arc<dyn RemoteHost>,
        renderer: Arc<dyn ConfigRenderer>,
    ) -> Self {
        Self {
            layout: PathLayout::new(&config.paths),
            ports: config.ports,
            sm_suffix: config.bootstrap.sm_suffix.clone(),
            bootstrapper,
            remote,
            renderer,
        }
    }
}

impl std::fmt::Debug for DeployContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployContext")
            .field("layout", &self.layout)
            .field("ports", &self.ports)
            .field("sm_suffix", &self.sm_suffix)
            .finish_non_exhaustive()
    }
}

/// Turn a tool-reported failure into an error.
pub(crate) fn tool_result(result: ExecOutput) -> DeployResult<ExecOutput> {
    if result.success {
        Ok(result)
    } else {
        Err(DeployError::BootstrapFailed {
            output: result.output,
        })
    }
}

/// Port `base + index`, failing if it does not fit.
pub(crate) fn offset_port(base: u16, index: u32) -> DeployResult<u16> {
    u16::try_from(index)
        .ok()
        .and_then(|i| base.checked_add(i))
        .ok_or_else(|| DeployError::InvalidParameter(format!("port {base}+{index} out of range")))
}
