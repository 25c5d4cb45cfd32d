//! Deployment orchestration.
//!
//! Four topology workflows (create chain, grow a group, delete a node,
//! upgrade) plus chain deletion and single-node start/stop. Each workflow
//! has a top-level form that owns its catalog transaction and a
//! `*_within` form that joins a caller's transaction and hands back the
//! restarts to publish once that transaction commits.

mod locks;
mod manager;

pub use locks::{GroupGuard, GroupLocks};
pub use manager::DeploymentManager;

use crate::restart::RestartScope;
use crate::types::RunMode;

/// Request to create a chain.
#[derive(Debug, Clone)]
pub struct DeployChainRequest {
    /// Unique chain name.
    pub chain_name: String,
    /// Image tag id to resolve.
    pub tag_id: i32,
    /// Raw topology lines.
    pub lines: Vec<String>,
    /// Root directory for generated files on every host.
    pub root_dir: String,
    /// External signer address embedded in front configs.
    pub signer_addr: String,
    /// How fronts run on their hosts.
    pub run_mode: RunMode,
}

/// Request to add nodes to a group.
#[derive(Debug, Clone)]
pub struct AddNodesRequest {
    /// Target chain.
    pub chain_name: String,
    /// Target group; created if it does not exist.
    pub group_id: i32,
    /// Host to place the nodes on.
    pub ip: String,
    /// Agency for a host the chain does not know yet.
    pub agency_name: Option<String>,
    /// Number of nodes, `0 < count < 200`.
    pub count: i64,
}

/// Result of a workflow run inside a caller's transaction.
///
/// `restarts` must be published only after the transaction commits.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Staged<T> {
    /// Workflow result.
    pub value: T,
    /// Restart requests to publish after commit.
    pub restarts: Vec<RestartScope>,
}

impl<T> Staged<T> {
    /// A result with no pending restarts.
    pub fn new(value: T) -> Self {
        Self {
            value,
            restarts: Vec::new(),
        }
    }

    /// Attach a restart request.
    pub fn with_restart(mut self, scope: RestartScope) -> Self {
        self.restarts.push(scope);
        self
    }
}
