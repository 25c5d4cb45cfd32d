//! Chainwright Control Plane
//!
//! This crate provisions and evolves permissioned ledger networks spread
//! across many hosts. It turns operator topology into on-disk node
//! material, ships that material over SSH, records the resulting topology
//! in a relational catalog and restarts the affected node-agents.
//!
//! # Architecture
//!
//! - **Deployment workflows** ([`deployment`]): create a chain, grow a
//!   group, delete a node, upgrade a chain. Each is all-or-nothing with
//!   respect to the catalog.
//! - **Catalog** ([`store`]): transactional persistence of chains,
//!   agencies, hosts, groups, fronts and node memberships.
//! - **External tools** ([`bootstrap`], [`remote`]): the chain-bootstrap
//!   script and the SSH client, both behind traits.
//! - **Restart fan-out** ([`restart`]): restart requests published after
//!   commit and drained by a worker pool.
//!
//! # Status machines
//!
//! Entity status writes go through [`status::StatusMachine`]:
//!
//! ```text
//! Chain:  Initialized ──▶ Running ◀──▶ Stopped
//! Front:  Initialized ──▶ Running ◀──▶ Stopped
//!              └─────────────────────────▲
//! Group:  Maintaining ◀──▶ Normal
//! Node:   Dead ◀──▶ Running
//! ```
//!
//! # Example
//!
//! ```ignore
//! use chainwright_control::{ControlConfig, ControlService, StoreBackend};
//! use chainwright_control::deployment::DeployChainRequest;
//!
//! let config = ControlConfig::load()?;
//! let service = ControlService::start(&config, StoreBackend::Postgres).await?;
//! let outcome = service
//!     .manager()
//!     .deploy_chain(&DeployChainRequest {
//!         chain_name: "chain0".to_owned(),
//!         tag_id: 1,
//!         lines: vec!["10.0.0.1:agencyA:2:{1,2}".to_owned()],
//!         root_dir: "/opt/chains".to_owned(),
//!         signer_addr: "10.0.0.9:5004".to_owned(),
//!         run_mode: Default::default(),
//!     })
//!     .await?;
//! service.shutdown().await;
//! ```

#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

pub mod bootstrap;
pub mod config;
pub mod deployment;
pub mod entity;
pub mod error;
pub mod paths;
pub mod process;
pub mod remote;
pub mod render;
pub mod restart;
pub mod service;
pub mod status;
pub mod store;
pub mod topology;
pub mod types;

// Re-export commonly used types at the crate root
pub use config::ControlConfig;
pub use deployment::{AddNodesRequest, DeployChainRequest, DeploymentManager, Staged};
pub use entity::DeployContext;
pub use error::{DeployError, DeployResult, ErrorKind, RetCode, WorkflowOutcome};
pub use restart::{RestartDispatcher, RestartQueue, RestartScope};
pub use service::{ControlService, StoreBackend};
pub use status::{ChainStatus, FrontStatus, GroupStatus, NodeStatus, StatusMachine};
pub use store::{CatalogStore, CatalogTx, MemoryStore, PostgresStore};
pub use types::{
    AgencyRecord, ChainId, ChainRecord, EncryptionScheme, FrontRecord, GroupId, GroupRecord,
    HostRecord, NodeId, RunMode,
};
