//! Configuration for chainwright-control.

use std::path::PathBuf;
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{DeployError, DeployResult};
use crate::types::ImageConfig;

const ENV_PREFIX: &str = "CHAINWRIGHT_";

/// Top-level configuration for the control plane.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ControlConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Local filesystem layout.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Port bases for newly allocated nodes.
    #[serde(default)]
    pub ports: PortsConfig,

    /// SSH transport configuration.
    #[serde(default)]
    pub ssh: SshConfig,

    /// Chain-bootstrap tool configuration.
    #[serde(default)]
    pub bootstrap: BootstrapConfig,

    /// Restart fan-out configuration.
    #[serde(default)]
    pub restart: RestartConfig,

    /// Image tags seeded into the catalog at startup.
    #[serde(default)]
    pub images: Vec<ImageConfig>,
}

impl ControlConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `chainwright.toml` in the current directory (if present)
    /// 3. Environment variables with `CHAINWRIGHT_` prefix
    pub fn load() -> DeployResult<Self> {
        Self::from_file("chainwright.toml")
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> DeployResult<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| DeployError::Config(e.to_string()))
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_database_url() -> String {
    "postgres://localhost/chainwright".to_owned()
}

const fn default_max_connections() -> u32 {
    10
}

const fn default_connect_timeout_secs() -> u64 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

/// Local filesystem layout.
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Root of the generated node tree.
    #[serde(default = "default_nodes_root")]
    pub nodes_root: PathBuf,

    /// Root that deleted node directories are moved into.
    #[serde(default = "default_quarantine_root")]
    pub quarantine_root: PathBuf,

    /// Name of the quarantine directory under a host's root dir.
    #[serde(default = "default_remote_quarantine_dir")]
    pub remote_quarantine_dir: String,
}

fn default_nodes_root() -> PathBuf {
    PathBuf::from("/var/lib/chainwright/nodes")
}

fn default_quarantine_root() -> PathBuf {
    PathBuf::from("/var/lib/chainwright/deleted-tmp")
}

fn default_remote_quarantine_dir() -> String {
    "deleted-tmp".to_owned()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            nodes_root: default_nodes_root(),
            quarantine_root: default_quarantine_root(),
            remote_quarantine_dir: default_remote_quarantine_dir(),
        }
    }
}

/// Port bases; a node with host index `i` gets `base + i`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PortsConfig {
    /// Front (node-agent) port base.
    #[serde(default = "default_front_base")]
    pub front_base: u16,

    /// Peer-to-peer port base.
    #[serde(default = "default_p2p_base")]
    pub p2p_base: u16,

    /// SDK channel port base.
    #[serde(default = "default_channel_base")]
    pub channel_base: u16,

    /// JSON-RPC port base.
    #[serde(default = "default_rpc_base")]
    pub rpc_base: u16,
}

const fn default_front_base() -> u16 {
    5002
}

const fn default_p2p_base() -> u16 {
    30300
}

const fn default_channel_base() -> u16 {
    20200
}

const fn default_rpc_base() -> u16 {
    8545
}

impl Default for PortsConfig {
    fn default() -> Self {
        Self {
            front_base: default_front_base(),
            p2p_base: default_p2p_base(),
            channel_base: default_channel_base(),
            rpc_base: default_rpc_base(),
        }
    }
}

/// SSH transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SshConfig {
    /// Remote login user.
    #[serde(default = "default_ssh_user")]
    pub user: String,

    /// Remote SSH port.
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Connection check timeout in seconds.
    #[serde(default = "default_ssh_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Remote command timeout in seconds.
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,

    /// File transfer timeout in seconds.
    #[serde(default = "default_transfer_timeout_secs")]
    pub transfer_timeout_secs: u64,
}

fn default_ssh_user() -> String {
    "root".to_owned()
}

const fn default_ssh_port() -> u16 {
    22
}

const fn default_ssh_connect_timeout_secs() -> u64 {
    10
}

const fn default_command_timeout_secs() -> u64 {
    120
}

const fn default_transfer_timeout_secs() -> u64 {
    300
}

impl SshConfig {
    /// Connection check timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Remote command timeout.
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// File transfer timeout.
    #[must_use]
    pub const fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: default_ssh_user(),
            port: default_ssh_port(),
            connect_timeout_secs: default_ssh_connect_timeout_secs(),
            command_timeout_secs: default_command_timeout_secs(),
            transfer_timeout_secs: default_transfer_timeout_secs(),
        }
    }
}

/// Chain-bootstrap tool configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    /// Path to the bootstrap script.
    #[serde(default = "default_bootstrap_script")]
    pub script: PathBuf,

    /// Timeout for a single invocation in seconds.
    #[serde(default = "default_bootstrap_timeout_secs")]
    pub timeout_secs: u64,

    /// Image suffix that selects the SM encryption scheme.
    #[serde(default = "default_sm_suffix")]
    pub sm_suffix: String,
}

fn default_bootstrap_script() -> PathBuf {
    PathBuf::from("/opt/chainwright/build_chain.sh")
}

const fn default_bootstrap_timeout_secs() -> u64 {
    600
}

fn default_sm_suffix() -> String {
    "-gm".to_owned()
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            script: default_bootstrap_script(),
            timeout_secs: default_bootstrap_timeout_secs(),
            sm_suffix: default_sm_suffix(),
        }
    }
}

/// Restart fan-out configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RestartConfig {
    /// Number of worker tasks.
    #[serde(default = "default_restart_workers")]
    pub workers: usize,

    /// Bounded queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Attempts per front before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt, doubled on each retry.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

const fn default_restart_workers() -> usize {
    2
}

const fn default_queue_capacity() -> usize {
    64
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

impl RestartConfig {
    /// Initial backoff as a duration.
    #[must_use]
    pub const fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            workers: default_restart_workers(),
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}
