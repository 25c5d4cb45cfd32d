//! Core types for chainwright-control.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{ChainStatus, FrontStatus, GroupStatus, NodeStatus};

macro_rules! int_id {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name($inner);

        impl $name {
            /// Wrap a raw id.
            #[must_use]
            pub const fn new(id: $inner) -> Self {
                Self(id)
            }

            /// The raw id.
            #[must_use]
            pub const fn get(self) -> $inner {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

int_id!(
    /// Catalog id of a chain.
    ChainId(i64)
);
int_id!(
    /// Catalog id of an agency.
    AgencyId(i64)
);
int_id!(
    /// Catalog id of a host.
    HostId(i64)
);
int_id!(
    /// Catalog id of a front (node-agent).
    FrontId(i64)
);
int_id!(
    /// Group number within a chain.
    GroupId(i32)
);

/// Identity of a ledger node, as generated by the bootstrap tool.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a new node ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines and directory suffixes.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Cryptographic scheme a chain is generated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionScheme {
    /// Standard ECDSA keys.
    #[default]
    Ecdsa,
    /// National-standard (SM2/SM3/SM4) keys.
    Sm,
}

impl EncryptionScheme {
    /// Derive the scheme from an image reference.
    ///
    /// Images whose tag ends with `sm_suffix` select [`EncryptionScheme::Sm`].
    #[must_use]
    pub fn from_image(image: &str, sm_suffix: &str) -> Self {
        if !sm_suffix.is_empty() && image.ends_with(sm_suffix) {
            Self::Sm
        } else {
            Self::Ecdsa
        }
    }

    /// Numeric flag understood by the node and front processes.
    #[must_use]
    pub const fn flag(&self) -> u8 {
        match self {
            Self::Ecdsa => 0,
            Self::Sm => 1,
        }
    }

    /// Get the scheme name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ecdsa => "ecdsa",
            Self::Sm => "sm",
        }
    }
}

impl fmt::Display for EncryptionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EncryptionScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ecdsa" => Ok(Self::Ecdsa),
            "sm" => Ok(Self::Sm),
            _ => Err(format!("unknown encryption scheme: {s}")),
        }
    }
}

/// How front processes run on their host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// One container per front.
    #[default]
    Docker,
    /// Plain processes started by the node directory's scripts.
    Host,
}

impl RunMode {
    /// Get the run mode name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Host => "host",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "docker" => Ok(Self::Docker),
            "host" => Ok(Self::Host),
            _ => Err(format!("unknown run mode: {s}")),
        }
    }
}

/// A resolvable image tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Tag id operators pass on the command line.
    pub id: i32,
    /// Config category, e.g. `docker_image`.
    pub config_type: String,
    /// Image reference, e.g. `fiscoorg/fisco-webase:v2.7.2`.
    pub value: String,
}

/// Data for a chain row that does not exist yet.
#[derive(Debug, Clone)]
pub struct NewChain {
    /// Unique chain name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Image reference the chain runs.
    pub version: String,
    /// Key scheme.
    pub encryption: EncryptionScheme,
    /// Initial status.
    pub status: ChainStatus,
    /// Root directory on every host.
    pub root_dir: String,
    /// Process run mode.
    pub run_mode: RunMode,
    /// External signer address embedded in front configs.
    pub signer_addr: String,
}

/// A chain row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainRecord {
    /// Catalog id.
    pub id: ChainId,
    /// Unique chain name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Image reference the chain runs.
    pub version: String,
    /// Key scheme.
    pub encryption: EncryptionScheme,
    /// Current status.
    pub status: ChainStatus,
    /// Root directory on every host.
    pub root_dir: String,
    /// Process run mode.
    pub run_mode: RunMode,
    /// External signer address.
    pub signer_addr: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// An agency row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgencyRecord {
    /// Catalog id.
    pub id: AgencyId,
    /// Name, unique within the chain.
    pub name: String,
    /// Owning chain.
    pub chain_id: ChainId,
    /// Owning chain name.
    pub chain_name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Data for a host row that does not exist yet.
#[derive(Debug, Clone)]
pub struct NewHost {
    /// Owning agency.
    pub agency_id: AgencyId,
    /// Owning agency name.
    pub agency_name: String,
    /// Owning chain.
    pub chain_id: ChainId,
    /// Host address, unique within the chain.
    pub ip: String,
    /// Root directory for generated files on this host.
    pub root_dir: String,
}

/// A host row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostRecord {
    /// Catalog id.
    pub id: HostId,
    /// Host address.
    pub ip: String,
    /// Owning agency.
    pub agency_id: AgencyId,
    /// Owning agency name.
    pub agency_name: String,
    /// Owning chain.
    pub chain_id: ChainId,
    /// Root directory on the host.
    pub root_dir: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A group row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecord {
    /// Owning chain.
    pub chain_id: ChainId,
    /// Group number.
    pub group_id: GroupId,
    /// Number of nodes currently assigned.
    pub node_count: u32,
    /// Membership status.
    pub status: GroupStatus,
    /// Free-form description.
    pub description: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Data for a front row that does not exist yet.
#[derive(Debug, Clone)]
pub struct NewFront {
    /// Node identity the front serves.
    pub node_id: NodeId,
    /// Host address.
    pub ip: String,
    /// Externally reachable front port.
    pub front_port: u16,
    /// Owning agency.
    pub agency_id: AgencyId,
    /// Owning agency name.
    pub agency_name: String,
    /// Hosting machine.
    pub host_id: HostId,
    /// Index of the node directory on its host.
    pub host_index: u32,
    /// Image reference the process runs.
    pub image_tag: String,
    /// Process run mode.
    pub run_mode: RunMode,
    /// Container name on the host.
    pub container_name: String,
    /// JSON-RPC port.
    pub rpc_port: u16,
    /// Peer-to-peer port.
    pub p2p_port: u16,
    /// SDK channel port.
    pub channel_port: u16,
    /// Owning chain.
    pub chain_id: ChainId,
    /// Owning chain name.
    pub chain_name: String,
    /// Initial status.
    pub status: FrontStatus,
}

/// A front (node-agent) row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontRecord {
    /// Catalog id.
    pub id: FrontId,
    /// Node identity the front serves.
    pub node_id: NodeId,
    /// Host address.
    pub ip: String,
    /// Externally reachable front port.
    pub front_port: u16,
    /// Owning agency.
    pub agency_id: AgencyId,
    /// Owning agency name.
    pub agency_name: String,
    /// Hosting machine.
    pub host_id: HostId,
    /// Index of the node directory on its host.
    pub host_index: u32,
    /// Image reference the process runs.
    pub image_tag: String,
    /// Process run mode.
    pub run_mode: RunMode,
    /// Container name on the host.
    pub container_name: String,
    /// JSON-RPC port.
    pub rpc_port: u16,
    /// Peer-to-peer port.
    pub p2p_port: u16,
    /// SDK channel port.
    pub channel_port: u16,
    /// Owning chain.
    pub chain_id: ChainId,
    /// Owning chain name.
    pub chain_name: String,
    /// Process status.
    pub status: FrontStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Link between a front and a group it serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontGroupRecord {
    /// Front.
    pub front_id: FrontId,
    /// Owning chain.
    pub chain_id: ChainId,
    /// Group.
    pub group_id: GroupId,
    /// Link status.
    pub status: GroupStatus,
}

/// A node row: one node identity's membership in one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Owning chain.
    pub chain_id: ChainId,
    /// Node identity.
    pub node_id: NodeId,
    /// Display name derived from group and node id.
    pub name: String,
    /// Group membership.
    pub group_id: GroupId,
    /// Host address.
    pub ip: String,
    /// Peer-to-peer port.
    pub p2p_port: u16,
    /// Liveness.
    pub status: NodeStatus,
}

impl NodeRecord {
    /// Derive the node name for a group membership.
    #[must_use]
    pub fn name_for(group_id: GroupId, node_id: &NodeId) -> String {
        format!("{}_{}", group_id, node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_from_image_suffix() {
        assert_eq!(
            EncryptionScheme::from_image("fiscoorg/fisco-webase:v2.7.2", "-gm"),
            EncryptionScheme::Ecdsa
        );
        assert_eq!(
            EncryptionScheme::from_image("fiscoorg/fisco-webase:v2.7.2-gm", "-gm"),
            EncryptionScheme::Sm
        );
        assert_eq!(EncryptionScheme::Sm.flag(), 1);
    }

    #[test]
    fn node_name_is_group_scoped() {
        let node = NodeId::new("a1b2c3d4e5f6");
        assert_eq!(NodeRecord::name_for(GroupId::new(2), &node), "2_a1b2c3d4e5f6");
        assert_eq!(node.short(), "a1b2c3d4");
        assert_eq!(NodeId::new("abc").short(), "abc");
    }
}
