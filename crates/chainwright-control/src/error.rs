//! Error types for chainwright-control.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result type alias using [`DeployError`].
pub type DeployResult<T> = Result<T, DeployError>;

/// Broad classification of a [`DeployError`].
///
/// Callers decide whether to retry or fix their input from the kind alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed or missing input.
    Validation,
    /// Uniqueness or version conflict.
    Conflict,
    /// A referenced entity does not exist.
    NotFound,
    /// The entity is in a state that forbids the operation.
    Precondition,
    /// The bootstrap tool, SSH or a file transfer failed.
    ExternalTool,
    /// Anything else raised inside a multi-step workflow.
    Unknown,
}

impl ErrorKind {
    /// Get the kind name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Precondition => "precondition",
            Self::ExternalTool => "external_tool",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in the deployment control plane.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    // ─────────────────────────────────────────────────────────────────────────
    // Validation errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Blank or otherwise unusable chain name.
    #[error("invalid chain name: {0:?}")]
    InvalidChainName(String),

    /// Image tag id does not resolve to a non-blank image reference.
    #[error("image tag {0} does not resolve to an image")]
    InvalidImageTag(i32),

    /// Topology input is empty or has no usable line.
    #[error("topology is empty")]
    EmptyTopology,

    /// Node count out of range.
    #[error("invalid node count {count}: {reason}")]
    InvalidNodeCount {
        /// Requested count.
        count: i64,
        /// What the count violated.
        reason: String,
    },

    /// Host address is not a valid IPv4 address.
    #[error("invalid IPv4 address: {0}")]
    InvalidIp(String),

    /// A brand-new host needs an agency name.
    #[error("agency name is required for new host {0}")]
    AgencyNameRequired(String),

    /// Generic malformed input.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    // ─────────────────────────────────────────────────────────────────────────
    // Conflict errors
    // ─────────────────────────────────────────────────────────────────────────
    /// A chain with this name already exists.
    #[error("chain already exists: {0}")]
    ChainExists(String),

    /// The same host was assigned to two agencies.
    #[error("host {ip} belongs to agency {existing}, cannot also belong to {requested}")]
    HostAgencyConflict {
        /// Host address.
        ip: String,
        /// Agency the host was first bound to.
        existing: String,
        /// Conflicting agency.
        requested: String,
    },

    /// Upgrade target equals the current version.
    #[error("chain {chain} already runs version {version}")]
    SameVersion {
        /// Chain name.
        chain: String,
        /// Current version.
        version: String,
    },

    /// A row with the same natural key already exists.
    #[error("duplicate {entity}: {key}")]
    Duplicate {
        /// Entity type.
        entity: &'static str,
        /// Natural key.
        key: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Not-found errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Chain not found.
    #[error("chain not found: {0}")]
    ChainNotFound(String),

    /// Node not found.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// Host not found.
    #[error("host not found: {0}")]
    HostNotFound(String),

    /// Agency not found.
    #[error("agency not found: {0}")]
    AgencyNotFound(String),

    /// Group not found.
    #[error("group {group_id} not found in chain {chain_id}")]
    GroupNotFound {
        /// Owning chain.
        chain_id: i64,
        /// Group id.
        group_id: i32,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Precondition errors
    // ─────────────────────────────────────────────────────────────────────────
    /// The node's front process is still running.
    #[error("node {0} is still running")]
    NodeStillRunning(String),

    /// A status write not allowed by the entity's transition table.
    #[error("invalid {entity} status transition: cannot transition from {from} to {to}")]
    InvalidStatusTransition {
        /// Entity type.
        entity: &'static str,
        /// Current status.
        from: &'static str,
        /// Attempted status.
        to: &'static str,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // External tool errors
    // ─────────────────────────────────────────────────────────────────────────
    /// SSH connectivity check failed.
    #[error("cannot connect to host {0} over SSH")]
    HostUnreachable(String),

    /// The chain-bootstrap tool reported failure.
    #[error("bootstrap tool failed: {output}")]
    BootstrapFailed {
        /// Captured tool output.
        output: String,
    },

    /// A remote command or transfer failed.
    #[error("remote operation on {ip} failed: {message}")]
    Remote {
        /// Host address.
        ip: String,
        /// Failure detail, including captured output.
        message: String,
    },

    /// An external command exceeded its time bound.
    #[error("{operation} timed out after {secs}s")]
    Timeout {
        /// What was running.
        operation: String,
        /// Bound that was exceeded.
        secs: u64,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Workflow wrappers
    // ─────────────────────────────────────────────────────────────────────────
    /// Chain creation failed after bootstrap started.
    #[error("deploy failed: {0}")]
    DeployFailed(#[source] Box<DeployError>),

    /// Growing a group failed.
    #[error("add node failed: {0}")]
    AddNodeFailed(#[source] Box<DeployError>),

    /// Regenerating process config for remaining nodes failed.
    #[error("updating related node config failed: {0}")]
    ConfigUpdateFailed(#[source] Box<DeployError>),

    /// Moving a node directory into quarantine failed.
    #[error("moving node directory failed: {0}")]
    NodeDirDeleteFailed(#[source] std::io::Error),

    // ─────────────────────────────────────────────────────────────────────────
    // Infrastructure errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Generated artifact could not be read.
    #[error("malformed artifact {path}: {message}")]
    Artifact {
        /// Offending file.
        path: String,
        /// What was wrong.
        message: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DeployError {
    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a remote error.
    #[must_use]
    pub fn remote(ip: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Remote {
            ip: ip.into(),
            message: msg.into(),
        }
    }

    /// Create an artifact error.
    #[must_use]
    pub fn artifact(path: &std::path::Path, msg: impl Into<String>) -> Self {
        Self::Artifact {
            path: path.display().to_string(),
            message: msg.into(),
        }
    }

    /// Create a node count error.
    #[must_use]
    pub fn node_count(count: i64, reason: impl Into<String>) -> Self {
        Self::InvalidNodeCount {
            count,
            reason: reason.into(),
        }
    }

    /// Wrap as [`DeployError::DeployFailed`], leaving an existing wrapper alone.
    #[must_use]
    pub fn into_deploy_failed(self) -> Self {
        match self {
            e @ Self::DeployFailed(_) => e,
            e => Self::DeployFailed(Box::new(e)),
        }
    }

    /// Wrap as [`DeployError::AddNodeFailed`], leaving an existing wrapper alone.
    #[must_use]
    pub fn into_add_node_failed(self) -> Self {
        match self {
            e @ Self::AddNodeFailed(_) => e,
            e => Self::AddNodeFailed(Box::new(e)),
        }
    }

    /// The root cause beneath any workflow wrapper.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::DeployFailed(inner) | Self::AddNodeFailed(inner) | Self::ConfigUpdateFailed(inner) => {
                inner.root_cause()
            }
            other => other,
        }
    }

    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidChainName(_)
            | Self::InvalidImageTag(_)
            | Self::EmptyTopology
            | Self::InvalidNodeCount { .. }
            | Self::InvalidIp(_)
            | Self::AgencyNameRequired(_)
            | Self::InvalidParameter(_) => ErrorKind::Validation,
            Self::ChainExists(_)
            | Self::HostAgencyConflict { .. }
            | Self::SameVersion { .. }
            | Self::Duplicate { .. } => ErrorKind::Conflict,
            Self::ChainNotFound(_)
            | Self::NodeNotFound(_)
            | Self::HostNotFound(_)
            | Self::AgencyNotFound(_)
            | Self::GroupNotFound { .. } => ErrorKind::NotFound,
            Self::NodeStillRunning(_) | Self::InvalidStatusTransition { .. } => {
                ErrorKind::Precondition
            }
            Self::HostUnreachable(_)
            | Self::BootstrapFailed { .. }
            | Self::Remote { .. }
            | Self::Timeout { .. } => ErrorKind::ExternalTool,
            Self::DeployFailed(_)
            | Self::AddNodeFailed(_)
            | Self::ConfigUpdateFailed(_)
            | Self::NodeDirDeleteFailed(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Artifact { .. }
            | Self::Config(_)
            | Self::Internal(_) => ErrorKind::Unknown,
        }
    }

    /// Stable numeric code for this error.
    #[must_use]
    pub const fn ret_code(&self) -> RetCode {
        match self {
            Self::InvalidChainName(_) | Self::InvalidParameter(_) => RetCode::PARAM_EXCEPTION,
            Self::InvalidImageTag(_) => RetCode::TAG_ID_PARAM_ERROR,
            Self::EmptyTopology => RetCode::IP_CONF_PARAM_NULL,
            Self::InvalidNodeCount { .. } => RetCode::NODES_NUM_ERROR,
            Self::InvalidIp(_) => RetCode::IP_FORMAT_ERROR,
            Self::AgencyNameRequired(_) => RetCode::AGENCY_NAME_EMPTY,
            Self::ChainExists(_) => RetCode::CHAIN_NAME_EXISTS,
            Self::HostAgencyConflict { .. } => RetCode::HOST_ONLY_BELONGS_ONE_AGENCY,
            Self::SameVersion { .. } => RetCode::UPGRADE_WITH_SAME_TAG,
            Self::Duplicate { .. } => RetCode::DUPLICATE_ENTITY,
            Self::ChainNotFound(_) => RetCode::CHAIN_NAME_NOT_EXISTS,
            Self::NodeNotFound(_) => RetCode::NODE_ID_NOT_EXISTS,
            Self::HostNotFound(_) => RetCode::HOST_NOT_EXISTS,
            Self::AgencyNotFound(_) => RetCode::AGENCY_NOT_EXISTS,
            Self::GroupNotFound { .. } => RetCode::GROUP_NOT_EXISTS,
            Self::NodeStillRunning(_) => RetCode::NODE_RUNNING,
            Self::InvalidStatusTransition { .. } => RetCode::INVALID_STATUS_TRANSITION,
            Self::HostUnreachable(_) => RetCode::HOST_CONNECT_ERROR,
            Self::BootstrapFailed { .. } => RetCode::EXEC_BUILD_CHAIN_ERROR,
            Self::Remote { .. } | Self::Timeout { .. } => RetCode::REMOTE_EXEC_ERROR,
            Self::DeployFailed(_) => RetCode::DEPLOY_WITH_UNKNOWN_EXCEPTION,
            Self::AddNodeFailed(_) => RetCode::ADD_NODE_WITH_UNKNOWN_EXCEPTION,
            Self::ConfigUpdateFailed(_) => RetCode::UPDATE_RELATED_NODE_ERROR,
            Self::NodeDirDeleteFailed(_) => RetCode::DELETE_NODE_DIR_ERROR,
            Self::Database(_)
            | Self::Io(_)
            | Self::Artifact { .. }
            | Self::Config(_)
            | Self::Internal(_) => RetCode::SYSTEM_EXCEPTION,
        }
    }
}

/// Numeric result code carried by every workflow outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RetCode(i32);

impl RetCode {
    /// Success.
    pub const SUCCESS: Self = Self(0);
    /// Unclassified system failure.
    pub const SYSTEM_EXCEPTION: Self = Self(102_000);
    /// Malformed parameter.
    pub const PARAM_EXCEPTION: Self = Self(102_001);
    /// Topology empty.
    pub const IP_CONF_PARAM_NULL: Self = Self(202_401);
    /// Host bound to two agencies.
    pub const HOST_ONLY_BELONGS_ONE_AGENCY: Self = Self(202_402);
    /// SSH check failed.
    pub const HOST_CONNECT_ERROR: Self = Self(202_403);
    /// Node count out of range.
    pub const NODES_NUM_ERROR: Self = Self(202_404);
    /// Unknown image tag.
    pub const TAG_ID_PARAM_ERROR: Self = Self(202_405);
    /// Chain name already used.
    pub const CHAIN_NAME_EXISTS: Self = Self(202_406);
    /// Bootstrap tool failed.
    pub const EXEC_BUILD_CHAIN_ERROR: Self = Self(202_407);
    /// Create-chain failed after bootstrap.
    pub const DEPLOY_WITH_UNKNOWN_EXCEPTION: Self = Self(202_408);
    /// Chain name unknown.
    pub const CHAIN_NAME_NOT_EXISTS: Self = Self(202_409);
    /// Host address malformed.
    pub const IP_FORMAT_ERROR: Self = Self(202_410);
    /// New host without agency name.
    pub const AGENCY_NAME_EMPTY: Self = Self(202_411);
    /// Grow-group failed.
    pub const ADD_NODE_WITH_UNKNOWN_EXCEPTION: Self = Self(202_412);
    /// Upgrade to the current version.
    pub const UPGRADE_WITH_SAME_TAG: Self = Self(202_413);
    /// Node id unknown.
    pub const NODE_ID_NOT_EXISTS: Self = Self(202_414);
    /// Node still running.
    pub const NODE_RUNNING: Self = Self(202_415);
    /// Regenerating related node config failed.
    pub const UPDATE_RELATED_NODE_ERROR: Self = Self(202_416);
    /// Quarantining node directory failed.
    pub const DELETE_NODE_DIR_ERROR: Self = Self(202_417);
    /// Host unknown.
    pub const HOST_NOT_EXISTS: Self = Self(202_418);
    /// Agency unknown.
    pub const AGENCY_NOT_EXISTS: Self = Self(202_419);
    /// Group unknown.
    pub const GROUP_NOT_EXISTS: Self = Self(202_420);
    /// Status write rejected by the transition table.
    pub const INVALID_STATUS_TRANSITION: Self = Self(202_421);
    /// Remote command or transfer failed.
    pub const REMOTE_EXEC_ERROR: Self = Self(202_422);
    /// Natural key already used.
    pub const DUPLICATE_ENTITY: Self = Self(202_423);

    /// The raw numeric value.
    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Returns true for [`RetCode::SUCCESS`].
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for RetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The single result every workflow hands back to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    /// Success or failure code.
    pub code: RetCode,
    /// Tool output on success, error detail on failure.
    pub detail: String,
}

impl WorkflowOutcome {
    /// A successful outcome.
    #[must_use]
    pub fn success(detail: impl Into<String>) -> Self {
        Self {
            code: RetCode::SUCCESS,
            detail: detail.into(),
        }
    }

    /// A failed outcome with an explicit code.
    #[must_use]
    pub fn failure(code: RetCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }

    /// Flatten an error into an outcome.
    #[must_use]
    pub fn from_error(error: &DeployError) -> Self {
        Self::failure(error.ret_code(), error.to_string())
    }

    /// Returns true if the workflow succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

impl From<DeployResult<WorkflowOutcome>> for WorkflowOutcome {
    fn from(result: DeployResult<WorkflowOutcome>) -> Self {
        match result {
            Ok(outcome) => outcome,
            Err(e) => Self::from_error(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrappers_keep_root_cause() {
        let err = DeployError::HostUnreachable("10.0.0.1".to_owned()).into_deploy_failed();
        assert!(matches!(err, DeployError::DeployFailed(_)));
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert!(matches!(err.root_cause(), DeployError::HostUnreachable(_)));

        // Wrapping twice does not nest.
        let again = err.into_deploy_failed();
        match again {
            DeployError::DeployFailed(inner) => {
                assert!(matches!(*inner, DeployError::HostUnreachable(_)));
            }
            other => panic!("expected DeployFailed, got {other:?}"),
        }
    }

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(DeployError::EmptyTopology.kind(), ErrorKind::Validation);
        assert_eq!(
            DeployError::ChainExists("c".to_owned()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            DeployError::NodeNotFound("n".to_owned()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            DeployError::NodeStillRunning("n".to_owned()).kind(),
            ErrorKind::Precondition
        );
        assert_eq!(
            DeployError::BootstrapFailed {
                output: "boom".to_owned()
            }
            .kind(),
            ErrorKind::ExternalTool
        );
    }

    #[test]
    fn outcome_from_error_flattens() {
        let err = DeployError::SameVersion {
            chain: "c".to_owned(),
            version: "v2.7.0".to_owned(),
        };
        let outcome = WorkflowOutcome::from(Err(err));
        assert!(!outcome.is_success());
        assert_eq!(outcome.code, RetCode::UPGRADE_WITH_SAME_TAG);
        assert!(outcome.detail.contains("v2.7.0"));
    }
}
