//! Status state machines for catalog entities.
//!
//! Every entity with a lifecycle carries a status enum and an explicit
//! transition table. Code that writes a status asks the table first via
//! [`StatusMachine::transition`]; arbitrary status writes are not possible
//! through the entity services.
//!
//! ```text
//! Chain:  Initialized ──▶ Running ◀──▶ Stopped
//! Front:  Initialized ──▶ Running ◀──▶ Stopped
//!              └──────────────────────▶ Stopped
//! Group:  Maintaining ◀──▶ Normal
//! Node:   Dead ◀──▶ Running
//! ```
//!
//! Re-entering the current status is always allowed so that restarts and
//! repeated regeneration stay idempotent.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DeployError, DeployResult};

/// Shared behaviour of every status enum.
pub trait StatusMachine: Copy + Eq + fmt::Debug + private::Sealed {
    /// Entity name used in error messages.
    const ENTITY: &'static str;

    /// Persisted name of this status.
    fn as_str(&self) -> &'static str;

    /// Whether the table permits moving from `self` to `to`.
    fn permits(&self, to: Self) -> bool;

    /// Validate a transition, returning the target status when permitted.
    fn transition(self, to: Self) -> DeployResult<Self> {
        if self == to || self.permits(to) {
            Ok(to)
        } else {
            Err(DeployError::InvalidStatusTransition {
                entity: Self::ENTITY,
                from: self.as_str(),
                to: to.as_str(),
            })
        }
    }
}

mod private {
    pub trait Sealed {}
}

fn unknown(entity: &str, s: &str) -> String {
    format!("unknown {entity} status: {s}")
}

// =============================================================================
// Chain
// =============================================================================

/// Lifecycle of a deployed chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainStatus {
    /// Rows and files created, no node started yet.
    Initialized,
    /// At least one restart fan-out completed.
    Running,
    /// Explicitly stopped.
    Stopped,
}

impl private::Sealed for ChainStatus {}

impl StatusMachine for ChainStatus {
    const ENTITY: &'static str = "chain";

    fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }

    fn permits(&self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Initialized, Self::Running)
                | (Self::Running, Self::Stopped)
                | (Self::Stopped, Self::Running)
        )
    }
}

impl FromStr for ChainStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initialized" => Ok(Self::Initialized),
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            _ => Err(unknown(Self::ENTITY, s)),
        }
    }
}

// =============================================================================
// Front
// =============================================================================

/// Lifecycle of a front (node-agent) process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrontStatus {
    /// Row and config created, process never started.
    Initialized,
    /// Process started.
    Running,
    /// Process stopped.
    Stopped,
}

impl FrontStatus {
    /// Returns true if the process is considered active.
    ///
    /// Only non-running fronts may be deleted.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl private::Sealed for FrontStatus {}

impl StatusMachine for FrontStatus {
    const ENTITY: &'static str = "front";

    fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }

    fn permits(&self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Initialized, Self::Running)
                | (Self::Initialized, Self::Stopped)
                | (Self::Running, Self::Stopped)
                | (Self::Stopped, Self::Running)
        )
    }
}

impl FromStr for FrontStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initialized" => Ok(Self::Initialized),
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            _ => Err(unknown(Self::ENTITY, s)),
        }
    }
}

// =============================================================================
// Group
// =============================================================================

/// Whether a group's membership is still settling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// Topology still changing.
    Maintaining,
    /// Every member running.
    Normal,
}

impl private::Sealed for GroupStatus {}

impl StatusMachine for GroupStatus {
    const ENTITY: &'static str = "group";

    fn as_str(&self) -> &'static str {
        match self {
            Self::Maintaining => "maintaining",
            Self::Normal => "normal",
        }
    }

    fn permits(&self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Maintaining, Self::Normal) | (Self::Normal, Self::Maintaining)
        )
    }
}

impl FromStr for GroupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "maintaining" => Ok(Self::Maintaining),
            "normal" => Ok(Self::Normal),
            _ => Err(unknown(Self::ENTITY, s)),
        }
    }
}

// =============================================================================
// Node
// =============================================================================

/// Liveness of a ledger node identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Not started yet, or stopped.
    Dead,
    /// Started successfully.
    Running,
}

impl private::Sealed for NodeStatus {}

impl StatusMachine for NodeStatus {
    const ENTITY: &'static str = "node";

    fn as_str(&self) -> &'static str {
        match self {
            Self::Dead => "dead",
            Self::Running => "running",
        }
    }

    fn permits(&self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Dead, Self::Running) | (Self::Running, Self::Dead)
        )
    }
}

impl FromStr for NodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dead" => Ok(Self::Dead),
            "running" => Ok(Self::Running),
            _ => Err(unknown(Self::ENTITY, s)),
        }
    }
}

macro_rules! impl_display {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(StatusMachine::as_str(self))
                }
            }
        )*
    };
}

impl_display!(ChainStatus, FrontStatus, GroupStatus, NodeStatus);
