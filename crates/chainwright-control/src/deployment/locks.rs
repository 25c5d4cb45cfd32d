//! Per-group serialisation of topology changes.

use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::GroupId;

/// One async lock per `(chain, group)`.
///
/// Workflows that change a group's membership hold its lock for their whole
/// duration. Locks are always taken in ascending group order and before the
/// catalog transaction begins.
#[derive(Debug, Default)]
pub struct GroupLocks {
    locks: DashMap<(String, GroupId), Arc<Mutex<()>>>,
}

/// Held locks; released on drop.
#[derive(Debug)]
pub struct GroupGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl GroupLocks {
    /// Create an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every group in `groups` for `chain`.
    pub async fn acquire(
        &self,
        chain: &str,
        groups: impl IntoIterator<Item = GroupId>,
    ) -> GroupGuard {
        let ordered: BTreeSet<GroupId> = groups.into_iter().collect();
        let mut guards = Vec::with_capacity(ordered.len());
        for group_id in ordered {
            let lock = Arc::clone(&self.locks.entry((chain.to_owned(), group_id)).or_default());
            guards.push(lock.lock_owned().await);
        }
        GroupGuard { _guards: guards }
    }
}
