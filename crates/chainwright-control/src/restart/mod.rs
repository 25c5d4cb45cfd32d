//! Asynchronous restart fan-out.
//!
//! Workflows publish a [`RestartScope`] and return immediately. A pool of
//! [`RestartWorker`]s drains the queue, (re)starts every front in scope on
//! its host and records the resulting statuses. Callers observe progress
//! only through entity status.

mod runner;
mod worker;

pub use runner::FrontRunner;
pub use worker::RestartWorker;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, RwLock};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RestartConfig;
use crate::types::{ChainId, GroupId};

/// Which fronts a restart request covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartScope {
    /// Every front of a chain.
    Chain(ChainId),
    /// Every front serving one group.
    Group(ChainId, GroupId),
    /// Every front serving any of several groups.
    Groups(ChainId, BTreeSet<GroupId>),
}

impl RestartScope {
    /// The chain the scope belongs to.
    #[must_use]
    pub const fn chain_id(&self) -> ChainId {
        match self {
            Self::Chain(id) | Self::Group(id, _) | Self::Groups(id, _) => *id,
        }
    }
}

impl fmt::Display for RestartScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chain(chain) => write!(f, "chain {chain}"),
            Self::Group(chain, group) => write!(f, "chain {chain} group {group}"),
            Self::Groups(chain, groups) => {
                let ids: Vec<String> = groups.iter().map(ToString::to_string).collect();
                write!(f, "chain {chain} groups {{{}}}", ids.join(","))
            }
        }
    }
}

/// Accepts restart requests without blocking the caller.
pub trait RestartDispatcher: Send + Sync {
    /// Publish a restart request. Never blocks and never fails.
    fn dispatch(&self, scope: RestartScope);

    /// Restart every front of a chain.
    fn restart_chain(&self, chain_id: ChainId) {
        self.dispatch(RestartScope::Chain(chain_id));
    }

    /// Restart every front serving a group.
    fn restart_group(&self, chain_id: ChainId, group_id: GroupId) {
        self.dispatch(RestartScope::Group(chain_id, group_id));
    }

    /// Restart every front serving any of `group_ids`.
    fn restart_groups(&self, chain_id: ChainId, group_ids: BTreeSet<GroupId>) {
        self.dispatch(RestartScope::Groups(chain_id, group_ids));
    }
}

/// Bounded restart queue drained by a pool of workers.
pub struct RestartQueue {
    tx: RwLock<Option<mpsc::Sender<RestartScope>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl RestartQueue {
    /// Spawn `config.workers` workers behind a queue of
    /// `config.queue_capacity` requests.
    #[must_use]
    pub fn start(config: &RestartConfig, worker: Arc<RestartWorker>) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let cancel = CancellationToken::new();

        let handles = (0..config.workers.max(1))
            .map(|id| {
                let worker = Arc::clone(&worker);
                let rx = Arc::clone(&rx);
                let cancel = cancel.clone();
                tokio::spawn(async move { worker.run(id, rx, cancel).await })
            })
            .collect();

        info!(workers = config.workers.max(1), capacity = config.queue_capacity, "restart queue started");
        Self {
            tx: RwLock::new(Some(tx)),
            handles: Mutex::new(handles),
            cancel,
        }
    }

    /// Stop accepting requests, let workers drain the queue, and wait.
    pub async fn shutdown(&self) {
        if let Ok(mut tx) = self.tx.write() {
            tx.take();
        }
        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "restart worker panicked");
            }
        }
        info!("restart queue drained");
    }

    /// Stop workers after their current request and drop anything queued.
    pub fn abort(&self) {
        if let Ok(mut tx) = self.tx.write() {
            tx.take();
        }
        self.cancel.cancel();
    }
}

impl RestartDispatcher for RestartQueue {
    fn dispatch(&self, scope: RestartScope) {
        let Ok(guard) = self.tx.read() else {
            warn!(%scope, "restart queue lock poisoned, dropping request");
            return;
        };
        let Some(tx) = guard.as_ref() else {
            warn!(%scope, "restart queue closed, dropping request");
            return;
        };
        match tx.try_send(scope) {
            Ok(()) => debug!("restart request queued"),
            Err(mpsc::error::TrySendError::Full(scope)) => {
                warn!(%scope, "restart queue full, dropping request");
            }
            Err(mpsc::error::TrySendError::Closed(scope)) => {
                warn!(%scope, "restart queue closed, dropping request");
            }
        }
    }
}

/// Dispatcher that only records requests.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    scopes: RwLock<Vec<RestartScope>>,
}

impl RecordingDispatcher {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request published so far.
    #[must_use]
    pub fn scopes(&self) -> Vec<RestartScope> {
        self.scopes.read().map(|s| s.clone()).unwrap_or_default()
    }
}

impl RestartDispatcher for RecordingDispatcher {
    fn dispatch(&self, scope: RestartScope) {
        if let Ok(mut scopes) = self.scopes.write() {
            scopes.push(scope);
        }
    }
}
