//! Integration tests for the restart fan-out.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::TestControl;
use tokio_util::sync::CancellationToken;

use chainwright_control::config::RestartConfig;
use chainwright_control::render::BuiltinRenderer;
use chainwright_control::restart::{FrontRunner, RestartWorker};
use chainwright_control::{
    CatalogStore, ChainId, ChainStatus, DeployContext, DeployError, DeploymentManager,
    FrontStatus, GroupId, GroupStatus, RestartDispatcher, RestartQueue, RestartScope,
};

fn fast_config() -> RestartConfig {
    RestartConfig {
        workers: 2,
        queue_capacity: 8,
        max_attempts: 2,
        initial_backoff_ms: 10,
    }
}

fn worker(control: &TestControl) -> RestartWorker {
    RestartWorker::new(
        control.store.clone(),
        FrontRunner::new(control.remote.clone()),
        &fast_config(),
    )
}

async fn group_status(control: &TestControl, group_id: i32) -> GroupStatus {
    let chain = control.chain("chain0").await.unwrap();
    let mut tx = control.store.begin().await.unwrap();
    tx.get_group(chain.id, GroupId::new(group_id))
        .await
        .unwrap()
        .unwrap()
        .status
}

#[tokio::test]
async fn chain_restart_starts_every_front() {
    let control = TestControl::with_chain().await;
    let chain = control.chain("chain0").await.unwrap();

    let started = worker(&control)
        .restart(&RestartScope::Chain(chain.id))
        .await
        .unwrap();

    assert_eq!(started, 3);
    assert!(control
        .fronts("chain0")
        .await
        .iter()
        .all(|f| f.status == FrontStatus::Running));
    assert_eq!(group_status(&control, 1).await, GroupStatus::Normal);
    assert_eq!(group_status(&control, 2).await, GroupStatus::Normal);
    assert_eq!(
        control.chain("chain0").await.unwrap().status,
        ChainStatus::Running
    );
}

#[tokio::test]
async fn group_restart_touches_only_members() {
    let control = TestControl::with_chain().await;
    let chain = control.chain("chain0").await.unwrap();

    let started = worker(&control)
        .restart(&RestartScope::Group(chain.id, GroupId::new(2)))
        .await
        .unwrap();

    assert_eq!(started, 1);
    assert!(control.remote.commands_on("10.0.0.1").is_empty());
    assert_eq!(control.remote.commands_on("10.0.0.2").len(), 1);
}

#[tokio::test]
async fn partial_failure_records_what_started() {
    let control = TestControl::with_chain().await;
    let chain = control.chain("chain0").await.unwrap();
    control.remote.mark_failing("10.0.0.2");

    let err = worker(&control)
        .restart(&RestartScope::Chain(chain.id))
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::Remote { .. }));

    for front in control.fronts("chain0").await {
        let expected = if front.ip == "10.0.0.2" {
            FrontStatus::Initialized
        } else {
            FrontStatus::Running
        };
        assert_eq!(front.status, expected, "{}", front.ip);
    }
    assert_eq!(group_status(&control, 1).await, GroupStatus::Maintaining);
    assert_eq!(
        control.chain("chain0").await.unwrap().status,
        ChainStatus::Running
    );
}

#[tokio::test(start_paused = true)]
async fn missing_chain_is_not_retried() {
    let control = TestControl::with_chain().await;
    let worker = worker(&control);

    let err = worker
        .restart(&RestartScope::Chain(ChainId::new(999)))
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::ChainNotFound(_)));

    tokio::time::timeout(
        Duration::from_millis(5),
        worker.process(&RestartScope::Chain(ChainId::new(999)), &CancellationToken::new()),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn queue_drains_published_restarts() {
    let control = TestControl::with_chain().await;
    let chain = control.chain("chain0").await.unwrap();
    let queue = RestartQueue::start(&fast_config(), Arc::new(worker(&control)));

    queue.restart_chain(chain.id);
    queue.shutdown().await;

    assert!(control
        .fronts("chain0")
        .await
        .iter()
        .all(|f| f.status == FrontStatus::Running));

    // Requests after shutdown are dropped without blocking.
    queue.restart_chain(chain.id);
    assert_eq!(control.remote.commands_on("10.0.0.1").len(), 2);
}

#[tokio::test]
async fn workflow_restarts_reach_the_queue() {
    let control = TestControl::with_chain().await;
    let queue = Arc::new(RestartQueue::start(&fast_config(), Arc::new(worker(&control))));
    let ctx = DeployContext::new(
        &control.config,
        control.bootstrapper.clone(),
        control.remote.clone(),
        Arc::new(BuiltinRenderer::new()),
    );
    let manager = DeploymentManager::new(control.store.clone(), ctx, queue.clone());

    manager.upgrade("chain0", 2).await.unwrap();
    queue.shutdown().await;

    let fronts = control.fronts("chain0").await;
    assert!(fronts.iter().all(|f| f.status == FrontStatus::Running));
    let command = &control.remote.commands_on("10.0.0.2")[0];
    assert!(command.contains(common::IMAGE_V2));
}
