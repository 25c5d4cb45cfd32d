//! Integration tests for node deletion.

#![allow(clippy::unwrap_used)]

mod common;

use std::collections::BTreeSet;

use common::fixtures::AddNodes;
use common::TestControl;

use chainwright_control::error::RetCode;
use chainwright_control::remote::RemoteCall;
use chainwright_control::{DeployError, GroupId, NodeId, RestartScope};

#[tokio::test]
async fn running_node_is_refused() {
    let control = TestControl::with_chain().await;
    let node = control.node_at("chain0", "10.0.0.1", 0).await;
    control.manager.start_node(&node).await.unwrap();
    let before = control.snapshot().await;

    let err = control
        .manager
        .delete_node(&node, true, true)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::NodeStillRunning(_)));
    assert_eq!(err.ret_code(), RetCode::NODE_RUNNING);
    assert_eq!(control.snapshot().await, before);
    assert!(control.node_dir("chain0", "10.0.0.1", 0).exists());
    assert!(control.restarts.scopes().is_empty());
}

#[tokio::test]
async fn shared_host_and_agency_survive() {
    let control = TestControl::with_chain().await;
    let chain = control.chain("chain0").await.unwrap();
    let node = control.node_at("chain0", "10.0.0.1", 1).await;

    let outcome = control
        .manager
        .delete_node(&node, true, true)
        .await
        .unwrap();
    assert!(outcome.is_success());

    let snapshot = control.snapshot().await;
    assert_eq!(snapshot.fronts, 2);
    assert_eq!(snapshot.hosts, 2);
    assert_eq!(snapshot.agencies, 1);
    assert_eq!(snapshot.group(1), Some(2));
    assert!(control.front(&node).await.is_none());

    assert_eq!(
        control.restarts.scopes(),
        vec![RestartScope::Groups(
            chain.id,
            BTreeSet::from([GroupId::new(1)])
        )]
    );
}

#[tokio::test]
async fn deleted_node_leaves_every_peer_list() {
    let control = TestControl::with_chain().await;
    let node = control.node_at("chain0", "10.0.0.1", 1).await;

    control
        .manager
        .delete_node(&node, false, false)
        .await
        .unwrap();

    for (ip, index) in [("10.0.0.1", 0), ("10.0.0.2", 0)] {
        let config =
            std::fs::read_to_string(control.node_dir("chain0", ip, index).join("config.ini"))
                .unwrap();
        assert!(!config.contains("10.0.0.1:30301"), "{ip}/node{index}");
        assert!(config.contains("10.0.0.1:30300"), "{ip}/node{index}");
    }
}

#[tokio::test]
async fn node_directory_is_quarantined_locally_and_remotely() {
    let control = TestControl::with_chain().await;
    let node = control.node_at("chain0", "10.0.0.1", 1).await;

    control
        .manager
        .delete_node(&node, false, false)
        .await
        .unwrap();

    assert!(!control.node_dir("chain0", "10.0.0.1", 1).exists());
    let quarantined: Vec<_> =
        std::fs::read_dir(control.config.paths.quarantine_root.join("chain0/10.0.0.1"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
    assert_eq!(quarantined.len(), 1);
    assert!(quarantined[0].starts_with("node1_"));
    assert!(quarantined[0].contains(node.as_str()));

    let moved = control.remote.calls().into_iter().find_map(|c| match c {
        RemoteCall::MoveDir { ip, src, dst } if ip == "10.0.0.1" => Some((src, dst)),
        _ => None,
    });
    let (src, dst) = moved.unwrap();
    assert_eq!(src, "/opt/chains/chain0/node1");
    assert!(dst.starts_with("/opt/chains/deleted-tmp/chain0/10.0.0.1_node1_"));
}

#[tokio::test]
async fn last_node_takes_host_and_agency_with_it() {
    let control = TestControl::with_chain().await;
    control
        .manager
        .deploy_nodes(&AddNodes::new(1, "10.0.0.3", 1).agency("agencyB").build())
        .await
        .unwrap();
    let node = control.node_at("chain0", "10.0.0.3", 0).await;

    control
        .manager
        .delete_node(&node, true, true)
        .await
        .unwrap();

    let snapshot = control.snapshot().await;
    assert_eq!(snapshot.hosts, 2);
    assert_eq!(snapshot.agencies, 1);
    assert_eq!(snapshot.fronts, 3);
    assert_eq!(snapshot.group(1), Some(3));
}

#[tokio::test]
async fn empty_host_is_kept_unless_asked() {
    let control = TestControl::with_chain().await;
    control
        .manager
        .deploy_nodes(&AddNodes::new(1, "10.0.0.3", 1).agency("agencyB").build())
        .await
        .unwrap();
    let node = control.node_at("chain0", "10.0.0.3", 0).await;

    control
        .manager
        .delete_node(&node, false, true)
        .await
        .unwrap();

    let snapshot = control.snapshot().await;
    assert_eq!(snapshot.hosts, 3);
    // The agency still owns the empty host.
    assert_eq!(snapshot.agencies, 2);
}

#[tokio::test]
async fn multi_group_node_restarts_every_group() {
    let control = TestControl::with_chain().await;
    let chain = control.chain("chain0").await.unwrap();
    let node = control.node_at("chain0", "10.0.0.2", 0).await;

    control
        .manager
        .delete_node(&node, false, false)
        .await
        .unwrap();

    let snapshot = control.snapshot().await;
    assert_eq!(snapshot.group(1), Some(2));
    assert_eq!(snapshot.group(2), Some(0));
    assert_eq!(
        control.restarts.scopes(),
        vec![RestartScope::Groups(
            chain.id,
            BTreeSet::from([GroupId::new(1), GroupId::new(2)])
        )]
    );
}

#[tokio::test]
async fn unknown_node_is_not_found() {
    let control = TestControl::with_chain().await;

    let err = control
        .manager
        .delete_node(&NodeId::new("ffff"), false, false)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::NodeNotFound(_)));
    assert_eq!(err.ret_code(), RetCode::NODE_ID_NOT_EXISTS);
}

#[tokio::test]
async fn failed_peer_update_keeps_node() {
    let control = TestControl::with_chain().await;
    let node = control.node_at("chain0", "10.0.0.1", 1).await;
    control.remote.mark_failing("10.0.0.2");
    let before = control.snapshot().await;

    let err = control
        .manager
        .delete_node(&node, false, false)
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::ConfigUpdateFailed(_)));
    assert_eq!(err.ret_code(), RetCode::UPDATE_RELATED_NODE_ERROR);
    assert_eq!(control.snapshot().await, before);
    assert!(control.node_dir("chain0", "10.0.0.1", 1).exists());
}
