//! Integration tests for chain creation.

#![allow(clippy::unwrap_used)]

mod common;

use common::fixtures::{scenario_request, Snapshot};
use common::TestControl;

use chainwright_control::error::RetCode;
use chainwright_control::remote::RemoteCall;
use chainwright_control::{
    CatalogStore, ChainStatus, DeployError, EncryptionScheme, FrontStatus, GroupStatus,
    WorkflowOutcome,
};

#[tokio::test]
async fn scenario_topology_is_recorded() {
    let control = TestControl::new().await;

    let outcome = control
        .manager
        .deploy_chain(&scenario_request("chain0"))
        .await
        .unwrap();
    assert!(outcome.is_success());
    assert!(outcome.detail.contains("3 nodes on 2 hosts"));

    let snapshot = control.snapshot().await;
    assert_eq!(snapshot.chains, 1);
    assert_eq!(snapshot.agencies, 1);
    assert_eq!(snapshot.hosts, 2);
    assert_eq!(snapshot.fronts, 3);
    assert_eq!(snapshot.group(1), Some(3));
    assert_eq!(snapshot.group(2), Some(1));
    // One node row per (node, group) membership.
    assert_eq!(snapshot.nodes, 4);
    assert_eq!(snapshot.links, 4);

    let chain = control.chain("chain0").await.unwrap();
    assert_eq!(chain.status, ChainStatus::Initialized);
    assert_eq!(chain.encryption, EncryptionScheme::Ecdsa);
    assert_eq!(chain.version, common::IMAGE_V1);

    let fronts = control.fronts("chain0").await;
    assert!(fronts.iter().all(|f| f.status == FrontStatus::Initialized));
    assert!(fronts.iter().all(|f| f.image_tag == common::IMAGE_V1));
    let second = fronts
        .iter()
        .find(|f| f.ip == "10.0.0.1" && f.host_index == 1)
        .unwrap();
    assert_eq!(second.front_port, 5003);
    assert_eq!(second.p2p_port, 30301);
    assert_eq!(second.container_name, "optchains-chain0-node1");

    let mut tx = control.store.begin().await.unwrap();
    for group in tx.list_groups(chain.id).await.unwrap() {
        assert_eq!(group.status, GroupStatus::Maintaining);
    }
    drop(tx);

    // Creation never restarts anything.
    assert!(control.restarts.scopes().is_empty());
}

#[tokio::test]
async fn generated_tree_is_shipped_and_configured() {
    let control = TestControl::with_chain().await;

    let application =
        std::fs::read_to_string(control.node_dir("chain0", "10.0.0.1", 0).join("application.yml"))
            .unwrap();
    assert!(application.contains("port: 5002"));
    assert!(application.contains("keyServer: 10.0.0.9:5004"));
    assert!(application.contains("encryptType: 0"));

    let uploads: Vec<(String, String)> = control
        .remote
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            RemoteCall::Upload { ip, remote_dir, .. } => Some((ip, remote_dir)),
            _ => None,
        })
        .collect();
    for ip in ["10.0.0.1", "10.0.0.2"] {
        assert!(uploads
            .iter()
            .any(|(host, dir)| host == ip && dir == "/opt/chains/chain0"));
    }
}

#[tokio::test]
async fn unreadable_node_rolls_everything_back() {
    let control = TestControl::new().await;
    control.bootstrapper.corrupt_node("10.0.0.2", 0);

    let err = control
        .manager
        .deploy_chain(&scenario_request("chain0"))
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::DeployFailed(_)));
    assert!(matches!(err.root_cause(), DeployError::Artifact { .. }));
    assert_eq!(err.ret_code(), RetCode::DEPLOY_WITH_UNKNOWN_EXCEPTION);

    assert_eq!(control.snapshot().await, Snapshot::default());
    assert!(!control.chain_dir("chain0").exists());
    assert_eq!(control.bootstrapper.build_count(), 1);
}

#[tokio::test]
async fn bootstrap_failure_returns_tool_output() {
    let control = TestControl::new().await;
    control
        .bootstrapper
        .fail_build_with("build_chain.sh: unsupported ip");

    let err = control
        .manager
        .deploy_chain(&scenario_request("chain0"))
        .await
        .unwrap_err();

    match &err {
        DeployError::BootstrapFailed { output } => {
            assert_eq!(output, "build_chain.sh: unsupported ip");
        }
        other => panic!("expected BootstrapFailed, got {other:?}"),
    }
    let outcome = WorkflowOutcome::from_error(&err);
    assert_eq!(outcome.code, RetCode::EXEC_BUILD_CHAIN_ERROR);

    assert_eq!(control.snapshot().await, Snapshot::default());
    assert!(!control.chain_dir("chain0").exists());
}

#[tokio::test]
async fn duplicate_name_is_rejected_before_bootstrap() {
    let control = TestControl::with_chain().await;
    let before = control.snapshot().await;

    let err = control
        .manager
        .deploy_chain(&scenario_request("chain0"))
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::ChainExists(_)));
    assert_eq!(control.bootstrapper.build_count(), 1);
    assert_eq!(control.snapshot().await, before);
    // The first chain's tree is untouched.
    assert!(control.node_dir("chain0", "10.0.0.1", 0).exists());
}

#[tokio::test]
async fn unreachable_host_fails_before_bootstrap() {
    let control = TestControl::new().await;
    control.remote.mark_unreachable("10.0.0.2");

    let err = control
        .manager
        .deploy_chain(&scenario_request("chain0"))
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::HostUnreachable(ref ip) if ip == "10.0.0.2"));
    assert_eq!(control.bootstrapper.build_count(), 0);
    assert_eq!(control.snapshot().await, Snapshot::default());
}

#[tokio::test]
async fn host_under_two_agencies_is_rejected() {
    let control = TestControl::new().await;
    let mut request = scenario_request("chain0");
    request.lines = vec![
        "10.0.0.1:agencyA:1:{1}".to_owned(),
        "10.0.0.1:agencyB:1:{1}".to_owned(),
    ];

    let err = control.manager.deploy_chain(&request).await.unwrap_err();

    assert!(matches!(err, DeployError::HostAgencyConflict { .. }));
    assert_eq!(err.ret_code(), RetCode::HOST_ONLY_BELONGS_ONE_AGENCY);
}

#[tokio::test]
async fn blank_topology_is_empty() {
    let control = TestControl::new().await;
    let mut request = scenario_request("chain0");
    request.lines = vec![String::new(), "# hosts".to_owned(), "   ".to_owned()];

    let err = control.manager.deploy_chain(&request).await.unwrap_err();

    assert!(matches!(err, DeployError::EmptyTopology));
}

#[tokio::test]
async fn unresolvable_tags_are_rejected() {
    let control = TestControl::new().await;

    for tag_id in [9, 42] {
        let mut request = scenario_request("chain0");
        request.tag_id = tag_id;
        let err = control.manager.deploy_chain(&request).await.unwrap_err();
        assert!(matches!(err, DeployError::InvalidImageTag(id) if id == tag_id));
    }
    assert_eq!(control.bootstrapper.build_count(), 0);
}

#[tokio::test]
async fn blank_chain_name_is_rejected() {
    let control = TestControl::new().await;

    let err = control
        .manager
        .deploy_chain(&scenario_request("  "))
        .await
        .unwrap_err();

    assert!(matches!(err, DeployError::InvalidChainName(_)));
}

#[tokio::test]
async fn sm_image_selects_sm_keys() {
    let control = TestControl::new().await;
    let mut request = scenario_request("chain0");
    request.tag_id = 3;

    control.manager.deploy_chain(&request).await.unwrap();

    let chain = control.chain("chain0").await.unwrap();
    assert_eq!(chain.encryption, EncryptionScheme::Sm);
    let config =
        std::fs::read_to_string(control.node_dir("chain0", "10.0.0.1", 0).join("config.ini"))
            .unwrap();
    assert!(config.contains("sm_crypto=true"));
}

#[tokio::test]
async fn agency_names_match_case_insensitively() {
    let control = TestControl::new().await;
    let mut request = scenario_request("chain0");
    request.lines = vec![
        "10.0.0.1:agencyA:1:{1}".to_owned(),
        "10.0.0.2:AGENCYA:1:{1}".to_owned(),
    ];

    control.manager.deploy_chain(&request).await.unwrap();

    let snapshot = control.snapshot().await;
    assert_eq!(snapshot.agencies, 1);
    assert_eq!(snapshot.hosts, 2);
    assert_eq!(snapshot.group(1), Some(2));
}
