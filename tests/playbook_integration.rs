//! End-to-end remediation scenarios: approval gates, dry-run, real
//! mutation and rollback through a gateway-backed handler.

mod common;

use std::sync::Arc;

use serde_json::json;

use cloudgate::gateway::{ProviderContext, ProviderGateway};
use cloudgate::playbook::executor::PlaybookExecutor;
use cloudgate::playbook::{
    Action, ActionKind, ActionStatus, Playbook, PlaybookError, PlaybookStatus, Severity,
};
use cloudgate::{CoreConfig, Finding, ProviderKind};

/// The FIX-S3-PUBLIC shape: one AWS mutation plus a notification,
/// approval-gated and reversible. `marker` tags mock invocations so
/// assertions stay independent of test ordering.
fn fix_s3_public(marker: &str) -> Playbook {
    Playbook::builder("FIX-S3-PUBLIC", "Fix Public S3 Bucket")
        .category("Storage")
        .severity(Severity::Critical)
        .requires_approval(true)
        .rollback_enabled(true)
        .action(
            Action::new(
                "block_public_access",
                ActionKind::Aws,
                json!({
                    "service": "s3api",
                    "action": "put-public-access-block",
                    "args": ["--marker", marker],
                    "rollback": {
                        "service": "s3api",
                        "action": "delete-public-access-block",
                        "args": ["--marker", marker]
                    }
                }),
            )
            .with_rollback("delete-public-access-block"),
        )
        .action(Action::new(
            "notify_team",
            ActionKind::Notification,
            json!({"channel": "#security-alerts", "message": "public access blocked"}),
        ))
        .build()
        .unwrap()
}

fn finding() -> Finding {
    Finding {
        id: "finding-s3-public".to_string(),
        category: "Storage".to_string(),
        severity: "CRITICAL".to_string(),
        resource: Some("bucket/leaky".to_string()),
        remediation_hint: None,
    }
}

fn executor_with_aws_gateway() -> PlaybookExecutor {
    common::fixture();
    let config = CoreConfig::default();
    let executor = PlaybookExecutor::new(config.clone());
    let gateway = ProviderGateway::new(ProviderKind::Aws, config).unwrap();
    gateway.start(ProviderContext::default()).unwrap();
    executor.register_gateway(Arc::new(gateway));
    executor
}

#[tokio::test]
async fn approval_plus_dry_run_spawns_no_children() {
    let executor = executor_with_aws_gateway();
    let playbook = fix_s3_public("dry-run-case");

    let pending = executor
        .execute(&playbook, &finding(), "alice", true)
        .await
        .unwrap();
    assert_eq!(pending.status, PlaybookStatus::AwaitingApproval);
    assert!(!common::mock_log().contains("dry-run-case"));

    let approved = executor
        .approve(&pending.execution_id, "bob", true)
        .await
        .unwrap();
    assert_eq!(approved.status, PlaybookStatus::Completed);
    assert_eq!(approved.action_results.len(), 2);
    for result in &approved.action_results {
        assert!(
            result.message.starts_with("[DRY-RUN]"),
            "not a dry-run message: {}",
            result.message
        );
    }
    // Still nothing spawned for this playbook.
    assert!(!common::mock_log().contains("dry-run-case"));
}

#[tokio::test]
async fn real_run_mutates_then_rolls_back_in_reverse() {
    let executor = executor_with_aws_gateway();
    let playbook = fix_s3_public("wet-run-case");

    let pending = executor
        .execute(&playbook, &finding(), "alice", false)
        .await
        .unwrap();
    let done = executor
        .approve(&pending.execution_id, "bob", false)
        .await
        .unwrap();
    assert_eq!(done.status, PlaybookStatus::Completed, "{done:?}");
    assert_eq!(done.action_results[0].status, ActionStatus::Completed);
    assert!(done.action_results[0].rollback_token.is_some());

    let log = common::mock_log();
    assert!(log.contains("s3api put-public-access-block --marker wet-run-case"));

    let rolled = executor.rollback(&done.execution_id).await.unwrap();
    assert_eq!(rolled.status, PlaybookStatus::RolledBack);
    assert!(!rolled.rollback_dirty);
    assert_eq!(rolled.action_results[0].status, ActionStatus::RolledBack);

    let log = common::mock_log();
    assert!(log.contains("s3api delete-public-access-block --marker wet-run-case"));

    // Completed -> RolledBack happens exactly once.
    let err = executor.rollback(&done.execution_id).await.unwrap_err();
    assert!(matches!(
        err,
        PlaybookError::State {
            operation: "rollback",
            ..
        }
    ));
}

#[tokio::test]
async fn gateway_denial_fails_the_playbook() {
    let executor = executor_with_aws_gateway();

    // The composed command lands in the identity block-list, so the
    // gateway refuses it and the playbook fails without a spawn.
    let playbook = Playbook::builder("BAD-REMEDIATION", "Blocked remediation")
        .requires_approval(false)
        .action(Action::new(
            "create_backdoor",
            ActionKind::Aws,
            json!({"service": "iam", "action": "create-user", "args": ["--marker", "denied-case"]}),
        ))
        .build()
        .unwrap();

    let done = executor
        .execute(&playbook, &finding(), "mallory", false)
        .await
        .unwrap();
    assert_eq!(done.status, PlaybookStatus::Failed);
    assert_eq!(done.action_results[0].status, ActionStatus::Failed);
    assert!(!common::mock_log().contains("denied-case"));
}

#[tokio::test]
async fn rejection_is_terminal() {
    let executor = executor_with_aws_gateway();
    let playbook = fix_s3_public("rejected-case");

    let pending = executor
        .execute(&playbook, &finding(), "alice", false)
        .await
        .unwrap();
    let rejected = executor
        .reject(&pending.execution_id, "carol", "not during the freeze")
        .unwrap();
    assert_eq!(rejected.status, PlaybookStatus::Rejected);
    assert_eq!(
        rejected.rejection_reason.as_deref(),
        Some("not during the freeze")
    );

    let err = executor
        .approve(&pending.execution_id, "bob", false)
        .await
        .unwrap_err();
    assert!(matches!(err, PlaybookError::State { .. }));
    assert!(!common::mock_log().contains("rejected-case"));
}
