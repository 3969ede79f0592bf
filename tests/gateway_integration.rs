//! End-to-end gateway scenarios against mock provider binaries.

mod common;

use std::time::Duration;

use cloudgate::gateway::{ProviderContext, ProviderGateway};
use cloudgate::{CoreConfig, ErrorKind, ExecStatus, ProviderKind, SecurityMode};

fn started_gateway(kind: ProviderKind, config: CoreConfig) -> ProviderGateway {
    common::fixture();
    let gateway = ProviderGateway::new(kind, config).unwrap();
    gateway.start(ProviderContext {
        name: "test".to_string(),
        profile: Some("audit".to_string()),
        region: Some("eu-west-1".to_string()),
        subscription_id: Some("sub-123".to_string()),
        tenant_id: None,
        project_id: None,
    })
    .unwrap();
    gateway
}

#[tokio::test]
async fn natural_language_resolves_validates_and_runs() {
    // "list my vms" -> az vm list -> Safe -> spawn -> JSON output.
    let gateway = started_gateway(ProviderKind::Azure, CoreConfig::default());
    let result = gateway.execute_command("list my vms").await;

    assert_eq!(result.status, ExecStatus::Success, "{}", result.output);
    assert_eq!(result.exit_code, Some(0));
    let structured = result.structured.expect("structured output");
    assert_eq!(structured[0]["name"], "x");
}

#[tokio::test]
async fn strict_mode_blocks_without_spawning() {
    let gateway = started_gateway(ProviderKind::Aws, CoreConfig::default());
    let result = gateway
        .execute_command("aws iam create-user --user-name evil")
        .await;

    assert_eq!(result.status, ExecStatus::Error);
    assert_eq!(result.error_kind, ErrorKind::ValidationError);
    assert_eq!(
        result.output,
        "identity-mutating command blocked in strict mode (category=identity)"
    );
    assert!(!common::mock_log().contains("create-user"));
}

#[tokio::test]
async fn pipeline_runs_three_wired_stages() {
    let gateway = started_gateway(ProviderKind::Gcp, CoreConfig::default());
    let result = gateway
        .execute_command("gcloud compute instances list | grep RUNNING | wc -l")
        .await;

    assert_eq!(result.status, ExecStatus::Success, "{}", result.output);
    assert_eq!(result.output.trim(), "2");
}

#[tokio::test]
async fn timeout_terminates_the_child() {
    let config = CoreConfig {
        max_wall_clock: Duration::from_secs(1),
        ..CoreConfig::default()
    };
    let gateway = started_gateway(ProviderKind::Aws, config);

    let start = std::time::Instant::now();
    let result = gateway.execute_command("aws ec2 describe-instances").await;
    let wall = start.elapsed();

    assert_eq!(result.status, ExecStatus::Error);
    assert_eq!(result.error_kind, ErrorKind::Timeout);
    assert!(result.output.contains("timed out"));
    assert!(result.elapsed >= Duration::from_millis(900));
    // Deadline plus grace, nowhere near the mock's 5s sleep.
    assert!(wall < Duration::from_secs(3), "took {wall:?}");
}

#[tokio::test]
async fn auth_errors_carry_the_login_hint() {
    let gateway = started_gateway(ProviderKind::Aws, CoreConfig::default());
    let result = gateway.execute_command("aws iam list-users").await;

    assert_eq!(result.status, ExecStatus::Error);
    assert_eq!(result.error_kind, ErrorKind::AuthError);
    assert!(result.output.contains("aws configure"));
}

#[tokio::test]
async fn context_profile_reaches_the_child() {
    let gateway = started_gateway(ProviderKind::Aws, CoreConfig::default());
    let result = gateway.execute_command("aws sts get-caller-identity").await;

    assert_eq!(result.status, ExecStatus::Success, "{}", result.output);
    let structured = result.structured.expect("structured output");
    assert_eq!(structured["Profile"], "audit");
}

#[tokio::test]
async fn permissive_mode_warns_instead_of_denying() {
    let config = CoreConfig {
        mode: SecurityMode::Permissive,
        ..CoreConfig::default()
    };
    let gateway = started_gateway(ProviderKind::Azure, config);

    // Block-listed under strict; permissive lets it reach the mock,
    // which rejects it, and the policy warning survives on the result.
    let result = gateway
        .execute_command("az keyvault purge --name kv")
        .await;

    assert_ne!(result.error_kind, ErrorKind::ValidationError);
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("permissive mode")));
}

#[tokio::test]
async fn subscription_is_injected_for_azure() {
    let gateway = started_gateway(ProviderKind::Azure, CoreConfig::default());
    let result = gateway.execute_command("az account show").await;

    assert_eq!(result.status, ExecStatus::Success, "{}", result.output);
    let structured = result.structured.expect("structured output");
    assert_eq!(structured["id"], "sub-123");
}
