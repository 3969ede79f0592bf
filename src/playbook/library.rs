//! Built-in remediation playbooks
//!
//! Ready playbooks for common findings across AWS, GCP and Azure.
//! Where an action is reversible, the compensating command travels in
//! the `rollback` params and becomes the rollback token on success.

use std::time::Duration;

use serde_json::json;

use super::{Action, ActionKind, Playbook, Severity};

fn aws_public_s3() -> Playbook {
    Playbook::builder("AWS-PUBLIC-S3", "Fix Public S3 Bucket")
        .description("Automatically restricts public access to an S3 bucket")
        .category("Storage")
        .severity(Severity::Critical)
        .rollback_enabled(true)
        .action(
            Action::new(
                "block_public_access",
                ActionKind::Aws,
                json!({
                    "service": "s3api",
                    "action": "put-public-access-block",
                    "args": [
                        "--public-access-block-configuration",
                        "BlockPublicAcls=true,IgnorePublicAcls=true,BlockPublicPolicy=true,RestrictPublicBuckets=true"
                    ],
                    "rollback": {
                        "service": "s3api",
                        "action": "delete-public-access-block"
                    }
                }),
            )
            .with_rollback("delete-public-access-block"),
        )
        .action(Action::new(
            "notify_security_team",
            ActionKind::Notification,
            json!({
                "type": "slack",
                "channel": "#security-alerts",
                "message": "S3 bucket public access blocked"
            }),
        ))
        .build()
        .expect("built-in playbook")
}

fn aws_ebs_encryption() -> Playbook {
    Playbook::builder("AWS-EBS-ENCRYPTION", "Enable EBS Encryption")
        .description("Enables encryption by default for new EBS volumes")
        .category("Compute")
        .severity(Severity::High)
        .prerequisite("volume_has_no_snapshots")
        .action(Action::new(
            "enable_ebs_encryption_by_default",
            ActionKind::Aws,
            json!({"service": "ec2", "action": "enable-ebs-encryption-by-default"}),
        ))
        .build()
        .expect("built-in playbook")
}

fn aws_open_security_group() -> Playbook {
    Playbook::builder("AWS-SG-RESTRICTION", "Restrict Security Group")
        .description("Removes overly permissive ingress rules")
        .category("Network")
        .severity(Severity::High)
        .rollback_enabled(true)
        .action(
            Action::new(
                "remove_world_open_rules",
                ActionKind::Aws,
                json!({
                    "service": "ec2",
                    "action": "revoke-security-group-ingress",
                    "args": ["--cidr", "0.0.0.0/0"],
                    "rollback": {
                        "service": "ec2",
                        "action": "authorize-security-group-ingress",
                        "args": ["--cidr", "0.0.0.0/0"]
                    }
                }),
            )
            .with_rollback("authorize-security-group-ingress"),
        )
        .build()
        .expect("built-in playbook")
}

fn gcp_public_bucket() -> Playbook {
    Playbook::builder("GCP-PUBLIC-BUCKET", "Restrict GCS Bucket Access")
        .description("Removes public access from GCS buckets")
        .category("Storage")
        .severity(Severity::Critical)
        .action(Action::new(
            "enforce_public_access_prevention",
            ActionKind::Gcp,
            json!({
                "service": "storage buckets",
                "action": "update",
                "args": ["--public-access-prevention"]
            }),
        ))
        .build()
        .expect("built-in playbook")
}

fn gcp_firewall_restriction() -> Playbook {
    Playbook::builder("GCP-FW-RESTRICTION", "Restrict Firewall Rule")
        .description("Removes overly permissive firewall rules")
        .category("Network")
        .severity(Severity::High)
        .action(Action::new(
            "delete_permissive_rule",
            ActionKind::Gcp,
            json!({"service": "compute firewall-rules", "action": "delete"}),
        ))
        .build()
        .expect("built-in playbook")
}

fn azure_public_blob() -> Playbook {
    Playbook::builder("AZURE-BLOB-PUBLIC", "Restrict Blob Storage Access")
        .description("Changes public blob containers to private")
        .category("Storage")
        .severity(Severity::Critical)
        .action(Action::new(
            "set_container_to_private",
            ActionKind::Azure,
            json!({
                "service": "storage container",
                "action": "set-permission",
                "args": ["--public-access", "off"]
            }),
        ))
        .build()
        .expect("built-in playbook")
}

fn azure_nsg_restriction() -> Playbook {
    Playbook::builder("AZURE-NSG-RESTRICTION", "Restrict Network Security Group")
        .description("Removes overly permissive NSG rules")
        .category("Network")
        .severity(Severity::High)
        .rollback_enabled(true)
        .action(Action::new(
            "remove_open_rules",
            ActionKind::Azure,
            json!({"service": "network nsg rule", "action": "delete"}),
        ))
        .build()
        .expect("built-in playbook")
}

fn enable_logging() -> Playbook {
    Playbook::builder("ENABLE-LOGGING", "Enable Resource Logging")
        .description("Enables CloudTrail and bucket access logging")
        .category("Compliance")
        .severity(Severity::Medium)
        .action(Action::new(
            "enable_cloudtrail",
            ActionKind::Aws,
            json!({"service": "cloudtrail", "action": "start-logging"}),
        ))
        .action(Action::new(
            "enable_s3_logging",
            ActionKind::Aws,
            json!({"service": "s3api", "action": "put-bucket-logging"}),
        ))
        .build()
        .expect("built-in playbook")
}

fn enable_mfa() -> Playbook {
    Playbook::builder("ENABLE-MFA", "Enable MFA on Privileged Account")
        .description("Notifies the account owner that MFA is required")
        .category("IAM")
        .severity(Severity::Critical)
        .requires_approval(false)
        .action(Action::new(
            "send_mfa_requirement_notification",
            ActionKind::Notification,
            json!({
                "type": "email",
                "subject": "Required: Enable MFA on Your Account",
                "message": "Your account was flagged as privileged without MFA"
            }),
        ))
        .build()
        .expect("built-in playbook")
}

fn rotate_credentials() -> Playbook {
    Playbook::builder("ROTATE-CREDENTIALS", "Rotate Exposed Credentials")
        .description("Deactivates the exposed access key and issues a replacement")
        .category("IAM")
        .severity(Severity::Critical)
        .rollback_enabled(true)
        .action(
            Action::new(
                "deactivate_access_key",
                ActionKind::Aws,
                json!({
                    "service": "iam",
                    "action": "update-access-key",
                    "args": ["--status", "Inactive"],
                    "rollback": {
                        "service": "iam",
                        "action": "update-access-key",
                        "args": ["--status", "Active"]
                    }
                }),
            )
            .with_rollback("reactivate-access-key"),
        )
        .action(Action::new(
            "create_new_access_key",
            ActionKind::Aws,
            json!({"service": "iam", "action": "create-access-key"}),
        ))
        .build()
        .expect("built-in playbook")
}

/// Every built-in playbook, in a stable order.
pub fn all() -> Vec<Playbook> {
    vec![
        aws_public_s3(),
        aws_ebs_encryption(),
        aws_open_security_group(),
        gcp_public_bucket(),
        gcp_firewall_restriction(),
        azure_public_blob(),
        azure_nsg_restriction(),
        enable_logging(),
        enable_mfa(),
        rotate_credentials(),
    ]
}

pub fn get(id: &str) -> Option<Playbook> {
    all().into_iter().find(|p| p.id == id)
}

pub fn by_category(category: &str) -> Vec<Playbook> {
    all()
        .into_iter()
        .filter(|p| p.category.eq_ignore_ascii_case(category))
        .collect()
}

/// Playbooks at or above the given severity.
pub fn at_or_above(severity: Severity) -> Vec<Playbook> {
    all().into_iter().filter(|p| p.severity >= severity).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_is_complete_and_well_formed() {
        let playbooks = all();
        assert_eq!(playbooks.len(), 10);
        for playbook in &playbooks {
            assert!(!playbook.actions.is_empty(), "{} has no actions", playbook.id);
            assert!(playbook.timeout >= Duration::from_secs(1));
        }
    }

    #[test]
    fn lookup_by_id() {
        let playbook = get("AWS-PUBLIC-S3").unwrap();
        assert_eq!(playbook.name, "Fix Public S3 Bucket");
        assert!(playbook.requires_approval);
        assert!(playbook.rollback_enabled);
        assert!(get("NOPE").is_none());
    }

    #[test]
    fn category_and_severity_queries() {
        let storage = by_category("storage");
        assert!(storage.iter().any(|p| p.id == "AWS-PUBLIC-S3"));
        assert!(storage.iter().any(|p| p.id == "AZURE-BLOB-PUBLIC"));

        let critical = at_or_above(Severity::Critical);
        assert!(critical.iter().all(|p| p.severity == Severity::Critical));
        assert!(critical.iter().any(|p| p.id == "ROTATE-CREDENTIALS"));

        let high_up = at_or_above(Severity::High);
        assert!(high_up.len() > critical.len());
    }

    #[test]
    fn reversible_actions_carry_rollback_params() {
        let playbook = get("AWS-SG-RESTRICTION").unwrap();
        let action = &playbook.actions[0];
        assert!(action.rollback_ref.is_some());
        assert!(!action.params["rollback"].is_null());
    }
}
