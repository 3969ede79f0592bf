//! AWS provider tables

use super::{owned, owned_patterns, BlockRule, Category, ProviderSpec, RegexRule};
use crate::ProviderKind;

const READ_ONLY_VERBS: &[&str] = &["describe-", "list-", "get-", "show-"];

const AUTH_PATTERNS: &[&str] = &[
    "Unable to locate credentials",
    "ExpiredToken",
    "AuthFailure",
    "The security token included in the request is invalid",
    "The config profile could not be found",
    "UnrecognizedClientException",
    "InvalidClientTokenId",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "credentials could not be refreshed",
    "NoCredentialProviders",
];

const CAUTION: &[&str] = &[
    "aws ec2 reboot-instances",
    "aws rds reboot-db-instance",
    "aws ssm send-command",
];

fn block_rules() -> Vec<BlockRule> {
    vec![
        BlockRule {
            category: Category::Identity,
            patterns: owned_patterns(&[
                "aws iam create-user",
                "aws iam create-access-key",
                "aws iam attach-user-policy",
                "aws iam attach-role-policy",
                "aws iam attach-group-policy",
                "aws iam put-user-policy",
                "aws iam put-role-policy",
                "aws iam put-group-policy",
                "aws iam create-policy",
                "aws iam create-login-profile",
                "aws iam update-assume-role-policy",
                "aws iam deactivate-mfa-device",
                "aws iam delete-",
            ]),
        },
        BlockRule {
            category: Category::Secrets,
            patterns: owned_patterns(&[
                "aws secretsmanager put-secret-value",
                "aws secretsmanager update-secret",
                "aws secretsmanager delete-secret",
                "aws kms schedule-key-deletion",
                "aws kms disable-key",
                "aws kms create-grant",
                "aws kms revoke-grant",
            ]),
        },
        BlockRule {
            category: Category::Logging,
            patterns: owned_patterns(&[
                "aws cloudtrail delete-trail",
                "aws cloudtrail stop-logging",
                "aws cloudtrail update-trail",
                "aws cloudtrail put-event-selectors",
                "aws cloudwatch delete-alarms",
                "aws cloudwatch disable-alarm-actions",
                "aws configservice delete-configuration-recorder",
                "aws configservice stop-configuration-recorder",
                "aws guardduty delete-detector",
                "aws guardduty update-detector",
            ]),
        },
        BlockRule {
            category: Category::Network,
            patterns: owned_patterns(&[
                "aws ec2 authorize-security-group-ingress",
                "aws ec2 authorize-security-group-egress",
                "aws ec2 delete-security-group",
                "aws ec2 modify-instance-attribute",
            ]),
        },
        BlockRule {
            category: Category::Project,
            patterns: owned_patterns(&[
                "aws organizations create-account",
                "aws organizations leave-organization",
                "aws organizations remove-account-from-organization",
                "aws organizations disable-policy-type",
                "aws organizations attach-policy",
            ]),
        },
        BlockRule {
            category: Category::Compute,
            patterns: owned_patterns(&[
                "aws ec2 terminate-instances",
                "aws ec2 delete-volume",
                "aws ec2 delete-snapshot",
                "aws ec2 deregister-image",
            ]),
        },
        BlockRule {
            category: Category::Storage,
            patterns: owned_patterns(&[
                "aws s3api delete-bucket",
                "aws s3api delete-bucket-policy",
                "aws s3api delete-bucket-encryption",
                "aws s3api put-bucket-acl",
                "aws s3 rb",
                "aws s3 rm",
            ]),
        },
        BlockRule {
            category: Category::Database,
            patterns: owned_patterns(&[
                "aws rds delete-db-instance",
                "aws rds delete-db-cluster",
                "aws rds delete-db-snapshot",
                "aws dynamodb delete-table",
            ]),
        },
    ]
}

const SAFE_PATTERNS: &[&str] = &[
    "aws iam get-",
    "aws iam list-",
    "aws iam generate-credential-report",
    "aws iam simulate-",
    "aws organizations describe-",
    "aws organizations list-",
    "aws sts get-caller-identity",
    "aws secretsmanager get-",
    "aws secretsmanager list-",
    "aws secretsmanager describe-",
    "aws kms describe-",
    "aws kms get-",
    "aws kms list-",
    "aws cloudtrail describe-",
    "aws cloudtrail get-",
    "aws cloudtrail list-",
    "aws cloudtrail lookup-events",
    "aws cloudwatch describe-",
    "aws cloudwatch get-",
    "aws cloudwatch list-",
    "aws configservice describe-",
    "aws configservice get-",
    "aws configservice list-",
    "aws guardduty describe-",
    "aws guardduty get-",
    "aws guardduty list-",
    "aws ec2 describe-",
    "aws ec2 get-",
    "aws s3 ls",
    "aws s3api get-",
    "aws s3api list-",
    "aws s3api head-",
];

fn regex_rules() -> Vec<RegexRule> {
    vec![
        RegexRule::new(
            r"aws .* --profile\s+(root|admin|administrator)\b",
            "Using sensitive profiles (root, admin) is restricted",
        ),
        RegexRule::new(
            r"aws .* --no-verify-ssl",
            "Disabling SSL verification is not allowed",
        ),
        RegexRule::new(
            r"aws .* --debug",
            "Debug mode is restricted as it may expose sensitive information",
        ),
        RegexRule::new(
            r"aws iam create-user.*--user-name\s+(root|admin|administrator|backup|security)",
            "Creating users with sensitive names is restricted",
        ),
        RegexRule::new(
            r"aws iam attach-user-policy.*--policy-arn\s+\S*(Administrator|FullAccess)",
            "Attaching administrator or full-access policies to users is restricted",
        ),
        RegexRule::new(
            r#"aws s3api put-bucket-policy.*"Principal":\s*"\*""#,
            "Creating public bucket policies is restricted",
        ),
        RegexRule::new(
            r#"aws s3api put-public-access-block.*"BlockPublicAcls":\s*false"#,
            "Disabling S3 public access blocks is restricted",
        ),
        RegexRule::new(
            r"aws cloudtrail update-trail.*--no-(include-global-service-events|multi-region)",
            "Weakening CloudTrail coverage is restricted",
        ),
    ]
}

const NL_PHRASES: &[(&str, &str)] = &[
    // Identity and account
    ("who am i", "aws sts get-caller-identity"),
    ("caller id", "aws sts get-caller-identity"),
    ("account information", "aws sts get-caller-identity"),
    ("account info", "aws sts get-caller-identity"),
    ("my identity", "aws sts get-caller-identity"),
    // IAM
    ("list users", "aws iam list-users"),
    ("show users", "aws iam list-users"),
    ("users", "aws iam list-users"),
    ("list roles", "aws iam list-roles"),
    ("show roles", "aws iam list-roles"),
    ("roles", "aws iam list-roles"),
    ("list groups", "aws iam list-groups"),
    ("show groups", "aws iam list-groups"),
    ("groups", "aws iam list-groups"),
    ("list access keys", "aws iam list-access-keys"),
    ("list policies", "aws iam list-policies"),
    // S3
    ("list buckets", "aws s3api list-buckets"),
    ("show buckets", "aws s3api list-buckets"),
    ("buckets", "aws s3api list-buckets"),
    ("list s3", "aws s3api list-buckets"),
    // EC2
    ("list instances", "aws ec2 describe-instances"),
    ("show instances", "aws ec2 describe-instances"),
    ("instances", "aws ec2 describe-instances"),
    ("list ec2", "aws ec2 describe-instances"),
    ("list vms", "aws ec2 describe-instances"),
    ("list vpcs", "aws ec2 describe-vpcs"),
    ("show vpcs", "aws ec2 describe-vpcs"),
    ("vpcs", "aws ec2 describe-vpcs"),
    ("list security groups", "aws ec2 describe-security-groups"),
    ("show security groups", "aws ec2 describe-security-groups"),
    ("security groups", "aws ec2 describe-security-groups"),
    ("list volumes", "aws ec2 describe-volumes"),
    ("list snapshots", "aws ec2 describe-snapshots"),
    // Secrets and keys
    ("list secrets", "aws secretsmanager list-secrets"),
    ("show secrets", "aws secretsmanager list-secrets"),
    ("list kms keys", "aws kms list-keys"),
    ("list keys", "aws kms list-keys"),
    // Logging
    ("list trails", "aws cloudtrail describe-trails"),
    ("show trails", "aws cloudtrail describe-trails"),
    ("list alarms", "aws cloudwatch describe-alarms"),
    // Lambda and containers
    ("list functions", "aws lambda list-functions"),
    ("show functions", "aws lambda list-functions"),
    ("functions", "aws lambda list-functions"),
    ("list lambda", "aws lambda list-functions"),
    ("list clusters", "aws eks list-clusters"),
    ("list kubernetes clusters", "aws eks list-clusters"),
    // RDS
    ("list databases", "aws rds describe-db-instances"),
    ("show databases", "aws rds describe-db-instances"),
    ("databases", "aws rds describe-db-instances"),
    ("list rds", "aws rds describe-db-instances"),
];

pub fn spec() -> ProviderSpec {
    ProviderSpec {
        kind: ProviderKind::Aws,
        binaries: &["aws"],
        read_only_verbs: READ_ONLY_VERBS,
        block_rules: block_rules(),
        safe_patterns: owned_patterns(SAFE_PATTERNS),
        caution_patterns: CAUTION,
        regex_rules: regex_rules(),
        nl_phrases: owned(NL_PHRASES),
        auth_patterns: AUTH_PATTERNS,
        login_hint: "aws configure",
    }
}
