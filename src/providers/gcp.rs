//! GCP provider tables (gcloud and gsutil)

use super::{owned, owned_patterns, BlockRule, Category, ProviderSpec, RegexRule};
use crate::ProviderKind;

const READ_ONLY_VERBS: &[&str] = &["list", "describe", "get", "export"];

const AUTH_PATTERNS: &[&str] = &[
    "gcloud auth login",
    "DefaultCredentialsError",
    "Reauthentication required",
    "not logged in",
    "could not find default credentials",
    "Your current active account",
    "does not have any valid credentials",
    "invalid_grant",
    "Token has been expired or revoked",
];

const CAUTION: &[&str] = &[
    "gcloud compute instances update",
    "gcloud sql instances update",
    "gcloud compute networks update",
];

fn block_rules() -> Vec<BlockRule> {
    vec![
        BlockRule {
            category: Category::Identity,
            patterns: owned_patterns(&[
                "gcloud iam service-accounts create",
                "gcloud iam service-accounts delete",
                "gcloud iam roles create",
                "gcloud iam roles update",
                "gcloud iam roles delete",
                "gcloud iam service-accounts keys create",
                "gcloud iam service-accounts keys delete",
                "gcloud projects add-iam-policy-binding",
                "gcloud projects remove-iam-policy-binding",
                "gcloud projects set-iam-policy",
                "gcloud auth revoke",
            ]),
        },
        BlockRule {
            category: Category::Secrets,
            patterns: owned_patterns(&[
                "gcloud secrets create",
                "gcloud secrets delete",
                "gcloud secrets update",
                "gcloud secrets versions destroy",
            ]),
        },
        BlockRule {
            category: Category::Logging,
            patterns: owned_patterns(&[
                "gcloud logging sinks delete",
                "gcloud logging sinks update",
                "gcloud logging buckets delete",
            ]),
        },
        BlockRule {
            category: Category::Network,
            patterns: owned_patterns(&[
                "gcloud compute firewall-rules create",
                "gcloud compute firewall-rules delete",
                "gcloud compute firewall-rules update",
                "gcloud compute networks delete",
            ]),
        },
        BlockRule {
            category: Category::Project,
            patterns: owned_patterns(&[
                "gcloud projects create",
                "gcloud projects delete",
                "gcloud projects move",
                "gcloud projects update",
            ]),
        },
        BlockRule {
            category: Category::Compute,
            patterns: owned_patterns(&[
                "gcloud compute instances delete",
                "gcloud compute disks delete",
                "gcloud compute images delete",
                "gcloud compute snapshots delete",
            ]),
        },
        BlockRule {
            category: Category::Storage,
            patterns: owned_patterns(&[
                "gsutil rm -r",
                "gsutil rb",
                "gsutil iam set",
                "gsutil acl set",
                "gcloud storage buckets delete",
                "gcloud storage rm",
            ]),
        },
        BlockRule {
            category: Category::Database,
            patterns: owned_patterns(&[
                "gcloud sql instances delete",
                "gcloud sql databases delete",
                "gcloud sql backups delete",
            ]),
        },
    ]
}

const SAFE_PATTERNS: &[&str] = &[
    "gcloud iam service-accounts list",
    "gcloud iam service-accounts describe",
    "gcloud iam roles list",
    "gcloud iam roles describe",
    "gcloud projects list",
    "gcloud projects describe",
    "gcloud projects get-iam-policy",
    "gcloud secrets list",
    "gcloud secrets describe",
    "gcloud logging sinks list",
    "gcloud logging sinks describe",
    "gcloud compute firewall-rules list",
    "gcloud compute firewall-rules describe",
    "gcloud compute networks list",
    "gcloud compute instances list",
    "gcloud compute instances describe",
    "gcloud sql instances list",
    "gcloud sql instances describe",
    "gcloud storage buckets list",
    "gcloud storage ls",
    "gsutil ls",
    "gsutil stat",
    "gsutil iam get",
    "gsutil acl get",
];

fn regex_rules() -> Vec<RegexRule> {
    vec![
        RegexRule::new(
            r"gcloud .* --verbosity[= ]debug",
            "Debug verbosity is restricted as it may expose sensitive information",
        ),
        RegexRule::new(
            r"gcloud projects add-iam-policy-binding.*--role[= ]\S*(owner|editor)",
            "Granting primitive owner/editor roles is restricted",
        ),
        RegexRule::new(
            r"gcloud compute firewall-rules (create|update).*--source-ranges[= ]\S*0\.0\.0\.0/0",
            "Opening firewall rules to the entire internet is restricted",
        ),
        RegexRule::new(
            r"gsutil iam ch.*all(Users|AuthenticatedUsers)",
            "Granting bucket access to allUsers is restricted",
        ),
        RegexRule::new(
            r"gcloud iam service-accounts keys create.*--key-file-type[= ]p12",
            "Legacy P12 service-account keys are restricted",
        ),
    ]
}

const NL_PHRASES: &[(&str, &str)] = &[
    // General
    ("who am i", "gcloud auth list"),
    ("current account", "gcloud config get-value account"),
    ("current project", "gcloud config get-value project"),
    ("show my account", "gcloud auth list"),
    ("show my project", "gcloud config get-value project"),
    ("get current project", "gcloud config get-value project"),
    // Projects and accounts
    ("list projects", "gcloud projects list"),
    ("show projects", "gcloud projects list"),
    ("projects", "gcloud projects list"),
    ("list accounts", "gcloud auth list"),
    ("accounts", "gcloud auth list"),
    // IAM
    ("list iam policies", "gcloud projects get-iam-policy"),
    ("show iam policies", "gcloud projects get-iam-policy"),
    ("list roles", "gcloud iam roles list"),
    ("show roles", "gcloud iam roles list"),
    ("roles", "gcloud iam roles list"),
    ("list service accounts", "gcloud iam service-accounts list"),
    ("service accounts", "gcloud iam service-accounts list"),
    ("list members", "gcloud projects get-iam-policy"),
    // Compute
    ("list instances", "gcloud compute instances list"),
    ("show instances", "gcloud compute instances list"),
    ("instances", "gcloud compute instances list"),
    ("list vms", "gcloud compute instances list"),
    ("show vms", "gcloud compute instances list"),
    ("vms", "gcloud compute instances list"),
    ("list images", "gcloud compute images list"),
    ("images", "gcloud compute images list"),
    ("list disks", "gcloud compute disks list"),
    // Storage
    ("list buckets", "gsutil ls"),
    ("show buckets", "gsutil ls"),
    ("buckets", "gsutil ls"),
    ("list storage", "gsutil ls"),
    // SQL
    ("list sql instances", "gcloud sql instances list"),
    ("sql instances", "gcloud sql instances list"),
    ("list databases", "gcloud sql databases list"),
    ("show databases", "gcloud sql databases list"),
    ("databases", "gcloud sql databases list"),
    // Networking
    ("list networks", "gcloud compute networks list"),
    ("networks", "gcloud compute networks list"),
    ("list vpcs", "gcloud compute networks list"),
    ("vpcs", "gcloud compute networks list"),
    ("list firewalls", "gcloud compute firewall-rules list"),
    ("firewall rules", "gcloud compute firewall-rules list"),
    ("list routes", "gcloud compute routes list"),
    ("routes", "gcloud compute routes list"),
    // Kubernetes
    ("list clusters", "gcloud container clusters list"),
    ("list gke clusters", "gcloud container clusters list"),
    ("list kubernetes clusters", "gcloud container clusters list"),
    ("clusters", "gcloud container clusters list"),
    // Functions and services
    ("list functions", "gcloud functions list"),
    ("functions", "gcloud functions list"),
    ("list cloud functions", "gcloud functions list"),
    ("list services", "gcloud services list"),
    ("services", "gcloud services list"),
    // Secrets
    ("list secrets", "gcloud secrets list"),
    ("secrets", "gcloud secrets list"),
];

pub fn spec() -> ProviderSpec {
    ProviderSpec {
        kind: ProviderKind::Gcp,
        binaries: &["gcloud", "gsutil"],
        read_only_verbs: READ_ONLY_VERBS,
        block_rules: block_rules(),
        safe_patterns: owned_patterns(SAFE_PATTERNS),
        caution_patterns: CAUTION,
        regex_rules: regex_rules(),
        nl_phrases: owned(NL_PHRASES),
        auth_patterns: AUTH_PATTERNS,
        login_hint: "gcloud auth login",
    }
}
