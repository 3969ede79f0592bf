//! Azure provider tables

use super::{owned, owned_patterns, BlockRule, Category, ProviderSpec, RegexRule};
use crate::ProviderKind;

const READ_ONLY_VERBS: &[&str] = &["list", "show", "get"];

const AUTH_PATTERNS: &[&str] = &[
    "az login",
    "not logged in",
    "InvalidAuthenticationToken",
    "AuthorizationFailed",
    "InvalidClientId",
    "InvalidTenantId",
    "Unable to authenticate",
    "credentials could not be found",
    "No subscriptions found",
    "AuthenticationException",
    "InvalidCredential",
];

const CAUTION: &[&str] = &[
    "az vm update",
    "az vm run-command invoke",
    "az sql db update",
    "az storage account update",
];

fn block_rules() -> Vec<BlockRule> {
    vec![
        BlockRule {
            category: Category::Identity,
            patterns: owned_patterns(&[
                "az ad user create",
                "az ad user delete",
                "az ad app create",
                "az ad app delete",
                "az ad sp create",
                "az ad sp delete",
                "az role assignment create",
                "az role assignment delete",
                "az role definition create",
                "az role definition update",
                "az role definition delete",
            ]),
        },
        BlockRule {
            category: Category::Secrets,
            patterns: owned_patterns(&[
                "az keyvault secret set",
                "az keyvault secret delete",
                "az keyvault key create",
                "az keyvault key delete",
                "az keyvault purge",
                "az keyvault delete",
            ]),
        },
        BlockRule {
            category: Category::Logging,
            patterns: owned_patterns(&[
                "az monitor log-profiles delete",
                "az monitor log-analytics workspace delete",
                "az eventhub namespace delete",
                "az sql server audit-policy update",
                "az storage logging off",
            ]),
        },
        BlockRule {
            category: Category::Network,
            patterns: owned_patterns(&[
                "az network firewall rule create",
                "az network firewall rule delete",
                "az network firewall update",
                "az network firewall delete",
                "az network nsg rule create",
                "az network nsg rule delete",
            ]),
        },
        BlockRule {
            category: Category::Project,
            patterns: owned_patterns(&[
                "az account set",
                "az group delete",
            ]),
        },
        BlockRule {
            category: Category::Compute,
            patterns: owned_patterns(&[
                "az vm delete",
                "az disk delete",
                "az image delete",
                "az snapshot delete",
            ]),
        },
        BlockRule {
            category: Category::Storage,
            patterns: owned_patterns(&[
                "az storage account delete",
                "az storage container delete",
                "az storage blob delete",
            ]),
        },
        BlockRule {
            category: Category::Database,
            patterns: owned_patterns(&[
                "az sql db delete",
                "az sql server delete",
                "az sql server firewall-rule create",
                "az sql server firewall-rule delete",
                "az cosmosdb delete",
            ]),
        },
    ]
}

const SAFE_PATTERNS: &[&str] = &[
    "az account show",
    "az account list",
    "az ad user list",
    "az ad user show",
    "az ad app list",
    "az ad sp list",
    "az role assignment list",
    "az role definition list",
    "az keyvault list",
    "az keyvault show",
    "az keyvault secret list",
    "az keyvault secret show",
    "az monitor log-profiles list",
    "az network firewall list",
    "az network firewall show",
    "az network nsg list",
    "az network nsg show",
    "az group list",
    "az group show",
    "az vm list",
    "az vm show",
    "az disk list",
    "az storage account list",
    "az storage account show",
    "az storage container list",
    "az storage blob list",
    "az sql db list",
    "az sql db show",
    "az sql server list",
    "az cosmosdb list",
];

fn regex_rules() -> Vec<RegexRule> {
    vec![
        RegexRule::new(
            r"az .* --debug",
            "Debug mode is restricted as it may expose sensitive information",
        ),
        RegexRule::new(
            r"az storage account update.*--allow-blob-public-access\s+true",
            "Enabling public blob access is restricted",
        ),
        RegexRule::new(
            r"az storage container set-permission.*--public-access\s+(blob|container)",
            "Making storage containers public is restricted",
        ),
        RegexRule::new(
            r"az network nsg rule create.*--source-address-prefixes?\s+('\*'|\*|0\.0\.0\.0/0|Internet)",
            "Opening NSG rules to the entire internet is restricted",
        ),
        RegexRule::new(
            r"az ad user create.*--user-principal-name\s+\S*(root|admin|administrator)",
            "Creating users with sensitive names is restricted",
        ),
        RegexRule::new(
            r"az storage account update.*--https-only\s+false",
            "Disabling HTTPS-only transfer is restricted",
        ),
    ]
}

const NL_PHRASES: &[(&str, &str)] = &[
    // General
    ("who am i", "az account show"),
    ("caller id", "az account show"),
    ("account info", "az account show"),
    ("show my account", "az account show"),
    ("show my subscription", "az account show"),
    ("current subscription", "az account show"),
    // Subscriptions and resource groups
    ("list subscriptions", "az account list"),
    ("show subscriptions", "az account list"),
    ("subscriptions", "az account list"),
    ("list resource groups", "az group list"),
    ("show resource groups", "az group list"),
    ("resource groups", "az group list"),
    ("list resources", "az resource list"),
    ("show resources", "az resource list"),
    // Entra ID
    ("list users", "az ad user list"),
    ("show users", "az ad user list"),
    ("users", "az ad user list"),
    ("list roles", "az role definition list"),
    ("show roles", "az role definition list"),
    ("roles", "az role definition list"),
    ("list groups", "az ad group list"),
    ("show groups", "az ad group list"),
    ("groups", "az ad group list"),
    // Storage
    ("list storage accounts", "az storage account list"),
    ("show storage accounts", "az storage account list"),
    ("storage accounts", "az storage account list"),
    ("list containers", "az storage container list"),
    ("show containers", "az storage container list"),
    ("containers", "az storage container list"),
    // Virtual machines
    ("list my vms", "az vm list"),
    ("list vms", "az vm list"),
    ("show vms", "az vm list"),
    ("vms", "az vm list"),
    ("list virtual machines", "az vm list"),
    ("show virtual machines", "az vm list"),
    ("virtual machines", "az vm list"),
    // Network
    ("list network security groups", "az network nsg list"),
    ("network security groups", "az network nsg list"),
    ("nsgs", "az network nsg list"),
    ("list vnets", "az network vnet list"),
    ("show vnets", "az network vnet list"),
    ("vnets", "az network vnet list"),
    // Databases
    ("list sql servers", "az sql server list"),
    ("sql servers", "az sql server list"),
    ("list sql databases", "az sql db list"),
    ("sql databases", "az sql db list"),
    ("list databases", "az sql db list"),
    ("databases", "az sql db list"),
    // Key vault
    ("list key vaults", "az keyvault list"),
    ("key vaults", "az keyvault list"),
    ("list secrets", "az keyvault secret list"),
    ("show secrets", "az keyvault secret list"),
    ("secrets", "az keyvault secret list"),
    // App services and functions
    ("list web apps", "az webapp list"),
    ("web apps", "az webapp list"),
    ("list app services", "az appservice plan list"),
    ("app services", "az appservice plan list"),
    ("list functions", "az functionapp list"),
    ("functions", "az functionapp list"),
    // Kubernetes
    ("list clusters", "az aks list"),
    ("list kubernetes clusters", "az aks list"),
    ("clusters", "az aks list"),
];

pub fn spec() -> ProviderSpec {
    ProviderSpec {
        kind: ProviderKind::Azure,
        binaries: &["az"],
        read_only_verbs: READ_ONLY_VERBS,
        block_rules: block_rules(),
        safe_patterns: owned_patterns(SAFE_PATTERNS),
        caution_patterns: CAUTION,
        regex_rules: regex_rules(),
        nl_phrases: owned(NL_PHRASES),
        auth_patterns: AUTH_PATTERNS,
        login_hint: "az login",
    }
}
