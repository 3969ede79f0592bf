//! Per-provider gateway tables
//!
//! Each provider module contributes one [`ProviderSpec`]: the command
//! prefix set, read-only verbs, the categorized block-list, safe and
//! caution patterns, regex rules, the natural-language dictionary, and
//! the auth-error fingerprints. The tables are built once at gateway
//! construction and read-only afterwards.

pub mod aws;
pub mod azure;
pub mod gcp;

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{ProviderKind, RiskTier};

/// Block-list category, walked in declared order during classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Identity,
    Secrets,
    Logging,
    Network,
    Project,
    Compute,
    Storage,
    Database,
}

impl Category {
    /// Risk tier assigned to commands matching this category.
    pub fn tier(&self) -> RiskTier {
        match self {
            Category::Identity | Category::Project => RiskTier::Critical,
            Category::Secrets | Category::Logging | Category::Network => RiskTier::High,
            Category::Compute | Category::Storage | Category::Database => RiskTier::Medium,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "identity" | "iam" => Some(Category::Identity),
            "secrets" => Some(Category::Secrets),
            "logging" => Some(Category::Logging),
            "network" => Some(Category::Network),
            "project" | "subscription" => Some(Category::Project),
            "compute" => Some(Category::Compute),
            "storage" => Some(Category::Storage),
            "database" => Some(Category::Database),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Identity => write!(f, "identity"),
            Category::Secrets => write!(f, "secrets"),
            Category::Logging => write!(f, "logging"),
            Category::Network => write!(f, "network"),
            Category::Project => write!(f, "project"),
            Category::Compute => write!(f, "compute"),
            Category::Storage => write!(f, "storage"),
            Category::Database => write!(f, "database"),
        }
    }
}

/// One category of the block-list
#[derive(Debug, Clone)]
pub struct BlockRule {
    pub category: Category,
    /// Command prefixes such as `aws iam create-user`, matched against
    /// the normalized command text
    pub patterns: Vec<String>,
}

/// Compiled regex rule for shapes prefix matching cannot express
#[derive(Debug, Clone)]
pub struct RegexRule {
    pub pattern: Regex,
    pub message: &'static str,
}

impl RegexRule {
    fn new(pattern: &str, message: &'static str) -> Self {
        // Table patterns are literals reviewed with the table itself.
        Self {
            pattern: Regex::new(pattern).expect("invalid built-in policy regex"),
            message,
        }
    }
}

/// Everything the gateway knows about one provider CLI
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    pub kind: ProviderKind,
    /// Binaries accepted as stage-0 commands (`aws`, `az`, `gcloud`, `gsutil`)
    pub binaries: &'static [&'static str],
    /// Read-only verbs; entries ending in `-` match by prefix
    pub read_only_verbs: &'static [&'static str],
    pub block_rules: Vec<BlockRule>,
    /// Prefixes that override a block-list hit (read-only sub-families)
    pub safe_patterns: Vec<String>,
    /// Allowed, but attach a warning to the result
    pub caution_patterns: &'static [&'static str],
    pub regex_rules: Vec<RegexRule>,
    /// Phrase -> canonical command, insertion order preserved
    pub nl_phrases: Vec<(String, String)>,
    /// Substrings on stderr that identify a credential problem
    pub auth_patterns: &'static [&'static str],
    /// Login command suggested alongside an auth error
    pub login_hint: &'static str,
}

impl ProviderSpec {
    pub fn for_kind(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Aws => aws::spec(),
            ProviderKind::Gcp => gcp::spec(),
            ProviderKind::Azure => azure::spec(),
        }
    }

    /// Whether `token` is one of this provider's stage-0 binaries.
    pub fn is_provider_binary(&self, token: &str) -> bool {
        self.binaries.contains(&token)
    }

    /// Extend the tables with entries from a YAML overlay.
    pub fn apply_overlay(&mut self, overlay: &ProviderOverlay) {
        for (name, patterns) in &overlay.block {
            let Some(category) = Category::parse(name) else {
                tracing::warn!("Ignoring unknown block-list category {:?} in policy overlay", name);
                continue;
            };
            match self.block_rules.iter_mut().find(|r| r.category == category) {
                Some(rule) => rule.patterns.extend(patterns.iter().cloned()),
                None => self.block_rules.push(BlockRule {
                    category,
                    patterns: patterns.clone(),
                }),
            }
        }
        self.safe_patterns.extend(overlay.safe.iter().cloned());
        for (phrase, command) in &overlay.nl {
            self.nl_phrases
                .push((phrase.to_lowercase(), command.clone()));
        }
    }
}

/// Per-provider section of the YAML policy overlay
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderOverlay {
    #[serde(default)]
    pub block: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub safe: Vec<String>,
    #[serde(default)]
    pub nl: HashMap<String, String>,
}

/// Optional YAML overlay extending the built-in policy tables
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyOverlay {
    #[serde(default)]
    pub aws: Option<ProviderOverlay>,
    #[serde(default)]
    pub gcp: Option<ProviderOverlay>,
    #[serde(default)]
    pub azure: Option<ProviderOverlay>,
}

impl PolicyOverlay {
    pub fn section(&self, kind: ProviderKind) -> Option<&ProviderOverlay> {
        match kind {
            ProviderKind::Aws => self.aws.as_ref(),
            ProviderKind::Gcp => self.gcp.as_ref(),
            ProviderKind::Azure => self.azure.as_ref(),
        }
    }
}

pub fn load_overlay(path: &Path) -> anyhow::Result<PolicyOverlay> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading policy overlay {}", path.display()))?;
    let overlay: PolicyOverlay = serde_yaml::from_str(&raw)
        .with_context(|| format!("parsing policy overlay {}", path.display()))?;
    tracing::info!("Loaded policy overlay from {}", path.display());
    Ok(overlay)
}

pub(crate) fn owned(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub(crate) fn owned_patterns(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
