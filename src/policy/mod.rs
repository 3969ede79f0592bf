//! Command risk classification and policy validation
//!
//! Classification is a pure function over the provider tables: a
//! read-only verb (or safe pattern) yields `Safe`; otherwise the
//! categorized block-list is walked in declared order and the first
//! matching category assigns its tier; an uncategorized mutation is
//! `Low`. Validation turns the classification into an allow/deny
//! decision under the active [`SecurityMode`].

use serde::{Deserialize, Serialize};

use crate::providers::{Category, ProviderSpec};
use crate::{RiskTier, SecurityMode};

/// Tokens that make any command safe regardless of block-list hits
const GENERAL_SAFE_TOKENS: &[&str] = &["help", "--help", "--version", "--dry-run"];

/// Outcome of classifying one command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub tier: RiskTier,
    pub category: Option<Category>,
    /// The verb or block-list pattern that decided the tier
    pub matched: Option<String>,
}

/// Allow/deny decision for one command
#[derive(Debug, Clone)]
pub enum Decision {
    Allow { warnings: Vec<String> },
    Deny { category: Option<Category>, reason: String },
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

fn is_flag(token: &str) -> bool {
    token.starts_with('-')
}

/// Whether `token` matches a read-only verb entry. Entries ending in
/// `-` are prefixes (`describe-`); other entries also cover their
/// hyphenated forms (`get` covers `get-iam-policy`).
fn verb_matches(entry: &str, token: &str) -> bool {
    if let Some(prefix) = entry.strip_suffix('-') {
        token.starts_with(prefix) && token.len() > prefix.len() && token.as_bytes()[prefix.len()] == b'-'
    } else {
        token == entry || (token.starts_with(entry) && token.as_bytes().get(entry.len()) == Some(&b'-'))
    }
}

/// Scan the command path (tokens before the first flag) for a
/// read-only verb; flag values never count.
fn read_only_verb(spec: &ProviderSpec, tokens: &[String]) -> Option<String> {
    tokens
        .iter()
        .skip(1)
        .take_while(|t| !is_flag(t))
        .find_map(|token| {
            spec.read_only_verbs
                .iter()
                .filter(|entry| verb_matches(entry, token))
                .max_by_key(|entry| entry.len())
                .map(|_| token.clone())
        })
}

/// Safe patterns override a block-list hit: per-provider read-only
/// families plus the universal help/version/dry-run escape hatches.
fn matches_safe_pattern(spec: &ProviderSpec, normalized: &str, tokens: &[String]) -> bool {
    if spec.safe_patterns.iter().any(|p| normalized.starts_with(p.as_str())) {
        return true;
    }
    tokens
        .iter()
        .any(|t| GENERAL_SAFE_TOKENS.contains(&t.to_ascii_lowercase().as_str()))
}

/// Classify a command into a risk tier.
pub fn classify(spec: &ProviderSpec, command: &str) -> Classification {
    let normalized = command.trim().to_lowercase();
    let tokens: Vec<String> = shlex::split(&normalized)
        .unwrap_or_else(|| normalized.split_whitespace().map(String::from).collect());

    if let Some(verb) = read_only_verb(spec, &tokens) {
        return Classification {
            tier: RiskTier::Safe,
            category: None,
            matched: Some(verb),
        };
    }
    if matches_safe_pattern(spec, &normalized, &tokens) {
        return Classification {
            tier: RiskTier::Safe,
            category: None,
            matched: None,
        };
    }

    for rule in &spec.block_rules {
        for pattern in &rule.patterns {
            if normalized.contains(pattern.as_str()) {
                return Classification {
                    tier: rule.category.tier(),
                    category: Some(rule.category),
                    matched: Some(pattern.clone()),
                };
            }
        }
    }

    Classification {
        tier: RiskTier::Low,
        category: None,
        matched: None,
    }
}

/// Validate a command under the given mode.
///
/// Strict mode denies block-listed commands at `Medium` tier and above
/// and any regex-rule hit. Permissive mode always allows, converting
/// denials into warnings on the result.
pub fn validate(
    spec: &ProviderSpec,
    command: &str,
    mode: SecurityMode,
    warn_threshold: RiskTier,
) -> Decision {
    let normalized = command.trim().to_lowercase();
    let mut warnings = Vec::new();

    for rule in &spec.regex_rules {
        if rule.pattern.is_match(command) || rule.pattern.is_match(&normalized) {
            match mode {
                SecurityMode::Strict => {
                    tracing::warn!(provider = %spec.kind, "Denied by policy rule: {}", rule.message);
                    return Decision::Deny {
                        category: None,
                        reason: rule.message.to_string(),
                    };
                }
                SecurityMode::Permissive => {
                    warnings.push(format!("permissive mode: {}", rule.message));
                }
            }
        }
    }

    let classification = classify(spec, command);

    if let Some(category) = classification.category {
        match mode {
            SecurityMode::Strict if classification.tier >= RiskTier::Medium => {
                let reason = format!(
                    "{category}-mutating command blocked in strict mode (category={category})"
                );
                tracing::warn!(provider = %spec.kind, tier = %classification.tier, "{reason}");
                return Decision::Deny {
                    category: Some(category),
                    reason,
                };
            }
            _ if classification.tier >= warn_threshold => {
                warnings.push(format!(
                    "permissive mode: {} command allowed (category={category})",
                    classification.tier
                ));
            }
            _ => {}
        }
    }

    for pattern in spec.caution_patterns {
        if normalized.contains(&pattern.to_lowercase()) {
            warnings.push(format!("caution: {pattern} modifies live resources"));
        }
    }

    Decision::Allow { warnings }
}
