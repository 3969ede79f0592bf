//! Cloudgate Library
//!
//! Core components for the multi-cloud command gateway and the
//! remediation playbook engine.

pub mod exec;
pub mod gateway;
pub mod nl;
pub mod pipeline;
pub mod playbook;
pub mod policy;
pub mod providers;

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Supported cloud providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Aws,
    Gcp,
    Azure,
}

impl ProviderKind {
    /// Parse a provider name as used on the CLI and in playbook actions.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "aws" => Some(ProviderKind::Aws),
            "gcp" | "google" => Some(ProviderKind::Gcp),
            "azure" | "az" => Some(ProviderKind::Azure),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Aws => write!(f, "aws"),
            ProviderKind::Gcp => write!(f, "gcp"),
            ProviderKind::Azure => write!(f, "azure"),
        }
    }
}

/// Risk tier of a command, derived from its verb and block-list category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    /// Read-only verbs only
    Safe,
    /// Mutating but uncategorized
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskTier::Safe => write!(f, "SAFE"),
            RiskTier::Low => write!(f, "LOW"),
            RiskTier::Medium => write!(f, "MEDIUM"),
            RiskTier::High => write!(f, "HIGH"),
            RiskTier::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Policy enforcement mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SecurityMode {
    /// Deny block-listed commands at or above Medium tier
    #[default]
    Strict,
    /// Allow everything, attaching warnings instead
    Permissive,
}

impl SecurityMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Some(SecurityMode::Strict),
            "permissive" => Some(SecurityMode::Permissive),
            _ => None,
        }
    }
}

/// Outcome of a single gateway command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    Success,
    Error,
}

/// Discriminated failure kind carried by an [`ExecutionResult`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[default]
    None,
    Timeout,
    AuthError,
    ValidationError,
    ExecutionError,
}

/// Result of executing (or refusing) one command through a gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecStatus,
    /// Captured stdout (or the refusal/error message), possibly truncated
    pub output: String,
    /// Parsed form of `output` when it is a complete JSON document
    pub structured: Option<serde_json::Value>,
    pub exit_code: Option<i32>,
    pub error_kind: ErrorKind,
    pub truncated: bool,
    pub elapsed: Duration,
    /// Policy warnings attached on the way through (permissive mode, caution commands)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ExecutionResult {
    pub fn success(
        output: String,
        structured: Option<serde_json::Value>,
        exit_code: i32,
        elapsed: Duration,
    ) -> Self {
        Self {
            status: ExecStatus::Success,
            output,
            structured,
            exit_code: Some(exit_code),
            error_kind: ErrorKind::None,
            truncated: false,
            elapsed,
            warnings: Vec::new(),
        }
    }

    pub fn error(kind: ErrorKind, output: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            status: ExecStatus::Error,
            output: output.into(),
            structured: None,
            exit_code: None,
            error_kind: kind,
            truncated: false,
            elapsed,
            warnings: Vec::new(),
        }
    }

    /// Refusal produced before any child process is spawned.
    pub fn validation_error(reason: impl Into<String>) -> Self {
        Self::error(ErrorKind::ValidationError, reason, Duration::ZERO)
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecStatus::Success
    }
}

/// A security finding handed to the remediation engine.
///
/// The engine reads findings and never mutates them; everything beyond
/// these fields is opaque to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub remediation_hint: Option<String>,
}

impl Finding {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category: String::new(),
            severity: String::new(),
            resource: None,
            remediation_hint: None,
        }
    }
}

/// Configuration for the gateway core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Policy enforcement mode
    pub mode: SecurityMode,
    /// Per-command wall-clock deadline
    pub max_wall_clock: Duration,
    /// Per-command stdout cap in bytes
    pub max_output_bytes: usize,
    /// Soft cap on concurrently running playbook executions
    pub max_concurrent_executions: usize,
    /// Soft cap on concurrently running child processes
    pub max_concurrent_children: usize,
    /// Lowest tier that draws a warning in permissive mode
    pub warn_threshold: RiskTier,
    /// Optional YAML overlay extending the per-provider policy tables
    pub policy_config_path: Option<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            mode: SecurityMode::Strict,
            max_wall_clock: Duration::from_secs(30),
            max_output_bytes: 1024 * 1024,
            max_concurrent_executions: 16,
            max_concurrent_children: 64,
            warn_threshold: RiskTier::Medium,
            policy_config_path: None,
        }
    }
}

impl CoreConfig {
    /// Build a config from the recognized environment variables:
    /// `SECURITY_MODE`, `MAX_WALL_CLOCK_SECS`, `MAX_OUTPUT_BYTES`,
    /// `POLICY_CONFIG_PATH`.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(mode) = std::env::var("SECURITY_MODE") {
            if let Some(parsed) = SecurityMode::parse(&mode) {
                config.mode = parsed;
            } else {
                tracing::warn!("Unrecognized SECURITY_MODE {:?}, keeping strict", mode);
            }
        }
        if let Ok(secs) = std::env::var("MAX_WALL_CLOCK_SECS") {
            match secs.parse::<u64>() {
                Ok(parsed) if parsed > 0 => config.max_wall_clock = Duration::from_secs(parsed),
                _ => tracing::warn!("Ignoring invalid MAX_WALL_CLOCK_SECS {:?}", secs),
            }
        }
        if let Ok(bytes) = std::env::var("MAX_OUTPUT_BYTES") {
            match bytes.parse::<usize>() {
                Ok(parsed) if parsed > 0 => config.max_output_bytes = parsed,
                _ => tracing::warn!("Ignoring invalid MAX_OUTPUT_BYTES {:?}", bytes),
            }
        }
        if let Ok(path) = std::env::var("POLICY_CONFIG_PATH") {
            if !path.is_empty() {
                config.policy_config_path = Some(path);
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_tier_ordering_is_total() {
        assert!(RiskTier::Safe < RiskTier::Low);
        assert!(RiskTier::Low < RiskTier::Medium);
        assert!(RiskTier::Medium < RiskTier::High);
        assert!(RiskTier::High < RiskTier::Critical);
    }

    #[test]
    fn provider_parse() {
        assert_eq!(ProviderKind::parse("AWS"), Some(ProviderKind::Aws));
        assert_eq!(ProviderKind::parse("az"), Some(ProviderKind::Azure));
        assert_eq!(ProviderKind::parse("google"), Some(ProviderKind::Gcp));
        assert_eq!(ProviderKind::parse("oracle"), None);
    }

    #[test]
    fn config_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.mode, SecurityMode::Strict);
        assert_eq!(config.max_wall_clock, Duration::from_secs(30));
        assert_eq!(config.max_output_bytes, 1024 * 1024);
    }
}
