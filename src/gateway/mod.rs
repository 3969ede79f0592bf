//! Provider gateway façade
//!
//! One gateway per provider. `execute_command` takes free-form user
//! text through interpretation, pipeline parsing, policy validation
//! and finally child-process execution, returning every expected
//! failure as a structured [`ExecutionResult`]. A gateway is an
//! explicit value constructed with its context; concurrent use of one
//! instance is safe.

use std::path::Path;
use std::sync::{Arc, RwLock};

use anyhow::{bail, Context as _};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::exec::{self, ExecRequest};
use crate::providers::{self, ProviderSpec};
use crate::{nl, pipeline, policy};
use crate::{CoreConfig, ExecutionResult, ProviderKind};

/// Credentials/scope context a gateway operates in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderContext {
    /// Display label, e.g. "prod" or "default"
    #[serde(default)]
    pub name: String,
    /// AWS named profile
    #[serde(default)]
    pub profile: Option<String>,
    /// AWS region
    #[serde(default)]
    pub region: Option<String>,
    /// Azure subscription id
    #[serde(default)]
    pub subscription_id: Option<String>,
    /// Azure tenant id
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// GCP project id
    #[serde(default)]
    pub project_id: Option<String>,
}

#[derive(Debug, Default)]
struct GatewayState {
    running: bool,
    context: ProviderContext,
    known_contexts: Vec<ProviderContext>,
}

/// Per-provider gateway
pub struct ProviderGateway {
    spec: ProviderSpec,
    config: CoreConfig,
    children_limit: Arc<Semaphore>,
    state: RwLock<GatewayState>,
}

impl ProviderGateway {
    /// Build a gateway for one provider, applying the optional YAML
    /// policy overlay from the config.
    pub fn new(kind: ProviderKind, config: CoreConfig) -> anyhow::Result<Self> {
        let mut spec = ProviderSpec::for_kind(kind);
        if let Some(path) = &config.policy_config_path {
            let overlay = providers::load_overlay(Path::new(path))
                .context("applying policy overlay")?;
            if let Some(section) = overlay.section(kind) {
                spec.apply_overlay(section);
            }
        }
        let children_limit = Arc::new(Semaphore::new(config.max_concurrent_children));
        Ok(Self {
            spec,
            config,
            children_limit,
            state: RwLock::new(GatewayState::default()),
        })
    }

    pub fn kind(&self) -> ProviderKind {
        self.spec.kind
    }

    pub fn spec(&self) -> &ProviderSpec {
        &self.spec
    }

    /// Verify the provider binary is installed and record the desired
    /// context. Restarting with a new context is allowed.
    pub fn start(&self, context: ProviderContext) -> anyhow::Result<()> {
        let binary = self.spec.binaries[0];
        if !binary_on_path(binary) {
            bail!("provider binary {binary:?} not found on PATH");
        }
        let mut state = self.state.write().expect("gateway state poisoned");
        if !state.known_contexts.iter().any(|c| *c == context) {
            state.known_contexts.push(context.clone());
        }
        state.context = context;
        state.running = true;
        tracing::info!(provider = %self.spec.kind, "Gateway started");
        Ok(())
    }

    /// Idempotent; outstanding executions are unaffected.
    pub fn stop(&self) {
        let mut state = self.state.write().expect("gateway state poisoned");
        if state.running {
            tracing::info!(provider = %self.spec.kind, "Gateway stopped");
        }
        state.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.state.read().expect("gateway state poisoned").running
    }

    pub fn current_context(&self) -> ProviderContext {
        self.state.read().expect("gateway state poisoned").context.clone()
    }

    pub fn list_contexts(&self) -> Vec<ProviderContext> {
        self.state
            .read()
            .expect("gateway state poisoned")
            .known_contexts
            .clone()
    }

    /// Interpret free-form text without executing anything.
    pub fn interpret(&self, text: &str) -> Option<String> {
        nl::interpret(&self.spec, text)
    }

    /// Classify and validate without executing anything.
    pub fn check(&self, command: &str) -> (policy::Classification, policy::Decision) {
        (
            policy::classify(&self.spec, command),
            policy::validate(&self.spec, command, self.config.mode, self.config.warn_threshold),
        )
    }

    /// Run one command through NL interpretation, pipeline parsing,
    /// policy validation and execution.
    pub async fn execute_command(&self, text: &str) -> ExecutionResult {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return ExecutionResult::validation_error("empty command");
        }

        // Prefix match takes precedence: provider-prefixed text is
        // never rewritten, malformed or not.
        let first_token = trimmed.split_whitespace().next().unwrap_or_default();
        let command = if self.spec.is_provider_binary(first_token) {
            trimmed.to_string()
        } else {
            match nl::interpret(&self.spec, trimmed) {
                Some(command) => {
                    tracing::debug!(provider = %self.spec.kind, %command, "Interpreted natural language");
                    command
                }
                None => {
                    return ExecutionResult::validation_error(format!(
                        "cannot interpret {trimmed:?} as a {} command",
                        self.spec.kind
                    ));
                }
            }
        };

        let parsed = match pipeline::parse(&command) {
            Ok(parsed) => parsed,
            Err(err) => return ExecutionResult::validation_error(err.to_string()),
        };
        if let Err(err) = pipeline::validate(&self.spec, &parsed) {
            return ExecutionResult::validation_error(err.to_string());
        }

        let decision = policy::validate(
            &self.spec,
            &parsed.head().text,
            self.config.mode,
            self.config.warn_threshold,
        );
        let warnings = match decision {
            policy::Decision::Deny { reason, .. } => {
                return ExecutionResult::validation_error(reason);
            }
            policy::Decision::Allow { warnings } => warnings,
        };

        let context = self.current_context();
        let mut parsed = parsed;
        inject_context(self.spec.kind, &context, &mut parsed.stages[0].argv);
        let env_overlay = env_overlay(self.spec.kind, &context);

        let result = exec::execute(ExecRequest {
            pipeline: &parsed,
            env_overlay: &env_overlay,
            timeout: self.config.max_wall_clock,
            max_output_bytes: self.config.max_output_bytes,
            auth_patterns: self.spec.auth_patterns,
            login_hint: self.spec.login_hint,
            children_limit: Some(self.children_limit.clone()),
        })
        .await;

        if warnings.is_empty() {
            result
        } else {
            let mut merged = warnings;
            merged.extend(result.warnings.iter().cloned());
            result.with_warnings(merged)
        }
    }
}

/// Append context arguments the user did not supply themselves.
fn inject_context(kind: ProviderKind, context: &ProviderContext, argv: &mut Vec<String>) {
    match kind {
        ProviderKind::Aws => {
            if let Some(profile) = &context.profile {
                if !has_flag(argv, "--profile") {
                    argv.push("--profile".to_string());
                    argv.push(profile.clone());
                }
            }
            // The region default only matters for the EC2 family.
            if let Some(region) = &context.region {
                if argv.get(1).map(String::as_str) == Some("ec2") && !has_flag(argv, "--region") {
                    argv.push("--region".to_string());
                    argv.push(region.clone());
                }
            }
        }
        ProviderKind::Azure => {
            if let Some(subscription) = &context.subscription_id {
                if !has_flag(argv, "--subscription") {
                    argv.push("--subscription".to_string());
                    argv.push(subscription.clone());
                }
            }
        }
        ProviderKind::Gcp => {
            if let Some(project) = &context.project_id {
                if argv.first().map(String::as_str) == Some("gcloud") && !has_flag(argv, "--project") {
                    argv.push("--project".to_string());
                    argv.push(project.clone());
                }
            }
        }
    }
}

fn has_flag(argv: &[String], flag: &str) -> bool {
    argv.iter().any(|a| a == flag || a.starts_with(&format!("{flag}=")))
}

/// Environment overlay for the provider stage.
fn env_overlay(kind: ProviderKind, context: &ProviderContext) -> Vec<(String, String)> {
    let mut env = Vec::new();
    match kind {
        ProviderKind::Aws => {
            if let Some(profile) = &context.profile {
                env.push(("AWS_PROFILE".to_string(), profile.clone()));
            }
            if let Some(region) = &context.region {
                env.push(("AWS_DEFAULT_REGION".to_string(), region.clone()));
            }
        }
        ProviderKind::Azure => {
            if let Some(subscription) = &context.subscription_id {
                env.push(("AZURE_SUBSCRIPTION_ID".to_string(), subscription.clone()));
            }
            if let Some(tenant) = &context.tenant_id {
                env.push(("AZURE_TENANT_ID".to_string(), tenant.clone()));
            }
        }
        ProviderKind::Gcp => {
            if let Some(project) = &context.project_id {
                env.push(("GOOGLE_CLOUD_PROJECT".to_string(), project.clone()));
                env.push(("CLOUDSDK_CORE_PROJECT".to_string(), project.clone()));
            }
        }
    }
    env
}

/// Locate a binary on PATH without spawning it.
pub(crate) fn binary_on_path(name: &str) -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(name);
        if !candidate.is_file() {
            continue;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(meta) = candidate.metadata() {
                if meta.permissions().mode() & 0o111 != 0 {
                    return true;
                }
            }
            continue;
        }
        #[cfg(not(unix))]
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, ExecStatus};

    fn gateway(kind: ProviderKind) -> ProviderGateway {
        ProviderGateway::new(kind, CoreConfig::default()).unwrap()
    }

    #[test]
    fn binary_lookup() {
        assert!(binary_on_path("ls"));
        assert!(!binary_on_path("cloudgate-no-such-binary-xyz"));
    }

    #[tokio::test]
    async fn strict_block_spawns_nothing() {
        let gw = gateway(ProviderKind::Aws);
        let result = gw
            .execute_command("aws iam create-user --user-name evil")
            .await;
        assert_eq!(result.status, ExecStatus::Error);
        assert_eq!(result.error_kind, ErrorKind::ValidationError);
        assert_eq!(
            result.output,
            "identity-mutating command blocked in strict mode (category=identity)"
        );
        assert_eq!(result.elapsed, std::time::Duration::ZERO);
    }

    #[tokio::test]
    async fn unknown_phrase_is_a_validation_error() {
        let gw = gateway(ProviderKind::Azure);
        let result = gw.execute_command("defragment the mainframe").await;
        assert_eq!(result.error_kind, ErrorKind::ValidationError);
        assert!(result.output.contains("cannot interpret"));
    }

    #[tokio::test]
    async fn metacharacters_are_rejected_before_execution() {
        let gw = gateway(ProviderKind::Aws);
        let result = gw.execute_command("aws s3 ls; rm -rf /").await;
        assert_eq!(result.error_kind, ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn disallowed_pipe_utility_is_rejected() {
        let gw = gateway(ProviderKind::Gcp);
        let result = gw
            .execute_command("gcloud projects list | jq .name")
            .await;
        assert_eq!(result.error_kind, ErrorKind::ValidationError);
        assert!(result.output.contains("jq"));
    }

    #[test]
    fn lifecycle_is_idempotent() {
        let gw = gateway(ProviderKind::Aws);
        assert!(!gw.is_running());
        gw.stop();
        gw.stop();
        assert!(!gw.is_running());
    }

    #[test]
    fn start_requires_the_provider_binary() {
        let gw = gateway(ProviderKind::Aws);
        // Whichever way it goes on this machine, state must agree.
        match gw.start(ProviderContext::default()) {
            Ok(()) => assert!(gw.is_running()),
            Err(err) => {
                assert!(err.to_string().contains("not found on PATH"));
                assert!(!gw.is_running());
            }
        }
    }

    #[test]
    fn aws_context_injection() {
        let context = ProviderContext {
            profile: Some("audit".to_string()),
            region: Some("eu-west-1".to_string()),
            ..Default::default()
        };

        let mut argv: Vec<String> = ["aws", "ec2", "describe-instances"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        inject_context(ProviderKind::Aws, &context, &mut argv);
        assert!(argv.contains(&"--profile".to_string()));
        assert!(argv.contains(&"--region".to_string()));

        // User-supplied flags win.
        let mut argv: Vec<String> = ["aws", "ec2", "describe-instances", "--region", "us-east-2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        inject_context(ProviderKind::Aws, &context, &mut argv);
        assert_eq!(argv.iter().filter(|a| *a == "--region").count(), 1);

        // Non-EC2 commands get no region.
        let mut argv: Vec<String> = ["aws", "s3", "ls"].iter().map(|s| s.to_string()).collect();
        inject_context(ProviderKind::Aws, &context, &mut argv);
        assert!(!argv.contains(&"--region".to_string()));
    }

    #[test]
    fn gcp_env_overlay_sets_both_project_variables() {
        let context = ProviderContext {
            project_id: Some("my-proj".to_string()),
            ..Default::default()
        };
        let env = env_overlay(ProviderKind::Gcp, &context);
        assert!(env.iter().any(|(k, v)| k == "GOOGLE_CLOUD_PROJECT" && v == "my-proj"));
        assert!(env.iter().any(|(k, _)| k == "CLOUDSDK_CORE_PROJECT"));
    }

    #[test]
    fn contexts_are_recorded() {
        let gw = gateway(ProviderKind::Gcp);
        // start may fail without gcloud installed; seed state directly.
        {
            let mut state = gw.state.write().unwrap();
            state.known_contexts.push(ProviderContext {
                name: "prod".to_string(),
                project_id: Some("prod-123".to_string()),
                ..Default::default()
            });
            state.context = state.known_contexts[0].clone();
        }
        assert_eq!(gw.current_context().name, "prod");
        assert_eq!(gw.list_contexts().len(), 1);
    }
}
