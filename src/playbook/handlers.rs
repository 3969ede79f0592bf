//! Action handlers
//!
//! Dispatch from action kind to an executor function. Built-in kinds
//! (`aws`, `gcp`, `azure`, `notification`, `script`) are registered at
//! executor construction; user-defined kinds live in the same registry
//! keyed by string.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{Action, ActionKind, ActionResult};
use crate::gateway::ProviderGateway;
use crate::{pipeline, CoreConfig, Finding};

/// Context passed to every handler invocation
#[derive(Clone)]
pub struct HandlerContext {
    pub finding: Finding,
    /// Handlers must not cause external side effects when set
    pub dry_run: bool,
}

/// A pluggable action executor
#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Execute the action, honoring `ctx.dry_run`.
    async fn run(&self, action: &Action, ctx: &HandlerContext) -> ActionResult;

    /// Undo a previously successful action using its rollback token.
    async fn rollback(
        &self,
        action: &Action,
        _token: &serde_json::Value,
        _ctx: &HandlerContext,
    ) -> ActionResult {
        ActionResult::skipped(action, "action kind has no rollback sub-handler")
    }
}

/// Registry from action kind to handler
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ActionHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, kind: &ActionKind, handler: Arc<dyn ActionHandler>) {
        tracing::info!(kind = %kind, "Registered action handler");
        self.handlers
            .write()
            .expect("handler registry poisoned")
            .insert(kind.as_str().to_string(), handler);
    }

    pub fn resolve(&self, kind: &ActionKind) -> Option<Arc<dyn ActionHandler>> {
        self.handlers
            .read()
            .expect("handler registry poisoned")
            .get(kind.as_str())
            .cloned()
    }

    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self
            .handlers
            .read()
            .expect("handler registry poisoned")
            .keys()
            .cloned()
            .collect();
        kinds.sort();
        kinds
    }
}

/// Records the intended message; never mutates external state.
pub struct NotificationHandler;

#[async_trait]
impl ActionHandler for NotificationHandler {
    async fn run(&self, action: &Action, ctx: &HandlerContext) -> ActionResult {
        let channel = action.params["channel"]
            .as_str()
            .or_else(|| action.params["type"].as_str())
            .unwrap_or("default");
        let message = action.params["message"]
            .as_str()
            .or_else(|| action.params["subject"].as_str())
            .unwrap_or("(no message)");

        if ctx.dry_run {
            return ActionResult::dry_run(
                action,
                format!("notification to {channel} would be sent: {message}"),
            );
        }
        tracing::info!(action = %action.name, %channel, "Recorded notification intent");
        ActionResult::completed(action, format!("notification to {channel} recorded: {message}"))
    }
}

/// Executes a bounded single-stage command; pipes and shell
/// metacharacters are rejected the same way gateway commands are.
pub struct ScriptHandler {
    config: CoreConfig,
}

impl ScriptHandler {
    pub fn new(config: CoreConfig) -> Self {
        Self { config }
    }

    async fn run_command(&self, action: &Action, command: &str) -> ActionResult {
        let parsed = match pipeline::parse(command) {
            Ok(parsed) => parsed,
            Err(err) => return ActionResult::failed(action, "script rejected", err.to_string()),
        };
        if parsed.is_piped() {
            return ActionResult::failed(
                action,
                "script rejected",
                "script actions may not contain pipes",
            );
        }

        let result = crate::exec::execute(crate::exec::ExecRequest {
            pipeline: &parsed,
            env_overlay: &[],
            timeout: self.config.max_wall_clock,
            max_output_bytes: self.config.max_output_bytes,
            auth_patterns: &[],
            login_hint: "",
            children_limit: None,
        })
        .await;

        if result.is_success() {
            ActionResult::completed(action, format!("script succeeded: {}", result.output.trim()))
        } else {
            ActionResult::failed(action, "script failed", result.output)
        }
    }
}

#[async_trait]
impl ActionHandler for ScriptHandler {
    async fn run(&self, action: &Action, ctx: &HandlerContext) -> ActionResult {
        let Some(script) = action.params["script"].as_str() else {
            return ActionResult::failed(action, "script rejected", "missing script parameter");
        };
        if ctx.dry_run {
            return ActionResult::dry_run(action, format!("would execute script: {script}"));
        }
        self.run_command(action, script).await
    }

    async fn rollback(
        &self,
        action: &Action,
        token: &serde_json::Value,
        ctx: &HandlerContext,
    ) -> ActionResult {
        let Some(script) = token["script"].as_str() else {
            return ActionResult::skipped(action, "rollback token carries no script");
        };
        if ctx.dry_run {
            return ActionResult::dry_run(action, format!("would execute rollback script: {script}"));
        }
        self.run_command(action, script).await
    }
}

/// Routes provider actions through the matching gateway, composing a
/// canonical command from the action params.
pub struct ProviderHandler {
    gateway: Arc<ProviderGateway>,
}

impl ProviderHandler {
    pub fn new(gateway: Arc<ProviderGateway>) -> Self {
        Self { gateway }
    }

    /// Compose `<binary> <service> <action> <args...>` unless a full
    /// `command` override is given.
    fn compose(&self, params: &serde_json::Value) -> Option<String> {
        if let Some(command) = params["command"].as_str() {
            return Some(command.to_string());
        }
        let service = params["service"].as_str()?;
        let verb = params["action"].as_str()?;
        let mut command = format!(
            "{} {service} {verb}",
            self.gateway.spec().binaries[0]
        );
        if let Some(args) = params["args"].as_array() {
            for arg in args.iter().filter_map(|a| a.as_str()) {
                command.push(' ');
                command.push_str(arg);
            }
        }
        Some(command)
    }
}

#[async_trait]
impl ActionHandler for ProviderHandler {
    async fn run(&self, action: &Action, ctx: &HandlerContext) -> ActionResult {
        let Some(command) = self.compose(&action.params) else {
            return ActionResult::failed(
                action,
                "action rejected",
                "params need either a command or service+action",
            );
        };

        if ctx.dry_run {
            return ActionResult::dry_run(action, format!("would execute: {command}"));
        }

        let result = self.gateway.execute_command(&command).await;
        if result.is_success() {
            let mut done = ActionResult::completed(action, format!("executed: {command}"));
            // The compensating command travels in the params; capture
            // it as the rollback token only after the mutation landed.
            if !action.params["rollback"].is_null() {
                done = done.with_rollback_token(action.params["rollback"].clone());
            }
            done
        } else {
            ActionResult::failed(action, format!("command failed: {command}"), result.output)
        }
    }

    async fn rollback(
        &self,
        action: &Action,
        token: &serde_json::Value,
        ctx: &HandlerContext,
    ) -> ActionResult {
        let Some(command) = self.compose(token) else {
            return ActionResult::skipped(action, "rollback token is not a command description");
        };
        if ctx.dry_run {
            return ActionResult::dry_run(action, format!("would roll back via: {command}"));
        }
        let result = self.gateway.execute_command(&command).await;
        if result.is_success() {
            ActionResult::completed(action, format!("rolled back via: {command}"))
        } else {
            ActionResult::failed(action, format!("rollback failed: {command}"), result.output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(dry_run: bool) -> HandlerContext {
        HandlerContext {
            finding: Finding::new("f-1"),
            dry_run,
        }
    }

    #[tokio::test]
    async fn notification_never_mutates_anything() {
        let handler = NotificationHandler;
        let action = Action::new(
            "notify",
            ActionKind::Notification,
            json!({"channel": "#security-alerts", "message": "bucket locked down"}),
        );

        let wet = handler.run(&action, &ctx(false)).await;
        assert_eq!(wet.status, super::super::ActionStatus::Completed);
        assert!(wet.message.contains("#security-alerts"));

        let dry = handler.run(&action, &ctx(true)).await;
        assert!(dry.message.starts_with("[DRY-RUN]"));
    }

    #[tokio::test]
    async fn script_dry_run_spawns_nothing() {
        let handler = ScriptHandler::new(CoreConfig::default());
        let action = Action::new(
            "fix",
            ActionKind::Script,
            json!({"script": "cloudgate-no-such-binary-xyz"}),
        );
        let result = handler.run(&action, &ctx(true)).await;
        assert_eq!(result.status, super::super::ActionStatus::Completed);
        assert!(result.message.starts_with("[DRY-RUN]"));
    }

    #[tokio::test]
    async fn script_executes_real_commands() {
        let handler = ScriptHandler::new(CoreConfig::default());
        let action = Action::new("fix", ActionKind::Script, json!({"script": "echo done"}));
        let result = handler.run(&action, &ctx(false)).await;
        assert_eq!(result.status, super::super::ActionStatus::Completed);
        assert!(result.message.contains("done"));
    }

    #[tokio::test]
    async fn script_rejects_pipes_and_missing_params() {
        let handler = ScriptHandler::new(CoreConfig::default());

        let piped = Action::new("fix", ActionKind::Script, json!({"script": "echo a | wc -l"}));
        let result = handler.run(&piped, &ctx(false)).await;
        assert_eq!(result.status, super::super::ActionStatus::Failed);

        let missing = Action::new("fix", ActionKind::Script, json!({}));
        let result = handler.run(&missing, &ctx(false)).await;
        assert_eq!(result.status, super::super::ActionStatus::Failed);
    }

    #[test]
    fn registry_resolves_and_lists() {
        let registry = HandlerRegistry::new();
        registry.register(&ActionKind::Notification, Arc::new(NotificationHandler));
        assert!(registry.resolve(&ActionKind::Notification).is_some());
        assert!(registry.resolve(&ActionKind::Aws).is_none());
        assert_eq!(registry.kinds(), vec!["notification".to_string()]);
    }
}
