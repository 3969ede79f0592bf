//! Remediation playbooks
//!
//! A playbook is an immutable ordered plan of remediation actions with
//! policy metadata (approval, rollback, timeout). Executions of a
//! playbook are tracked by the [`executor::PlaybookExecutor`] state
//! machine; handlers are dispatched through the
//! [`handlers::HandlerRegistry`].

pub mod executor;
pub mod handlers;
pub mod library;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Finding;

/// Severity attached to a playbook (and to the findings it addresses)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Some(Severity::Low),
            "MEDIUM" => Some(Severity::Medium),
            "HIGH" => Some(Severity::High),
            "CRITICAL" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Kind of a playbook action; selects the handler
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ActionKind {
    Aws,
    Gcp,
    Azure,
    Notification,
    Script,
    Custom(String),
}

impl ActionKind {
    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::Aws => "aws",
            ActionKind::Gcp => "gcp",
            ActionKind::Azure => "azure",
            ActionKind::Notification => "notification",
            ActionKind::Script => "script",
            ActionKind::Custom(name) => name,
        }
    }

    /// The closed built-in set; everything else is registry-defined.
    pub fn is_builtin(&self) -> bool {
        !matches!(self, ActionKind::Custom(_))
    }
}

impl From<String> for ActionKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "aws" => ActionKind::Aws,
            "gcp" => ActionKind::Gcp,
            "azure" => ActionKind::Azure,
            "notification" => ActionKind::Notification,
            "script" => ActionKind::Script,
            _ => ActionKind::Custom(s),
        }
    }
}

impl From<ActionKind> for String {
    fn from(kind: ActionKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Condition checked against the finding before an action runs
pub type ActionPredicate = Arc<dyn Fn(&Finding) -> bool + Send + Sync>;

/// One step in a playbook
#[derive(Clone, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub kind: ActionKind,
    /// Untyped parameters interpreted by the handler
    #[serde(default)]
    pub params: serde_json::Value,
    /// Skip the action when the predicate rejects the finding
    #[serde(skip)]
    pub predicate: Option<ActionPredicate>,
    /// Names the compensating operation for the handler's rollback path
    #[serde(default)]
    pub rollback_ref: Option<String>,
}

impl Action {
    pub fn new(name: impl Into<String>, kind: ActionKind, params: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            kind,
            params,
            predicate: None,
            rollback_ref: None,
        }
    }

    pub fn with_predicate(mut self, predicate: ActionPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn with_rollback(mut self, rollback_ref: impl Into<String>) -> Self {
        self.rollback_ref = Some(rollback_ref.into());
        self
    }
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("params", &self.params)
            .field("predicate", &self.predicate.as_ref().map(|_| "<fn>"))
            .field("rollback_ref", &self.rollback_ref)
            .finish()
    }
}

/// Immutable description of a remediation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Finding category this playbook addresses
    pub category: String,
    pub severity: Severity,
    pub prerequisites: Vec<String>,
    pub actions: Vec<Action>,
    pub requires_approval: bool,
    pub rollback_enabled: bool,
    pub timeout: Duration,
}

impl Playbook {
    pub fn builder(id: impl Into<String>, name: impl Into<String>) -> PlaybookBuilder {
        PlaybookBuilder {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category: String::new(),
            severity: Severity::Medium,
            prerequisites: Vec::new(),
            actions: Vec::new(),
            requires_approval: true,
            rollback_enabled: false,
            timeout: Duration::from_secs(300),
        }
    }
}

/// Builder for [`Playbook`]; the built value is immutable.
pub struct PlaybookBuilder {
    id: String,
    name: String,
    description: String,
    category: String,
    severity: Severity,
    prerequisites: Vec<String>,
    actions: Vec<Action>,
    requires_approval: bool,
    rollback_enabled: bool,
    timeout: Duration,
}

impl PlaybookBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn requires_approval(mut self, required: bool) -> Self {
        self.requires_approval = required;
        self
    }

    pub fn rollback_enabled(mut self, enabled: bool) -> Self {
        self.rollback_enabled = enabled;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn prerequisite(mut self, check: impl Into<String>) -> Self {
        self.prerequisites.push(check.into());
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn build(self) -> Result<Playbook, PlaybookError> {
        if self.id.trim().is_empty() || self.name.trim().is_empty() {
            return Err(PlaybookError::Validation(
                "playbook id and name must be non-empty".to_string(),
            ));
        }
        if self.actions.is_empty() {
            return Err(PlaybookError::Validation(format!(
                "playbook {} has no actions",
                self.id
            )));
        }
        for (index, action) in self.actions.iter().enumerate() {
            if self.actions[..index].iter().any(|a| a.name == action.name) {
                return Err(PlaybookError::Validation(format!(
                    "duplicate action name {:?} in playbook {}",
                    action.name, self.id
                )));
            }
        }
        Ok(Playbook {
            id: self.id,
            name: self.name,
            description: self.description,
            category: self.category,
            severity: self.severity,
            prerequisites: self.prerequisites,
            actions: self.actions,
            requires_approval: self.requires_approval,
            rollback_enabled: self.rollback_enabled,
            timeout: self.timeout,
        })
    }
}

/// Status of one playbook execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlaybookStatus {
    Pending,
    AwaitingApproval,
    Running,
    Completed,
    Failed,
    RolledBack,
    Rejected,
}

impl PlaybookStatus {
    /// Terminal states are never left, except `Completed`, which
    /// `rollback` may turn into `RolledBack` exactly once.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlaybookStatus::Completed
                | PlaybookStatus::Failed
                | PlaybookStatus::RolledBack
                | PlaybookStatus::Rejected
        )
    }
}

impl std::fmt::Display for PlaybookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybookStatus::Pending => write!(f, "PENDING"),
            PlaybookStatus::AwaitingApproval => write!(f, "AWAITING_APPROVAL"),
            PlaybookStatus::Running => write!(f, "RUNNING"),
            PlaybookStatus::Completed => write!(f, "COMPLETED"),
            PlaybookStatus::Failed => write!(f, "FAILED"),
            PlaybookStatus::RolledBack => write!(f, "ROLLED_BACK"),
            PlaybookStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// Status of one action within an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    RolledBack,
}

/// Result of executing a single action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub name: String,
    pub kind: ActionKind,
    pub status: ActionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Data captured at success that the rollback sub-handler consumes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_token: Option<serde_json::Value>,
}

impl ActionResult {
    pub fn completed(action: &Action, message: impl Into<String>) -> Self {
        Self::finished(action, ActionStatus::Completed, message, None)
    }

    pub fn failed(action: &Action, message: impl Into<String>, error: impl Into<String>) -> Self {
        Self::finished(action, ActionStatus::Failed, message, Some(error.into()))
    }

    pub fn skipped(action: &Action, message: impl Into<String>) -> Self {
        Self::finished(action, ActionStatus::Skipped, message, None)
    }

    /// Synthetic result for dry runs; nothing external happened.
    pub fn dry_run(action: &Action, message: impl Into<String>) -> Self {
        Self::finished(
            action,
            ActionStatus::Completed,
            format!("[DRY-RUN] {}", message.into()),
            None,
        )
    }

    fn finished(
        action: &Action,
        status: ActionStatus,
        message: impl Into<String>,
        error: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: action.name.clone(),
            kind: action.kind.clone(),
            status,
            started_at: now,
            ended_at: Some(now),
            message: message.into(),
            error,
            rollback_token: None,
        }
    }

    pub fn with_rollback_token(mut self, token: serde_json::Value) -> Self {
        self.rollback_token = Some(token);
        self
    }
}

/// Mutable record of one attempted playbook run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookExecution {
    pub execution_id: String,
    pub playbook_id: String,
    pub playbook_name: String,
    pub finding_id: String,
    pub initiator: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: PlaybookStatus,
    pub dry_run: bool,
    pub action_results: Vec<ActionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// Set when a rollback sub-handler failed; the terminal state
    /// stays `RolledBack` but the record needs inspection
    #[serde(default)]
    pub rollback_dirty: bool,
}

/// Expected failures of the playbook API, returned structured
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybookError {
    NotFound(String),
    State {
        execution_id: String,
        status: PlaybookStatus,
        operation: &'static str,
    },
    Validation(String),
    HandlerMissing(String),
    ResourceExhausted,
}

impl std::fmt::Display for PlaybookError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybookError::NotFound(id) => write!(f, "execution not found: {id}"),
            PlaybookError::State {
                execution_id,
                status,
                operation,
            } => write!(
                f,
                "cannot {operation} execution {execution_id} in status {status}"
            ),
            PlaybookError::Validation(msg) => write!(f, "invalid playbook: {msg}"),
            PlaybookError::HandlerMissing(kind) => {
                write!(f, "no handler registered for action kind {kind:?}")
            }
            PlaybookError::ResourceExhausted => {
                write!(f, "concurrent playbook execution limit reached")
            }
        }
    }
}

impl std::error::Error for PlaybookError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_an_immutable_playbook() {
        let playbook = Playbook::builder("TEST-1", "Test")
            .category("Storage")
            .severity(Severity::High)
            .action(Action::new("step", ActionKind::Notification, serde_json::json!({})))
            .build()
            .unwrap();
        assert_eq!(playbook.id, "TEST-1");
        assert!(playbook.requires_approval);
        assert_eq!(playbook.timeout, Duration::from_secs(300));
    }

    #[test]
    fn builder_rejects_empty_and_duplicate_shapes() {
        assert!(Playbook::builder("", "x")
            .action(Action::new("a", ActionKind::Notification, serde_json::json!({})))
            .build()
            .is_err());
        assert!(Playbook::builder("P", "x").build().is_err());
        assert!(Playbook::builder("P", "x")
            .action(Action::new("a", ActionKind::Notification, serde_json::json!({})))
            .action(Action::new("a", ActionKind::Script, serde_json::json!({})))
            .build()
            .is_err());
    }

    #[test]
    fn action_kind_round_trips_through_strings() {
        assert_eq!(ActionKind::from("aws".to_string()), ActionKind::Aws);
        assert_eq!(
            ActionKind::from("pagerduty".to_string()),
            ActionKind::Custom("pagerduty".to_string())
        );
        assert_eq!(ActionKind::Azure.as_str(), "azure");
        assert!(!ActionKind::Custom("x".into()).is_builtin());
    }

    #[test]
    fn terminal_states() {
        assert!(PlaybookStatus::Completed.is_terminal());
        assert!(PlaybookStatus::Failed.is_terminal());
        assert!(PlaybookStatus::Rejected.is_terminal());
        assert!(PlaybookStatus::RolledBack.is_terminal());
        assert!(!PlaybookStatus::Running.is_terminal());
        assert!(!PlaybookStatus::AwaitingApproval.is_terminal());
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert_eq!(Severity::parse("critical"), Some(Severity::Critical));
        assert_eq!(Severity::parse("nope"), None);
    }
}
