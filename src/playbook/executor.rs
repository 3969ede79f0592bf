//! Playbook execution state machine
//!
//! Runs playbook instances through `Pending -> AwaitingApproval ->
//! Running -> Completed/Failed/Rejected/RolledBack`, dispatching
//! actions strictly in declared order via the handler registry.
//! Executions are independent: the executor never holds the state
//! lock across a handler invocation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::handlers::{
    ActionHandler, HandlerContext, HandlerRegistry, NotificationHandler, ProviderHandler,
    ScriptHandler,
};
use super::{
    Action, ActionKind, ActionResult, ActionStatus, Playbook, PlaybookError, PlaybookExecution,
    PlaybookStatus,
};
use crate::gateway::ProviderGateway;
use crate::playbook::Severity;
use crate::{CoreConfig, Finding, ProviderKind};

/// Prerequisite check evaluated against the finding before any action
pub type PrerequisiteCheck = Arc<dyn Fn(&Finding) -> bool + Send + Sync>;

/// History query filter
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub playbook_id: Option<String>,
    pub finding_id: Option<String>,
}

/// What the executor needs to continue an execution after approval or
/// roll it back later
struct RunMaterial {
    playbook: Arc<Playbook>,
    finding: Finding,
}

/// Executes remediation playbooks
pub struct PlaybookExecutor {
    registry: HandlerRegistry,
    executions: Mutex<HashMap<String, PlaybookExecution>>,
    materials: Mutex<HashMap<String, RunMaterial>>,
    prerequisites: RwLock<HashMap<String, PrerequisiteCheck>>,
    limit: Arc<Semaphore>,
    sequence: AtomicU64,
}

impl PlaybookExecutor {
    /// Build an executor with the `notification` and `script` handlers
    /// registered. Provider handlers join via [`register_gateway`].
    ///
    /// [`register_gateway`]: Self::register_gateway
    pub fn new(config: CoreConfig) -> Self {
        let registry = HandlerRegistry::new();
        registry.register(&ActionKind::Notification, Arc::new(NotificationHandler));
        registry.register(&ActionKind::Script, Arc::new(ScriptHandler::new(config.clone())));
        let limit = Arc::new(Semaphore::new(config.max_concurrent_executions));
        Self {
            registry,
            executions: Mutex::new(HashMap::new()),
            materials: Mutex::new(HashMap::new()),
            prerequisites: RwLock::new(HashMap::new()),
            limit,
            sequence: AtomicU64::new(0),
        }
    }

    /// Route `aws`/`gcp`/`azure` actions through the given gateway.
    pub fn register_gateway(&self, gateway: Arc<ProviderGateway>) {
        let kind = match gateway.kind() {
            ProviderKind::Aws => ActionKind::Aws,
            ProviderKind::Gcp => ActionKind::Gcp,
            ProviderKind::Azure => ActionKind::Azure,
        };
        self.registry
            .register(&kind, Arc::new(ProviderHandler::new(gateway)));
    }

    pub fn register_handler(&self, kind: &ActionKind, handler: Arc<dyn ActionHandler>) {
        self.registry.register(kind, handler);
    }

    pub fn register_prerequisite(&self, name: impl Into<String>, check: PrerequisiteCheck) {
        self.prerequisites
            .write()
            .expect("prerequisite registry poisoned")
            .insert(name.into(), check);
    }

    /// A playbook is valid iff its shape is well-formed and every
    /// action kind resolves to a registered handler.
    pub fn validate(&self, playbook: &Playbook) -> Result<(), PlaybookError> {
        if playbook.actions.is_empty() {
            return Err(PlaybookError::Validation(format!(
                "playbook {} has no actions",
                playbook.id
            )));
        }
        for action in &playbook.actions {
            if self.registry.resolve(&action.kind).is_none() {
                return Err(PlaybookError::HandlerMissing(
                    action.kind.as_str().to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Submit a playbook for a finding. Returns the execution snapshot:
    /// `AwaitingApproval` when the playbook gates on approval,
    /// otherwise the record after the run finished.
    pub async fn execute(
        &self,
        playbook: &Playbook,
        finding: &Finding,
        initiator: &str,
        dry_run: bool,
    ) -> Result<PlaybookExecution, PlaybookError> {
        self.validate(playbook)?;

        let execution_id = self.next_execution_id(&playbook.id);
        let execution = PlaybookExecution {
            execution_id: execution_id.clone(),
            playbook_id: playbook.id.clone(),
            playbook_name: playbook.name.clone(),
            finding_id: finding.id.clone(),
            initiator: initiator.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            status: PlaybookStatus::Pending,
            dry_run,
            action_results: Vec::new(),
            approver: None,
            rejection_reason: None,
            rollback_dirty: false,
        };

        if playbook.requires_approval {
            let mut record = execution;
            record.status = PlaybookStatus::AwaitingApproval;
            tracing::info!(execution = %execution_id, playbook = %playbook.id, "Execution awaiting approval");
            self.store(record.clone(), playbook, finding);
            return Ok(record);
        }

        // Back-pressure applies before anything is recorded.
        let permit = self
            .limit
            .clone()
            .try_acquire_owned()
            .map_err(|_| PlaybookError::ResourceExhausted)?;

        self.store(execution, playbook, finding);
        self.run_actions(&execution_id, dry_run, permit).await;
        self.get(&execution_id)
            .ok_or_else(|| PlaybookError::NotFound(execution_id))
    }

    /// Approve an execution awaiting approval and run it.
    pub async fn approve(
        &self,
        execution_id: &str,
        approver: &str,
        dry_run: bool,
    ) -> Result<PlaybookExecution, PlaybookError> {
        // Claim the transition under the lock so racing approvals
        // cannot both start the run.
        {
            let mut executions = self.executions.lock().expect("executions poisoned");
            let record = executions
                .get_mut(execution_id)
                .ok_or_else(|| PlaybookError::NotFound(execution_id.to_string()))?;
            if record.status != PlaybookStatus::AwaitingApproval {
                return Err(PlaybookError::State {
                    execution_id: execution_id.to_string(),
                    status: record.status,
                    operation: "approve",
                });
            }
            record.status = PlaybookStatus::Running;
            record.approver = Some(approver.to_string());
            record.dry_run = dry_run;
        }

        let permit = match self.limit.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                // Give the slot back; the approval can be retried.
                let mut executions = self.executions.lock().expect("executions poisoned");
                if let Some(record) = executions.get_mut(execution_id) {
                    record.status = PlaybookStatus::AwaitingApproval;
                    record.approver = None;
                }
                return Err(PlaybookError::ResourceExhausted);
            }
        };

        tracing::info!(execution = %execution_id, %approver, "Execution approved");
        self.run_actions(execution_id, dry_run, permit).await;
        self.get(execution_id)
            .ok_or_else(|| PlaybookError::NotFound(execution_id.to_string()))
    }

    /// Reject an execution awaiting approval.
    pub fn reject(
        &self,
        execution_id: &str,
        rejector: &str,
        reason: &str,
    ) -> Result<PlaybookExecution, PlaybookError> {
        let mut executions = self.executions.lock().expect("executions poisoned");
        let record = executions
            .get_mut(execution_id)
            .ok_or_else(|| PlaybookError::NotFound(execution_id.to_string()))?;
        if record.status != PlaybookStatus::AwaitingApproval {
            return Err(PlaybookError::State {
                execution_id: execution_id.to_string(),
                status: record.status,
                operation: "reject",
            });
        }
        record.status = PlaybookStatus::Rejected;
        record.rejection_reason = Some(reason.to_string());
        record.ended_at = Some(Utc::now());
        tracing::info!(execution = %execution_id, %rejector, %reason, "Execution rejected");
        Ok(record.clone())
    }

    /// Roll back a completed execution: walk its action results in
    /// reverse and hand each rollback token to the matching
    /// sub-handler. Permitted exactly once, from `Completed` only.
    pub async fn rollback(&self, execution_id: &str) -> Result<PlaybookExecution, PlaybookError> {
        let (playbook, finding, dry_run, mut results) = {
            let mut executions = self.executions.lock().expect("executions poisoned");
            let record = executions
                .get_mut(execution_id)
                .ok_or_else(|| PlaybookError::NotFound(execution_id.to_string()))?;
            if record.status != PlaybookStatus::Completed {
                return Err(PlaybookError::State {
                    execution_id: execution_id.to_string(),
                    status: record.status,
                    operation: "rollback",
                });
            }

            let materials = self.materials.lock().expect("materials poisoned");
            let material = materials
                .get(execution_id)
                .ok_or_else(|| PlaybookError::NotFound(execution_id.to_string()))?;
            if !material.playbook.rollback_enabled {
                return Err(PlaybookError::Validation(format!(
                    "playbook {} does not support rollback",
                    material.playbook.id
                )));
            }

            // Claim the Completed -> RolledBack transition now; a
            // second rollback call gets StateError.
            record.status = PlaybookStatus::RolledBack;
            (
                material.playbook.clone(),
                material.finding.clone(),
                record.dry_run,
                record.action_results.clone(),
            )
        };

        tracing::info!(execution = %execution_id, playbook = %playbook.id, "Rolling back execution");
        let ctx = HandlerContext { finding, dry_run };
        let mut dirty = false;

        for result in results.iter_mut().rev() {
            if result.status != ActionStatus::Completed {
                continue;
            }
            let Some(token) = result.rollback_token.clone() else {
                result
                    .message
                    .push_str(" (no rollback token; skipped during rollback)");
                continue;
            };
            let Some(action) = playbook.actions.iter().find(|a| a.name == result.name) else {
                continue;
            };
            let Some(handler) = self.registry.resolve(&action.kind) else {
                result.error = Some("rollback handler missing".to_string());
                dirty = true;
                continue;
            };

            let outcome = handler.rollback(action, &token, &ctx).await;
            match outcome.status {
                ActionStatus::Failed => {
                    result.error = Some(
                        outcome
                            .error
                            .unwrap_or_else(|| outcome.message.clone()),
                    );
                    dirty = true;
                }
                _ => {
                    result.status = ActionStatus::RolledBack;
                    result.message = outcome.message;
                }
            }
        }

        let mut executions = self.executions.lock().expect("executions poisoned");
        let record = executions
            .get_mut(execution_id)
            .ok_or_else(|| PlaybookError::NotFound(execution_id.to_string()))?;
        record.action_results = results;
        record.rollback_dirty = dirty;
        record.ended_at = Some(Utc::now());
        Ok(record.clone())
    }

    pub fn get(&self, execution_id: &str) -> Option<PlaybookExecution> {
        self.executions
            .lock()
            .expect("executions poisoned")
            .get(execution_id)
            .cloned()
    }

    /// Query the in-memory history, newest first.
    pub fn history(&self, filter: &HistoryFilter, limit: usize) -> Vec<PlaybookExecution> {
        let executions = self.executions.lock().expect("executions poisoned");
        let mut matches: Vec<PlaybookExecution> = executions
            .values()
            .filter(|e| {
                filter
                    .playbook_id
                    .as_ref()
                    .map(|id| &e.playbook_id == id)
                    .unwrap_or(true)
                    && filter
                        .finding_id
                        .as_ref()
                        .map(|id| &e.finding_id == id)
                        .unwrap_or(true)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| b.execution_id.cmp(&a.execution_id))
        });
        matches.truncate(limit);
        matches
    }

    /// Pick built-in playbooks applicable to a finding: category must
    /// match and the finding severity must reach the playbook's.
    pub fn match_playbooks<'a>(
        &self,
        library: &'a [Playbook],
        finding: &Finding,
    ) -> Vec<&'a Playbook> {
        let severity = Severity::parse(&finding.severity).unwrap_or(Severity::Low);
        library
            .iter()
            .filter(|p| {
                p.category.eq_ignore_ascii_case(&finding.category) && severity >= p.severity
            })
            .collect()
    }

    fn next_execution_id(&self, playbook_id: &str) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!(
            "{playbook_id}-{}-{seq:04}",
            Utc::now().format("%Y%m%d%H%M%S")
        )
    }

    fn store(&self, execution: PlaybookExecution, playbook: &Playbook, finding: &Finding) {
        let id = execution.execution_id.clone();
        self.executions
            .lock()
            .expect("executions poisoned")
            .insert(id.clone(), execution);
        self.materials.lock().expect("materials poisoned").insert(
            id,
            RunMaterial {
                playbook: Arc::new(playbook.clone()),
                finding: finding.clone(),
            },
        );
    }

    fn prerequisite(&self, name: &str) -> Option<PrerequisiteCheck> {
        self.prerequisites
            .read()
            .expect("prerequisite registry poisoned")
            .get(name)
            .cloned()
    }

    /// Drive one execution through its actions. The state lock is
    /// never held across a handler call.
    async fn run_actions(&self, execution_id: &str, dry_run: bool, _permit: OwnedSemaphorePermit) {
        let (playbook, finding) = {
            let materials = self.materials.lock().expect("materials poisoned");
            match materials.get(execution_id) {
                Some(material) => (material.playbook.clone(), material.finding.clone()),
                None => return,
            }
        };

        self.update(execution_id, |record| {
            record.status = PlaybookStatus::Running;
        });

        // Prerequisites fail the execution before any action runs; an
        // unregistered check fails closed.
        for check_name in &playbook.prerequisites {
            let passed = match self.prerequisite(check_name) {
                Some(check) => check(&finding),
                None => {
                    tracing::warn!(execution = %execution_id, check = %check_name, "Unknown prerequisite check");
                    false
                }
            };
            if !passed {
                let results: Vec<ActionResult> = playbook
                    .actions
                    .iter()
                    .map(|action| {
                        ActionResult::skipped(
                            action,
                            format!("prerequisite {check_name:?} not satisfied"),
                        )
                    })
                    .collect();
                self.finish(execution_id, PlaybookStatus::Failed, results);
                return;
            }
        }

        let ctx = HandlerContext {
            finding: finding.clone(),
            dry_run,
        };
        let deadline = tokio::time::Instant::now() + playbook.timeout;
        let mut results: Vec<ActionResult> = Vec::with_capacity(playbook.actions.len());
        let mut failed = false;

        for (index, action) in playbook.actions.iter().enumerate() {
            if failed {
                results.push(ActionResult::skipped(action, "previous action failed"));
                continue;
            }

            if let Some(predicate) = &action.predicate {
                if !predicate(&finding) {
                    results.push(ActionResult::skipped(action, "condition not met"));
                    self.publish_progress(execution_id, &results);
                    continue;
                }
            }

            let Some(handler) = self.registry.resolve(&action.kind) else {
                results.push(ActionResult::failed(
                    action,
                    "no handler for action kind",
                    format!("handler {:?} missing", action.kind.as_str()),
                ));
                failed = true;
                continue;
            };

            // Expose the running action to concurrent `get` calls.
            let mut running = ActionResult::completed(action, String::new());
            running.status = ActionStatus::Running;
            running.ended_at = None;
            results.push(running);
            self.publish_progress(execution_id, &results);

            let started_at = results[index].started_at;
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let outcome = if remaining.is_zero() {
                None
            } else {
                tokio::time::timeout(remaining, handler.run(action, &ctx))
                    .await
                    .ok()
            };

            let mut result = match outcome {
                Some(result) => result,
                None => {
                    tracing::warn!(execution = %execution_id, action = %action.name, "Playbook timeout during action");
                    ActionResult::failed(
                        action,
                        "playbook timeout",
                        format!("playbook exceeded its {:?} budget", playbook.timeout),
                    )
                }
            };
            result.started_at = started_at;
            if result.status == ActionStatus::Failed {
                failed = true;
            }
            results[index] = result;
            self.publish_progress(execution_id, &results);
        }

        let status = if failed {
            PlaybookStatus::Failed
        } else {
            PlaybookStatus::Completed
        };
        self.finish(execution_id, status, results);
    }

    fn publish_progress(&self, execution_id: &str, results: &[ActionResult]) {
        self.update(execution_id, |record| {
            record.action_results = results.to_vec();
        });
    }

    fn finish(&self, execution_id: &str, status: PlaybookStatus, results: Vec<ActionResult>) {
        tracing::info!(execution = %execution_id, %status, "Execution finished");
        self.update(execution_id, |record| {
            record.status = status;
            record.action_results = results;
            record.ended_at = Some(Utc::now());
        });
    }

    fn update(&self, execution_id: &str, apply: impl FnOnce(&mut PlaybookExecution)) {
        let mut executions = self.executions.lock().expect("executions poisoned");
        if let Some(record) = executions.get_mut(execution_id) {
            apply(record);
        }
    }
}
