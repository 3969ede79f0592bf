//! `cloudgate playbook` — list and run built-in remediation playbooks

use std::sync::Arc;

use anyhow::{bail, Context};
use cloudgate::gateway::{ProviderContext, ProviderGateway};
use cloudgate::playbook::executor::{HistoryFilter, PlaybookExecutor};
use cloudgate::playbook::{library, PlaybookStatus};
use cloudgate::{CoreConfig, Finding, ProviderKind};

pub fn list() {
    for playbook in library::all() {
        println!(
            "{:<22} {:<10} {:<10} {} action(s)  {}",
            playbook.id,
            playbook.severity,
            playbook.category,
            playbook.actions.len(),
            playbook.name
        );
    }
}

pub fn show(id: &str) -> anyhow::Result<()> {
    let Some(playbook) = library::get(id) else {
        bail!("unknown playbook {id:?}");
    };
    println!("{}", serde_json::to_string_pretty(&playbook)?);
    Ok(())
}

/// Run one built-in playbook end to end in this process. When the
/// playbook gates on approval, `approver` drives the approve step;
/// without it the execution is left awaiting approval and reported.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    id: &str,
    finding_id: &str,
    category: Option<String>,
    severity: Option<String>,
    initiator: &str,
    approver: Option<String>,
    dry_run: bool,
    context: ProviderContext,
) -> anyhow::Result<()> {
    let Some(playbook) = library::get(id) else {
        bail!("unknown playbook {id:?}");
    };

    let config = CoreConfig::from_env();
    let executor = PlaybookExecutor::new(config.clone());
    for kind in [ProviderKind::Aws, ProviderKind::Gcp, ProviderKind::Azure] {
        let gateway =
            ProviderGateway::new(kind, config.clone()).context("building provider gateway")?;
        // Best effort: a missing provider binary only matters if the
        // playbook actually routes an action through that gateway.
        let _ = gateway.start(context.clone());
        executor.register_gateway(Arc::new(gateway));
    }

    let finding = Finding {
        id: finding_id.to_string(),
        category: category.unwrap_or_else(|| playbook.category.clone()),
        severity: severity.unwrap_or_else(|| playbook.severity.to_string()),
        resource: None,
        remediation_hint: None,
    };

    let mut execution = executor
        .execute(&playbook, &finding, initiator, dry_run)
        .await?;

    if execution.status == PlaybookStatus::AwaitingApproval {
        match approver {
            Some(approver) => {
                execution = executor
                    .approve(&execution.execution_id, &approver, dry_run)
                    .await?;
            }
            None => {
                println!(
                    "execution {} is awaiting approval (re-run with --approver to approve)",
                    execution.execution_id
                );
                return Ok(());
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&execution)?);
    if execution.status != PlaybookStatus::Completed {
        std::process::exit(1);
    }

    let history = executor.history(
        &HistoryFilter {
            playbook_id: Some(playbook.id.clone()),
            ..Default::default()
        },
        5,
    );
    tracing::debug!(entries = history.len(), "Execution history recorded");
    Ok(())
}
