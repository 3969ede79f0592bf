//! `cloudgate exec` — run one command through a provider gateway

use anyhow::Context;
use cloudgate::gateway::{ProviderContext, ProviderGateway};
use cloudgate::{CoreConfig, ExecStatus, ProviderKind};

pub async fn run(
    provider: ProviderKind,
    command: &str,
    context: ProviderContext,
) -> anyhow::Result<()> {
    let gateway = ProviderGateway::new(provider, CoreConfig::from_env())
        .context("building provider gateway")?;
    gateway.start(context)?;

    let result = gateway.execute_command(command).await;

    for warning in &result.warnings {
        eprintln!("warning: {warning}");
    }
    match result.status {
        ExecStatus::Success => {
            println!("{}", result.output);
            if result.truncated {
                eprintln!("(output truncated at the configured byte cap)");
            }
        }
        ExecStatus::Error => {
            eprintln!("error ({:?}): {}", result.error_kind, result.output);
            std::process::exit(1);
        }
    }
    Ok(())
}
