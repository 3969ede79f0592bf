//! `cloudgate check` — classify and validate without executing

use anyhow::Context;
use cloudgate::gateway::ProviderGateway;
use cloudgate::policy::Decision;
use cloudgate::{CoreConfig, ProviderKind};

pub fn run(provider: ProviderKind, command: &str) -> anyhow::Result<()> {
    let gateway = ProviderGateway::new(provider, CoreConfig::from_env())
        .context("building provider gateway")?;
    let (classification, decision) = gateway.check(command);

    println!("tier: {}", classification.tier);
    if let Some(category) = classification.category {
        println!("category: {category}");
    }
    if let Some(matched) = &classification.matched {
        println!("matched: {matched}");
    }
    match decision {
        Decision::Allow { warnings } => {
            println!("decision: allow");
            for warning in warnings {
                println!("warning: {warning}");
            }
        }
        Decision::Deny { reason, .. } => {
            println!("decision: deny");
            println!("reason: {reason}");
            std::process::exit(1);
        }
    }
    Ok(())
}
