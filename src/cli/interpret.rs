//! `cloudgate interpret` — resolve a phrase without executing it

use anyhow::Context;
use cloudgate::gateway::ProviderGateway;
use cloudgate::{CoreConfig, ProviderKind};

pub fn run(provider: ProviderKind, text: &str) -> anyhow::Result<()> {
    let gateway = ProviderGateway::new(provider, CoreConfig::from_env())
        .context("building provider gateway")?;
    match gateway.interpret(text) {
        Some(command) => println!("{command}"),
        None => {
            eprintln!("cannot interpret {text:?} as a {provider} command");
            std::process::exit(1);
        }
    }
    Ok(())
}
