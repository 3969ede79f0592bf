//! `cloudgate contexts` — show the context a gateway would run in

use cloudgate::gateway::ProviderContext;
use cloudgate::ProviderKind;

pub fn run(provider: ProviderKind, context: &ProviderContext) {
    println!("provider: {provider}");
    match provider {
        ProviderKind::Aws => {
            println!("profile: {}", context.profile.as_deref().unwrap_or("(default)"));
            println!("region: {}", context.region.as_deref().unwrap_or("(unset)"));
        }
        ProviderKind::Azure => {
            println!(
                "subscription: {}",
                context.subscription_id.as_deref().unwrap_or("(unset)")
            );
            println!("tenant: {}", context.tenant_id.as_deref().unwrap_or("(unset)"));
        }
        ProviderKind::Gcp => {
            println!("project: {}", context.project_id.as_deref().unwrap_or("(unset)"));
        }
    }
}
