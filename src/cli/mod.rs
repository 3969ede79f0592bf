//! CLI subcommand implementations
//!
//! Thin glue over the library: each module exposes a `run` function
//! invoked from `main`. Exit codes and formatting live here, never in
//! the core.

pub mod check;
pub mod contexts;
pub mod exec;
pub mod interpret;
pub mod playbooks;

use cloudgate::gateway::ProviderContext;

/// Assemble a provider context from CLI flags, falling back to the
/// conventional environment variables.
pub fn context_from_env(
    profile: Option<String>,
    region: Option<String>,
    subscription: Option<String>,
    project: Option<String>,
) -> ProviderContext {
    ProviderContext {
        name: "default".to_string(),
        profile: profile.or_else(|| std::env::var("AWS_PROFILE").ok()),
        region: region.or_else(|| std::env::var("AWS_DEFAULT_REGION").ok()),
        subscription_id: subscription.or_else(|| std::env::var("AZURE_SUBSCRIPTION_ID").ok()),
        tenant_id: std::env::var("AZURE_TENANT_ID").ok(),
        project_id: project
            .or_else(|| std::env::var("GOOGLE_CLOUD_PROJECT").ok())
            .or_else(|| std::env::var("CLOUDSDK_CORE_PROJECT").ok()),
    }
}
