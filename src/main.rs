//! Cloudgate - Multi-Cloud Command Gateway
//!
//! Mediates AWS/GCP/Azure CLI commands through natural-language
//! interpretation, security policy and bounded execution, and runs
//! remediation playbooks with approval gates and rollback.

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use cloudgate::ProviderKind;

mod cli;

/// Cloudgate - Multi-Cloud Command Gateway and Remediation Engine
#[derive(Parser)]
#[command(name = "cloudgate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ContextArgs {
    /// AWS named profile
    #[arg(long)]
    profile: Option<String>,

    /// AWS region
    #[arg(long)]
    region: Option<String>,

    /// Azure subscription id
    #[arg(long)]
    subscription: Option<String>,

    /// GCP project id
    #[arg(long)]
    project: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a command (or natural-language phrase) through a gateway
    Exec {
        /// Provider: aws, gcp or azure
        provider: String,

        /// Command text, e.g. "aws s3 ls" or "list my vms"
        command: String,

        #[command(flatten)]
        context: ContextArgs,
    },

    /// Resolve a natural-language phrase to a provider command
    Interpret {
        /// Provider: aws, gcp or azure
        provider: String,

        /// Phrase to interpret
        text: String,
    },

    /// Classify and validate a command without executing it
    Check {
        /// Provider: aws, gcp or azure
        provider: String,

        /// Command to classify
        command: String,
    },

    /// Show the context a gateway would run in
    Contexts {
        /// Provider: aws, gcp or azure
        provider: String,

        #[command(flatten)]
        context: ContextArgs,
    },

    /// Manage remediation playbooks
    Playbook {
        #[command(subcommand)]
        action: PlaybookAction,
    },
}

#[derive(Subcommand)]
enum PlaybookAction {
    /// List built-in playbooks
    List,

    /// Show one playbook definition
    Show { id: String },

    /// Execute a playbook for a finding
    Run {
        /// Playbook id, e.g. AWS-PUBLIC-S3
        id: String,

        /// Finding id the execution is tied to
        #[arg(long, default_value = "manual")]
        finding: String,

        /// Finding category override
        #[arg(long)]
        category: Option<String>,

        /// Finding severity override
        #[arg(long)]
        severity: Option<String>,

        /// Who initiated the run
        #[arg(long, default_value = "operator")]
        initiator: String,

        /// Approve the execution as this user when approval is required
        #[arg(long)]
        approver: Option<String>,

        /// Run the state machine without external side effects
        #[arg(long)]
        dry_run: bool,

        #[command(flatten)]
        context: ContextArgs,
    },
}

fn parse_provider(name: &str) -> anyhow::Result<ProviderKind> {
    ProviderKind::parse(name)
        .ok_or_else(|| anyhow::anyhow!("unknown provider {name:?} (expected aws, gcp or azure)"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Exec {
            provider,
            command,
            context,
        } => {
            let provider = parse_provider(&provider)?;
            let context = cli::context_from_env(
                context.profile,
                context.region,
                context.subscription,
                context.project,
            );
            cli::exec::run(provider, &command, context).await?;
        }
        Commands::Interpret { provider, text } => {
            cli::interpret::run(parse_provider(&provider)?, &text)?;
        }
        Commands::Check { provider, command } => {
            cli::check::run(parse_provider(&provider)?, &command)?;
        }
        Commands::Contexts { provider, context } => {
            let provider = parse_provider(&provider)?;
            let context = cli::context_from_env(
                context.profile,
                context.region,
                context.subscription,
                context.project,
            );
            cli::contexts::run(provider, &context);
        }
        Commands::Playbook { action } => match action {
            PlaybookAction::List => cli::playbooks::list(),
            PlaybookAction::Show { id } => cli::playbooks::show(&id)?,
            PlaybookAction::Run {
                id,
                finding,
                category,
                severity,
                initiator,
                approver,
                dry_run,
                context,
            } => {
                let context = cli::context_from_env(
                    context.profile,
                    context.region,
                    context.subscription,
                    context.project,
                );
                cli::playbooks::run(
                    &id, &finding, category, severity, &initiator, approver, dry_run, context,
                )
                .await?;
            }
        },
    }

    Ok(())
}
