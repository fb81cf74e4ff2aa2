//! Breakwater diagnostics binary
//!
//! Inspects provider discovery, health, and circuit breaker state for the
//! current environment.

use breakwater::cli::{Cli, Command, environment_reference};
use breakwater::{ProviderContext, ProviderName, telemetry};
use clap::Parser;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    telemetry::init("info");

    match cli.command {
        Command::Env => {
            print!("{}", environment_reference());
        }
        Command::Providers => {
            let context = ProviderContext::from_env()?;
            let discovered = context.discover().await;
            tracing::info!(providers = discovered, "Discovery complete");

            let stats = context.get_provider_stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Probe { name } => {
            let context = ProviderContext::from_env()?;
            context.discover().await;

            let provider = ProviderName::from(name.as_str());
            let status = context.force_health_check(&provider).await;
            println!("{}: {}", provider, status.as_str());
        }
    }

    Ok(())
}
