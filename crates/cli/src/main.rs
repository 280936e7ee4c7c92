//! Basket CLI - migrations and basket inspection.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! basket migrate
//!
//! # Show the priced basket for an owner
//! basket get alice
//!
//! # Replace a basket
//! basket put alice --items '[{"productId":"p1","productName":"Widget","quantity":2,"unitPrice":"10.00"}]'
//! basket put alice --file basket.json
//!
//! # Delete a basket
//! basket delete alice
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use basket_service::TelemetryConfig;
use clap::{Args, Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "basket")]
#[command(author, version, about = "Basket service CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Show the priced basket for an owner
    Get {
        /// Basket owner id
        owner: String,
    },
    /// Replace the basket for an owner
    Put {
        /// Basket owner id
        owner: String,

        #[command(flatten)]
        items: ItemsSource,
    },
    /// Delete the basket for an owner
    Delete {
        /// Basket owner id
        owner: String,
    },
}

/// Where `put` reads its items from.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct ItemsSource {
    /// Items as a JSON array
    #[arg(long)]
    items: Option<String>,

    /// Path to a file holding the JSON array
    #[arg(long)]
    file: Option<PathBuf>,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &TelemetryConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let _sentry_guard = init_sentry(&TelemetryConfig::from_env());

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "basket_service=info,basket_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Get { owner } => commands::basket::get(&owner).await?,
        Commands::Put { owner, items } => {
            let items = match (items.items, items.file) {
                (Some(json), _) => commands::basket::ItemsInput::Inline(json),
                (None, Some(path)) => commands::basket::ItemsInput::File(path),
                (None, None) => return Err(commands::CommandError::MissingItems),
            };
            commands::basket::put(&owner, items).await?;
        }
        Commands::Delete { owner } => commands::basket::delete(&owner).await?,
    }
    Ok(())
}
