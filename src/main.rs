//! Main entry point for the Lingua Dispatch CLI

#![forbid(unsafe_code)]

use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lingua_dispatch::cli::commands::{self, Commands};
use lingua_dispatch::{EngineSettings, JsonFileStore, PreferenceStore, ProviderKind};

/// Lingua Dispatch - multi-provider AI translation tool
#[derive(Parser, Debug)]
#[command(name = "lingua-dispatch", version, about, long_about = None)]
struct Args {
    /// Preference file (defaults to the user config directory)
    #[arg(long)]
    prefs: Option<PathBuf>,

    /// Provider to use for this run, overriding the stored preference
    #[arg(long, value_parser = ["gemini", "openai", "claude"])]
    engine: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit per-attempt debug events
    #[arg(long)]
    debug_spans: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        "debug".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .ok()
                .filter(|_| !args.verbose)
                .unwrap_or_else(|| format!("lingua_dispatch={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let store: Arc<dyn PreferenceStore> = Arc::new(match &args.prefs {
        Some(path) => JsonFileStore::open(path)?,
        None => JsonFileStore::open_default()?,
    });

    let mut settings = EngineSettings::from_env(store.as_ref())?;
    if let Some(engine) = &args.engine {
        settings.active_provider = ProviderKind::from_id(engine);
    }
    if args.debug_spans {
        settings.debug_logging = true;
    }

    // Execute command
    match args.command {
        Commands::Translate {
            text,
            source_lang,
            target_lang,
        } => {
            commands::handle_translate(settings, store, text, source_lang, target_lang).await?;
        }
        Commands::Batch {
            file,
            output,
            source_lang,
            target_lang,
        } => {
            commands::handle_batch(settings, store, file, output, source_lang, target_lang).await?;
        }
        Commands::Models { action } => {
            commands::handle_models(settings, store, action).await?;
        }
        Commands::Cache { action } => {
            commands::handle_cache(settings, store, action).await?;
        }
    }

    Ok(())
}
