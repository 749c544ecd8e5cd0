//! CLI command definitions and handlers

use clap::Subcommand;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::core::batch::MAX_BATCH_ITEMS;
use crate::core::catalog::ModelCatalog;
use crate::core::client::DispatchEngine;
use crate::core::config::{EngineSettings, MODEL_CACHE_TTL};
use crate::core::models::ProviderKind;
use crate::core::store::PreferenceStore;
use crate::core::transport::ReqwestTransport;

const PROVIDERS: [&str; 3] = ["gemini", "openai", "claude"];

/// Commands for Lingua Dispatch
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Translate a single string
    Translate {
        /// Text to translate
        text: String,

        /// Source language code, or "auto"
        #[arg(short, long, default_value = "auto")]
        source_lang: String,

        /// Target language code
        #[arg(short, long)]
        target_lang: String,
    },

    /// Translate a file line by line using batched prompts
    Batch {
        /// Input file, one string per line
        #[arg(short, long)]
        file: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Source language code, or "auto"
        #[arg(short, long, default_value = "auto")]
        source_lang: String,

        /// Target language code
        #[arg(short, long)]
        target_lang: String,
    },

    /// List or refresh provider model catalogs
    Models {
        #[command(subcommand)]
        action: ModelsAction,
    },

    /// Inspect or clear cached model catalogs
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

/// `models` subcommands
#[derive(Subcommand, Debug)]
pub enum ModelsAction {
    /// Show cached models, or the built-in list when the cache is empty
    List {
        #[arg(short, long, value_parser = PROVIDERS)]
        provider: String,
    },

    /// Fetch the live catalog and cache it
    Refresh {
        #[arg(short, long, value_parser = PROVIDERS)]
        provider: String,
    },
}

/// `cache` subcommands
#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cache diagnostics without modifying anything
    Inspect {
        /// Only this provider (all if omitted)
        #[arg(short, long, value_parser = PROVIDERS)]
        provider: Option<String>,
    },

    /// Remove cached catalogs
    Clear {
        /// Only this provider (all if omitted)
        #[arg(short, long, value_parser = PROVIDERS)]
        provider: Option<String>,
    },
}

fn selected(provider: Option<&str>) -> Vec<ProviderKind> {
    match provider {
        Some(id) => vec![ProviderKind::from_id(id)],
        None => ProviderKind::ALL.to_vec(),
    }
}

fn catalog(settings: &EngineSettings, store: Arc<dyn PreferenceStore>) -> anyhow::Result<ModelCatalog> {
    let transport = Arc::new(ReqwestTransport::new()?);
    Ok(ModelCatalog::new(store, transport)
        .with_timeout(settings.gemini.timeout())
        .with_cache_bypass(settings.disable_model_cache))
}

/// Handle single-string translation
pub async fn handle_translate(
    settings: EngineSettings,
    store: Arc<dyn PreferenceStore>,
    text: String,
    source_lang: String,
    target_lang: String,
) -> anyhow::Result<()> {
    let engine = DispatchEngine::new(settings, store)?;
    let config = engine.active_config();
    info!("Translating via {} ({})", config.provider, config.model);

    let translated = engine.translate(&text, &source_lang, &target_lang).await?;
    println!("{}", translated);

    Ok(())
}

/// Handle batch file translation
pub async fn handle_batch(
    settings: EngineSettings,
    store: Arc<dyn PreferenceStore>,
    file: PathBuf,
    output: Option<PathBuf>,
    source_lang: String,
    target_lang: String,
) -> anyhow::Result<()> {
    let start_time = Instant::now();

    info!("Starting batch translation");
    info!("Input: {}", file.display());
    info!("Target language: {}", target_lang);

    let content = tokio::fs::read_to_string(&file).await?;
    let lines: Vec<String> = content.lines().map(str::to_string).collect();
    if lines.is_empty() {
        anyhow::bail!("No lines found in {}", file.display());
    }

    let engine = DispatchEngine::new(settings, store)?;

    let pb = ProgressBar::new(lines.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("=>-"),
    );

    let mut translated = Vec::with_capacity(lines.len());
    for chunk in lines.chunks(MAX_BATCH_ITEMS) {
        pb.set_message(format!("{} -> {}", source_lang, target_lang));
        translated.extend(engine.translate_batch(chunk, &source_lang, &target_lang).await?);
        pb.inc(chunk.len() as u64);
    }
    pb.finish_with_message("Completed");

    let changed = lines
        .iter()
        .zip(&translated)
        .filter(|(original, result)| original != result)
        .count();
    let body = translated.join("\n");
    match &output {
        Some(path) => tokio::fs::write(path, body + "\n").await?,
        None => println!("{}", body),
    }

    let duration = start_time.elapsed();
    info!(
        "Completed: {} lines, {} translated in {:?}",
        lines.len(),
        changed,
        duration
    );

    if let Some(path) = output {
        println!("\n✅ Translation completed!");
        println!("   Lines: {}", lines.len());
        println!("   Translated: {}", changed);
        println!("   Output: {}", path.display());
        println!("   Time: {:?}", duration);
    }

    Ok(())
}

/// Handle model catalog commands
pub async fn handle_models(
    settings: EngineSettings,
    store: Arc<dyn PreferenceStore>,
    action: ModelsAction,
) -> anyhow::Result<()> {
    let catalog = catalog(&settings, store)?;

    let (provider, models) = match action {
        ModelsAction::List { provider } => {
            let provider = ProviderKind::from_id(&provider);
            (provider, catalog.available_models(provider, MODEL_CACHE_TTL))
        }
        ModelsAction::Refresh { provider } => {
            let provider = ProviderKind::from_id(&provider);
            let api_key = &settings.provider(provider).api_key;
            (provider, catalog.refresh_models(provider, api_key).await?)
        }
    };

    let current = &settings.provider(provider).model;
    println!("{} models:", provider);
    for model in &models {
        let marker = if &model.id == current { "*" } else { " " };
        println!(" {} {:<40} {}", marker, model.id, model.label());
    }

    Ok(())
}

/// Handle cache diagnostics commands
pub async fn handle_cache(
    settings: EngineSettings,
    store: Arc<dyn PreferenceStore>,
    action: CacheAction,
) -> anyhow::Result<()> {
    let catalog = catalog(&settings, store)?;

    match action {
        CacheAction::Inspect { provider } => {
            for provider in selected(provider.as_deref()) {
                println!("{}", catalog.inspect_cache(provider));
            }
        }
        CacheAction::Clear { provider } => {
            let providers = selected(provider.as_deref());
            for provider in &providers {
                catalog.clear_cache(*provider)?;
            }
            println!("✅ Cleared {} model cache(s)", providers.len());
        }
    }

    Ok(())
}
