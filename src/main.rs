use std::env;
use std::sync::Arc;

use falbatch::{
    logger, BatchConfig, BatchRunner, FalClient, FalConfig, GenerationSettings, KeyStore, Outcome,
    ProgressObserver,
};

struct ConsoleObserver;

impl ProgressObserver for ConsoleObserver {
    fn on_progress(&self, index: usize, outcome: &Outcome) {
        match outcome {
            Outcome::Success { path, size_bytes } => {
                log::info!(
                    "🖼 Prompt {} saved to {} ({} bytes)",
                    index + 1,
                    path.display(),
                    size_bytes
                );
            }
            Outcome::Failure { reason } => {
                log::warn!("Prompt {} failed: {}", index + 1, reason);
            }
        }
    }

    fn on_batch_complete(&self) {
        log::info!("🎉 Done");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logger::init_with_config(logger::LoggerConfig::development())?;

    match dotenv::dotenv() {
        Ok(_) => log::info!("✅ .env file loaded successfully"),
        Err(_) => log::warn!("No .env file found, using system environment variables"),
    }

    let prompts_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "prompts.txt".to_string());

    // Key resolution mirrors the desktop tool: env var first, then the
    // saved credential file.
    let key_store = KeyStore::new("config.txt");
    let mut fal_config = FalConfig::from_env();
    if fal_config.api_key.is_none() {
        fal_config.api_key = key_store.load()?;
    }
    if fal_config.api_key.is_none() {
        log::error!("No API key found; set FAL_KEY or write it to config.txt");
        std::process::exit(1);
    }
    if let Some(key) = &fal_config.api_key {
        key_store.save(key)?;
    }

    let prompts: Vec<String> = std::fs::read_to_string(&prompts_path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if prompts.is_empty() {
        log::error!("No prompts found in {}", prompts_path);
        std::process::exit(1);
    }

    let mut settings = GenerationSettings::new();
    if let Ok(model) = env::var("FALBATCH_MODEL") {
        settings = settings.with_model(model);
    }
    if let Ok(ratio) = env::var("FALBATCH_ASPECT_RATIO") {
        settings = settings.with_aspect_ratio(ratio.parse()?);
    }
    if let Ok(resolution) = env::var("FALBATCH_RESOLUTION") {
        settings = settings.with_resolution(resolution.parse()?);
    }

    log::info!("🚀 Generating {} images", prompts.len());

    let client = Arc::new(FalClient::new(fal_config)?);
    let batch_config = BatchConfig::from_env();
    let runner = BatchRunner::new(client, settings, &batch_config);

    let state = runner.run_batch(prompts, &ConsoleObserver).await?;

    log::info!(
        "{} / {} images generated ({} failed)",
        state.success_count(),
        state.total,
        state.failure_count()
    );

    Ok(())
}
