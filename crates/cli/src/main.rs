mod metrics;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use torrentfed_core::{
    load_config, validate_config, Aggregator, Config, ResultCache, TorrentResult,
};

#[derive(Debug, Parser)]
#[command(name = "torrentfed")]
#[command(about = "Find torrents for IMDb ids across several sources")]
struct Args {
    /// Query only this source instead of all of them
    #[arg(long)]
    source: Option<String>,

    /// Print Prometheus metrics to stderr when done
    #[arg(long)]
    metrics: bool,

    /// Configuration file
    #[arg(long, env = "TORRENTFED_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// IMDb ids to search for, e.g. tt0111161
    #[arg(required = true)]
    imdb_ids: Vec<String>,
}

/// One line of output per identifier.
#[derive(Debug, Serialize)]
struct Output<'a> {
    imdb_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    results: Option<Vec<TorrentResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> Output<'a> {
    fn new<E: std::fmt::Display>(imdb_id: &'a str, outcome: Result<Vec<TorrentResult>, E>) -> Self {
        match outcome {
            Ok(results) => Self {
                imdb_id,
                results: Some(results),
                error: None,
            },
            Err(e) => Self {
                imdb_id,
                results: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config_path = &args.config;

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;
    info!("Configuration loaded successfully");

    let cache = Arc::new(open_cache(&config));
    let aggregator = Aggregator::from_config(&config, Arc::clone(&cache))
        .context("Failed to create torrent sources")?;
    info!(
        "Initialized sources: {:?}",
        aggregator.sources().keys().collect::<Vec<_>>()
    );

    for imdb_id in &args.imdb_ids {
        let output = match &args.source {
            Some(name) => {
                let source = aggregator
                    .sources()
                    .get(name)
                    .with_context(|| format!("Unknown source {:?}", name))?;
                Output::new(imdb_id, source.check(imdb_id).await)
            }
            None => Output::new(imdb_id, aggregator.find_results(imdb_id).await),
        };
        println!(
            "{}",
            serde_json::to_string(&output).context("Failed to serialize results")?
        );
    }

    // A single-source query never leaves anything running.
    if args.source.is_none() {
        settle_background_searches(&aggregator).await;
    }

    if let Some(path) = &config.cache.persist_path {
        match cache.save_to_file(path) {
            Ok(entries) => info!("Saved {} cache entries to {:?}", entries, path),
            Err(e) => warn!("Couldn't save cache to {:?}: {}", path, e),
        }
    }

    if args.metrics {
        eprint!("{}", metrics::encode_metrics()?);
    }

    Ok(())
}

/// Load the persisted cache, or start with an empty one.
fn open_cache(config: &Config) -> ResultCache {
    let max_bytes = config.cache.max_bytes;
    match &config.cache.persist_path {
        Some(path) if path.exists() => load_cache(path, max_bytes),
        _ => ResultCache::new(max_bytes),
    }
}

fn load_cache(path: &Path, max_bytes: usize) -> ResultCache {
    match ResultCache::load_from_file(path, max_bytes) {
        Ok(cache) => {
            info!("Loaded {} cache entries from {:?}", cache.len(), path);
            cache
        }
        Err(e) => {
            warn!("Couldn't load cache from {:?}, starting empty: {}", path, e);
            ResultCache::new(max_bytes)
        }
    }
}

/// Wait for searches that outlived their grace period so their results make
/// it into the cache before it is saved.
async fn settle_background_searches(aggregator: &Aggregator) {
    if aggregator.background_count().await > 0 {
        info!("Waiting for background searches to finish");
    }
    let settled = aggregator.settle_background().await;
    if settled > 0 {
        info!("Settled {} background searches", settled);
    }
}
