//! Discover command implementation.

use anyhow::{Context, Result};
use faultline_corpus::FileStore;
use faultline_discovery::{DiscoveryConfig, DiscoveryPipeline};
use faultline_embed::{CachedEmbedder, Client, ClientConfig};
use std::fs;
use std::sync::Arc;
use tracing::{info, warn};

/// Runs the discover command.
pub async fn run(
    project: &str,
    data_dir: &str,
    days_back: i64,
    config_path: Option<&str>,
    output: Option<&str>,
    skip_embeddings: bool,
) -> Result<()> {
    info!("Running discovery for project: {}", project);

    let mut config = match config_path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {path}"))?;
            serde_yaml::from_str::<DiscoveryConfig>(&raw)
                .with_context(|| format!("Failed to parse config file: {path}"))?
        }
        None => DiscoveryConfig::default(),
    };
    if skip_embeddings {
        config.skip_embeddings = true;
    }

    let store = Box::new(FileStore::new(data_dir));
    let mut pipeline = DiscoveryPipeline::new(store, config.clone());

    if !config.skip_embeddings {
        match std::env::var("OPENAI_API_KEY") {
            Ok(api_key) if !api_key.is_empty() => {
                let client = Client::new(
                    ClientConfig::new(api_key).with_model(config.embedding_model.as_str()),
                )
                .context("Failed to build embedding client")?;
                pipeline =
                    pipeline.with_embedder(Arc::new(CachedEmbedder::with_fresh_cache(client)));
            }
            _ => warn!("OPENAI_API_KEY not set, running without embeddings"),
        }
    }

    let report = pipeline
        .run(project, None, None, days_back)
        .await
        .with_context(|| format!("Discovery failed for project {project}"))?;

    println!("{}", report.summary());

    if let Some(path) = output {
        let json = serde_json::to_string_pretty(&report)
            .context("Failed to serialize report")?;
        fs::write(path, json).with_context(|| format!("Failed to write report to {path}"))?;
        info!("Wrote full report to {}", path);
    }

    Ok(())
}
