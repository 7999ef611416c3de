// src/config.rs

//! Configuration loading and wiring.
//!
//! Turns a [`Config`] into a ready-to-run [`Crawler`] with its requester and
//! delivery sink chain.

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::models::Config;
use crate::pipeline::{Crawler, CycleSettings};
use crate::services::{
    ApiRequester, ConvertingSink, FfmpegTranscoder, LogSink, Sink, WebhookSink,
};
use crate::staging::QuotaDownloader;
use crate::storage::ReadModel;
use crate::utils::http::create_async_client;

/// Load configuration from a TOML file and validate it.
///
/// Falls back to defaults if the file cannot be read.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load_or_default(path);
    config.validate()?;
    Ok(config)
}

/// Build the delivery chain: webhook or log, optionally behind conversion.
pub fn build_sink(config: &Config, client: &reqwest::Client) -> Result<Arc<dyn Sink>> {
    let base: Arc<dyn Sink> = match &config.delivery.webhook_url {
        Some(url) => {
            log::info!("Delivering through webhook {}", url);
            Arc::new(WebhookSink::new(client.clone(), url.clone()))
        }
        None => {
            log::info!("No webhook configured; deliveries are only logged");
            Arc::new(LogSink)
        }
    };

    if !config.delivery.convert_webm {
        return Ok(base);
    }
    let downloader = QuotaDownloader::from_config(&config.staging, client.clone())?;
    let transcoder = FfmpegTranscoder::new(&config.delivery.ffmpeg_path);
    Ok(Arc::new(ConvertingSink::new(
        base,
        Arc::new(downloader),
        Arc::new(transcoder),
    )))
}

/// Assemble a crawler over `read_model` from configuration.
pub fn build_crawler(config: &Config, read_model: Arc<dyn ReadModel>) -> Result<Crawler> {
    let client = create_async_client(&config.crawler)?;
    let requester = ApiRequester::new(client.clone(), config.api.clone());
    let sink = build_sink(config, &client)?;
    Ok(Crawler::new(
        read_model,
        Arc::new(requester),
        sink,
        CycleSettings::from(&config.crawler),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::storage::MemoryStore;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("missing.toml")).unwrap();
        assert_eq!(config.crawler.max_concurrent, Config::default().crawler.max_concurrent);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[crawler]\nmax_concurrent = 0\n").unwrap();
        assert!(matches!(load_config(&path), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_build_crawler_from_config() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.staging.path = tmp.path().join("staging");
        config.crawler.max_concurrent = 3;
        config.crawler.cycle_deadline_secs = 42;

        let crawler = build_crawler(&config, Arc::new(MemoryStore::default())).unwrap();
        assert_eq!(crawler.settings().max_concurrent, 3);
        assert_eq!(crawler.settings().deadline.as_secs(), 42);
        assert!(config.staging.path.is_dir());

        // No subscriptions: the cycle completes without touching the network
        let report = crawler.run_cycle().await.unwrap();
        assert_eq!(report.boards, 0);
    }
}
