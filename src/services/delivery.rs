// src/services/delivery.rs

//! Delivery sinks.
//!
//! A sink receives one matched file together with the users it is meant for.
//! Sinks are called fire-and-forget from the sync cycle; their errors are
//! logged by the caller and never retried.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::User;
use crate::services::transcode::Transcoder;
use crate::staging::{QuotaDownloader, STAGED_EXTENSION};

/// Destination for matched files.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Deliver the remote resource at `locator` to every recipient.
    async fn send(&self, recipients: &[User], locator: &str, caption: &str) -> Result<()>;

    /// Deliver a local file to every recipient.
    ///
    /// The file may be deleted as soon as this returns, so the contents must
    /// be consumed before then.
    async fn send_file(&self, recipients: &[User], path: &Path, caption: &str) -> Result<()> {
        self.send(recipients, &path.to_string_lossy(), caption).await
    }
}

/// Sink that only logs what would be delivered.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

#[async_trait]
impl Sink for LogSink {
    async fn send(&self, recipients: &[User], locator: &str, caption: &str) -> Result<()> {
        let chats: Vec<i64> = recipients.iter().map(|u| u.chat_id).collect();
        log::info!("Deliver {} [{}] to chats {:?}", locator, caption, chats);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    chat_ids: Vec<i64>,
    resource: &'a str,
    caption: &'a str,
}

/// Sink that POSTs each delivery to a webhook.
///
/// Remote resources are sent as JSON `{chat_ids, resource, caption}`; local
/// files are uploaded as `multipart/form-data` with `chat_ids` (a JSON
/// array), `caption` and `file` fields.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    async fn post(&self, request: reqwest::RequestBuilder) -> Result<()> {
        request
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| AppError::fetch(&self.url, e))?;
        Ok(())
    }
}

#[async_trait]
impl Sink for WebhookSink {
    async fn send(&self, recipients: &[User], locator: &str, caption: &str) -> Result<()> {
        let payload = WebhookPayload {
            chat_ids: recipients.iter().map(|u| u.chat_id).collect(),
            resource: locator,
            caption,
        };
        self.post(self.client.post(&self.url).json(&payload)).await?;
        log::debug!("Webhook accepted {} for {} chats", locator, recipients.len());
        Ok(())
    }

    async fn send_file(&self, recipients: &[User], path: &Path, caption: &str) -> Result<()> {
        let bytes = tokio::fs::read(path).await?;
        let size = bytes.len();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let chat_ids: Vec<i64> = recipients.iter().map(|u| u.chat_id).collect();

        let form = Form::new()
            .text("chat_ids", serde_json::to_string(&chat_ids)?)
            .text("caption", caption.to_string())
            .part("file", Part::bytes(bytes).file_name(file_name));
        self.post(self.client.post(&self.url).multipart(form)).await?;
        log::debug!(
            "Webhook accepted upload {} ({} bytes) for {} chats",
            path.display(),
            size,
            recipients.len()
        );
        Ok(())
    }
}

/// Sink that stages and converts `.webm` files before handing them on.
///
/// Other files are passed through unchanged. The staged original and the
/// converted output are freed whether or not conversion succeeds.
pub struct ConvertingSink {
    inner: Arc<dyn Sink>,
    downloader: Arc<QuotaDownloader>,
    transcoder: Arc<dyn Transcoder>,
}

impl ConvertingSink {
    pub fn new(
        inner: Arc<dyn Sink>,
        downloader: Arc<QuotaDownloader>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            inner,
            downloader,
            transcoder,
        }
    }

    async fn convert_and_send(
        &self,
        recipients: &[User],
        url: &str,
        converted_url: &str,
        caption: &str,
    ) -> Result<()> {
        let staged = self.downloader.save(url).await?;
        let output: PathBuf = self.downloader.get(converted_url);

        let converted = self.transcoder.convert(&staged, &output).await;
        let sent = match converted {
            Ok(()) => self.inner.send_file(recipients, &output, caption).await,
            Err(e) => Err(e),
        };

        if let Err(e) = self.downloader.free(url).await {
            log::warn!("Failed to free staged {}: {}", url, e);
        }
        if output.exists() {
            if let Err(e) = self.downloader.free(converted_url).await {
                log::warn!("Failed to free converted {}: {}", converted_url, e);
            }
        }
        sent
    }
}

#[async_trait]
impl Sink for ConvertingSink {
    async fn send(&self, recipients: &[User], locator: &str, caption: &str) -> Result<()> {
        match locator.strip_suffix(STAGED_EXTENSION) {
            Some(stem) => {
                let converted_url = format!("{stem}.mp4");
                self.convert_and_send(recipients, locator, &converted_url, caption)
                    .await
            }
            None => self.inner.send(recipients, locator, caption).await,
        }
    }

    async fn send_file(&self, recipients: &[User], path: &Path, caption: &str) -> Result<()> {
        self.inner.send_file(recipients, path, caption).await
    }
}
