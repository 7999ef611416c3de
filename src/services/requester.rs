// src/services/requester.rs

//! Imageboard API client.

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{ApiConfig, ThreadData, ThreadList, ThreadPosts};
use crate::utils::http::fetch_json;
use crate::utils::url::expand;

/// Source of board and thread data.
#[async_trait]
pub trait Requester: Send + Sync {
    /// List the threads currently on a board.
    async fn list_threads(&self, board: &str) -> Result<ThreadList>;

    /// Fetch every post of one thread.
    async fn get_thread(&self, board: &str, thread_id: &str) -> Result<ThreadPosts>;

    /// Turn a file's relative path into a fetchable URL.
    fn resource_url(&self, path: &str) -> String;
}

/// Requester backed by the imageboard's JSON API.
pub struct ApiRequester {
    client: reqwest::Client,
    api: ApiConfig,
}

impl ApiRequester {
    pub fn new(client: reqwest::Client, api: ApiConfig) -> Self {
        Self { client, api }
    }

    fn threads_url(&self, board: &str) -> String {
        expand(&self.api.threads_url, &[("board", board)])
    }

    fn thread_url(&self, board: &str, thread_id: &str) -> String {
        expand(
            &self.api.thread_url,
            &[("board", board), ("thread", thread_id)],
        )
    }
}

#[async_trait]
impl Requester for ApiRequester {
    async fn list_threads(&self, board: &str) -> Result<ThreadList> {
        let url = self.threads_url(board);
        log::debug!("Listing threads of /{}/ from {}", board, url);
        fetch_json(&self.client, &url)
            .await
            .map_err(|e| AppError::fetch(format!("board /{board}/"), e))
    }

    async fn get_thread(&self, board: &str, thread_id: &str) -> Result<ThreadPosts> {
        let url = self.thread_url(board, thread_id);
        log::debug!("Fetching thread {} from {}", thread_id, url);
        let data: ThreadData = fetch_json(&self.client, &url)
            .await
            .map_err(|e| AppError::fetch(format!("thread /{board}/{thread_id}"), e))?;
        Ok(data.into_posts())
    }

    fn resource_url(&self, path: &str) -> String {
        expand(&self.api.resource_url, &[("path", path)])
    }
}
