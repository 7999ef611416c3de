//! Local filesystem read model.
//!
//! The whole [`StoreData`] document lives in one JSON file. Every mutation
//! is applied to a copy, written atomically (temp file, then rename) and only
//! then made visible, so a failed write leaves both disk and memory as they
//! were.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{Subscription, User};
use crate::storage::{ReadModel, StoreData};

/// Read model persisted as a JSON file.
#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl LocalStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = read_json(&path).await?.unwrap_or_default();
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `f` to the document and persist the result.
    pub async fn update<T>(&self, f: impl FnOnce(&mut StoreData) -> Result<T>) -> Result<T> {
        let mut data = self.data.lock().await;
        let mut next = data.clone();
        let value = f(&mut next)?;
        write_json(&self.path, &next).await?;
        *data = next;
        Ok(value)
    }

    pub async fn snapshot(&self) -> StoreData {
        self.data.lock().await.clone()
    }
}

#[async_trait]
impl ReadModel for LocalStore {
    async fn subscriptions(&self) -> Result<Vec<Subscription>> {
        Ok(self.data.lock().await.subscriptions.clone())
    }

    async fn subscribers_of(&self, subscription: &Subscription) -> Result<Vec<User>> {
        Ok(self.data.lock().await.subscribers_of(subscription.id))
    }

    async fn cursor(&self) -> Result<u64> {
        Ok(self.data.lock().await.cursor)
    }

    async fn advance_cursor(&self, timestamp: u64) -> Result<bool> {
        let mut data = self.data.lock().await;
        if timestamp <= data.cursor {
            return Ok(false);
        }
        let mut next = data.clone();
        next.advance_cursor(timestamp);
        write_json(&self.path, &next)
            .await
            .map_err(|e| AppError::read_model(format!("cannot persist cursor: {e}")))?;
        *data = next;
        Ok(true)
    }
}

/// Read JSON data, returning None if the file doesn't exist.
async fn read_json(path: &Path) -> Result<Option<StoreData>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Io(e)),
    }
}

/// Write JSON atomically (write to temp, then rename).
async fn write_json(path: &Path, data: &StoreData) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let bytes = serde_json::to_vec_pretty(data)?;
    let tmp = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(&bytes).await?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
