//! Quota-bounded disk staging.
//!
//! Files that must be converted before delivery are downloaded here first.
//! Every staged byte is accounted in a [`SpaceLedger`]; a file is reserved
//! before it is written and released after it is deleted.
//!
//! ## Layout
//!
//! ```text
//! {root}/
//! ├── 2chhkbsrc1100.webm    # staged original
//! └── 2chhkbsrc1100.mp4     # conversion output (not counted)
//! ```

mod ledger;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::StagingConfig;
use crate::utils::http;
use crate::utils::url::staged_name;

pub use ledger::SpaceLedger;

/// Extension of files that are counted against the quota.
pub const STAGED_EXTENSION: &str = ".webm";

#[derive(Debug)]
struct StagedFile {
    size: u64,
    refs: usize,
}

/// Downloads remote files into a size-limited directory.
#[derive(Debug)]
pub struct QuotaDownloader {
    root: PathBuf,
    ledger: SpaceLedger,
    client: reqwest::Client,
    reserve_wait: Duration,
    staged: Mutex<HashMap<PathBuf, StagedFile>>,
    temp_counter: AtomicU64,
}

impl QuotaDownloader {
    /// Create a downloader rooted at `root`, creating the directory.
    pub fn new(
        root: impl Into<PathBuf>,
        max_space: u64,
        reserve_wait: Duration,
        client: reqwest::Client,
    ) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            ledger: SpaceLedger::new(max_space),
            client,
            reserve_wait,
            staged: Mutex::new(HashMap::new()),
            temp_counter: AtomicU64::new(0),
        })
    }

    pub fn from_config(config: &StagingConfig, client: reqwest::Client) -> Result<Self> {
        Self::new(
            &config.path,
            config.max_space_bytes,
            Duration::from_secs(config.reserve_wait_secs),
            client,
        )
    }

    pub fn ledger(&self) -> &SpaceLedger {
        &self.ledger
    }

    /// Local path for a URL. Pure function of the URL string.
    pub fn get(&self, url: &str) -> PathBuf {
        self.root.join(staged_name(url))
    }

    /// Download `url` into the staging area and return its local path.
    pub async fn save(&self, url: &str) -> Result<PathBuf> {
        let path = self.get(url);
        if self.acquire_existing(&path).await {
            log::debug!("Reusing staged file {}", path.display());
            return Ok(path);
        }

        let bytes = http::fetch_bytes(&self.client, url)
            .await
            .map_err(|e| AppError::fetch(url, e))?;
        self.stage_bytes(url, &bytes).await
    }

    /// Store already fetched content for `url` under the quota.
    pub async fn stage_bytes(&self, url: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.get(url);
        let size = bytes.len() as u64;

        self.ledger.reserve(size, self.reserve_wait).await?;

        let tmp = self.temp_path(&path);
        if let Err(e) = tokio::fs::write(&tmp, bytes).await {
            self.ledger.release(size);
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AppError::Io(e));
        }

        let mut staged = self.staged.lock().await;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            drop(staged);
            self.ledger.release(size);
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AppError::Io(e));
        }

        let duplicate = match staged.entry(path.clone()) {
            Entry::Occupied(mut entry) => {
                // Same URL staged concurrently; keep the first reservation.
                entry.get_mut().refs += 1;
                true
            }
            Entry::Vacant(entry) => {
                entry.insert(StagedFile { size, refs: 1 });
                false
            }
        };
        drop(staged);

        if duplicate {
            self.ledger.release(size);
        } else {
            log::debug!(
                "Staged {} ({} bytes, {} of {} in use)",
                path.display(),
                size,
                self.ledger.loaded(),
                self.ledger.max_space()
            );
        }

        Ok(path)
    }

    /// Delete the local copy of `url` and release its reservation.
    ///
    /// Names without [`STAGED_EXTENSION`] were never reserved and are only
    /// deleted.
    pub async fn free(&self, url: &str) -> Result<()> {
        let path = self.get(url);
        if !url.ends_with(STAGED_EXTENSION) {
            tokio::fs::remove_file(&path).await?;
            return Ok(());
        }

        let mut staged = self.staged.lock().await;
        let released = match staged.get(&path).map(|file| file.refs) {
            Some(refs) if refs > 1 => {
                if let Some(file) = staged.get_mut(&path) {
                    file.refs -= 1;
                }
                return Ok(());
            }
            Some(_) => staged.remove(&path).map(|file| file.size),
            None => None,
        };
        let removed = tokio::fs::remove_file(&path).await;
        drop(staged);

        if let Some(size) = released {
            self.ledger.release(size);
            log::debug!(
                "Freed {} ({} bytes, {} in use)",
                path.display(),
                size,
                self.ledger.loaded()
            );
        }
        removed?;
        Ok(())
    }

    async fn acquire_existing(&self, path: &Path) -> bool {
        let mut staged = self.staged.lock().await;
        match staged.get_mut(path) {
            Some(file) => {
                file.refs += 1;
                true
            }
            None => false,
        }
    }

    fn temp_path(&self, path: &Path) -> PathBuf {
        let n = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(format!(".part{n}"));
        path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::utils::test_server::client;
    use tempfile::TempDir;

    const URL: &str = "https://s1.webmshare.com/DBj7M.webm";

    fn downloader(dir: &TempDir, max_space: u64) -> QuotaDownloader {
        QuotaDownloader::new(
            dir.path(),
            max_space,
            Duration::from_millis(50),
            client(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_is_pure() {
        let tmp = TempDir::new().unwrap();
        let d = downloader(&tmp, 1_000);
        let path = d.get(URL);
        assert_eq!(path, tmp.path().join("s1webmshare.comDBj7M.webm"));
        assert!(!path.exists());
        assert_eq!(d.get(URL), path);
    }

    #[tokio::test]
    async fn test_stage_and_free() {
        let tmp = TempDir::new().unwrap();
        let d = downloader(&tmp, 1_000);

        let path = d.stage_bytes(URL, &[7u8; 300]).await.unwrap();
        assert_eq!(path, d.get(URL));
        assert_eq!(std::fs::read(&path).unwrap().len(), 300);
        assert_eq!(d.ledger().loaded(), 300);

        d.free(URL).await.unwrap();
        assert!(!path.exists());
        assert_eq!(d.ledger().loaded(), 0);
    }

    #[tokio::test]
    async fn test_too_large_file_is_rejected_without_ledger_change() {
        let tmp = TempDir::new().unwrap();
        let d = downloader(&tmp, 100);

        let result = d.stage_bytes(URL, &[0u8; 100]).await;
        assert!(matches!(result, Err(AppError::FileTooLarge { size: 100, max: 100 })));
        assert_eq!(d.ledger().loaded(), 0);
        assert!(!d.get(URL).exists());
    }

    #[tokio::test]
    async fn test_quota_exhausted_leaves_ledger_untouched() {
        let tmp = TempDir::new().unwrap();
        let d = downloader(&tmp, 100);

        d.stage_bytes(URL, &[0u8; 80]).await.unwrap();
        let other = "https://host.com/other.webm";
        let result = d.stage_bytes(other, &[0u8; 30]).await;
        assert!(matches!(result, Err(AppError::QuotaExhausted { size: 30 })));
        assert_eq!(d.ledger().loaded(), 80);
        assert!(!d.get(other).exists());
    }

    #[tokio::test]
    async fn test_failed_fetch_is_fetch_error() {
        let tmp = TempDir::new().unwrap();
        let d = downloader(&tmp, 1_000);
        // Nothing listens on port 1
        let url = "http://127.0.0.1:1/x.webm";

        let result = d.save(url).await;
        assert!(matches!(result, Err(AppError::Fetch { .. })), "{result:?}");
        assert_eq!(d.ledger().loaded(), 0);
        assert!(!d.get(url).exists());
    }

    #[tokio::test]
    async fn test_write_failure_releases_reservation() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("staging");
        let d = QuotaDownloader::new(&root, 1_000, Duration::from_millis(50), client()).unwrap();
        std::fs::remove_dir_all(&root).unwrap();

        let result = d.stage_bytes(URL, &[0u8; 300]).await;
        assert!(matches!(result, Err(AppError::Io(_))), "{result:?}");
        assert_eq!(d.ledger().loaded(), 0);
    }

    #[tokio::test]
    async fn test_save_downloads_into_staging() {
        let tmp = TempDir::new().unwrap();
        let d = downloader(&tmp, 1_000);
        let (base, _request) = crate::utils::test_server::serve_once(200, vec![3u8; 120]).await;
        let url = format!("{base}/b/src/7.webm");

        let path = d.save(&url).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![3u8; 120]);
        assert_eq!(d.ledger().loaded(), 120);

        d.free(&url).await.unwrap();
        assert_eq!(d.ledger().loaded(), 0);
    }

    #[tokio::test]
    async fn test_free_converted_output_is_plain_delete() {
        let tmp = TempDir::new().unwrap();
        let d = downloader(&tmp, 1_000);

        d.stage_bytes(URL, &[0u8; 200]).await.unwrap();
        let mp4_url = URL.replace(".webm", ".mp4");
        let mp4 = d.get(&mp4_url);
        std::fs::write(&mp4, b"converted").unwrap();

        d.free(&mp4_url).await.unwrap();
        assert!(!mp4.exists());
        assert_eq!(d.ledger().loaded(), 200);

        d.free(URL).await.unwrap();
        assert_eq!(d.ledger().loaded(), 0);
    }

    #[tokio::test]
    async fn test_free_missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let d = downloader(&tmp, 1_000);
        assert!(matches!(d.free(URL).await, Err(AppError::Io(_))));
        assert_eq!(d.ledger().loaded(), 0);
    }

    #[tokio::test]
    async fn test_shared_file_released_by_last_free() {
        let tmp = TempDir::new().unwrap();
        let d = downloader(&tmp, 1_000);

        d.stage_bytes(URL, &[0u8; 100]).await.unwrap();
        assert!(d.acquire_existing(&d.get(URL)).await);
        assert_eq!(d.ledger().loaded(), 100);

        d.free(URL).await.unwrap();
        assert!(d.get(URL).exists());
        assert_eq!(d.ledger().loaded(), 100);

        d.free(URL).await.unwrap();
        assert!(!d.get(URL).exists());
        assert_eq!(d.ledger().loaded(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_staging_respects_quota() {
        let tmp = TempDir::new().unwrap();
        let d = Arc::new(QuotaDownloader::new(
            tmp.path(),
            1_000,
            Duration::from_secs(10),
            client(),
        )
        .unwrap());

        let mut tasks = Vec::new();
        for i in 0..20 {
            let d = Arc::clone(&d);
            tasks.push(tokio::spawn(async move {
                let url = format!("https://host.com/src/{i}.webm");
                d.stage_bytes(&url, &[1u8; 300]).await.unwrap();
                assert!(d.ledger().loaded() < 1_000);
                d.free(&url).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(d.ledger().loaded(), 0);
    }
}
