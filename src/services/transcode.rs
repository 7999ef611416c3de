//! Media conversion through an external binary.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{AppError, Result};

/// Converts a staged file into a format the sink can transmit.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn convert(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Runs `ffmpeg -y -loglevel error -i <input> <output>`.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        let result = Command::new(&self.binary)
            .arg("-y")
            .args(["-loglevel", "error"])
            .arg("-i")
            .arg(input)
            .arg(output)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                AppError::Transcode(format!("cannot run {}: {e}", self.binary.display()))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(AppError::Transcode(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                result.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}
