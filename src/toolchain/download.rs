// pgdump-provision/src/toolchain/download.rs
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::errors::{AppError, Result};

#[cfg(windows)]
pub const INSTALLER_FILE_NAME: &str = "psql_installer.exe";
#[cfg(not(windows))]
pub const INSTALLER_FILE_NAME: &str = "psql_installer.run";

/// Fetches an installer binary into a local cache directory.
#[async_trait]
pub trait InstallerFetcher: Send + Sync {
    /// Downloads `url` to `dest_dir/INSTALLER_FILE_NAME` and returns that path.
    /// On failure the destination file must be treated as garbage.
    async fn download(&self, url: &str, dest_dir: &Path) -> Result<PathBuf>;
}

pub struct HttpInstallerFetcher {
    client: reqwest::Client,
}

impl HttpInstallerFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        HttpInstallerFetcher { client }
    }
}

#[async_trait]
impl InstallerFetcher for HttpInstallerFetcher {
    async fn download(&self, url: &str, dest_dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dest_dir).await.map_err(|e| {
            AppError::Download(format!(
                "failed to create installer directory {}: {}",
                dest_dir.display(),
                e
            ))
        })?;

        let destination_path = dest_dir.join(INSTALLER_FILE_NAME);
        if tokio::fs::try_exists(&destination_path).await.unwrap_or(false) {
            tokio::fs::remove_file(&destination_path).await.map_err(|e| {
                AppError::Download(format!(
                    "failed to remove stale installer {}: {}",
                    destination_path.display(),
                    e
                ))
            })?;
        }

        info!(url = %url, destination = %destination_path.display(), "downloading PostgreSQL installer");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::Download(format!("GET {}: {}", url, e)))?;

        let mut output_file = File::create(&destination_path).await.map_err(|e| {
            AppError::Download(format!(
                "failed to create {}: {}",
                destination_path.display(),
                e
            ))
        })?;

        let mut body = response.bytes_stream();
        let mut total_bytes_downloaded = 0usize;
        while let Some(chunk) = body.next().await {
            let chunk = chunk
                .map_err(|e| AppError::Download(format!("reading body of {}: {}", url, e)))?;
            output_file.write_all(&chunk).await.map_err(|e| {
                AppError::Download(format!(
                    "failed to write {}: {}",
                    destination_path.display(),
                    e
                ))
            })?;
            total_bytes_downloaded += chunk.len();
        }
        output_file.flush().await.map_err(|e| {
            AppError::Download(format!(
                "failed to flush {}: {}",
                destination_path.display(),
                e
            ))
        })?;

        info!(bytes = total_bytes_downloaded, "installer downloaded");
        Ok(destination_path)
    }
}
