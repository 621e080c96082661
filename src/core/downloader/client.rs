use std::path::Path;

use futures_util::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::core::error::{ManagerError, ManagerResult};
use crate::core::events::{EventBus, LogLevel};

/// Bytes between two progress events.
const PROGRESS_STEP: u64 = 1024 * 1024;

/// Streaming, SHA-256 validated downloader.
pub struct Downloader {
    client: Client,
    /// Optional sink for progress lines.
    events: Option<EventBus>,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Download `url` to `dest`, optionally validating SHA-256.
    ///
    /// The body is streamed to disk and hashed on the way. On a mismatch
    /// the partial file is removed. Returns the number of bytes written.
    pub async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        sha256_expected: Option<&str>,
    ) -> ManagerResult<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ManagerError::io(parent, e))?;
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ManagerError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total_bytes = response.content_length();
        let mut stream = response.bytes_stream();
        let mut hasher = Sha256::new();
        let mut written: u64 = 0;
        let mut next_report = PROGRESS_STEP;

        // Scoped so the handle is closed before any cleanup on Windows.
        {
            let mut file = tokio::fs::File::create(dest)
                .await
                .map_err(|e| ManagerError::io(dest, e))?;

            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                hasher.update(&chunk);
                file.write_all(&chunk)
                    .await
                    .map_err(|e| ManagerError::io(dest, e))?;
                written += chunk.len() as u64;

                if written >= next_report {
                    self.report_progress(written, total_bytes);
                    next_report = written + PROGRESS_STEP;
                }
            }

            file.flush().await.map_err(|e| ManagerError::io(dest, e))?;
        }

        if let Some(expected) = sha256_expected {
            let actual = hex::encode(hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                let _ = tokio::fs::remove_file(dest).await;
                return Err(ManagerError::ChecksumMismatch {
                    path: dest.to_path_buf(),
                    expected: expected.to_string(),
                    actual,
                });
            }
        }

        info!("Downloaded {} ({} bytes) -> {:?}", url, written, dest);
        Ok(written)
    }

    fn report_progress(&self, written: u64, total: Option<u64>) {
        let line = match total {
            Some(total) if total > 0 => {
                format!("Downloaded {} of {} KiB", written / 1024, total / 1024)
            }
            _ => format!("Downloaded {} KiB", written / 1024),
        };
        match &self.events {
            Some(events) => events.emit(LogLevel::Debug, line),
            None => debug!("{}", line),
        }
    }
}
