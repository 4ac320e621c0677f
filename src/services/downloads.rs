//! Gallery downloading with bounded retries.
//!
//! Fetch attempts return an explicit outcome instead of throwing through
//! the retry path: the caller sees Done, Retry (with the delay already
//! computed) or Failed. Back-off doubles from a 350 ms base; HTTP 429
//! adds a linear penalty on top.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use log::{info, warn};

use crate::database::{net_repo, Store};
use crate::services::config::Settings;
use crate::services::images::codec;
use crate::types::models::DbId;
use crate::types::{StoreError, StoreResult};

pub const DOWNLOAD_RETRY_BASE_MS: u64 = 350;

/// Result of a single fetch attempt.
#[derive(Debug)]
pub enum DownloadOutcome {
    Done { bytes: Vec<u8>, final_url: String },
    Retry { after: Duration },
    Failed { error: String },
}

/// The HTTP client is global and initialised once.
fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .user_agent("pixvault/0.1")
            .build()
            .expect("failed to build HTTP client")
    })
}

/// Exponential back-off: base doubles per attempt.
pub fn retry_delay(attempt: u32) -> Duration {
    Duration::from_millis(DOWNLOAD_RETRY_BASE_MS * 2_u64.saturating_pow(attempt))
}

/// Strips fragments and tracking query parameters so the same target
/// always has the same identity string.
pub fn canonical_url(url: &str) -> String {
    const TRACKING_PREFIXES: [&str; 4] = ["utm_", "fbclid", "gclid", "ref_src"];

    let without_fragment = url.split('#').next().unwrap_or(url);
    let Some((base, query)) = without_fragment.split_once('?') else {
        return without_fragment.to_string();
    };

    let kept: Vec<&str> = query
        .split('&')
        .filter(|param| {
            let key = param.split('=').next().unwrap_or("");
            !TRACKING_PREFIXES
                .iter()
                .any(|prefix| key.starts_with(prefix) || key == prefix.trim_end_matches('_'))
        })
        .collect();

    if kept.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{}", kept.join("&"))
    }
}

pub struct Downloader {
    max_retries: u32,
    http_debug: bool,
}

impl Downloader {
    pub fn new(settings: &Settings) -> Self {
        Self {
            max_retries: settings.max_download_retries,
            http_debug: settings.http_debug,
        }
    }

    /// One fetch attempt classified into an outcome.
    pub async fn fetch_once(&self, url: &str, referrer: &str, attempt: u32) -> DownloadOutcome {
        if self.http_debug {
            info!("Fetching (attempt {attempt}): {url}");
        }

        let mut request = http_client().get(url);
        if !referrer.is_empty() {
            request = request.header(reqwest::header::REFERER, referrer);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                // Connection problems are retryable.
                if self.http_debug {
                    warn!("Request error for {url}: {e}");
                }
                return DownloadOutcome::Retry {
                    after: retry_delay(attempt),
                };
            }
        };

        let status = response.status();
        let final_url = response.url().to_string();

        if status.as_u16() == 429 {
            // Being told to slow down: add a linear penalty on top of the
            // exponential delay.
            let after =
                retry_delay(attempt) + Duration::from_millis(DOWNLOAD_RETRY_BASE_MS * u64::from(attempt + 1));
            return DownloadOutcome::Retry { after };
        }

        if status.is_server_error() {
            return DownloadOutcome::Retry {
                after: retry_delay(attempt),
            };
        }

        if !status.is_success() {
            return DownloadOutcome::Failed {
                error: format!("HTTP {status} for {url}"),
            };
        }

        match response.bytes().await {
            Ok(bytes) => DownloadOutcome::Done {
                bytes: bytes.to_vec(),
                final_url,
            },
            Err(e) => {
                if self.http_debug {
                    warn!("Body read error for {url}: {e}");
                }
                DownloadOutcome::Retry {
                    after: retry_delay(attempt),
                }
            }
        }
    }

    /// Fetches with bounded retries, sleeping the outcome-provided delay
    /// between attempts.
    pub async fn fetch_with_retries(&self, url: &str, referrer: &str) -> Result<Vec<u8>, String> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url, referrer, attempt).await {
                DownloadOutcome::Done { bytes, .. } => return Ok(bytes),
                DownloadOutcome::Failed { error } => return Err(error),
                DownloadOutcome::Retry { after } => {
                    attempt += 1;
                    if attempt >= self.max_retries {
                        return Err(format!("download failed after {attempt} attempts: {url}"));
                    }
                    warn!(
                        "Retrying download in {} ms (attempt {attempt}): {url}",
                        after.as_millis()
                    );
                    tokio::time::sleep(after).await;
                }
            }
        }
    }

    /// Downloads every file of a gallery into the staging folder and
    /// marks the gallery downloaded. Files that fail all retries or are
    /// not images are skipped.
    pub async fn download_gallery(
        &self,
        store: &Store,
        settings: &Settings,
        gallery_id: DbId,
    ) -> StoreResult<Vec<PathBuf>> {
        let mut conn = store.conn().await?;

        let gallery = net_repo::select_net_gallery_by_id(store, &mut conn, gallery_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("net gallery {gallery_id}")))?;
        let files = net_repo::select_net_files_from_gallery(&mut conn, gallery_id).await?;
        drop(conn);

        let staging = settings.staging_folder();
        std::fs::create_dir_all(&staging)?;

        let mut saved = Vec::new();
        for file in &files {
            let url = canonical_url(&file.file_url);
            let bytes = match self.fetch_with_retries(&url, &file.page_referrer).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Giving up on {url}: {e}");
                    continue;
                }
            };

            if !codec::is_bytes_an_image(&bytes) {
                warn!("Downloaded data is not an image, skipping: {url}");
                continue;
            }

            let name = if file.preferred_name.is_empty() {
                format!("netfile_{}", file.id)
            } else {
                file.preferred_name.clone()
            };
            let target = staging.join(name);
            std::fs::write(&target, &bytes)?;
            saved.push(target);
        }

        let mut conn = store.conn().await?;
        gallery.set_downloaded(true);
        net_repo::update_net_gallery(&mut conn, &gallery).await?;
        info!(
            "Downloaded {} of {} files for gallery {gallery_id}",
            saved.len(),
            files.len()
        );

        Ok(saved)
    }
}

#[cfg(test)]
#[path = "tests/downloads_tests.rs"]
mod tests;
