use anyhow::{anyhow, Result};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use reqwest::Client;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use url::Url;

use super::archive::install_archives;
use super::batches::{batch_url, discover_batches, legacy_batch_urls, links_for_period};
use super::index::{ensure_index, load_manifest};
use super::return_type::ReturnType;
use crate::core::config::Config;
use crate::core::types::{DocumentSource, Manifest, ManifestSource, Period};
use crate::error::SourceError;
use crate::extract::Document;
use crate::utils::dirs::DUPLICATE_LOG_FILE;
use crate::utils::http::fetch_and_save;
use crate::utils::rate_limit::RateLimiter;

pub struct IrsSource {
    client: Client,
    config: Config,
    rate_limiter: RateLimiter,
    failed_batches: Mutex<HashSet<String>>,
    install_lock: Mutex<()>,
}

impl IrsSource {
    pub fn new(config: Config) -> Result<Self> {
        let client = Client::builder()
            .gzip(true)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: Config, client: Client) -> Self {
        let rate_limiter = RateLimiter::new(config.max_concurrent_downloads);
        Self {
            client,
            config,
            rate_limiter,
            failed_batches: Mutex::new(HashSet::new()),
            install_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn document_dir(&self, period: Period, batch_id: Option<&str>) -> PathBuf {
        let year_dir = self.config.xml_dir(period);
        match batch_id {
            Some(batch) => year_dir.join(batch),
            None => year_dir,
        }
    }

    pub fn document_path(&self, object_id: &str, period: Period, batch_id: Option<&str>) -> PathBuf {
        self.document_dir(period, batch_id)
            .join(format!("{}_public.xml", object_id))
    }

    pub async fn discover_batches(&self) -> Result<Vec<Url>> {
        discover_batches(
            &self.client,
            &self.config.downloads_page,
            &self.config.user_agent,
            &self.rate_limiter,
        )
        .await
    }

    async fn archive_urls(&self, period: Period, batch_id: Option<&str>) -> Result<Vec<Url>> {
        if let Some(batch) = batch_id {
            return Ok(vec![batch_url(&self.config.base_url, period, batch)?]);
        }
        if let Some(urls) = legacy_batch_urls(&self.config.base_url, period)? {
            return Ok(urls);
        }

        log::info!("No built-in archive list for {}, checking the downloads page", period);
        let links = links_for_period(&self.discover_batches().await?, period);
        if links.is_empty() {
            return Err(anyhow!("No archives found for year {}", period));
        }
        Ok(links)
    }

    fn archive_path(&self, period: Period, url: &Url) -> Result<PathBuf> {
        let file_name = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| anyhow!("Archive URL {} has no file name", url))?;
        Ok(self
            .config
            .data_dir
            .join("archives")
            .join(period.to_string())
            .join(file_name))
    }

    // Downloads the archives behind one batch, reusing any already on disk.
    // A batch that failed once is not retried.
    async fn download(&self, period: Period, batch_id: Option<&str>) -> Result<Vec<PathBuf>> {
        let key = batch_key(period, batch_id);
        if self.failed_batches.lock().await.contains(&key) {
            return Err(anyhow!("Batch {} failed to download earlier", key));
        }

        match self.download_archives(period, batch_id).await {
            Ok(paths) => Ok(paths),
            Err(e) => {
                log::error!("Failed to download batch {}: {:#}", key, e);
                self.failed_batches.lock().await.insert(key);
                Err(e)
            }
        }
    }

    async fn download_archives(&self, period: Period, batch_id: Option<&str>) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for url in self.archive_urls(period, batch_id).await? {
            let path = self.archive_path(period, &url)?;
            if path.exists() {
                log::debug!("Using cached archive {:?}", path);
            } else {
                log::info!("Downloading {}", url);
                let bytes = fetch_and_save(
                    &self.client,
                    &url,
                    &path,
                    &self.config.user_agent,
                    mime::APPLICATION_OCTET_STREAM,
                    &self.rate_limiter,
                )
                .await?;
                log::info!("Downloaded {:?} ({} bytes)", path, bytes);
            }
            paths.push(path);
        }
        Ok(paths)
    }

    async fn install(&self, period: Period, batch_id: Option<&str>, archives: Vec<PathBuf>) -> Result<()> {
        let dest = self.document_dir(period, batch_id);
        let _guard = self.install_lock.lock().await;
        if dest.exists() {
            return Ok(());
        }

        let duplicate_log = self.config.data_dir.join(DUPLICATE_LOG_FILE);
        let target = dest.clone();
        let result = tokio::task::spawn_blocking(move || {
            install_archives(&archives, &target, &duplicate_log)
        })
        .await
        .map_err(|e| anyhow!("Extraction task failed: {}", e))?;

        match result {
            Ok(summary) => {
                log::info!(
                    "Installed {} filings into {:?}",
                    summary.extracted,
                    dest
                );
                Ok(())
            }
            Err(e) => {
                self.failed_batches
                    .lock()
                    .await
                    .insert(batch_key(period, batch_id));
                Err(e)
            }
        }
    }

    async fn ensure_batch(&self, period: Period, batch_id: Option<&str>) -> Result<()> {
        if self.document_dir(period, batch_id).exists() {
            return Ok(());
        }
        let archives = self.download(period, batch_id).await?;
        self.install(period, batch_id, archives).await
    }

    fn effective_batch<'a>(period: Period, batch_id: Option<&'a str>) -> Option<&'a str> {
        if period.uses_batch_index() {
            batch_id
        } else {
            None
        }
    }

    pub async fn is_failed(&self, period: Period, batch_id: Option<&str>) -> bool {
        self.failed_batches
            .lock()
            .await
            .contains(&batch_key(period, Self::effective_batch(period, batch_id)))
    }
}

fn batch_key(period: Period, batch_id: Option<&str>) -> String {
    format!("{}/{}", period, batch_id.unwrap_or("*"))
}

fn manifest_unavailable(period: Period, error: anyhow::Error) -> SourceError {
    SourceError::ManifestUnavailable {
        period,
        reason: format!("{:#}", error),
    }
}

#[async_trait::async_trait]
impl ManifestSource for IrsSource {
    async fn fetch_manifest(
        &self,
        period: Period,
        return_type: &ReturnType,
    ) -> Result<Manifest, SourceError> {
        let path = ensure_index(&self.client, &self.config, &self.rate_limiter, period)
            .await
            .map_err(|e| manifest_unavailable(period, e))?;
        load_manifest(&path, period, return_type).map_err(|e| manifest_unavailable(period, e))
    }
}

#[async_trait::async_trait]
impl DocumentSource for IrsSource {
    async fn prepare(&self, manifest: &Manifest) -> Result<()> {
        let period = manifest.period;
        let pending: Vec<Option<String>> = manifest
            .records
            .iter()
            .map(|record| Self::effective_batch(period, record.batch_id.as_deref()).map(str::to_string))
            .unique()
            .filter(|batch| !self.document_dir(period, batch.as_deref()).exists())
            .collect();

        if pending.is_empty() {
            log::debug!("All batches for {} are already extracted", period);
            return Ok(());
        }
        log::info!("Preparing {} batches for {}", pending.len(), period);

        let downloads: Vec<(Option<String>, Result<Vec<PathBuf>>)> = stream::iter(pending)
            .map(|batch| async move {
                let archives = self.download(period, batch.as_deref()).await;
                (batch, archives)
            })
            .buffer_unordered(self.config.max_concurrent_downloads.max(1))
            .collect()
            .await;

        let total = downloads.len();
        let mut failed = 0usize;
        for (batch, archives) in downloads {
            let result = match archives {
                Ok(archives) => self.install(period, batch.as_deref(), archives).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                log::warn!(
                    "Batch {} could not be prepared: {:#}",
                    batch_key(period, batch.as_deref()),
                    e
                );
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(anyhow!("{} of {} batches could not be prepared", failed, total));
        }
        Ok(())
    }

    async fn fetch_document(
        &self,
        object_id: &str,
        batch_id: Option<&str>,
        period: Period,
    ) -> Result<Document, SourceError> {
        let batch_id = Self::effective_batch(period, batch_id);
        self.ensure_batch(period, batch_id)
            .await
            .map_err(|e| SourceError::not_found(object_id, format!("{:#}", e)))?;

        let path = self.document_path(object_id, period, batch_id);
        let bytes = read_document(&path)
            .await
            .map_err(|e| SourceError::not_found(object_id, e))?;
        Document::from_bytes(&bytes).map_err(|e| SourceError::malformed(object_id, format!("{:#}", e)))
    }
}

async fn read_document(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| anyhow!("Failed to read {:?}: {}", path, e))
}
