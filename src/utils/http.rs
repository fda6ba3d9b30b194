use anyhow::{anyhow, Result};
use mime::Mime;
use reqwest::Client;
use std::path::Path;
use url::Url;

use super::dirs::ensure_parent_dir;
use super::rate_limit::RateLimiter;

// Downloads `url` into `filepath` and returns the number of bytes written.
// The body goes to a `.part` sibling first and is renamed into place once
// complete, so an interrupted download never looks like a cached file.
pub async fn fetch_and_save(
    client: &Client,
    url: &Url,
    filepath: &Path,
    user_agent: &str,
    accept: Mime,
    rate_limiter: &RateLimiter,
) -> Result<u64> {
    let _permit = rate_limiter.acquire().await?;
    log::debug!("Fetching URL: {}", url);

    let response = client
        .get(url.as_str())
        .header(reqwest::header::USER_AGENT, user_agent)
        .header(reqwest::header::ACCEPT, accept.as_ref())
        .header(reqwest::header::ACCEPT_ENCODING, "gzip, deflate")
        .send()
        .await?;

    log::debug!("Response status: {}", response.status());

    if !response.status().is_success() {
        return Err(anyhow!(
            "HTTP request for {} failed with status: {}",
            url,
            response.status()
        ));
    }

    if let Some(length) = response.content_length() {
        log::debug!("Expected content length: {}", length);
    }

    let content = response.bytes().await?;
    log::debug!("Received content length: {}", content.len());

    ensure_parent_dir(filepath)?;
    let partial = partial_path(filepath);
    tokio::fs::write(&partial, &content)
        .await
        .map_err(|e| anyhow!("Failed to write {:?}: {}", partial, e))?;
    tokio::fs::rename(&partial, filepath)
        .await
        .map_err(|e| anyhow!("Failed to move {:?} into place: {}", filepath, e))?;

    log::debug!("Saved content to {:?}", filepath);
    Ok(content.len() as u64)
}

pub async fn fetch_text(
    client: &Client,
    url: &Url,
    user_agent: &str,
    rate_limiter: &RateLimiter,
) -> Result<String> {
    let _permit = rate_limiter.acquire().await?;
    log::debug!("Fetching page: {}", url);

    let response = client
        .get(url.as_str())
        .header(reqwest::header::USER_AGENT, user_agent)
        .header(reqwest::header::ACCEPT, mime::TEXT_HTML.as_ref())
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "HTTP request for {} failed with status: {}",
            url,
            response.status()
        ));
    }

    Ok(response.text().await?)
}

fn partial_path(filepath: &Path) -> std::path::PathBuf {
    let mut name = filepath
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    filepath.with_file_name(name)
}
