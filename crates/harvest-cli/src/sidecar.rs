//! Client for the scraping sidecar's HTTP JSON API.
//!
//! Uses the curl crate (libcurl). Each call is one blocking transfer run on the
//! blocking pool; the sidecar owns cookies, parsing and rate limiting.

use anyhow::{Context, Result};
use async_trait::async_trait;
use harvest_core::services::{GalleryDownloader, GalleryMetadata, Page, PageFetcher, ServiceError};
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// `PageFetcher` and `GalleryDownloader` over the sidecar:
/// `/tasks/fetch`, `/gallery/metadata` and `/image/fetch`.
#[derive(Debug, Clone)]
pub struct SidecarClient {
    base: Url,
    timeout: Duration,
}

impl SidecarClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let mut base = Url::parse(base_url).context("invalid sidecar_url")?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            base,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        })
    }

    pub(crate) fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, ServiceError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| ServiceError::Transport(format!("bad endpoint {}: {}", path, e)))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    async fn get_json<T>(&self, url: Url) -> Result<T, ServiceError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let timeout = self.timeout;
        blocking(move || {
            let body = get_body(url.as_str(), timeout)?;
            serde_json::from_slice(&body)
                .map_err(|e| ServiceError::Remote(format!("invalid response from {}: {}", url, e)))
        })
        .await
    }
}

#[async_trait]
impl PageFetcher for SidecarClient {
    async fn fetch(&self, url: &str, cursor: Option<&str>) -> Result<Page, ServiceError> {
        let mut query = vec![("url", url)];
        if let Some(next) = cursor {
            query.push(("next", next));
        }
        let endpoint = self.endpoint("tasks/fetch", &query)?;
        tracing::debug!(%endpoint, "fetching listing page");
        self.get_json(endpoint).await
    }
}

#[async_trait]
impl GalleryDownloader for SidecarClient {
    async fn metadata(&self, url: &str) -> Result<GalleryMetadata, ServiceError> {
        let endpoint = self.endpoint("gallery/metadata", &[("url", url)])?;
        self.get_json(endpoint).await
    }

    async fn download_asset(&self, url: &str, save_path: &Path) -> Result<(), ServiceError> {
        let endpoint = self.endpoint("image/fetch", &[("url", url)])?;
        let target = save_path.to_path_buf();
        let timeout = self.timeout;
        blocking(move || download_to(endpoint.as_str(), &target, timeout)).await
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ServiceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ServiceError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServiceError::Transport(format!("transfer task failed: {}", e)))?
}

fn curl_err(e: curl::Error) -> ServiceError {
    ServiceError::Transport(e.to_string())
}

fn easy_for(url: &str, timeout: Duration) -> Result<curl::easy::Easy, ServiceError> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(curl_err)?;
    easy.follow_location(true).map_err(curl_err)?;
    easy.max_redirections(10).map_err(curl_err)?;
    easy.connect_timeout(CONNECT_TIMEOUT).map_err(curl_err)?;
    easy.timeout(timeout).map_err(curl_err)?;
    Ok(easy)
}

fn check_status(easy: &mut curl::easy::Easy, url: &str) -> Result<(), ServiceError> {
    let code = easy.response_code().map_err(curl_err)?;
    if !(200..300).contains(&code) {
        return Err(ServiceError::Remote(format!("GET {} returned HTTP {}", url, code)));
    }
    Ok(())
}

/// GET `url` into memory.
fn get_body(url: &str, timeout: Duration) -> Result<Vec<u8>, ServiceError> {
    let mut body = Vec::new();
    let mut easy = easy_for(url, timeout)?;
    {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })
            .map_err(curl_err)?;
        transfer.perform().map_err(curl_err)?;
    }
    check_status(&mut easy, url)?;
    Ok(body)
}

/// GET `url` into a temp file next to `target`, then rename over `target`.
/// A failed transfer never leaves a truncated asset behind.
fn download_to(url: &str, target: &Path, timeout: Duration) -> Result<(), ServiceError> {
    let dir: PathBuf = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;

    let mut easy = easy_for(url, timeout)?;
    let mut write_error: Option<std::io::Error> = None;
    {
        let file = tmp.as_file_mut();
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| match file.write_all(data) {
                Ok(()) => Ok(data.len()),
                Err(e) => {
                    write_error = Some(e);
                    Ok(0) // abort transfer
                }
            })
            .map_err(curl_err)?;
        let performed = transfer.perform();
        drop(transfer);
        if let Some(e) = write_error.take() {
            return Err(ServiceError::Io(e));
        }
        performed.map_err(curl_err)?;
    }
    check_status(&mut easy, url)?;

    tmp.as_file_mut().flush()?;
    tmp.persist(target).map_err(|e| ServiceError::Io(e.error))?;
    tracing::debug!(path = %target.display(), "asset saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_keep_base_path_and_encode_query() {
        let client = SidecarClient::new("http://127.0.0.1:8000/api", 30).unwrap();
        let url = client
            .endpoint("tasks/fetch", &[("url", "https://e.org/?f=a b"), ("next", "X1")])
            .unwrap();
        assert_eq!(url.path(), "/api/tasks/fetch");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("url".to_string(), "https://e.org/?f=a b".to_string()),
                ("next".to_string(), "X1".to_string())
            ]
        );
    }

    #[test]
    fn bare_host_base_url() {
        let client = SidecarClient::new("http://localhost:8000", 0).unwrap();
        let url = client.endpoint("image/fetch", &[]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/image/fetch");
        assert_eq!(client.timeout, Duration::from_secs(1));
    }

    #[test]
    fn rejects_invalid_base_url() {
        assert!(SidecarClient::new("not a url", 30).is_err());
    }
}
