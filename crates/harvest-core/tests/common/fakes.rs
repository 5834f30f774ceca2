//! Scripted collaborators for integration tests.
//!
//! Every fake can hold a single call at a named point (a page cursor, a gallery
//! link or an asset URL) until the test releases it, which lets tests issue
//! pause/delete requests while a collaborator call is in flight.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use harvest_core::services::{
    ArchiveProgress, ArchiveRequest, Archiver, GalleryDownloader, GalleryMetadata, LinkItem, Page,
    PageFetcher, ServiceError,
};

/// One-shot rendezvous between a fake call and the test.
#[derive(Default)]
pub struct Gate {
    entered: Notify,
    release: Notify,
}

impl Gate {
    /// Wait until the held call has started.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the held call finish.
    pub fn release(&self) {
        self.release.notify_one();
    }

    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

#[derive(Default)]
struct Gates(Mutex<HashMap<String, Arc<Gate>>>);

impl Gates {
    fn hold(&self, key: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.0
            .lock()
            .unwrap()
            .insert(key.to_string(), Arc::clone(&gate));
        gate
    }

    async fn pass(&self, key: &str) {
        let gate = self.0.lock().unwrap().remove(key);
        if let Some(gate) = gate {
            gate.pass().await;
        }
    }
}

/// Pages keyed by cursor; the first page is keyed by "".
#[derive(Default)]
pub struct FakeFetcher {
    pages: HashMap<String, Page>,
    gates: Gates,
    calls: Mutex<Vec<Option<String>>>,
}

impl FakeFetcher {
    pub fn page(mut self, cursor: &str, titles: &[&str], next: Option<&str>) -> Self {
        let items = titles
            .iter()
            .map(|t| LinkItem::new(*t, format!("https://example.org/g/{}/t{}/", t, t)))
            .collect();
        self.pages.insert(cursor.to_string(), Page::new(items, next));
        self
    }

    /// Hold the fetch for `cursor` ("" = first page) until released.
    pub fn hold(&self, cursor: &str) -> Arc<Gate> {
        self.gates.hold(cursor)
    }

    pub fn calls(&self) -> Vec<Option<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch(&self, _url: &str, cursor: Option<&str>) -> Result<Page, ServiceError> {
        let key = cursor.unwrap_or("");
        self.calls.lock().unwrap().push(cursor.map(str::to_string));
        self.gates.pass(key).await;
        match self.pages.get(key) {
            Some(page) => Ok(page.clone()),
            None => Err(ServiceError::Transport(format!("no page for cursor {:?}", key))),
        }
    }
}

/// Galleries keyed by link; assets are `<link>img<n>.jpg`.
#[derive(Default)]
pub struct FakeDownloader {
    galleries: HashMap<String, Vec<String>>,
    broken: HashSet<String>,
    gates: Gates,
    metadata_calls: Mutex<Vec<String>>,
    assets: Mutex<Vec<PathBuf>>,
}

impl FakeDownloader {
    pub fn gallery(mut self, link: &str, assets: usize) -> Self {
        let urls = (0..assets).map(|n| format!("{}img{}.jpg", link, n)).collect();
        self.galleries.insert(link.to_string(), urls);
        self
    }

    /// Metadata for `link` fails with a transport error.
    pub fn broken(mut self, link: &str) -> Self {
        self.broken.insert(link.to_string());
        self
    }

    /// Hold the metadata call for a gallery link, or the download of an asset URL.
    pub fn hold(&self, key: &str) -> Arc<Gate> {
        self.gates.hold(key)
    }

    pub fn metadata_calls(&self) -> Vec<String> {
        self.metadata_calls.lock().unwrap().clone()
    }

    pub fn saved_assets(&self) -> Vec<PathBuf> {
        self.assets.lock().unwrap().clone()
    }
}

#[async_trait]
impl GalleryDownloader for FakeDownloader {
    async fn metadata(&self, url: &str) -> Result<GalleryMetadata, ServiceError> {
        self.metadata_calls.lock().unwrap().push(url.to_string());
        self.gates.pass(url).await;
        if self.broken.contains(url) {
            return Err(ServiceError::Transport("connection refused".to_string()));
        }
        match self.galleries.get(url) {
            Some(links) => Ok(GalleryMetadata::with_links(links.clone())),
            None => Err(ServiceError::Remote(format!("unknown gallery {}", url))),
        }
    }

    async fn download_asset(&self, url: &str, save_path: &Path) -> Result<(), ServiceError> {
        self.gates.pass(url).await;
        if let Some(parent) = save_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(save_path, url.as_bytes()).await?;
        self.assets.lock().unwrap().push(save_path.to_path_buf());
        Ok(())
    }
}

/// Records requests and reports a little progress.
#[derive(Default)]
pub struct FakeArchiver {
    pub requests: Mutex<Vec<ArchiveRequest>>,
}

#[async_trait]
impl Archiver for FakeArchiver {
    async fn archive(
        &self,
        request: &ArchiveRequest,
        progress: ArchiveProgress,
    ) -> Result<(), ServiceError> {
        self.requests.lock().unwrap().push(request.clone());
        let _ = progress.send(100);
        tokio::fs::write(&request.output, b"archive").await?;
        Ok(())
    }
}
