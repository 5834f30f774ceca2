//! Collaborator contracts consumed by the orchestration core.
//!
//! The core never talks HTTP or spawns archivers itself; it drives these
//! traits. Implementations own their transport, cookies, rate limiting and
//! timeout policy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

/// Failure reported by a collaborator. Always recoverable from the core's point of view.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("remote error: {0}")]
    Remote(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One harvested catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkItem {
    pub title: String,
    pub link: String,
}

impl LinkItem {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
        }
    }
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Page {
    /// None means the response carried no item list (end of data).
    pub items: Option<Vec<LinkItem>>,
    /// Continuation cursor; None or empty means the listing is exhausted.
    pub next: Option<String>,
}

impl Page {
    pub fn new(items: Vec<LinkItem>, next: Option<&str>) -> Self {
        Self {
            items: Some(items),
            next: next.map(str::to_string),
        }
    }

    /// Cursor for the following page, treating an empty token as absent.
    pub fn cursor(&self) -> Option<&str> {
        self.next.as_deref().filter(|c| !c.is_empty())
    }
}

/// Gallery metadata as reported by the download service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GalleryMetadata {
    #[serde(alias = "image_links")]
    pub image_links: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Remote-reported failure even though the call itself succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl GalleryMetadata {
    pub fn with_links<I, S>(links: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            image_links: links.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// The remote-reported failure reason, if any.
    pub fn failure(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }
}

/// What the archive step should produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRequest {
    /// The job's root folder.
    pub folder: PathBuf,
    /// Destination archive path.
    pub output: PathBuf,
    pub password: Option<String>,
}

/// Out-of-band archive progress in percent. Send failures are ignored.
pub type ArchiveProgress = UnboundedSender<u8>;

/// Page Fetch Service: one page of `{title, link}` items plus a continuation cursor.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, cursor: Option<&str>) -> Result<Page, ServiceError>;
}

/// Download Service: gallery metadata and single-asset retrieval.
#[async_trait]
pub trait GalleryDownloader: Send + Sync {
    async fn metadata(&self, url: &str) -> Result<GalleryMetadata, ServiceError>;

    /// Retrieve one resource to `save_path`, replacing any existing file there.
    async fn download_asset(&self, url: &str, save_path: &Path) -> Result<(), ServiceError>;
}

/// Post-processing step run when every gallery of an archive job completed.
#[async_trait]
pub trait Archiver: Send + Sync {
    async fn archive(
        &self,
        request: &ArchiveRequest,
        progress: ArchiveProgress,
    ) -> Result<(), ServiceError>;
}
