//! Crawl job records, results and events.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::task::JoinHandle;

use crate::control::new_job_id;
use crate::queue::GalleryRef;
use crate::services::LinkItem;

/// Crawl jobs are keyed by an opaque creation-time token.
pub type CrawlJobId = String;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlState {
    #[default]
    Waiting,
    Fetching,
    Paused,
}

impl CrawlState {
    pub fn as_str(self) -> &'static str {
        match self {
            CrawlState::Waiting => "waiting",
            CrawlState::Fetching => "fetching",
            CrawlState::Paused => "paused",
        }
    }
}

impl std::fmt::Display for CrawlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One paginated listing being walked. Persisted as-is in the crawl checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlJob {
    #[serde(default = "new_job_id")]
    pub id: CrawlJobId,
    #[serde(default, alias = "link")]
    pub source_url: String,
    #[serde(default)]
    pub state: CrawlState,
    /// Continuation for the next page; None once the listing is exhausted.
    #[serde(default, alias = "nextToken")]
    pub cursor: Option<String>,
    /// Last page whose items are included in `collected_items`.
    #[serde(default, alias = "currentPage")]
    pub page_count: u32,
    #[serde(default, alias = "allItems")]
    pub collected_items: Vec<LinkItem>,
    #[serde(default, alias = "tasksPath")]
    pub checkpoint_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub status: String,
}

impl CrawlJob {
    pub(crate) fn new(source_url: &str, checkpoint_path: PathBuf, max_pages: Option<u32>) -> Self {
        Self {
            id: new_job_id(),
            source_url: source_url.to_string(),
            state: CrawlState::Waiting,
            cursor: None,
            page_count: 0,
            collected_items: Vec::new(),
            checkpoint_path,
            max_pages,
            progress: 0,
            status: "Starting...".to_string(),
        }
    }

    /// Job built from a legacy bare-array checkpoint.
    pub(crate) fn imported(
        source_url: Option<&str>,
        checkpoint_path: PathBuf,
        items: Vec<LinkItem>,
    ) -> Self {
        Self {
            id: format!("imported-{}", new_job_id()),
            source_url: source_url.unwrap_or("Imported Task").to_string(),
            progress: 100,
            status: format!("Imported {} items", items.len()),
            collected_items: items,
            ..Self::new("", checkpoint_path, None)
        }
    }

    /// The listing has been walked to its end (or nothing was ever fetched).
    pub fn is_exhausted(&self) -> bool {
        self.page_count > 0 && self.cursor.is_none()
    }
}

/// Items harvested by a finished crawl, ready to become download candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    pub job_id: CrawlJobId,
    pub source_url: String,
    pub title: String,
    pub items: Vec<LinkItem>,
}

impl FetchResult {
    /// Snapshot of a job's items; the title names the listing's host.
    pub fn from_job(job: &CrawlJob) -> Self {
        let count = job.collected_items.len();
        let title = match url::Url::parse(&job.source_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
        {
            Some(host) => format!("Fetched from {} ({} items)", host, count),
            None => format!("{} ({} items)", job.source_url, count),
        };
        Self {
            job_id: job.id.clone(),
            source_url: job.source_url.clone(),
            title,
            items: job.collected_items.clone(),
        }
    }

    /// Gallery references for the download queue, ids `<crawl id>-<index>`.
    pub fn into_gallery_refs(self) -> Vec<GalleryRef> {
        let job_id = self.job_id;
        self.items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| GalleryRef {
                id: format!("{}-{}", job_id, idx),
                title: item.title,
                link: item.link,
            })
            .collect()
    }
}

/// Published on the controller's event channel, if one is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlEvent {
    Updated {
        id: CrawlJobId,
        state: CrawlState,
        progress: u8,
        status: String,
    },
    Finished(FetchResult),
    Removed {
        id: CrawlJobId,
    },
}

/// How a crawl loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// Cursor exhausted or the page returned no item list.
    Completed(FetchResult),
    /// Stopped at the page limit; the cursor is kept for a later run.
    Capped(FetchResult),
    /// Paused at a page boundary with progress persisted.
    Paused,
    /// The page fetch failed; the job was parked in `Paused`.
    Failed(String),
    /// The job record disappeared while the loop was running.
    Deleted,
}

/// A spawned crawl loop.
#[derive(Debug)]
pub struct CrawlHandle {
    pub id: CrawlJobId,
    pub(crate) task: JoinHandle<CrawlOutcome>,
}

impl CrawlHandle {
    /// Wait for the loop to stop.
    pub async fn join(self) -> CrawlOutcome {
        self.task
            .await
            .unwrap_or_else(|e| CrawlOutcome::Failed(format!("crawl task ended abnormally: {}", e)))
    }
}
