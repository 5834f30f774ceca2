//! Download job and gallery records, settings, events.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::task::JoinHandle;

use crate::progress::ProgressStats;

pub type DownloadJobId = String;

/// Lifecycle shared by download jobs and their galleries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    #[default]
    Pending,
    Running,
    Paused,
    Error,
    Completed,
}

impl TaskState {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Paused => "paused",
            TaskState::Error => "error",
            TaskState::Completed => "completed",
        }
    }

    /// Completed or Error: the gallery loop will not touch it again this run.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Error)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArchiveState {
    #[default]
    None,
    Archiving,
    Archived,
    ArchiveError,
}

/// One gallery of a download job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryTask {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(alias = "link")]
    pub source_link: String,
    #[serde(default)]
    pub target_path: PathBuf,
    #[serde(default)]
    pub asset_count: u32,
    #[serde(default)]
    pub completed_asset_count: u32,
    #[serde(default)]
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GalleryTask {
    pub(crate) fn reset(&mut self) {
        self.asset_count = 0;
        self.completed_asset_count = 0;
        self.state = TaskState::Pending;
        self.error = None;
    }
}

/// A batch of galleries downloaded (and optionally archived) together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadJob {
    pub id: DownloadJobId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub state: TaskState,
    #[serde(default)]
    pub galleries: Vec<GalleryTask>,
    #[serde(default)]
    pub is_archive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_password: Option<String>,
    #[serde(default)]
    pub archive_state: ArchiveState,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub status: String,
    /// Folder holding every gallery of the job; what gets archived.
    #[serde(default)]
    pub root_dir: PathBuf,
}

impl DownloadJob {
    pub fn completed_galleries(&self) -> usize {
        self.galleries
            .iter()
            .filter(|g| g.state == TaskState::Completed)
            .count()
    }

    pub fn all_galleries_completed(&self) -> bool {
        self.galleries.iter().all(|g| g.state == TaskState::Completed)
    }

    pub fn stats(&self) -> ProgressStats {
        ProgressStats {
            galleries_done: self.completed_galleries(),
            gallery_count: self.galleries.len(),
            assets_done: self
                .galleries
                .iter()
                .map(|g| u64::from(g.completed_asset_count))
                .sum(),
            asset_count: self.galleries.iter().map(|g| u64::from(g.asset_count)).sum(),
        }
    }
}

/// A gallery to add to a job: id, display title and source link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryRef {
    pub id: String,
    pub title: String,
    pub link: String,
}

/// Where the queue persists and writes things.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub checkpoint_path: PathBuf,
    pub download_root: PathBuf,
    /// Gallery folder template relative to the job root.
    pub path_template: String,
    /// Archives land here; defaults to `download_root`.
    pub archive_dir: Option<PathBuf>,
    pub archive_extension: String,
}

impl QueueSettings {
    pub fn new(checkpoint_path: impl Into<PathBuf>, download_root: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_path: checkpoint_path.into(),
            download_root: download_root.into(),
            path_template: crate::config::DEFAULT_PATH_TEMPLATE.to_string(),
            archive_dir: None,
            archive_extension: crate::config::DEFAULT_ARCHIVE_EXTENSION.to_string(),
        }
    }
}

/// Published on the queue's event channel, if one is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueEvent {
    JobUpdated {
        id: DownloadJobId,
        state: TaskState,
        progress: u8,
        status: String,
    },
    GalleryUpdated {
        job_id: DownloadJobId,
        gallery_id: String,
        state: TaskState,
        completed_assets: u32,
        asset_count: u32,
    },
    ArchiveProgress {
        job_id: DownloadJobId,
        percent: u8,
    },
    Removed {
        id: DownloadJobId,
    },
}

/// How a gallery loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Some gallery or the archive step failed.
    Failed,
    Paused,
    Deleted,
}

/// A spawned gallery loop.
#[derive(Debug)]
pub struct JobHandle {
    pub id: DownloadJobId,
    pub(crate) task: JoinHandle<JobOutcome>,
}

impl JobHandle {
    pub async fn join(self) -> JobOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(job = %self.id, "download task ended abnormally: {}", e);
                JobOutcome::Failed
            }
        }
    }
}
