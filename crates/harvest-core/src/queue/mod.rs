//! Download Queue: jobs of galleries of assets, downloaded strictly in order
//! within a job while separate jobs progress concurrently.

mod finish;
mod run;
mod types;

use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::checkpoint::{self, CheckpointError, CheckpointStore};
use crate::control::JobControl;
use crate::path_template::{self, TemplateFields};
use crate::progress::{percent, ProgressStats};
use crate::services::{Archiver, GalleryDownloader, LinkItem};

pub use types::{
    ArchiveState, DownloadJob, DownloadJobId, GalleryRef, GalleryTask, JobHandle, JobOutcome,
    QueueEvent, QueueSettings, TaskState,
};

pub struct DownloadQueue {
    downloader: Arc<dyn GalleryDownloader>,
    archiver: Option<Arc<dyn Archiver>>,
    store: Arc<dyn CheckpointStore>,
    settings: QueueSettings,
    jobs: Mutex<Vec<DownloadJob>>,
    control: Arc<JobControl<DownloadJobId>>,
    events: Option<UnboundedSender<QueueEvent>>,
}

impl DownloadQueue {
    pub fn new(
        downloader: Arc<dyn GalleryDownloader>,
        store: Arc<dyn CheckpointStore>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            downloader,
            archiver: None,
            store,
            settings,
            jobs: Mutex::new(Vec::new()),
            control: Arc::new(JobControl::new()),
            events: None,
        }
    }

    /// Archiver used for jobs enqueued with `is_archive`.
    pub fn with_archiver(mut self, archiver: Arc<dyn Archiver>) -> Self {
        self.archiver = Some(archiver);
        self
    }

    pub fn with_events(mut self, tx: UnboundedSender<QueueEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.settings
    }

    pub fn control(&self) -> &Arc<JobControl<DownloadJobId>> {
        &self.control
    }

    /// Add galleries to job `job_id`, creating the job in `Pending` if needed.
    ///
    /// Galleries whose link is already part of the job are skipped, so
    /// repeated calls are idempotent. Galleries added to a finished job put it
    /// back in `Pending`. Returns the number of galleries added.
    pub async fn enqueue(
        &self,
        job_id: &str,
        title: &str,
        galleries: Vec<GalleryRef>,
        is_archive: bool,
        archive_password: Option<String>,
    ) -> usize {
        let mut jobs = self.jobs.lock().await;
        let idx = match jobs.iter().position(|j| j.id == job_id) {
            Some(idx) => idx,
            None => {
                let root_dir = path_template::job_root(&self.settings.download_root, title);
                jobs.push(DownloadJob {
                    id: job_id.to_string(),
                    title: title.to_string(),
                    state: TaskState::Pending,
                    galleries: Vec::new(),
                    is_archive,
                    archive_password: archive_password.filter(|p| !p.is_empty()),
                    archive_state: ArchiveState::None,
                    progress: 0,
                    status: "Queued".to_string(),
                    root_dir,
                });
                info!(job = %job_id, "created download job '{}'", title);
                jobs.len() - 1
            }
        };

        let job = &mut jobs[idx];
        let mut added = 0;
        for gallery in galleries {
            if job.galleries.iter().any(|g| g.source_link == gallery.link) {
                continue;
            }
            let task = self.gallery_task(job, gallery);
            job.galleries.push(task);
            added += 1;
        }

        if added > 0 {
            if matches!(job.state, TaskState::Completed | TaskState::Error) {
                job.state = TaskState::Pending;
                job.archive_state = ArchiveState::None;
            }
            job.progress = percent(job.completed_galleries(), job.galleries.len());
            job.status = format!("{} galleries queued", job.galleries.len());
            info!(job = %job_id, "enqueued {} gallery(s)", added);
        } else {
            debug!(job = %job_id, "enqueue added nothing new");
        }
        self.emit_job(job);
        self.persist(&jobs).await;
        added
    }

    fn gallery_task(&self, job: &DownloadJob, gallery: GalleryRef) -> GalleryTask {
        let index = job.galleries.len() + 1;
        let relative = path_template::render(
            &self.settings.path_template,
            &TemplateFields {
                link: &gallery.link,
                title: &gallery.title,
                job_title: &job.title,
                index,
            },
        );
        let id = if gallery.id.is_empty() {
            format!("{}-{}", job.id, index - 1)
        } else {
            gallery.id
        };
        GalleryTask {
            id,
            title: gallery.title,
            source_link: gallery.link,
            target_path: job.root_dir.join(relative),
            asset_count: 0,
            completed_asset_count: 0,
            state: TaskState::Pending,
            error: None,
        }
    }

    /// Start the gallery loop of a `Pending` or `Paused` job.
    pub async fn start_job(self: &Arc<Self>, id: &str) -> Option<JobHandle> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.iter_mut().find(|j| j.id == id)?;
        if !matches!(job.state, TaskState::Pending | TaskState::Paused) {
            debug!(job = %id, state = %job.state, "start rejected: job not pending or paused");
            return None;
        }
        let Some(guard) = self.control.register(job.id.clone()) else {
            debug!(job = %id, "start rejected: previous loop still winding down");
            return None;
        };
        job.state = TaskState::Running;
        job.status = "Starting...".to_string();
        for gallery in &mut job.galleries {
            if gallery.state == TaskState::Paused {
                gallery.state = TaskState::Pending;
            }
        }
        self.emit_job(job);
        self.persist(&jobs).await;
        drop(jobs);

        info!(job = %id, "download job started");
        let this = Arc::clone(self);
        let loop_id = id.to_string();
        let task = tokio::spawn(async move { run::run_job(this, loop_id, guard).await });
        Some(JobHandle {
            id: id.to_string(),
            task,
        })
    }

    /// Start every eligible job without waiting for any of them.
    pub async fn start_all(self: &Arc<Self>) -> Vec<JobHandle> {
        let eligible: Vec<DownloadJobId> = self
            .jobs
            .lock()
            .await
            .iter()
            .filter(|j| matches!(j.state, TaskState::Pending | TaskState::Paused))
            .map(|j| j.id.clone())
            .collect();
        let mut handles = Vec::with_capacity(eligible.len());
        for id in eligible {
            if let Some(handle) = self.start_job(&id).await {
                handles.push(handle);
            }
        }
        handles
    }

    /// Pause a running or pending job and its unfinished galleries. A running
    /// loop stops before its next gallery or asset.
    pub async fn pause_job(&self, id: &str) -> bool {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
            debug!(job = %id, "pause rejected: unknown download job");
            return false;
        };
        if !matches!(job.state, TaskState::Running | TaskState::Pending) {
            debug!(job = %id, state = %job.state, "pause rejected");
            return false;
        }
        mark_paused(job);
        self.control.request_pause(&job.id);
        info!(job = %id, "pausing download job");
        self.emit_job(job);
        self.persist(&jobs).await;
        true
    }

    /// Same as [`pause_job`](Self::pause_job).
    pub async fn stop_job(&self, id: &str) -> bool {
        self.pause_job(id).await
    }

    /// Reset a job and all its galleries to `Pending` and start it again.
    /// Everything is downloaded anew.
    pub async fn restart_job(self: &Arc<Self>, id: &str) -> Option<JobHandle> {
        {
            let mut jobs = self.jobs.lock().await;
            let job = jobs.iter_mut().find(|j| j.id == id)?;
            if job.state == TaskState::Running || self.control.is_active(&job.id) {
                debug!(job = %id, "restart rejected: job is running");
                return None;
            }
            for gallery in &mut job.galleries {
                gallery.reset();
            }
            job.state = TaskState::Pending;
            job.archive_state = ArchiveState::None;
            job.progress = 0;
            job.status = "Restarting...".to_string();
            info!(job = %id, "download job reset");
            self.persist(&jobs).await;
        }
        self.start_job(id).await
    }

    /// Remove a job that is not running and rewrite the checkpoint.
    pub async fn delete_job(&self, id: &str) -> bool {
        let mut jobs = self.jobs.lock().await;
        let Some(idx) = jobs.iter().position(|j| j.id == id) else {
            debug!(job = %id, "delete rejected: unknown download job");
            return false;
        };
        if jobs[idx].state == TaskState::Running || self.control.is_active(&jobs[idx].id) {
            debug!(job = %id, "delete rejected: job is running");
            return false;
        }
        jobs.remove(idx);
        self.persist(&jobs).await;
        drop(jobs);

        info!(job = %id, "deleted download job");
        self.emit(QueueEvent::Removed { id: id.to_string() });
        true
    }

    /// Load the queue checkpoint. Interrupted work comes back as `Paused`;
    /// an interrupted archive step is marked failed so a start retries it.
    /// Returns the number of jobs added.
    pub async fn restore(&self) -> Result<usize, CheckpointError> {
        let path = self.settings.checkpoint_path.clone();
        let stored: Vec<DownloadJob> =
            checkpoint::load_jobs(self.store.as_ref(), &path, |items| {
                self.import_legacy(items).into_iter().collect()
            })
            .await?;

        let mut jobs = self.jobs.lock().await;
        let mut added = 0;
        for mut job in stored {
            if jobs.iter().any(|j| j.id == job.id) {
                continue;
            }
            normalise_restored(&mut job);
            if job.root_dir.as_os_str().is_empty() {
                job.root_dir = path_template::job_root(&self.settings.download_root, &job.title);
            }
            jobs.push(job);
            added += 1;
        }
        info!(path = %path.display(), "restored {} download job(s)", added);
        Ok(added)
    }

    /// A job holding every item of a legacy bare-array checkpoint.
    fn import_legacy(&self, items: Vec<LinkItem>) -> Option<DownloadJob> {
        if items.is_empty() {
            return None;
        }
        let title = format!("Imported ({} galleries)", items.len());
        let mut job = DownloadJob {
            id: format!("imported-{}", crate::control::new_job_id()),
            root_dir: path_template::job_root(&self.settings.download_root, &title),
            title,
            state: TaskState::Pending,
            galleries: Vec::new(),
            is_archive: false,
            archive_password: None,
            archive_state: ArchiveState::None,
            progress: 0,
            status: "Imported".to_string(),
        };
        for item in items {
            let task = self.gallery_task(
                &job,
                GalleryRef {
                    id: String::new(),
                    title: item.title,
                    link: item.link,
                },
            );
            job.galleries.push(task);
        }
        Some(job)
    }

    pub async fn jobs(&self) -> Vec<DownloadJob> {
        self.jobs.lock().await.clone()
    }

    pub async fn job(&self, id: &str) -> Option<DownloadJob> {
        self.jobs.lock().await.iter().find(|j| j.id == id).cloned()
    }

    pub async fn stats(&self, id: &str) -> Option<ProgressStats> {
        self.jobs
            .lock()
            .await
            .iter()
            .find(|j| j.id == id)
            .map(DownloadJob::stats)
    }

    async fn persist(&self, jobs: &[DownloadJob]) {
        let path = &self.settings.checkpoint_path;
        if let Err(e) = checkpoint::save_jobs(self.store.as_ref(), path, jobs).await {
            warn!(path = %path.display(), "failed to write download checkpoint: {}", e);
        }
    }

    fn emit_job(&self, job: &DownloadJob) {
        self.emit(QueueEvent::JobUpdated {
            id: job.id.clone(),
            state: job.state,
            progress: job.progress,
            status: job.status.clone(),
        });
    }

    fn emit_gallery(&self, job_id: &str, gallery: &GalleryTask) {
        self.emit(QueueEvent::GalleryUpdated {
            job_id: job_id.to_string(),
            gallery_id: gallery.id.clone(),
            state: gallery.state,
            completed_assets: gallery.completed_asset_count,
            asset_count: gallery.asset_count,
        });
    }

    fn emit(&self, event: QueueEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

/// Job and every gallery that has not finished go to `Paused`.
fn mark_paused(job: &mut DownloadJob) {
    job.state = TaskState::Paused;
    job.status = format!(
        "Paused ({}/{} galleries)",
        job.completed_galleries(),
        job.galleries.len()
    );
    for gallery in &mut job.galleries {
        if !gallery.state.is_terminal() {
            gallery.state = TaskState::Paused;
        }
    }
}

fn normalise_restored(job: &mut DownloadJob) {
    if job.archive_state == ArchiveState::Archiving {
        job.archive_state = ArchiveState::ArchiveError;
        job.state = TaskState::Running;
    }
    if job.state == TaskState::Running {
        mark_paused(job);
    }
    for gallery in &mut job.galleries {
        gallery.completed_asset_count = gallery.completed_asset_count.min(gallery.asset_count);
    }
}

#[cfg(test)]
mod tests;
