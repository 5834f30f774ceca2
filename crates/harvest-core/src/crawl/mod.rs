//! Crawl Controller: walks a cursor-paginated listing page by page, persisting
//! progress after every page so the crawl survives pause, errors and restarts.

mod run;
mod types;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::checkpoint::{self, CheckpointError, CheckpointStore};
use crate::control::JobControl;
use crate::services::PageFetcher;

pub use types::{
    CrawlEvent, CrawlHandle, CrawlJob, CrawlJobId, CrawlOutcome, CrawlState, FetchResult,
};

/// Owns the crawl jobs and drives one fetch loop per active job.
///
/// Shared as `Arc<CrawlController>`; loops are spawned on the tokio runtime.
pub struct CrawlController {
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn CheckpointStore>,
    jobs: Mutex<Vec<CrawlJob>>,
    results: StdMutex<Vec<FetchResult>>,
    control: Arc<JobControl<CrawlJobId>>,
    events: Option<UnboundedSender<CrawlEvent>>,
}

impl CrawlController {
    pub fn new(fetcher: Arc<dyn PageFetcher>, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            fetcher,
            store,
            jobs: Mutex::new(Vec::new()),
            results: StdMutex::new(Vec::new()),
            control: Arc::new(JobControl::new()),
            events: None,
        }
    }

    /// Publish job updates on `tx`. Send failures are ignored.
    pub fn with_events(mut self, tx: UnboundedSender<CrawlEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Pause tokens of the active loops (e.g. for Ctrl-C handling).
    pub fn control(&self) -> &Arc<JobControl<CrawlJobId>> {
        &self.control
    }

    /// Start crawling `source_url`, persisting to `checkpoint_path`.
    ///
    /// If the checkpoint already holds a job for the same URL, its cursor,
    /// items and page count seed this run and the old entry is replaced.
    /// Returns None if that URL is already being fetched.
    pub async fn start_crawl(
        self: &Arc<Self>,
        source_url: &str,
        checkpoint_path: &Path,
        max_pages: Option<u32>,
    ) -> Option<CrawlHandle> {
        if let Err(e) = self.merge_checkpoint(checkpoint_path, Some(source_url)).await {
            warn!(path = %checkpoint_path.display(), "could not read crawl checkpoint: {}", e);
        }

        let mut jobs = self.jobs.lock().await;
        let previous = jobs
            .iter()
            .position(|j| j.source_url == source_url && j.checkpoint_path == checkpoint_path);

        let mut job = CrawlJob::new(source_url, checkpoint_path.to_path_buf(), max_pages);
        let guard = self.control.register(job.id.clone())?;
        if let Some(idx) = previous {
            let prior = &jobs[idx];
            if prior.state == CrawlState::Fetching || self.control.is_active(&prior.id) {
                debug!(url = %source_url, job = %prior.id, "start rejected: crawl already running");
                return None;
            }
            info!(url = %source_url, job = %prior.id, page = prior.page_count, "resuming crawl from checkpoint entry");
            job.cursor = prior.cursor.clone();
            job.page_count = prior.page_count;
            job.collected_items = prior.collected_items.clone();
            jobs.remove(idx);
        }

        let id = job.id.clone();
        job.state = CrawlState::Fetching;
        jobs.insert(0, job);
        self.persist(&jobs, checkpoint_path).await;
        drop(jobs);

        info!(job = %id, url = %source_url, "crawl started");
        let this = Arc::clone(self);
        let loop_id = id.clone();
        let task = tokio::spawn(async move { run::run_crawl(this, loop_id, guard).await });
        Some(CrawlHandle { id, task })
    }

    /// Ask a fetching job to pause. The loop saves its progress at the next
    /// page boundary; an in-flight page completes first.
    pub async fn pause_crawl(&self, id: &str) -> bool {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.iter_mut().find(|j| j.id == id) else {
            debug!(job = %id, "pause rejected: unknown crawl job");
            return false;
        };
        if job.state != CrawlState::Fetching {
            debug!(job = %id, state = %job.state, "pause rejected: crawl not fetching");
            return false;
        }
        job.state = CrawlState::Paused;
        self.control.request_pause(&job.id);
        info!(job = %id, "pausing crawl");
        self.emit_update(job);
        true
    }

    /// Re-enter the loop of a paused job from its persisted cursor.
    pub async fn resume_crawl(self: &Arc<Self>, id: &str) -> Option<CrawlHandle> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.iter_mut().find(|j| j.id == id)?;
        if job.state != CrawlState::Paused {
            debug!(job = %id, state = %job.state, "resume rejected: crawl not paused");
            return None;
        }
        let Some(guard) = self.control.register(job.id.clone()) else {
            debug!(job = %id, "resume rejected: previous loop still winding down");
            return None;
        };
        job.state = CrawlState::Fetching;
        job.status = format!("Resuming from page {}...", job.page_count + 1);
        let path = job.checkpoint_path.clone();
        self.emit_update(job);
        self.persist(&jobs, &path).await;
        drop(jobs);

        info!(job = %id, "crawl resumed");
        let this = Arc::clone(self);
        let loop_id = id.to_string();
        let task = tokio::spawn(async move { run::run_crawl(this, loop_id, guard).await });
        Some(CrawlHandle {
            id: id.to_string(),
            task,
        })
    }

    /// Remove a waiting or paused job and rewrite its checkpoint without it.
    pub async fn delete_crawl(&self, id: &str) -> bool {
        let mut jobs = self.jobs.lock().await;
        let Some(idx) = jobs.iter().position(|j| j.id == id) else {
            debug!(job = %id, "delete rejected: unknown crawl job");
            return false;
        };
        if jobs[idx].state == CrawlState::Fetching || self.control.is_active(&jobs[idx].id) {
            debug!(job = %id, "delete rejected: crawl is fetching");
            return false;
        }
        let removed = jobs.remove(idx);
        self.persist(&jobs, &removed.checkpoint_path).await;
        drop(jobs);

        info!(job = %id, "deleted crawl job");
        self.emit(CrawlEvent::Removed { id: removed.id });
        true
    }

    /// Load the jobs stored at `path`. Jobs saved mid-fetch come back as
    /// `Paused`; finished jobs with items are offered again as fetch results.
    /// Returns the number of jobs added.
    pub async fn restore(&self, path: &Path) -> Result<usize, CheckpointError> {
        let added = self.merge_checkpoint(path, None).await?;
        let finished: Vec<FetchResult> = added
            .iter()
            .filter(|j| j.state == CrawlState::Waiting && !j.collected_items.is_empty())
            .map(FetchResult::from_job)
            .collect();
        for result in finished {
            self.push_result(result);
        }
        info!(path = %path.display(), "restored {} crawl job(s)", added.len());
        Ok(added.len())
    }

    /// Snapshot of every known crawl job.
    pub async fn crawl_jobs(&self) -> Vec<CrawlJob> {
        self.jobs.lock().await.clone()
    }

    pub async fn crawl_job(&self, id: &str) -> Option<CrawlJob> {
        self.jobs.lock().await.iter().find(|j| j.id == id).cloned()
    }

    /// Drain the fetch results produced since the last call.
    pub fn take_results(&self) -> Vec<FetchResult> {
        std::mem::take(&mut *self.results.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Add jobs from the checkpoint at `path` that are not yet known by id.
    async fn merge_checkpoint(
        &self,
        path: &Path,
        legacy_url: Option<&str>,
    ) -> Result<Vec<CrawlJob>, CheckpointError> {
        let owned_path: PathBuf = path.to_path_buf();
        let stored: Vec<CrawlJob> = checkpoint::load_jobs(self.store.as_ref(), path, move |items| {
            vec![CrawlJob::imported(legacy_url, owned_path, items)]
        })
        .await?;

        let mut jobs = self.jobs.lock().await;
        let mut added = Vec::new();
        for mut job in stored {
            if jobs.iter().any(|j| j.id == job.id) {
                continue;
            }
            if job.state == CrawlState::Fetching {
                job.state = CrawlState::Paused;
            }
            job.checkpoint_path = path.to_path_buf();
            added.push(job.clone());
            jobs.push(job);
        }
        Ok(added)
    }

    /// Replace the document at `path` with the jobs that live there.
    /// Failures are logged; the loop keeps going with in-memory state.
    async fn persist(&self, jobs: &[CrawlJob], path: &Path) {
        let owned: Vec<&CrawlJob> = jobs.iter().filter(|j| j.checkpoint_path == path).collect();
        if let Err(e) = checkpoint::save_jobs(self.store.as_ref(), path, &owned).await {
            warn!(path = %path.display(), "failed to write crawl checkpoint: {}", e);
        }
    }

    fn push_result(&self, result: FetchResult) {
        self.emit(CrawlEvent::Finished(result.clone()));
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result);
    }

    fn emit_update(&self, job: &CrawlJob) {
        self.emit(CrawlEvent::Updated {
            id: job.id.clone(),
            state: job.state,
            progress: job.progress,
            status: job.status.clone(),
        });
    }

    fn emit(&self, event: CrawlEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
