//! The gallery loop: one gallery at a time, one asset at a time.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::types::{DownloadJob, JobOutcome, TaskState};
use super::{finish, mark_paused, DownloadQueue};
use crate::control::LoopGuard;
use crate::path_template::asset_file_name;
use crate::progress::percent;
use crate::services::GalleryMetadata;

const METADATA_FILE: &str = "metadata.json";

pub(super) fn find<'a>(jobs: &'a mut [DownloadJob], id: &str) -> Option<&'a mut DownloadJob> {
    jobs.iter_mut().find(|j| j.id == id)
}

/// What one gallery pass ended with.
enum GalleryPass {
    Done,
    Paused,
    Deleted,
}

pub(super) async fn run_job(
    queue: Arc<DownloadQueue>,
    id: String,
    guard: LoopGuard<String>,
) -> JobOutcome {
    let mut index = 0usize;
    loop {
        let (link, target) = {
            let mut jobs = queue.jobs.lock().await;
            let Some(job) = find(&mut jobs, &id) else {
                return JobOutcome::Deleted;
            };
            if pause_requested(job, &guard) {
                if job.state == TaskState::Running {
                    mark_paused(job);
                }
                queue.emit_job(job);
                queue.persist(&jobs).await;
                info!(job = %id, "download job paused");
                return JobOutcome::Paused;
            }

            // Galleries enqueued while running are appended, so re-read the length.
            while index < job.galleries.len() && job.galleries[index].state == TaskState::Completed
            {
                index += 1;
            }
            if index >= job.galleries.len() {
                break;
            }

            let total = job.galleries.len();
            let gallery = &mut job.galleries[index];
            gallery.state = TaskState::Running;
            gallery.error = None;
            let picked = (gallery.source_link.clone(), gallery.target_path.clone());
            job.status = format!("Downloading gallery {} of {}", index + 1, total);
            queue.emit_gallery(&id, &job.galleries[index]);
            queue.emit_job(job);
            queue.persist(&jobs).await;
            picked
        };

        match run_gallery(&queue, &id, index, &guard, &link, &target).await {
            GalleryPass::Done => index += 1,
            GalleryPass::Paused => continue,
            GalleryPass::Deleted => return JobOutcome::Deleted,
        }
    }

    finish::finish_job(&queue, &id).await
}

/// Pause is either an explicit state change or a tripped token (e.g. Ctrl-C).
fn pause_requested(job: &DownloadJob, guard: &LoopGuard<String>) -> bool {
    guard.pause_requested() || matches!(job.state, TaskState::Paused | TaskState::Pending)
}

async fn run_gallery(
    queue: &DownloadQueue,
    job_id: &str,
    index: usize,
    guard: &LoopGuard<String>,
    link: &str,
    target: &Path,
) -> GalleryPass {
    let metadata = match queue.downloader.metadata(link).await {
        Ok(meta) => match meta.failure() {
            Some(reason) => Err(reason.to_string()),
            None => Ok(meta),
        },
        Err(e) => Err(e.to_string()),
    };
    let metadata = match metadata {
        Ok(meta) => meta,
        Err(reason) => {
            warn!(job = %job_id, gallery = index, %link, "gallery metadata failed: {}", reason);
            return settle_gallery(queue, job_id, index, Some(reason)).await;
        }
    };

    if let Err(e) = write_snapshot(target, link, &metadata).await {
        warn!(job = %job_id, path = %target.display(), "could not write metadata snapshot: {}", e);
    }

    let total = metadata.image_links.len() as u32;
    {
        let mut jobs = queue.jobs.lock().await;
        let Some(job) = find(&mut jobs, job_id) else {
            return GalleryPass::Deleted;
        };
        let gallery = &mut job.galleries[index];
        gallery.asset_count = total;
        gallery.completed_asset_count = 0;
        if let Some(title) = metadata.title.as_ref().filter(|_| gallery.title.is_empty()) {
            gallery.title = title.clone();
        }
        queue.emit_gallery(job_id, &job.galleries[index]);
        queue.persist(&jobs).await;
    }
    debug!(job = %job_id, gallery = index, "gallery lists {} asset(s)", total);

    let mut failed = 0u32;
    for (n, url) in metadata.image_links.iter().enumerate() {
        {
            let mut jobs = queue.jobs.lock().await;
            let Some(job) = find(&mut jobs, job_id) else {
                return GalleryPass::Deleted;
            };
            if pause_requested(job, guard) {
                let gallery = &mut job.galleries[index];
                if !gallery.state.is_terminal() {
                    gallery.state = TaskState::Paused;
                }
                debug!(job = %job_id, gallery = index, asset = n, "pause observed mid-gallery");
                queue.persist(&jobs).await;
                return GalleryPass::Paused;
            }
        }

        let save_path = target.join(asset_file_name(n, url));
        match queue.downloader.download_asset(url, &save_path).await {
            Ok(()) => {
                let mut jobs = queue.jobs.lock().await;
                let Some(job) = find(&mut jobs, job_id) else {
                    return GalleryPass::Deleted;
                };
                let gallery = &mut job.galleries[index];
                gallery.completed_asset_count = (gallery.completed_asset_count + 1).min(total);
                queue.emit_gallery(job_id, &job.galleries[index]);
                queue.persist(&jobs).await;
            }
            Err(e) => {
                failed += 1;
                warn!(job = %job_id, gallery = index, %url, "asset download failed: {}", e);
            }
        }
    }

    let reason = if total == 0 {
        Some("gallery lists no assets".to_string())
    } else if failed > 0 {
        Some(format!("{} of {} assets failed", failed, total))
    } else {
        None
    };
    settle_gallery(queue, job_id, index, reason).await
}

/// Record a gallery's terminal state and the job progress that follows from it.
async fn settle_gallery(
    queue: &DownloadQueue,
    job_id: &str,
    index: usize,
    error: Option<String>,
) -> GalleryPass {
    let mut jobs = queue.jobs.lock().await;
    let Some(job) = find(&mut jobs, job_id) else {
        return GalleryPass::Deleted;
    };
    let gallery = &mut job.galleries[index];
    let complete = error.is_none()
        && gallery.asset_count > 0
        && gallery.completed_asset_count == gallery.asset_count;
    if complete {
        gallery.state = TaskState::Completed;
        gallery.error = None;
        info!(job = %job_id, gallery = %gallery.id, "gallery completed");
    } else {
        gallery.state = TaskState::Error;
        gallery.error = Some(error.unwrap_or_else(|| "incomplete".to_string()));
    }
    job.progress = percent(job.completed_galleries(), job.galleries.len());
    queue.emit_gallery(job_id, &job.galleries[index]);
    queue.emit_job(job);
    queue.persist(&jobs).await;
    GalleryPass::Done
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetadataSnapshot<'a> {
    source_link: &'a str,
    #[serde(flatten)]
    metadata: &'a GalleryMetadata,
}

/// `<target>/metadata.json`, replaced on every pass.
async fn write_snapshot(
    target: &Path,
    link: &str,
    metadata: &GalleryMetadata,
) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(target).await?;
    let json = serde_json::to_vec_pretty(&MetadataSnapshot {
        source_link: link,
        metadata,
    })
    .map_err(std::io::Error::other)?;
    let path = target.join(METADATA_FILE);
    tokio::fs::write(&path, json).await?;
    Ok(path)
}
