//! End of a gallery loop: settle the job state and run the archive step.

use tracing::{info, warn};

use super::run::find;
use super::types::{ArchiveState, JobOutcome, QueueEvent, TaskState};
use super::DownloadQueue;
use crate::path_template::sanitize_component;
use crate::services::{ArchiveRequest, ServiceError};

/// Every gallery has been visited. Decide between Completed, Error and the
/// archive step; a job paused during its last gallery stays paused.
pub(super) async fn finish_job(queue: &DownloadQueue, id: &str) -> JobOutcome {
    let request = {
        let mut jobs = queue.jobs.lock().await;
        let Some(job) = find(&mut jobs, id) else {
            return JobOutcome::Deleted;
        };
        if matches!(job.state, TaskState::Paused | TaskState::Pending) {
            return JobOutcome::Paused;
        }

        let done = job.completed_galleries();
        let total = job.galleries.len();
        if !job.all_galleries_completed() {
            job.state = TaskState::Error;
            job.status = format!("Finished with errors: {} of {} galleries completed", done, total);
            warn!(job = %id, "download job finished with {} failed gallery(s)", total - done);
            queue.emit_job(job);
            queue.persist(&jobs).await;
            return JobOutcome::Failed;
        }

        job.progress = 100;
        if !job.is_archive || job.archive_state == ArchiveState::Archived {
            job.state = TaskState::Completed;
            job.status = format!("Completed: {} galleries", total);
            info!(job = %id, "download job completed");
            queue.emit_job(job);
            queue.persist(&jobs).await;
            return JobOutcome::Completed;
        }

        job.archive_state = ArchiveState::Archiving;
        job.status = "Archiving...".to_string();
        queue.emit_job(job);
        let request = ArchiveRequest {
            folder: job.root_dir.clone(),
            output: archive_output(queue, &job.title, &job.id),
            password: job.archive_password.clone(),
        };
        queue.persist(&jobs).await;
        request
    };

    info!(job = %id, output = %request.output.display(), "archiving job folder");
    let result = run_archiver(queue, id, &request).await;

    let mut jobs = queue.jobs.lock().await;
    let Some(job) = find(&mut jobs, id) else {
        return JobOutcome::Deleted;
    };
    let outcome = match result {
        Ok(()) => {
            job.archive_state = ArchiveState::Archived;
            job.state = TaskState::Completed;
            job.status = format!("Archived to {}", request.output.display());
            info!(job = %id, "archive created");
            JobOutcome::Completed
        }
        Err(e) => {
            job.archive_state = ArchiveState::ArchiveError;
            job.state = TaskState::Error;
            job.status = format!("Archive failed: {}", e);
            warn!(job = %id, "archive step failed: {}", e);
            JobOutcome::Failed
        }
    };
    queue.emit_job(job);
    queue.persist(&jobs).await;
    outcome
}

fn archive_output(queue: &DownloadQueue, title: &str, id: &str) -> std::path::PathBuf {
    let settings = queue.settings();
    let dir = settings
        .archive_dir
        .clone()
        .unwrap_or_else(|| settings.download_root.clone());
    let mut stem = sanitize_component(title);
    if stem.is_empty() {
        stem = sanitize_component(id);
    }
    dir.join(format!("{}.{}", stem, settings.archive_extension))
}

/// Run the archiver, forwarding its progress as queue events.
async fn run_archiver(
    queue: &DownloadQueue,
    id: &str,
    request: &ArchiveRequest,
) -> Result<(), ServiceError> {
    let Some(archiver) = queue.archiver.clone() else {
        return Err(ServiceError::Remote("no archiver configured".to_string()));
    };
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<u8>();
    let events = queue.events.clone();
    let job_id = id.to_string();
    let forward = tokio::spawn(async move {
        while let Some(percent) = rx.recv().await {
            if let Some(events) = &events {
                let _ = events.send(QueueEvent::ArchiveProgress {
                    job_id: job_id.clone(),
                    percent,
                });
            }
        }
    });
    let result = archiver.archive(request, tx).await;
    // The sender went to the archiver; once it is dropped the forwarder drains and exits.
    let _ = forward.await;
    result
}
