//! `harvest download` – run queued download jobs until they finish or are paused.

use anyhow::{anyhow, Result};
use harvest_core::queue::{DownloadQueue, JobHandle, JobOutcome};

use crate::cli::context::App;
use crate::cli::control_socket::ControlTargets;
use crate::cli::report::{self, Session};

pub async fn run_download(app: &App, job: Option<&str>) -> Result<()> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let queue = app.download_queue(Some(tx)).await?;
    let printer = report::spawn_queue_printer(rx);
    let session = Session::start(ControlTargets {
        crawl: None,
        queue: Some(queue.clone()),
    });

    let handles = match job {
        Some(id) => match queue.start_job(id).await {
            Some(handle) => Ok(vec![handle]),
            None => Err(anyhow!(
                "download job {id} is not pending or paused (see `harvest status`)"
            )),
        },
        None => Ok(queue.start_all().await),
    };
    let outcome = match handles {
        Ok(handles) if handles.is_empty() => {
            println!("No pending or paused download jobs.");
            Ok(())
        }
        Ok(handles) => wait_for_jobs(&queue, handles).await,
        Err(e) => Err(e),
    };
    session.close();
    printer.abort();
    outcome
}

/// Waits for every loop and prints one summary line per job.
pub(super) async fn wait_for_jobs(queue: &DownloadQueue, handles: Vec<JobHandle>) -> Result<()> {
    let mut failed = 0;
    for handle in handles {
        let id = handle.id.clone();
        let outcome = handle.join().await;
        let status = queue
            .job(&id)
            .await
            .map(|j| j.status)
            .unwrap_or_default();
        match outcome {
            JobOutcome::Completed => println!("Job {id} completed: {status}"),
            JobOutcome::Paused => println!("Job {id} paused: {status}"),
            JobOutcome::Deleted => println!("Job {id} was removed"),
            JobOutcome::Failed => {
                failed += 1;
                println!("Job {id} failed: {status}");
            }
        }
    }
    if failed > 0 {
        return Err(anyhow!(
            "{failed} download job(s) failed; `harvest download` retries unfinished galleries"
        ));
    }
    Ok(())
}
