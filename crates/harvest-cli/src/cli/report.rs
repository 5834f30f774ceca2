//! Progress printing and the per-run control session (control socket + Ctrl-C).

use harvest_core::config;
use harvest_core::crawl::CrawlEvent;
use harvest_core::queue::{QueueEvent, TaskState};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use crate::cli::control_socket::{self, ControlTargets};

const ARCHIVE_PRINT_INTERVAL: Duration = Duration::from_millis(500);

/// Prints crawl status lines as the controller reports them.
pub fn spawn_crawl_printer(mut rx: UnboundedReceiver<CrawlEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                CrawlEvent::Updated {
                    id,
                    progress,
                    status,
                    ..
                } => println!("  [{id}] {progress:>3}%  {status}"),
                CrawlEvent::Finished(result) => println!("  [{}] {}", result.job_id, result.title),
                CrawlEvent::Removed { id } => println!("  [{id}] removed"),
            }
        }
    })
}

/// Prints job status lines, gallery completions and throttled archive progress.
pub fn spawn_queue_printer(mut rx: UnboundedReceiver<QueueEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_archive_print: Option<Instant> = None;
        while let Some(event) = rx.recv().await {
            match event {
                QueueEvent::JobUpdated {
                    id,
                    progress,
                    status,
                    ..
                } => println!("  [{id}] {progress:>3}%  {status}"),
                QueueEvent::GalleryUpdated {
                    job_id,
                    gallery_id,
                    state,
                    completed_assets,
                    asset_count,
                } if state != TaskState::Running => println!(
                    "  [{job_id}] gallery {gallery_id}: {state} ({completed_assets}/{asset_count} assets)"
                ),
                QueueEvent::GalleryUpdated { .. } => {}
                QueueEvent::ArchiveProgress { job_id, percent } => {
                    let now = Instant::now();
                    let due = last_archive_print
                        .map(|t| now.duration_since(t) >= ARCHIVE_PRINT_INTERVAL)
                        .unwrap_or(true);
                    if due || percent >= 100 {
                        println!("  [{job_id}] archiving {percent:>3}%");
                        last_archive_print = Some(now);
                    }
                }
                QueueEvent::Removed { id } => println!("  [{id}] removed"),
            }
        }
    })
}

/// Control socket listener plus a Ctrl-C handler that pauses every active
/// loop, alive for the duration of one `crawl`/`resume`/`download` run.
pub struct Session {
    socket: Option<PathBuf>,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    pub fn start(targets: ControlTargets) -> Self {
        let mut tasks = Vec::new();
        let mut socket = None;
        match config::control_socket_path() {
            Ok(path) => match control_socket::spawn_control_listener(targets.clone(), &path) {
                Ok(handle) => {
                    tracing::debug!(path = %path.display(), "control socket listening");
                    tasks.push(handle);
                    socket = Some(path);
                }
                Err(e) => tracing::warn!(path = %path.display(), "control socket unavailable: {:#}", e),
            },
            Err(e) => tracing::warn!("control socket unavailable: {:#}", e),
        }

        tasks.push(tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            let mut paused = 0;
            if let Some(crawl) = &targets.crawl {
                paused += crawl.control().request_pause_all();
            }
            if let Some(queue) = &targets.queue {
                paused += queue.control().request_pause_all();
            }
            eprintln!("\nInterrupted: pausing {paused} job(s) at the next boundary (Ctrl-C again to quit)");
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        }));

        Self { socket, tasks }
    }

    pub fn close(self) {
        for task in &self.tasks {
            task.abort();
        }
        if let Some(path) = &self.socket {
            let _ = std::fs::remove_file(path);
        }
    }
}
