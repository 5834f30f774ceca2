//! Control socket: server (while `harvest crawl`/`download` run) and client
//! (for `harvest pause`). Protocol: one line "pause <id>" per request, answered
//! by "ok" or "unknown".

use anyhow::Result;
use harvest_core::crawl::CrawlController;
use harvest_core::queue::DownloadQueue;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// What a running process can pause on request.
#[derive(Clone, Default)]
pub struct ControlTargets {
    pub crawl: Option<Arc<CrawlController>>,
    pub queue: Option<Arc<DownloadQueue>>,
}

impl ControlTargets {
    async fn pause(&self, id: &str) -> bool {
        if let Some(crawl) = &self.crawl {
            if crawl.pause_crawl(id).await {
                return true;
            }
        }
        if let Some(queue) = &self.queue {
            if queue.pause_job(id).await {
                return true;
            }
        }
        false
    }
}

/// Spawns a task that listens on `path` and pauses the named crawl or download
/// job for each "pause <id>" line. Malformed lines are answered with "unknown".
pub fn spawn_control_listener(
    targets: ControlTargets,
    path: impl AsRef<Path>,
) -> Result<tokio::task::JoinHandle<()>> {
    let path = path.as_ref().to_path_buf();
    let _ = std::fs::remove_file(&path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(&path)?;
    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let targets = targets.clone();
                    tokio::spawn(async move {
                        let (read, mut write) = stream.into_split();
                        let mut lines = BufReader::new(read).lines();
                        while let Ok(Some(line)) = lines.next_line().await {
                            let paused = match line.trim().strip_prefix("pause ") {
                                Some(id) => targets.pause(id.trim()).await,
                                None => false,
                            };
                            let reply = if paused { "ok\n" } else { "unknown\n" };
                            if write.write_all(reply.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                    });
                }
                Err(e) => tracing::debug!("control socket accept: {}", e),
            }
        }
    });
    Ok(handle)
}

/// Sends "pause <id>" to a running `harvest`. Returns false if nothing is
/// listening or the running process does not know the job.
pub async fn send_pause(socket_path: &Path, id: &str) -> Result<bool> {
    if !socket_path.exists() {
        return Ok(false);
    }
    let stream = match UnixStream::connect(socket_path).await {
        Ok(s) => s,
        Err(e) => {
            tracing::debug!(path = %socket_path.display(), "stale control socket: {}", e);
            return Ok(false);
        }
    };
    let (read, mut write) = stream.into_split();
    write.write_all(format!("pause {}\n", id).as_bytes()).await?;
    let reply = BufReader::new(read).lines().next_line().await?;
    Ok(reply.as_deref().map(str::trim) == Some("ok"))
}
