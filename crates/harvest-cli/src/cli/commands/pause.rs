//! `harvest pause <id>` – pause a crawl or download job. If a `harvest` run
//! owns the job, it is signalled through the control socket.

use anyhow::{bail, Result};
use harvest_core::config;
use harvest_core::crawl::CrawlState;

use crate::cli::context::App;
use crate::cli::control_socket;

pub async fn run_pause(app: &App, id: &str) -> Result<()> {
    if let Ok(path) = config::control_socket_path() {
        match control_socket::send_pause(&path, id).await {
            Ok(true) => {
                println!("Pause requested for job {id}; it stops at the next boundary");
                return Ok(());
            }
            Ok(false) => {}
            Err(e) => tracing::debug!("control socket: {:#}", e),
        }
    }

    // Nothing running owns the job: pause a pending download job on disk.
    let queue = app.download_queue(None).await?;
    if queue.pause_job(id).await {
        println!("Paused download job {id}");
        return Ok(());
    }
    // A crawl only runs inside a `harvest` process; on disk it is already stopped.
    let path = app.crawl_checkpoint(None)?;
    let crawl = app.crawl_controller(&path, None).await?;
    if let Some(job) = crawl.crawl_job(id).await {
        if job.state == CrawlState::Paused {
            println!("Crawl job {id} is already paused");
            return Ok(());
        }
    }
    bail!("no running or pending job {id}");
}
