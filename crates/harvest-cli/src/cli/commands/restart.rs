//! `harvest restart <job-id>` – reset a download job and download everything again.

use anyhow::{anyhow, Result};

use super::download::wait_for_jobs;
use crate::cli::context::App;
use crate::cli::control_socket::ControlTargets;
use crate::cli::report::{self, Session};

pub async fn run_restart(app: &App, id: &str) -> Result<()> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let queue = app.download_queue(Some(tx)).await?;
    let printer = report::spawn_queue_printer(rx);
    let session = Session::start(ControlTargets {
        crawl: None,
        queue: Some(queue.clone()),
    });

    let outcome = match queue.restart_job(id).await {
        Some(handle) => {
            println!("Restarting download job {id}");
            wait_for_jobs(&queue, vec![handle]).await
        }
        None => Err(anyhow!("no stopped download job {id} (see `harvest status`)")),
    };
    session.close();
    printer.abort();
    outcome
}
