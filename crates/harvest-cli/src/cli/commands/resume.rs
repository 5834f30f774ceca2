//! `harvest resume <id>` – continue a paused crawl from its saved cursor.

use anyhow::{anyhow, Result};
use std::path::PathBuf;

use super::crawl::wait_for_crawl;
use crate::cli::context::App;
use crate::cli::control_socket::ControlTargets;
use crate::cli::report::{self, Session};

pub async fn run_resume(app: &App, id: &str, checkpoint: Option<PathBuf>) -> Result<()> {
    let path = app.crawl_checkpoint(checkpoint)?;
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let crawl = app.crawl_controller(&path, Some(tx)).await?;
    let printer = report::spawn_crawl_printer(rx);
    let session = Session::start(ControlTargets {
        crawl: Some(crawl.clone()),
        queue: None,
    });

    let outcome = match crawl.resume_crawl(id).await {
        Some(handle) => {
            println!("Resuming crawl {id}");
            wait_for_crawl(handle).await.map(|_| ())
        }
        None => Err(anyhow!(
            "crawl job {id} is not paused (see `harvest status`)"
        )),
    };
    session.close();
    printer.abort();
    outcome
}
