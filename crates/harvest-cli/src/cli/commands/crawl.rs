//! `harvest crawl <url>` – crawl a listing, optionally handing the result to the download queue.

use anyhow::{bail, Context, Result};
use harvest_core::crawl::{CrawlHandle, CrawlOutcome, FetchResult};
use std::path::PathBuf;

use super::enqueue::enqueue_result;
use crate::cli::context::App;
use crate::cli::control_socket::ControlTargets;
use crate::cli::report::{self, Session};

pub async fn run_crawl(
    app: &App,
    url: &str,
    max_pages: Option<u32>,
    checkpoint: Option<PathBuf>,
    enqueue: bool,
    archive: bool,
    password: Option<String>,
) -> Result<()> {
    let path = app.crawl_checkpoint(checkpoint)?;
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let crawl = app.crawl_controller(&path, Some(tx)).await?;
    let printer = report::spawn_crawl_printer(rx);
    let session = Session::start(ControlTargets {
        crawl: Some(crawl.clone()),
        queue: None,
    });

    let handle = crawl
        .start_crawl(url, &path, max_pages.or(app.cfg.max_pages))
        .await
        .with_context(|| format!("{url} is already being crawled"))?;
    println!("Crawling {} as job {}", url, handle.id);
    let result = wait_for_crawl(handle).await;
    session.close();
    printer.abort();

    let result = result?;
    if enqueue {
        if let Some(result) = result {
            enqueue_result(app, result, None, archive, password).await?;
        }
    }
    Ok(())
}

/// Waits for a crawl loop and prints how it ended. Returns the harvested
/// items when the crawl finished or hit its page limit.
pub(super) async fn wait_for_crawl(handle: CrawlHandle) -> Result<Option<FetchResult>> {
    let id = handle.id.clone();
    match handle.join().await {
        CrawlOutcome::Completed(result) => {
            println!("Finished: {} items found", result.items.len());
            Ok(Some(result))
        }
        CrawlOutcome::Capped(result) => {
            println!(
                "Reached the page limit with {} items; crawl the same URL again to continue",
                result.items.len()
            );
            Ok(Some(result))
        }
        CrawlOutcome::Paused => {
            println!("Paused crawl {id}; continue with `harvest resume {id}`");
            Ok(None)
        }
        CrawlOutcome::Deleted => {
            println!("Crawl {id} was deleted");
            Ok(None)
        }
        CrawlOutcome::Failed(reason) => {
            bail!("crawl {id} stopped: {reason} (progress kept; `harvest resume {id}` retries)")
        }
    }
}
