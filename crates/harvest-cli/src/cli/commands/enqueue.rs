//! `harvest enqueue <crawl-id>` – turn a finished crawl into a download job.

use anyhow::{anyhow, bail, Result};
use harvest_core::crawl::{CrawlState, FetchResult};
use std::path::PathBuf;

use crate::cli::context::App;

pub async fn run_enqueue(
    app: &App,
    crawl_id: &str,
    title: Option<String>,
    archive: bool,
    password: Option<String>,
    checkpoint: Option<PathBuf>,
) -> Result<()> {
    let path = app.crawl_checkpoint(checkpoint)?;
    let crawl = app.crawl_controller(&path, None).await?;
    let job = crawl
        .crawl_job(crawl_id)
        .await
        .ok_or_else(|| anyhow!("no crawl job {crawl_id} in {}", path.display()))?;
    if job.state != CrawlState::Waiting {
        bail!("crawl job {crawl_id} is {}; finish it first with `harvest resume {crawl_id}`", job.state);
    }
    if job.collected_items.is_empty() {
        bail!("crawl job {crawl_id} found no items");
    }
    enqueue_result(app, FetchResult::from_job(&job), title, archive, password).await
}

/// Adds every item of `result` to the download job with the crawl's id.
pub(super) async fn enqueue_result(
    app: &App,
    result: FetchResult,
    title: Option<String>,
    archive: bool,
    password: Option<String>,
) -> Result<()> {
    let queue = app.download_queue(None).await?;
    let title = title.unwrap_or_else(|| result.title.clone());
    let job_id = result.job_id.clone();
    let refs = result.into_gallery_refs();
    let total = refs.len();
    let added = queue.enqueue(&job_id, &title, refs, archive, password).await;
    println!("Queued {added} of {total} galleries in download job {job_id} ({title})");
    if added > 0 {
        println!("Start it with `harvest download --job {job_id}`");
    }
    Ok(())
}
