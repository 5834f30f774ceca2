//! The page loop. One iteration fetches one page; every boundary between pages
//! is where pause is observed and progress is persisted.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::types::{CrawlJob, CrawlOutcome, CrawlState, FetchResult};
use super::CrawlController;
use crate::control::LoopGuard;
use crate::progress::crawl_progress;

enum Next {
    Fetch {
        url: String,
        cursor: Option<String>,
        page: u32,
    },
    Finish {
        capped: bool,
    },
}

fn find<'a>(jobs: &'a mut [CrawlJob], id: &str) -> Option<&'a mut CrawlJob> {
    jobs.iter_mut().find(|j| j.id == id)
}

pub(super) async fn run_crawl(
    ctl: Arc<CrawlController>,
    id: String,
    guard: LoopGuard<String>,
) -> CrawlOutcome {
    loop {
        let next = {
            let mut jobs = ctl.jobs.lock().await;
            let Some(job) = find(&mut jobs, &id) else {
                debug!(job = %id, "crawl job vanished; stopping loop");
                return CrawlOutcome::Deleted;
            };
            let path: PathBuf = job.checkpoint_path.clone();

            if job.is_exhausted() {
                Next::Finish { capped: false }
            } else if guard.pause_requested() || job.state == CrawlState::Paused {
                job.state = CrawlState::Paused;
                job.status = format!(
                    "Paused after page {} ({} items)",
                    job.page_count,
                    job.collected_items.len()
                );
                ctl.emit_update(job);
                ctl.persist(&jobs, &path).await;
                info!(job = %id, "crawl paused");
                return CrawlOutcome::Paused;
            } else {
                let page = job.page_count + 1;
                if job.max_pages.is_some_and(|max| page > max) {
                    info!(job = %id, "reached page limit ({})", page - 1);
                    Next::Finish { capped: true }
                } else {
                    job.progress = crawl_progress(page);
                    job.status = format!(
                        "Fetching page {}... (Found {})",
                        page,
                        job.collected_items.len()
                    );
                    ctl.emit_update(job);
                    Next::Fetch {
                        url: job.source_url.clone(),
                        cursor: job.cursor.clone(),
                        page,
                    }
                }
            }
        };

        let (url, cursor, page) = match next {
            Next::Fetch { url, cursor, page } => (url, cursor, page),
            Next::Finish { capped } => return finish(&ctl, &id, capped).await,
        };

        debug!(job = %id, page, cursor = ?cursor, "fetching page");
        let response = ctl.fetcher.fetch(&url, cursor.as_deref()).await;

        let mut jobs = ctl.jobs.lock().await;
        let Some(job) = find(&mut jobs, &id) else {
            return CrawlOutcome::Deleted;
        };
        let path = job.checkpoint_path.clone();
        match response {
            Ok(response) => {
                let next_cursor = response.cursor().map(str::to_string);
                let Some(items) = response.items else {
                    debug!(job = %id, page, "page carried no items; treating as end of data");
                    job.cursor = None;
                    job.page_count = page;
                    drop(jobs);
                    return finish(&ctl, &id, false).await;
                };
                debug!(job = %id, page, "page returned {} item(s)", items.len());
                job.collected_items.extend(items);
                job.cursor = next_cursor;
                job.page_count = page;
                ctl.persist(&jobs, &path).await;
            }
            Err(e) => {
                warn!(job = %id, page, "page fetch failed: {}", e);
                let reason = e.to_string();
                job.state = CrawlState::Paused;
                job.status = format!("Error: {}", reason);
                ctl.emit_update(job);
                ctl.persist(&jobs, &path).await;
                return CrawlOutcome::Failed(reason);
            }
        }
    }
}

async fn finish(ctl: &CrawlController, id: &str, capped: bool) -> CrawlOutcome {
    let mut jobs = ctl.jobs.lock().await;
    let Some(job) = find(&mut jobs, id) else {
        return CrawlOutcome::Deleted;
    };
    job.progress = 100;
    job.state = CrawlState::Waiting;
    job.status = if capped {
        format!("Reached page limit ({})", job.page_count)
    } else {
        format!("Finished: {} items found", job.collected_items.len())
    };
    ctl.emit_update(job);
    let result = FetchResult::from_job(job);
    let path = job.checkpoint_path.clone();
    ctl.persist(&jobs, &path).await;
    drop(jobs);

    info!(job = %id, items = result.items.len(), capped, "crawl finished");
    ctl.push_result(result.clone());
    if capped {
        CrawlOutcome::Capped(result)
    } else {
        CrawlOutcome::Completed(result)
    }
}
