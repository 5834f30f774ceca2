//! `harvest status` – list crawl jobs and download jobs.

use anyhow::Result;
use std::path::PathBuf;

use crate::cli::context::App;

pub async fn run_status(app: &App, checkpoint: Option<PathBuf>) -> Result<()> {
    let path = app.crawl_checkpoint(checkpoint)?;
    let crawls = app.crawl_controller(&path, None).await?.crawl_jobs().await;
    if crawls.is_empty() {
        println!("No crawl jobs in {}.", path.display());
    } else {
        println!("{:<16} {:<9} {:>5} {:>6} {:>4}  {}", "CRAWL", "STATE", "PAGES", "ITEMS", "%", "URL");
        for j in crawls {
            println!(
                "{:<16} {:<9} {:>5} {:>6} {:>4}  {}",
                j.id,
                j.state.as_str(),
                j.page_count,
                j.collected_items.len(),
                j.progress,
                j.source_url
            );
            if !j.status.is_empty() {
                println!("{:<16} {}", "", j.status);
            }
        }
    }
    println!();

    let jobs = app.download_queue(None).await?.jobs().await;
    if jobs.is_empty() {
        println!("No download jobs.");
    } else {
        println!("{:<16} {:<10} {:>4} {:>9} {:>11}  {}", "JOB", "STATE", "%", "GALLERIES", "ASSETS", "TITLE");
        for j in jobs {
            let stats = j.stats();
            println!(
                "{:<16} {:<10} {:>4} {:>9} {:>11}  {}",
                j.id,
                j.state.as_str(),
                j.progress,
                format!("{}/{}", stats.galleries_done, stats.gallery_count),
                format!("{}/{}", stats.assets_done, stats.asset_count),
                j.title
            );
            if !j.status.is_empty() {
                println!("{:<16} {}", "", j.status);
            }
        }
    }
    Ok(())
}
