//! `harvest delete <id>` – drop a crawl job from the checkpoint.

use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::cli::context::App;

pub async fn run_delete(app: &App, id: &str, checkpoint: Option<PathBuf>) -> Result<()> {
    let path = app.crawl_checkpoint(checkpoint)?;
    let crawl = app.crawl_controller(&path, None).await?;
    if !crawl.delete_crawl(id).await {
        bail!("no waiting or paused crawl job {id} in {}", path.display());
    }
    println!("Deleted crawl job {id}");
    Ok(())
}
