//! `harvest remove <job-id>` – remove a download job. Downloaded files stay on disk.

use anyhow::{bail, Result};

use crate::cli::context::App;

pub async fn run_remove(app: &App, id: &str) -> Result<()> {
    let queue = app.download_queue(None).await?;
    if !queue.delete_job(id).await {
        bail!("no stopped download job {id} (see `harvest status`)");
    }
    println!("Removed download job {id}");
    Ok(())
}
