//! CLI for the harvest crawler and gallery downloader.

mod commands;
mod context;
mod control_socket;
mod report;

use anyhow::Result;
use clap::{Parser, Subcommand};
use harvest_core::config;
use std::path::PathBuf;

use commands::{
    run_crawl, run_delete, run_download, run_enqueue, run_pause, run_remove, run_restart,
    run_resume, run_status,
};
use context::App;

/// Top-level CLI for harvest.
#[derive(Debug, Parser)]
#[command(name = "harvest")]
#[command(about = "harvest: resumable catalog crawler and gallery downloader", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Crawl a paginated listing, resuming from the checkpoint if it was crawled before.
    Crawl {
        /// Listing URL.
        url: String,
        /// Stop after N pages (default: config `max_pages`, else unlimited).
        #[arg(long, value_name = "N")]
        max_pages: Option<u32>,
        /// Crawl checkpoint file (default: config `crawl_checkpoint`).
        #[arg(long, value_name = "PATH")]
        checkpoint: Option<PathBuf>,
        /// Put the harvested items into the download queue when the crawl finishes.
        #[arg(long)]
        enqueue: bool,
        /// With --enqueue: archive the download job once every gallery completed.
        #[arg(long)]
        archive: bool,
        /// With --archive: archive password.
        #[arg(long, value_name = "PASSWORD")]
        password: Option<String>,
    },

    /// Resume a paused crawl by its ID.
    Resume {
        /// Crawl job identifier.
        id: String,
        #[arg(long, value_name = "PATH")]
        checkpoint: Option<PathBuf>,
    },

    /// Delete a waiting or paused crawl job.
    Delete {
        /// Crawl job identifier.
        id: String,
        #[arg(long, value_name = "PATH")]
        checkpoint: Option<PathBuf>,
    },

    /// Show crawl jobs and download jobs.
    Status {
        #[arg(long, value_name = "PATH")]
        checkpoint: Option<PathBuf>,
    },

    /// Create (or extend) a download job from a crawl job's items.
    Enqueue {
        /// Crawl job identifier; also used as the download job identifier.
        crawl_id: String,
        /// Download job title (default: "Fetched from <host> (<n> items)").
        #[arg(long)]
        title: Option<String>,
        /// Archive the job folder once every gallery completed.
        #[arg(long)]
        archive: bool,
        /// Archive password.
        #[arg(long, value_name = "PASSWORD")]
        password: Option<String>,
        #[arg(long, value_name = "PATH")]
        checkpoint: Option<PathBuf>,
    },

    /// Download queued jobs: one job with --job, otherwise every pending or paused job.
    Download {
        #[arg(long, value_name = "ID")]
        job: Option<String>,
    },

    /// Pause a crawl or download job (signals a running harvest if there is one).
    Pause {
        /// Crawl or download job identifier.
        id: String,
    },

    /// Reset a download job and download everything again.
    Restart {
        /// Download job identifier.
        id: String,
    },

    /// Remove a download job that is not running.
    Remove {
        /// Download job identifier.
        id: String,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let app = App::new(cfg)?;

        match cli.command {
            CliCommand::Crawl {
                url,
                max_pages,
                checkpoint,
                enqueue,
                archive,
                password,
            } => {
                run_crawl(&app, &url, max_pages, checkpoint, enqueue, archive, password).await?
            }
            CliCommand::Resume { id, checkpoint } => run_resume(&app, &id, checkpoint).await?,
            CliCommand::Delete { id, checkpoint } => run_delete(&app, &id, checkpoint).await?,
            CliCommand::Status { checkpoint } => run_status(&app, checkpoint).await?,
            CliCommand::Enqueue {
                crawl_id,
                title,
                archive,
                password,
                checkpoint,
            } => run_enqueue(&app, &crawl_id, title, archive, password, checkpoint).await?,
            CliCommand::Download { job } => run_download(&app, job.as_deref()).await?,
            CliCommand::Pause { id } => run_pause(&app, &id).await?,
            CliCommand::Restart { id } => run_restart(&app, &id).await?,
            CliCommand::Remove { id } => run_remove(&app, &id).await?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
