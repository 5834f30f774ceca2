//! Wiring shared by the commands: config, checkpoint store and collaborators.

use anyhow::{Context, Result};
use harvest_core::checkpoint::JsonFileStore;
use harvest_core::config::HarvestConfig;
use harvest_core::crawl::{CrawlController, CrawlEvent};
use harvest_core::queue::{DownloadQueue, QueueEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use crate::archiver::SevenZipArchiver;
use crate::sidecar::SidecarClient;

pub struct App {
    pub cfg: HarvestConfig,
    store: Arc<JsonFileStore>,
    sidecar: Arc<SidecarClient>,
}

impl App {
    pub fn new(cfg: HarvestConfig) -> Result<Self> {
        let sidecar = SidecarClient::new(&cfg.sidecar_url, cfg.request_timeout_secs)?;
        Ok(Self {
            cfg,
            store: Arc::new(JsonFileStore::new()),
            sidecar: Arc::new(sidecar),
        })
    }

    /// `--checkpoint` if given, else the configured crawl checkpoint.
    pub fn crawl_checkpoint(&self, explicit: Option<PathBuf>) -> Result<PathBuf> {
        match explicit {
            Some(p) => Ok(p),
            None => self.cfg.crawl_checkpoint_path(),
        }
    }

    /// Crawl controller with the jobs stored at `path` loaded.
    pub async fn crawl_controller(
        &self,
        path: &Path,
        events: Option<UnboundedSender<CrawlEvent>>,
    ) -> Result<Arc<CrawlController>> {
        let mut controller = CrawlController::new(self.sidecar.clone(), self.store.clone());
        if let Some(tx) = events {
            controller = controller.with_events(tx);
        }
        controller
            .restore(path)
            .await
            .with_context(|| format!("load crawl checkpoint {}", path.display()))?;
        Ok(Arc::new(controller))
    }

    /// Download queue with its checkpoint loaded.
    pub async fn download_queue(
        &self,
        events: Option<UnboundedSender<QueueEvent>>,
    ) -> Result<Arc<DownloadQueue>> {
        let settings = self.cfg.queue_settings()?;
        let archiver = SevenZipArchiver::new(self.cfg.archive_settings().program);
        let mut queue = DownloadQueue::new(self.sidecar.clone(), self.store.clone(), settings)
            .with_archiver(Arc::new(archiver));
        if let Some(tx) = events {
            queue = queue.with_events(tx);
        }
        let path = queue.settings().checkpoint_path.clone();
        queue
            .restore()
            .await
            .with_context(|| format!("load download checkpoint {}", path.display()))?;
        Ok(Arc::new(queue))
    }
}
