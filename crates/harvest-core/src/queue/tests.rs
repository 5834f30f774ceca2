//! Tests for the download queue (scripted downloader, in-memory checkpoint store).

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{
    ArchiveState, DownloadQueue, GalleryRef, JobOutcome, QueueEvent, QueueSettings, TaskState,
};
use crate::checkpoint::MemoryStore;
use crate::services::{
    ArchiveProgress, ArchiveRequest, Archiver, GalleryDownloader, GalleryMetadata, ServiceError,
};

#[derive(Default)]
struct ScriptedDownloader {
    metadata: HashMap<String, Result<GalleryMetadata, String>>,
    broken_assets: HashSet<String>,
    fetched: Mutex<Vec<(String, PathBuf)>>,
}

impl ScriptedDownloader {
    fn gallery(mut self, link: &str, assets: usize) -> Self {
        let links = (0..assets).map(|n| format!("{}/img{}.png", link, n));
        self.metadata
            .insert(link.to_string(), Ok(GalleryMetadata::with_links(links)));
        self
    }

    fn broken_gallery(mut self, link: &str, reason: &str) -> Self {
        self.metadata.insert(link.to_string(), Err(reason.to_string()));
        self
    }

    fn broken_asset(mut self, url: &str) -> Self {
        self.broken_assets.insert(url.to_string());
        self
    }

    fn fetched(&self) -> Vec<(String, PathBuf)> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl GalleryDownloader for ScriptedDownloader {
    async fn metadata(&self, url: &str) -> Result<GalleryMetadata, ServiceError> {
        match self.metadata.get(url) {
            Some(Ok(meta)) => Ok(meta.clone()),
            Some(Err(reason)) => Err(ServiceError::Transport(reason.clone())),
            None => Ok(GalleryMetadata {
                error: Some("gallery not found".to_string()),
                ..GalleryMetadata::default()
            }),
        }
    }

    async fn download_asset(&self, url: &str, save_path: &Path) -> Result<(), ServiceError> {
        if self.broken_assets.contains(url) {
            return Err(ServiceError::Remote("HTTP 404".to_string()));
        }
        self.fetched
            .lock()
            .unwrap()
            .push((url.to_string(), save_path.to_path_buf()));
        Ok(())
    }
}

struct RecordingArchiver {
    fail: bool,
    requests: Mutex<Vec<ArchiveRequest>>,
}

impl RecordingArchiver {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            fail,
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Archiver for RecordingArchiver {
    async fn archive(
        &self,
        request: &ArchiveRequest,
        progress: ArchiveProgress,
    ) -> Result<(), ServiceError> {
        self.requests.lock().unwrap().push(request.clone());
        let _ = progress.send(50);
        let _ = progress.send(100);
        if self.fail {
            Err(ServiceError::Remote("7z exited with status 2".to_string()))
        } else {
            Ok(())
        }
    }
}

fn refs(links: &[&str]) -> Vec<GalleryRef> {
    links
        .iter()
        .enumerate()
        .map(|(n, link)| GalleryRef {
            id: format!("crawl-{}", n),
            title: format!("Gallery {}", n),
            link: link.to_string(),
        })
        .collect()
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    store: Arc<MemoryStore>,
    settings: QueueSettings,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("output");
        let settings = QueueSettings::new("downloads.json", &root);
        Self {
            _dir: dir,
            root,
            store: Arc::new(MemoryStore::new()),
            settings,
        }
    }

    fn queue(&self, downloader: Arc<ScriptedDownloader>) -> DownloadQueue {
        DownloadQueue::new(downloader, self.store.clone(), self.settings.clone())
    }
}

const G1: &str = "https://example.org/g/1/aa/";
const G2: &str = "https://example.org/g/2/bb/";
const G3: &str = "https://example.org/g/3/cc/";

#[tokio::test]
async fn metadata_error_leaves_job_in_error_at_half_progress() {
    let fx = Fixture::new();
    let downloader = Arc::new(
        ScriptedDownloader::default()
            .gallery(G1, 3)
            .broken_gallery(G2, "timed out"),
    );
    let queue = Arc::new(fx.queue(downloader.clone()));
    queue.enqueue("job", "Two", refs(&[G1, G2]), false, None).await;

    let outcome = queue.start_job("job").await.unwrap().join().await;
    assert_eq!(outcome, JobOutcome::Failed);

    let job = queue.job("job").await.unwrap();
    assert_eq!(job.state, TaskState::Error);
    assert_eq!(job.progress, 50);
    assert_eq!(job.galleries[0].state, TaskState::Completed);
    assert_eq!(job.galleries[0].completed_asset_count, 3);
    assert_eq!(job.galleries[1].state, TaskState::Error);
    assert!(job.galleries[1].error.as_deref().unwrap().contains("timed out"));
    assert_eq!(downloader.fetched().len(), 3);

    let doc = fx.store.document(Path::new("downloads.json")).unwrap();
    assert_eq!(doc["jobs"][0]["state"], "error");
    assert_eq!(doc["jobs"][0]["galleries"][0]["completedAssetCount"], 3);
}

#[tokio::test]
async fn assets_land_in_template_folder_with_snapshot() {
    let fx = Fixture::new();
    let downloader = Arc::new(ScriptedDownloader::default().gallery(G1, 2));
    let queue = Arc::new(fx.queue(downloader.clone()));
    queue.enqueue("job", "My Job", refs(&[G1]), false, None).await;

    let outcome = queue.start_job("job").await.unwrap().join().await;
    assert_eq!(outcome, JobOutcome::Completed);

    let target = fx.root.join("My Job").join("1 Gallery 0");
    let job = queue.job("job").await.unwrap();
    assert_eq!(job.galleries[0].target_path, target);
    assert_eq!(job.progress, 100);
    assert_eq!(job.state, TaskState::Completed);

    let paths: Vec<PathBuf> = downloader.fetched().into_iter().map(|(_, p)| p).collect();
    assert_eq!(paths, vec![target.join("0001.png"), target.join("0002.png")]);

    let snapshot: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(target.join("metadata.json")).unwrap())
            .unwrap();
    assert_eq!(snapshot["sourceLink"], G1);
    assert_eq!(snapshot["imageLinks"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn failed_asset_marks_gallery_error_but_finishes_the_rest() {
    let fx = Fixture::new();
    let downloader = Arc::new(
        ScriptedDownloader::default()
            .gallery(G1, 3)
            .broken_asset(&format!("{}/img1.png", G1)),
    );
    let queue = Arc::new(fx.queue(downloader.clone()));
    queue.enqueue("job", "J", refs(&[G1]), false, None).await;
    queue.start_job("job").await.unwrap().join().await;

    let job = queue.job("job").await.unwrap();
    let gallery = &job.galleries[0];
    assert_eq!(gallery.state, TaskState::Error);
    assert_eq!(gallery.asset_count, 3);
    assert_eq!(gallery.completed_asset_count, 2);
    assert_eq!(gallery.error.as_deref(), Some("1 of 3 assets failed"));
    assert_eq!(job.state, TaskState::Error);
    assert_eq!(job.progress, 0);
}

#[tokio::test]
async fn remote_reported_failure_and_empty_gallery_are_errors() {
    let fx = Fixture::new();
    let downloader = Arc::new(ScriptedDownloader::default().gallery(G2, 0));
    let queue = Arc::new(fx.queue(downloader));
    // G1 is unknown to the downloader: metadata carries an error field.
    queue.enqueue("job", "J", refs(&[G1, G2]), false, None).await;
    queue.start_job("job").await.unwrap().join().await;

    let job = queue.job("job").await.unwrap();
    assert_eq!(job.galleries[0].error.as_deref(), Some("gallery not found"));
    assert_eq!(job.galleries[1].state, TaskState::Error);
    assert_eq!(job.galleries[1].asset_count, 0);
}

#[tokio::test]
async fn enqueue_is_idempotent_and_keeps_completed_galleries() {
    let fx = Fixture::new();
    let downloader = Arc::new(ScriptedDownloader::default().gallery(G1, 1).gallery(G2, 1));
    let queue = Arc::new(fx.queue(downloader.clone()));

    assert_eq!(queue.enqueue("job", "J", refs(&[G1]), false, None).await, 1);
    assert_eq!(queue.enqueue("job", "J", refs(&[G1]), false, None).await, 0);
    queue.start_job("job").await.unwrap().join().await;
    assert_eq!(queue.job("job").await.unwrap().state, TaskState::Completed);

    let added = queue
        .enqueue("job", "J", vec![GalleryRef { id: "x".into(), title: "B".into(), link: G2.into() }], false, None)
        .await;
    assert_eq!(added, 1);
    let job = queue.job("job").await.unwrap();
    assert_eq!(job.state, TaskState::Pending);
    assert_eq!(job.galleries.len(), 2);
    assert_eq!(job.galleries[0].state, TaskState::Completed);
    assert_eq!(job.progress, 50);

    queue.start_job("job").await.unwrap().join().await;
    // Only the new gallery's asset was fetched the second time.
    assert_eq!(downloader.fetched().len(), 2);
    assert_eq!(queue.job("job").await.unwrap().state, TaskState::Completed);
}

#[tokio::test]
async fn archive_step_runs_after_full_completion() {
    let fx = Fixture::new();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let archiver = RecordingArchiver::new(false);
    let queue = Arc::new(
        fx.queue(Arc::new(ScriptedDownloader::default().gallery(G1, 1)))
            .with_archiver(archiver.clone())
            .with_events(tx),
    );
    queue
        .enqueue("job", "Packed", refs(&[G1]), true, Some("s3cret".into()))
        .await;

    let outcome = queue.start_job("job").await.unwrap().join().await;
    assert_eq!(outcome, JobOutcome::Completed);
    let job = queue.job("job").await.unwrap();
    assert_eq!(job.state, TaskState::Completed);
    assert_eq!(job.archive_state, ArchiveState::Archived);

    let requests = archiver.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].folder, fx.root.join("Packed"));
    assert_eq!(requests[0].output, fx.root.join("Packed.zip"));
    assert_eq!(requests[0].password.as_deref(), Some("s3cret"));

    let mut archive_progress = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let QueueEvent::ArchiveProgress { percent, .. } = event {
            archive_progress.push(percent);
        }
    }
    assert_eq!(archive_progress, vec![50, 100]);
}

#[tokio::test]
async fn archive_failure_keeps_job_out_of_completed() {
    let fx = Fixture::new();
    let queue = Arc::new(
        fx.queue(Arc::new(ScriptedDownloader::default().gallery(G1, 1)))
            .with_archiver(RecordingArchiver::new(true)),
    );
    queue.enqueue("job", "J", refs(&[G1]), true, None).await;
    let outcome = queue.start_job("job").await.unwrap().join().await;

    assert_eq!(outcome, JobOutcome::Failed);
    let job = queue.job("job").await.unwrap();
    assert_eq!(job.state, TaskState::Error);
    assert_eq!(job.archive_state, ArchiveState::ArchiveError);
    assert_eq!(job.galleries[0].state, TaskState::Completed);
    assert!(job.status.starts_with("Archive failed"));
}

#[tokio::test]
async fn archive_without_archiver_fails() {
    let fx = Fixture::new();
    let queue = Arc::new(fx.queue(Arc::new(ScriptedDownloader::default().gallery(G1, 1))));
    queue.enqueue("job", "J", refs(&[G1]), true, None).await;
    queue.start_job("job").await.unwrap().join().await;
    assert_eq!(
        queue.job("job").await.unwrap().archive_state,
        ArchiveState::ArchiveError
    );
}

#[tokio::test]
async fn restart_downloads_everything_again() {
    let fx = Fixture::new();
    let downloader = Arc::new(ScriptedDownloader::default().gallery(G1, 2));
    let queue = Arc::new(fx.queue(downloader.clone()));
    queue.enqueue("job", "J", refs(&[G1]), false, None).await;
    queue.start_job("job").await.unwrap().join().await;

    assert!(queue.start_job("job").await.is_none(), "completed job is not startable");
    let outcome = queue.restart_job("job").await.unwrap().join().await;
    assert_eq!(outcome, JobOutcome::Completed);
    assert_eq!(downloader.fetched().len(), 4);
}

#[tokio::test]
async fn pause_pending_job_then_start_all() {
    let fx = Fixture::new();
    let downloader = Arc::new(ScriptedDownloader::default().gallery(G1, 1).gallery(G3, 1));
    let queue = Arc::new(fx.queue(downloader));
    queue.enqueue("a", "A", refs(&[G1]), false, None).await;
    queue.enqueue("b", "B", refs(&[G3]), false, None).await;

    assert!(queue.pause_job("a").await);
    let job = queue.job("a").await.unwrap();
    assert_eq!(job.state, TaskState::Paused);
    assert_eq!(job.galleries[0].state, TaskState::Paused);
    assert!(!queue.pause_job("a").await, "already paused");

    let handles = queue.start_all().await;
    assert_eq!(handles.len(), 2);
    for handle in handles {
        assert_eq!(handle.join().await, JobOutcome::Completed);
    }
    let stats = queue.stats("a").await.unwrap();
    assert_eq!(stats.job_percent(), 100);
    assert_eq!(stats.assets_done, 1);
}

#[tokio::test]
async fn delete_removes_job_from_checkpoint() {
    let fx = Fixture::new();
    let queue = Arc::new(fx.queue(Arc::new(ScriptedDownloader::default())));
    queue.enqueue("a", "A", refs(&[G1]), false, None).await;
    queue.enqueue("b", "B", refs(&[G2]), false, None).await;

    assert!(queue.delete_job("a").await);
    assert!(!queue.delete_job("a").await);
    let doc = fx.store.document(Path::new("downloads.json")).unwrap();
    let ids: Vec<&str> = doc["jobs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["b"]);
}

#[tokio::test]
async fn restore_parks_interrupted_work() {
    let fx = Fixture::new();
    fx.store.insert(
        "downloads.json",
        json!({
            "version": "1.0",
            "jobs": [
                {"id": "run", "title": "R", "state": "running", "galleries": [
                    {"id": "g0", "link": G1, "state": "completed", "assetCount": 1, "completedAssetCount": 1},
                    {"id": "g1", "sourceLink": G2, "state": "running", "assetCount": 4, "completedAssetCount": 9}
                ]},
                {"id": "arc", "title": "A", "state": "running", "isArchive": true,
                 "archiveState": "archiving", "galleries": []},
                {"id": "done", "title": "D", "state": "completed"}
            ]
        }),
    );
    let queue = fx.queue(Arc::new(ScriptedDownloader::default()));
    assert_eq!(queue.restore().await.unwrap(), 3);

    let run = queue.job("run").await.unwrap();
    assert_eq!(run.state, TaskState::Paused);
    assert_eq!(run.galleries[0].state, TaskState::Completed);
    assert_eq!(run.galleries[1].state, TaskState::Paused);
    assert_eq!(run.galleries[1].completed_asset_count, 4);
    assert_eq!(run.root_dir, fx.root.join("R"));

    let arc = queue.job("arc").await.unwrap();
    assert_eq!(arc.state, TaskState::Paused);
    assert_eq!(arc.archive_state, ArchiveState::ArchiveError);

    assert_eq!(queue.job("done").await.unwrap().state, TaskState::Completed);
}

#[tokio::test]
async fn restore_migrates_legacy_item_list() {
    let fx = Fixture::new();
    fx.store.insert(
        "downloads.json",
        json!([{"title": "one", "link": G1}, {"title": "two", "link": G2}]),
    );
    let queue = fx.queue(Arc::new(ScriptedDownloader::default()));
    assert_eq!(queue.restore().await.unwrap(), 1);
    let jobs = queue.jobs().await;
    assert_eq!(jobs[0].galleries.len(), 2);
    assert_eq!(jobs[0].state, TaskState::Pending);
    assert!(jobs[0].id.starts_with("imported-"));
    let doc = fx.store.document(Path::new("downloads.json")).unwrap();
    assert_eq!(doc["version"], "1.0");
}
