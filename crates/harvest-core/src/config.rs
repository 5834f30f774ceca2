use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::queue::QueueSettings;

pub const DEFAULT_PATH_TEMPLATE: &str = "{gid} {title}";
pub const DEFAULT_ARCHIVE_EXTENSION: &str = "zip";

/// Archive step settings (optional `[archive]` section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// External archiver executable (7-Zip compatible command line).
    pub program: String,
    /// File extension of produced archives, without the dot.
    pub extension: String,
    /// Where archives are written. None = the download directory.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            program: "7z".to_string(),
            extension: DEFAULT_ARCHIVE_EXTENSION.to_string(),
            output_dir: None,
        }
    }
}

/// Global configuration loaded from `~/.config/harvest/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Base URL of the scraping sidecar that serves pages, metadata and images.
    pub sidecar_url: String,
    /// Root directory for downloaded galleries.
    pub download_dir: PathBuf,
    /// Template for a gallery folder below the job folder, e.g. `{gid} {title}`.
    pub path_template: String,
    /// Crawl checkpoint file. None = `~/.local/state/harvest/tasks.json`.
    #[serde(default)]
    pub crawl_checkpoint: Option<PathBuf>,
    /// Download queue checkpoint file. None = `~/.local/state/harvest/downloads.json`.
    #[serde(default)]
    pub download_checkpoint: Option<PathBuf>,
    /// Default page cap for crawls (None = crawl until the cursor runs out).
    #[serde(default)]
    pub max_pages: Option<u32>,
    /// Per-request timeout applied by the sidecar client.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Optional archive step settings; if missing, built-in defaults are used.
    #[serde(default)]
    pub archive: Option<ArchiveConfig>,
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            sidecar_url: "http://127.0.0.1:8000".to_string(),
            download_dir: PathBuf::from("output"),
            path_template: DEFAULT_PATH_TEMPLATE.to_string(),
            crawl_checkpoint: None,
            download_checkpoint: None,
            max_pages: None,
            request_timeout_secs: default_request_timeout_secs(),
            archive: None,
        }
    }
}

impl HarvestConfig {
    /// Crawl checkpoint path, falling back to the XDG state directory.
    pub fn crawl_checkpoint_path(&self) -> Result<PathBuf> {
        match &self.crawl_checkpoint {
            Some(p) => Ok(p.clone()),
            None => Ok(state_dir()?.join("tasks.json")),
        }
    }

    /// Download queue checkpoint path, falling back to the XDG state directory.
    pub fn download_checkpoint_path(&self) -> Result<PathBuf> {
        match &self.download_checkpoint {
            Some(p) => Ok(p.clone()),
            None => Ok(state_dir()?.join("downloads.json")),
        }
    }

    pub fn archive_settings(&self) -> ArchiveConfig {
        self.archive.clone().unwrap_or_default()
    }

    /// Download queue settings derived from this config.
    pub fn queue_settings(&self) -> Result<QueueSettings> {
        let archive = self.archive_settings();
        Ok(QueueSettings {
            checkpoint_path: self.download_checkpoint_path()?,
            download_root: self.download_dir.clone(),
            path_template: self.path_template.clone(),
            archive_dir: archive.output_dir,
            archive_extension: archive.extension,
        })
    }
}

/// `~/.local/state/harvest` on Debian.
pub fn state_dir() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("harvest")?;
    Ok(xdg_dirs.get_state_home())
}

/// Unix socket a running `harvest` listens on for pause requests.
pub fn control_socket_path() -> Result<PathBuf> {
    Ok(state_dir()?.join("control.sock"))
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("harvest")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<HarvestConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = HarvestConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: HarvestConfig = toml::from_str(&data)?;
    Ok(cfg)
}
