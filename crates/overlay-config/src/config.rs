use crate::PathManager;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub revert: RevertConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub purge: PurgeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_url")]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Badge image composited onto posters
    #[serde(default = "default_overlay_image")]
    pub image: PathBuf,
    /// Badge width as a fraction of the poster width
    #[serde(default = "default_scale")]
    pub scale: f32,
    /// A season counts as new while its first episode aired at most this many days ago
    #[serde(default = "default_window_days")]
    pub window_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevertStrategyKind {
    /// Unlock the poster and let the server pick its default again
    Reset,
    /// Keep a local copy of the original poster and upload it back
    BackupFile,
    /// Remember which poster candidate was selected and re-select it
    PosterId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevertConfig {
    #[serde(default = "default_revert_strategy")]
    pub strategy: RevertStrategyKind,
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Write badged posters to the preview folder instead of uploading them
    #[serde(default = "default_true")]
    pub preview: bool,
    #[serde(default)]
    pub preview_dir: Option<PathBuf>,
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
    #[serde(default)]
    pub ledger_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,
    #[serde(default = "default_true")]
    pub run_on_startup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeConfig {
    /// Fetch attempts before a ledger entry for an unreachable show is dropped
    #[serde(default = "default_purge_attempts")]
    pub attempts: u32,
    #[serde(default = "default_backoff_seconds")]
    pub backoff_seconds: u64,
}

fn default_true() -> bool {
    true
}

fn default_server_url() -> String {
    "http://localhost:32400".to_string()
}

fn default_overlay_image() -> PathBuf {
    PathBuf::from("new_season.png")
}

fn default_scale() -> f32 {
    0.85
}

fn default_window_days() -> u32 {
    20
}

fn default_revert_strategy() -> RevertStrategyKind {
    RevertStrategyKind::Reset
}

fn default_interval_hours() -> u64 {
    24
}

fn default_purge_attempts() -> u32 {
    3
}

fn default_backoff_seconds() -> u64 {
    2
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { url: default_server_url() }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            image: default_overlay_image(),
            scale: default_scale(),
            window_days: default_window_days(),
        }
    }
}

impl Default for RevertConfig {
    fn default() -> Self {
        Self {
            strategy: default_revert_strategy(),
            backup_dir: None,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            preview: default_true(),
            preview_dir: None,
            staging_dir: None,
            ledger_file: None,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_hours: default_interval_hours(),
            run_on_startup: default_true(),
        }
    }
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            attempts: default_purge_attempts(),
            backoff_seconds: default_backoff_seconds(),
        }
    }
}

impl Config {
    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.url.trim().is_empty() {
            return Err(anyhow::anyhow!("server.url cannot be empty"));
        }
        if !(self.overlay.scale > 0.0 && self.overlay.scale <= 1.0) {
            return Err(anyhow::anyhow!(
                "overlay.scale must be in (0, 1], got {}",
                self.overlay.scale
            ));
        }
        if self.overlay.window_days == 0 {
            return Err(anyhow::anyhow!("overlay.window_days must be at least 1"));
        }
        if self.scheduler.interval_hours == 0 {
            return Err(anyhow::anyhow!("scheduler.interval_hours must be at least 1"));
        }
        if self.purge.attempts == 0 {
            return Err(anyhow::anyhow!("purge.attempts must be at least 1"));
        }
        Ok(())
    }

    pub fn ledger_file(&self, paths: &PathManager) -> PathBuf {
        self.run.ledger_file.clone().unwrap_or_else(|| paths.ledger_file())
    }

    pub fn preview_dir(&self, paths: &PathManager) -> PathBuf {
        self.run.preview_dir.clone().unwrap_or_else(|| paths.preview_dir())
    }

    pub fn staging_dir(&self, paths: &PathManager) -> PathBuf {
        self.run.staging_dir.clone().unwrap_or_else(|| paths.staging_dir())
    }

    pub fn backup_dir(&self, paths: &PathManager) -> PathBuf {
        self.revert.backup_dir.clone().unwrap_or_else(|| paths.backup_dir())
    }

    /// Relative overlay paths are taken from the config directory.
    pub fn overlay_image(&self, paths: &PathManager) -> PathBuf {
        if self.overlay.image.is_absolute() {
            self.overlay.image.clone()
        } else {
            paths.config_dir().join(&self.overlay.image)
        }
    }
}
