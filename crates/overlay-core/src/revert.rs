use crate::ledger::RestoreData;
use anyhow::{Context, Result};
use async_trait::async_trait;
use overlay_config::RevertStrategyKind;
use overlay_models::PosterItem;
use overlay_sources::MediaServer;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// How an overlaid poster gets put back.
///
/// `capture` runs right before the overlaid image is uploaded and returns
/// whatever `revert` needs later. `revert` reports success as a bool: a
/// failure is logged here and the caller keeps the ledger entry for a retry.
#[async_trait]
pub trait RevertStrategy: Send + Sync {
    fn kind(&self) -> RevertStrategyKind;

    async fn capture(&self, server: &dyn MediaServer, item: &PosterItem, original: &[u8]) -> Result<RestoreData>;

    async fn revert(&self, server: &dyn MediaServer, item: &PosterItem, restore: &RestoreData) -> bool;

    /// Throw away captured state that will never be used, e.g. after the
    /// upload it was captured for failed.
    fn discard(&self, restore: &RestoreData) {
        if let RestoreData::BackupFile { path } = restore {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Failed to remove unused backup {}: {}", path.display(), e);
            }
        }
    }
}

/// Unlock the poster field and let the server pick its default artwork again.
pub async fn reset_poster(server: &dyn MediaServer, item: &PosterItem) -> bool {
    if let Err(e) = server.unlock_poster(item).await {
        warn!(
            rating_key = %item.rating_key,
            title = %item.title,
            "Failed to unlock {} poster: {}",
            item.kind.label(),
            e
        );
        return false;
    }
    if let Err(e) = server.refresh_metadata(item).await {
        warn!(
            rating_key = %item.rating_key,
            title = %item.title,
            "Failed to refresh {} metadata: {}",
            item.kind.label(),
            e
        );
        return false;
    }
    info!(
        operation = "revert",
        rating_key = %item.rating_key,
        title = %item.title,
        "Reset {} poster",
        item.kind.label()
    );
    true
}

/// Shared handling for restore data a strategy does not produce itself.
async fn revert_foreign(server: &dyn MediaServer, item: &PosterItem, restore: &RestoreData) -> bool {
    match restore {
        RestoreData::Untouched => true,
        other => {
            if !matches!(other, RestoreData::Reset) {
                debug!(
                    rating_key = %item.rating_key,
                    "Restore data '{}' does not match the configured strategy, resetting",
                    other.label()
                );
            }
            reset_poster(server, item).await
        }
    }
}

pub struct ResetStrategy;

#[async_trait]
impl RevertStrategy for ResetStrategy {
    fn kind(&self) -> RevertStrategyKind {
        RevertStrategyKind::Reset
    }

    async fn capture(&self, _server: &dyn MediaServer, _item: &PosterItem, _original: &[u8]) -> Result<RestoreData> {
        Ok(RestoreData::Reset)
    }

    async fn revert(&self, server: &dyn MediaServer, item: &PosterItem, restore: &RestoreData) -> bool {
        revert_foreign(server, item, restore).await
    }
}

/// Keeps the downloaded original on disk and uploads it again on revert.
pub struct BackupFileStrategy {
    backup_dir: PathBuf,
}

impl BackupFileStrategy {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
        }
    }

    pub fn backup_path(&self, item: &PosterItem, original: &[u8]) -> PathBuf {
        let extension = image::guess_format(original)
            .ok()
            .and_then(|format| format.extensions_str().first().copied())
            .unwrap_or("img");
        self.backup_dir.join(format!("{}.{}", item.rating_key, extension))
    }

    async fn restore_from(&self, server: &dyn MediaServer, item: &PosterItem, path: &Path) -> bool {
        if !path.exists() {
            warn!(
                rating_key = %item.rating_key,
                title = %item.title,
                "Backup {} is missing, resetting poster instead",
                path.display()
            );
            return reset_poster(server, item).await;
        }

        if let Err(e) = server.upload_poster(item, path).await {
            warn!(
                rating_key = %item.rating_key,
                title = %item.title,
                "Failed to restore {} poster from {}: {}",
                item.kind.label(),
                path.display(),
                e
            );
            return false;
        }

        if let Err(e) = std::fs::remove_file(path) {
            warn!("Restored poster but failed to remove backup {}: {}", path.display(), e);
        }
        info!(
            operation = "revert",
            rating_key = %item.rating_key,
            title = %item.title,
            "Restored {} poster from backup",
            item.kind.label()
        );
        true
    }
}

#[async_trait]
impl RevertStrategy for BackupFileStrategy {
    fn kind(&self) -> RevertStrategyKind {
        RevertStrategyKind::BackupFile
    }

    async fn capture(&self, _server: &dyn MediaServer, item: &PosterItem, original: &[u8]) -> Result<RestoreData> {
        std::fs::create_dir_all(&self.backup_dir)
            .with_context(|| format!("Failed to create {}", self.backup_dir.display()))?;
        let path = self.backup_path(item, original);
        std::fs::write(&path, original).with_context(|| format!("Failed to write backup {}", path.display()))?;
        debug!(rating_key = %item.rating_key, "Backed up original poster to {}", path.display());
        Ok(RestoreData::BackupFile { path })
    }

    async fn revert(&self, server: &dyn MediaServer, item: &PosterItem, restore: &RestoreData) -> bool {
        match restore {
            RestoreData::BackupFile { path } => self.restore_from(server, item, path).await,
            other => revert_foreign(server, item, other).await,
        }
    }
}

/// Remembers which server-side poster candidate was selected and selects it
/// again on revert.
pub struct PosterIdStrategy;

#[async_trait]
impl RevertStrategy for PosterIdStrategy {
    fn kind(&self) -> RevertStrategyKind {
        RevertStrategyKind::PosterId
    }

    async fn capture(&self, server: &dyn MediaServer, item: &PosterItem, _original: &[u8]) -> Result<RestoreData> {
        let candidates = server
            .poster_candidates(item)
            .await
            .with_context(|| format!("Failed to list posters for {}", item.title))?;
        match candidates.into_iter().find(|c| c.selected) {
            Some(selected) => Ok(RestoreData::PosterId { id: selected.id }),
            None => {
                debug!(rating_key = %item.rating_key, "No selected poster candidate, will reset on revert");
                Ok(RestoreData::Reset)
            }
        }
    }

    async fn revert(&self, server: &dyn MediaServer, item: &PosterItem, restore: &RestoreData) -> bool {
        let id = match restore {
            RestoreData::PosterId { id } => id,
            other => return revert_foreign(server, item, other).await,
        };

        let candidates = match server.poster_candidates(item).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(
                    rating_key = %item.rating_key,
                    title = %item.title,
                    "Failed to list posters: {}",
                    e
                );
                return false;
            }
        };

        let Some(candidate) = candidates.iter().find(|c| &c.id == id) else {
            warn!(
                rating_key = %item.rating_key,
                title = %item.title,
                "Poster {} is no longer offered, resetting instead",
                id
            );
            return reset_poster(server, item).await;
        };

        match server.select_poster(item, candidate).await {
            Ok(()) => {
                info!(
                    operation = "revert",
                    rating_key = %item.rating_key,
                    title = %item.title,
                    "Re-selected original {} poster",
                    item.kind.label()
                );
                true
            }
            Err(e) => {
                warn!(
                    rating_key = %item.rating_key,
                    title = %item.title,
                    "Failed to select poster {}: {}",
                    id,
                    e
                );
                false
            }
        }
    }
}

pub fn build_strategy(kind: RevertStrategyKind, backup_dir: &Path) -> Box<dyn RevertStrategy> {
    match kind {
        RevertStrategyKind::Reset => Box::new(ResetStrategy),
        RevertStrategyKind::BackupFile => Box::new(BackupFileStrategy::new(backup_dir)),
        RevertStrategyKind::PosterId => Box::new(PosterIdStrategy),
    }
}
