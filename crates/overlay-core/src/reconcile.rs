use crate::compositor::{save_png, Compositor};
use crate::eligibility::{latest_season, Eligibility, EligibilityEvaluator};
use crate::files::{poster_stem, preview_path, staging_path, StagedFile};
use crate::ledger::{LedgerEntry, OverlayLedger, OverlayMode, RestoreData, SeasonRecord};
use crate::revert::RevertStrategy;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use overlay_models::{ItemKind, PosterItem, RatingKey, Season, Show};
use overlay_sources::MediaServer;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub window_days: u32,
    pub preview: bool,
    pub preview_dir: PathBuf,
    pub staging_dir: PathBuf,
    /// Fetch attempts before a tracked show that keeps failing is purged
    pub purge_attempts: u32,
    /// Delay before the second attempt; doubles after each failure
    pub purge_backoff: Duration,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub shows_scanned: usize,
    pub eligible: usize,
    pub applied: usize,
    pub previewed: usize,
    pub reverted: usize,
    pub purged: usize,
    pub unchanged: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl ReconcileReport {
    fn record_error(&mut self, title: &str, error: &anyhow::Error) {
        self.errors.push(format!("{}: {:#}", title, error));
    }
}

enum Lookup {
    Found(Show),
    Gone(String),
}

enum RevertOutcome {
    Reverted,
    /// Some poster failed; the entry holds only what is still left to undo.
    Pending(LedgerEntry),
}

/// Brings the server's posters in line with which shows are currently in
/// their new-season window, recording every change in the ledger.
pub struct Reconciler {
    server: Arc<dyn MediaServer>,
    strategy: Box<dyn RevertStrategy>,
    /// Only needed to apply overlays; reverting works without one.
    compositor: Option<Compositor>,
    evaluator: EligibilityEvaluator,
    ledger: OverlayLedger,
    options: ReconcileOptions,
}

impl Reconciler {
    pub fn new(
        server: Arc<dyn MediaServer>,
        strategy: Box<dyn RevertStrategy>,
        ledger: OverlayLedger,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            server,
            strategy,
            compositor: None,
            evaluator: EligibilityEvaluator::new(options.window_days),
            ledger,
            options,
        }
    }

    pub fn with_compositor(mut self, compositor: Compositor) -> Self {
        self.compositor = Some(compositor);
        self
    }

    fn compositor(&self) -> Result<&Compositor> {
        self.compositor
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No overlay image loaded"))
    }

    pub fn ledger(&self) -> &OverlayLedger {
        &self.ledger
    }

    /// Run one reconciliation pass as of `now`.
    ///
    /// Only a failure to enumerate library sections is returned as an error;
    /// everything after that is handled per show and collected in the report.
    pub async fn run(&mut self, now: DateTime<Utc>) -> Result<ReconcileReport> {
        self.compositor()?;
        let start = Instant::now();
        let mut report = ReconcileReport::default();
        let mode = if self.options.preview { "preview" } else { "commit" };
        info!(
            operation = "reconcile",
            mode,
            window_days = self.options.window_days,
            tracked = self.ledger.len(),
            "Starting reconciliation"
        );

        let sections = self
            .server
            .show_sections()
            .await
            .context("Failed to list library sections")?;

        let mut shows: Vec<Show> = Vec::new();
        let mut seen: HashSet<RatingKey> = HashSet::new();
        for section in &sections {
            match self.server.shows(section).await {
                Ok(listed) => {
                    debug!("Section '{}': {} shows", section.title, listed.len());
                    for show in listed {
                        if seen.insert(show.rating_key.clone()) {
                            shows.push(show);
                        }
                    }
                }
                Err(e) => {
                    warn!("Failed to list shows in section '{}': {}", section.title, e);
                    report.errors.push(format!("section {}: {}", section.title, e));
                }
            }
        }

        // Tracked shows missing from the scan are looked up directly so a
        // listing hiccup never reads as "no longer eligible".
        let mut gone: Vec<(RatingKey, String)> = Vec::new();
        for key in self.ledger.keys() {
            if seen.contains(&key) {
                continue;
            }
            match self.lookup_with_retry(&key).await {
                Lookup::Found(show) => {
                    seen.insert(key);
                    shows.push(show);
                }
                Lookup::Gone(reason) => gone.push((key, reason)),
            }
        }

        let mut decisions: Vec<(Show, Eligibility)> = Vec::with_capacity(shows.len());
        for show in shows {
            let decision = self.evaluator.evaluate(self.server.as_ref(), &show, now).await;
            decisions.push((show, decision));
        }
        report.shows_scanned = decisions.len();
        report.eligible = decisions.iter().filter(|(_, d)| d.is_eligible()).count();

        for (show, decision) in &decisions {
            if let Eligibility::Eligible { season, .. } = decision {
                self.add(show, season, now, &mut report).await;
            }
        }

        for (show, decision) in &decisions {
            match decision {
                Eligibility::Ineligible(reason) if self.ledger.contains(&show.rating_key) => {
                    info!(
                        rating_key = %show.rating_key,
                        title = %show.title,
                        "No longer eligible ({})",
                        reason
                    );
                    self.remove(&show.rating_key, &mut report).await;
                }
                Eligibility::Unknown(reason) if self.ledger.contains(&show.rating_key) => {
                    warn!(
                        rating_key = %show.rating_key,
                        title = %show.title,
                        "Keeping overlay, eligibility unknown: {}",
                        reason
                    );
                }
                _ => {}
            }
        }

        for (key, reason) in gone {
            self.purge(&key, &reason, &mut report);
        }

        self.persist();
        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            operation = "reconcile",
            mode,
            scanned = report.shows_scanned,
            eligible = report.eligible,
            applied = report.applied,
            previewed = report.previewed,
            reverted = report.reverted,
            purged = report.purged,
            errors = report.errors.len(),
            duration_ms = report.duration_ms,
            "Reconciliation complete"
        );
        Ok(report)
    }

    /// Undo every tracked overlay regardless of eligibility.
    pub async fn revert_all(&mut self) -> ReconcileReport {
        let start = Instant::now();
        let mut report = ReconcileReport::default();
        info!(operation = "revert_all", tracked = self.ledger.len(), "Reverting all overlays");

        for key in self.ledger.keys() {
            let is_preview = self
                .ledger
                .get(&key)
                .map_or(false, |entry| entry.mode == OverlayMode::Preview);
            if !is_preview {
                if let Lookup::Gone(reason) = self.lookup_with_retry(&key).await {
                    self.purge(&key, &reason, &mut report);
                    continue;
                }
            }
            self.remove_now(&key, &mut report).await;
        }

        self.persist();
        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            operation = "revert_all",
            reverted = report.reverted,
            purged = report.purged,
            remaining = self.ledger.len(),
            "Revert complete"
        );
        report
    }

    async fn add(&mut self, show: &Show, season: &Season, now: DateTime<Utc>, report: &mut ReconcileReport) {
        match self.ledger.get(&show.rating_key).map(|entry| entry.mode) {
            Some(OverlayMode::Committed) => {
                report.unchanged += 1;
                return;
            }
            Some(OverlayMode::Preview) if self.options.preview => {
                report.unchanged += 1;
                return;
            }
            Some(OverlayMode::Preview) => {
                info!(rating_key = %show.rating_key, title = %show.title, "Upgrading preview to a real overlay");
            }
            None => {}
        }

        let result = if self.options.preview {
            self.preview_overlay(show, season, now).await
        } else {
            self.commit_overlay(show, season, now).await
        };

        match result {
            Ok(entry) => {
                if entry.mode == OverlayMode::Preview {
                    report.previewed += 1;
                } else {
                    report.applied += 1;
                }
                self.ledger.insert(show.rating_key.clone(), entry);
                self.persist();
            }
            Err(e) => {
                error!(
                    operation = "apply",
                    rating_key = %show.rating_key,
                    title = %show.title,
                    "Failed to apply overlay: {:#}",
                    e
                );
                report.record_error(&show.title, &e);
            }
        }
    }

    async fn commit_overlay(&self, show: &Show, season: &Season, now: DateTime<Utc>) -> Result<LedgerEntry> {
        let stem = poster_stem(&show.title, show.rating_key.as_str());

        let show_restore = self.apply_poster(&show.poster_item(), &stem).await?;

        let season_item = season.poster_item(&show.title);
        let season = match self.apply_poster(&season_item, &stem).await {
            Ok(restore) => Some(SeasonRecord {
                rating_key: season.rating_key.clone(),
                index: season.index,
                restore,
            }),
            Err(e) => {
                warn!(
                    rating_key = %season.rating_key,
                    title = %season_item.title,
                    "Season poster not overlaid: {:#}",
                    e
                );
                None
            }
        };

        Ok(LedgerEntry {
            title: show.title.clone(),
            timestamp: now,
            mode: OverlayMode::Committed,
            show: show_restore,
            season,
            legacy: false,
        })
    }

    /// Badge one poster and upload it, returning how to undo the upload.
    async fn apply_poster(&self, item: &PosterItem, stem: &str) -> Result<RestoreData> {
        let label = item.kind.label();
        let original = self
            .server
            .download_poster(item)
            .await
            .with_context(|| format!("Failed to download {} poster", label))?;
        let overlaid = self.compositor()?.apply(&original)?;

        let staged = StagedFile::new(staging_path(&self.options.staging_dir, stem, label));
        save_png(&overlaid, staged.path())?;

        let restore = self
            .strategy
            .capture(self.server.as_ref(), item, &original)
            .await
            .with_context(|| format!("Failed to record original {} poster", label))?;

        if let Err(e) = self.server.upload_poster(item, staged.path()).await {
            self.strategy.discard(&restore);
            return Err(anyhow::Error::new(e).context(format!("Failed to upload {} poster", label)));
        }

        info!(
            operation = "apply",
            rating_key = %item.rating_key,
            title = %item.title,
            restore = restore.label(),
            "Uploaded overlaid {} poster",
            label
        );
        Ok(restore)
    }

    async fn preview_overlay(&self, show: &Show, season: &Season, now: DateTime<Utc>) -> Result<LedgerEntry> {
        let stem = poster_stem(&show.title, show.rating_key.as_str());

        self.render_preview(&show.poster_item(), &stem).await?;

        let season_item = season.poster_item(&show.title);
        let season = match self.render_preview(&season_item, &stem).await {
            Ok(()) => Some(SeasonRecord {
                rating_key: season.rating_key.clone(),
                index: season.index,
                restore: RestoreData::Untouched,
            }),
            Err(e) => {
                warn!(
                    rating_key = %season.rating_key,
                    title = %season_item.title,
                    "Season preview not rendered: {:#}",
                    e
                );
                None
            }
        };

        Ok(LedgerEntry {
            title: show.title.clone(),
            timestamp: now,
            mode: OverlayMode::Preview,
            show: RestoreData::Untouched,
            season,
            legacy: false,
        })
    }

    async fn render_preview(&self, item: &PosterItem, stem: &str) -> Result<()> {
        let label = item.kind.label();
        let original = self
            .server
            .download_poster(item)
            .await
            .with_context(|| format!("Failed to download {} poster", label))?;
        let overlaid = self.compositor()?.apply(&original)?;
        let path = preview_path(&self.options.preview_dir, stem, label);
        save_png(&overlaid, &path)?;
        info!(
            operation = "preview",
            rating_key = %item.rating_key,
            title = %item.title,
            "Wrote preview {}",
            path.display()
        );
        Ok(())
    }

    async fn remove(&mut self, key: &RatingKey, report: &mut ReconcileReport) {
        if self.options.preview {
            info!(rating_key = %key, "Preview mode: would remove overlay");
            return;
        }
        self.remove_now(key, report).await;
    }

    async fn remove_now(&mut self, key: &RatingKey, report: &mut ReconcileReport) {
        let Some(entry) = self.ledger.get(key).cloned() else {
            return;
        };

        match self.revert_entry(key, entry).await {
            RevertOutcome::Reverted => {
                self.ledger.remove(key);
                report.reverted += 1;
            }
            RevertOutcome::Pending(entry) => {
                report.errors.push(format!("{}: revert incomplete, will retry", entry.title));
                self.ledger.insert(key.clone(), entry);
            }
        }
        self.persist();
    }

    async fn revert_entry(&self, key: &RatingKey, mut entry: LedgerEntry) -> RevertOutcome {
        if entry.mode == OverlayMode::Preview {
            debug!(rating_key = %key, title = %entry.title, "Dropping preview entry");
            return RevertOutcome::Reverted;
        }

        let server = self.server.as_ref();
        if entry.legacy {
            match server.seasons(key).await {
                Ok(seasons) => {
                    entry.season = latest_season(&seasons).map(|season| SeasonRecord {
                        rating_key: season.rating_key.clone(),
                        index: season.index,
                        restore: RestoreData::Reset,
                    });
                    entry.legacy = false;
                }
                Err(e) => warn!(
                    rating_key = %key,
                    title = %entry.title,
                    "Could not find the season poster of a migrated overlay: {}",
                    e
                ),
            }
        }

        let show_item = tracked_item(key, ItemKind::Show, entry.title.clone());
        if self.strategy.revert(server, &show_item, &entry.show).await {
            entry.show = RestoreData::Untouched;
        }

        if let Some(season) = entry.season.as_mut() {
            let title = match season.index {
                Some(index) => format!("{} - Season {}", entry.title, index),
                None => format!("{} - season", entry.title),
            };
            let season_item = tracked_item(&season.rating_key, ItemKind::Season, title);
            if self.strategy.revert(server, &season_item, &season.restore).await {
                season.restore = RestoreData::Untouched;
            }
        }

        if entry.is_settled() {
            info!(operation = "revert", rating_key = %key, title = %entry.title, "Overlay removed");
            RevertOutcome::Reverted
        } else {
            warn!(
                operation = "revert",
                rating_key = %key,
                title = %entry.title,
                "Overlay only partly removed, keeping entry for the next run"
            );
            RevertOutcome::Pending(entry)
        }
    }

    fn purge(&mut self, key: &RatingKey, reason: &str, report: &mut ReconcileReport) {
        if let Some(entry) = self.ledger.remove(key) {
            warn!(
                operation = "purge",
                rating_key = %key,
                title = %entry.title,
                "Show is unreachable ({}), forgetting its overlay",
                reason
            );
            report.purged += 1;
            self.persist();
        }
    }

    /// Fetch a tracked show, retrying failures with exponential backoff.
    /// Only a definite "this show is gone" answer is final at once.
    async fn lookup_with_retry(&self, key: &RatingKey) -> Lookup {
        let attempts = self.options.purge_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            match self.server.fetch_show(key).await {
                Ok(show) => return Lookup::Found(show),
                Err(e) if e.is_gone() => return Lookup::Gone(e.to_string()),
                Err(e) => {
                    last_error = e.to_string();
                    if attempt + 1 < attempts {
                        let delay = self.options.purge_backoff.saturating_mul(2u32.saturating_pow(attempt));
                        warn!(
                            rating_key = %key,
                            attempt = attempt + 1,
                            "Failed to fetch tracked show: {}. Retrying in {:?}",
                            e,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Lookup::Gone(last_error)
    }

    fn persist(&self) {
        if let Err(e) = self.ledger.save() {
            error!("Failed to save ledger {}: {:#}", self.ledger.path().display(), e);
        }
    }
}

/// A poster identified only by what the ledger remembers about it.
fn tracked_item(key: &RatingKey, kind: ItemKind, title: String) -> PosterItem {
    PosterItem {
        rating_key: key.clone(),
        kind,
        title,
        thumb: None,
        section_id: None,
    }
}
