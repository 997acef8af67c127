use super::*;
use crate::revert::{BackupFileStrategy, ResetStrategy};
use crate::testing::{episode, season, show, FakeServer};
use chrono::{NaiveDate, TimeZone};
use image::{DynamicImage, Rgba, RgbaImage};
use tempfile::TempDir;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 20, 12, 0, 0).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// "Foo": two seasons, season 2 premiering on `premiere`.
fn foo(premiere: NaiveDate) -> Show {
    let mut tree = show("1", "Foo");
    tree.seasons = vec![
        season("10", Some(1), vec![episode(Some(1), Some(date(2020, 1, 1)))]),
        season("11", Some(2), vec![episode(Some(1), Some(premiere))]),
    ];
    tree
}

fn badge() -> Compositor {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 4, Rgba([0, 0, 255, 255])));
    Compositor::new(image, 0.5)
}

struct Fixture {
    dir: TempDir,
    server: Arc<FakeServer>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            server: Arc::new(FakeServer::new()),
        }
    }

    fn ledger_path(&self) -> PathBuf {
        self.dir.path().join("overlaid_log.json")
    }

    fn backup_dir(&self) -> PathBuf {
        self.dir.path().join("poster_backups")
    }

    fn preview_dir(&self) -> PathBuf {
        self.dir.path().join("preview_posters")
    }

    fn staging_dir(&self) -> PathBuf {
        self.dir.path().join("staging")
    }

    fn options(&self, preview: bool) -> ReconcileOptions {
        ReconcileOptions {
            window_days: 10,
            preview,
            preview_dir: self.preview_dir(),
            staging_dir: self.staging_dir(),
            purge_attempts: 3,
            purge_backoff: Duration::ZERO,
        }
    }

    fn reconciler(&self, preview: bool) -> Reconciler {
        self.reconciler_with(preview, Box::new(ResetStrategy))
    }

    fn reconciler_with(&self, preview: bool, strategy: Box<dyn RevertStrategy>) -> Reconciler {
        let server: Arc<dyn MediaServer> = self.server.clone();
        Reconciler::new(server, strategy, OverlayLedger::load(self.ledger_path()), self.options(preview))
            .with_compositor(badge())
    }

    fn saved_ledger(&self) -> OverlayLedger {
        OverlayLedger::load(self.ledger_path())
    }

    fn seed(&self, key: &str, entry: LedgerEntry) {
        let mut ledger = OverlayLedger::load(self.ledger_path());
        ledger.insert(RatingKey::new(key), entry);
        ledger.save().unwrap();
    }
}

fn committed_foo() -> LedgerEntry {
    LedgerEntry {
        title: "Foo".to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 6, 6, 0, 0, 0).unwrap(),
        mode: OverlayMode::Committed,
        show: RestoreData::Reset,
        season: Some(SeasonRecord {
            rating_key: RatingKey::new("11"),
            index: Some(2),
            restore: RestoreData::Reset,
        }),
        legacy: false,
    }
}

#[tokio::test]
async fn test_new_season_gets_overlay() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 15)));

    let mut reconciler = fx.reconciler(false);
    let report = reconciler.run(now()).await.unwrap();

    assert_eq!(report.shows_scanned, 1);
    assert_eq!(report.eligible, 1);
    assert_eq!(report.applied, 1);
    assert!(report.errors.is_empty());

    let uploaded: Vec<RatingKey> = fx.server.uploads().into_iter().map(|(key, _)| key).collect();
    assert_eq!(uploaded, vec![RatingKey::new("1"), RatingKey::new("11")]);

    let ledger = fx.saved_ledger();
    let entry = ledger.get(&RatingKey::new("1")).unwrap();
    assert_eq!(entry.mode, OverlayMode::Committed);
    assert_eq!(entry.title, "Foo");
    assert_eq!(entry.timestamp, now());
    assert_eq!(entry.show, RestoreData::Reset);
    let season = entry.season.as_ref().unwrap();
    assert_eq!(season.rating_key, RatingKey::new("11"));
    assert_eq!(season.index, Some(2));

    // Staged uploads are cleaned up
    let leftovers = std::fs::read_dir(fx.staging_dir()).map(|d| d.count()).unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_second_run_is_noop() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 15)));
    fx.server.add_show("2", show("2", "Single Season"));

    fx.reconciler(false).run(now()).await.unwrap();
    let uploads_after_first = fx.server.upload_count();
    let ledger_after_first = std::fs::read_to_string(fx.ledger_path()).unwrap();

    let later = now() + chrono::Duration::hours(1);
    let report = fx.reconciler(false).run(later).await.unwrap();

    assert_eq!(report.applied, 0);
    assert_eq!(report.unchanged, 1);
    assert_eq!(fx.server.upload_count(), uploads_after_first);
    assert_eq!(std::fs::read_to_string(fx.ledger_path()).unwrap(), ledger_after_first);
}

#[tokio::test]
async fn test_stale_overlay_is_reverted() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 5)));
    fx.seed("1", committed_foo());

    let report = fx.reconciler(false).run(now()).await.unwrap();

    assert_eq!(report.reverted, 1);
    assert_eq!(fx.server.unlocked(), vec![RatingKey::new("1"), RatingKey::new("11")]);
    assert_eq!(fx.server.refreshed(), vec![RatingKey::new("1"), RatingKey::new("11")]);
    assert!(fx.saved_ledger().is_empty());
    assert_eq!(fx.server.upload_count(), 0);
}

#[tokio::test]
async fn test_entry_for_unknown_show_is_purged() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 15)));
    fx.seed("999", committed_foo());

    let report = fx.reconciler(false).run(now()).await.unwrap();

    assert_eq!(report.purged, 1);
    // Not found is final, no retries
    assert_eq!(fx.server.fetch_calls("999"), 1);
    let ledger = fx.saved_ledger();
    assert!(!ledger.contains(&RatingKey::new("999")));
    assert!(ledger.contains(&RatingKey::new("1")));
    assert!(fx.server.unlocked().is_empty());
}

#[tokio::test]
async fn test_deleted_show_is_purged() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 15)));
    fx.reconciler(false).run(now()).await.unwrap();
    assert!(fx.saved_ledger().contains(&RatingKey::new("1")));

    fx.server.remove_show("1");
    let report = fx.reconciler(false).run(now()).await.unwrap();
    assert_eq!(report.purged, 1);
    assert!(fx.saved_ledger().is_empty());
}

#[tokio::test]
async fn test_unreachable_show_purged_after_retries() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 5)));
    fx.seed("1", committed_foo());
    fx.server.make_unreachable("1");

    let report = fx.reconciler(false).run(now()).await.unwrap();

    assert_eq!(fx.server.fetch_calls("1"), 3);
    assert_eq!(report.purged, 1);
    assert!(fx.saved_ledger().is_empty());
    assert!(fx.server.unlocked().is_empty());
}

#[tokio::test]
async fn test_transient_failure_recovers_before_purge() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 15)));
    fx.seed("1", committed_foo());
    fx.server.fail_listing();
    fx.server.make_flaky("1", 2);

    let report = fx.reconciler(false).run(now()).await.unwrap();

    assert_eq!(fx.server.fetch_calls("1"), 3);
    assert_eq!(report.purged, 0);
    assert_eq!(report.unchanged, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(fx.saved_ledger().contains(&RatingKey::new("1")));
}

#[tokio::test]
async fn test_unreadable_answer_is_retried_before_purge() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 15)));
    fx.seed("1", committed_foo());
    fx.server.fail_listing();
    fx.server.make_garbled("1", 2);

    let report = fx.reconciler(false).run(now()).await.unwrap();

    assert_eq!(fx.server.fetch_calls("1"), 3);
    assert_eq!(report.purged, 0);
    assert_eq!(report.unchanged, 1);
    assert!(fx.saved_ledger().contains(&RatingKey::new("1")));
}

#[tokio::test]
async fn test_unreadable_answers_exhaust_retries_then_purge() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 15)));
    fx.seed("1", committed_foo());
    fx.server.fail_listing();
    fx.server.make_garbled("1", 5);

    let report = fx.reconciler(false).run(now()).await.unwrap();

    assert_eq!(fx.server.fetch_calls("1"), 3);
    assert_eq!(report.purged, 1);
    assert!(fx.saved_ledger().is_empty());
}

#[tokio::test]
async fn test_key_now_naming_another_item_is_purged_at_once() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 15)));
    fx.seed("1", committed_foo());
    fx.server.fail_listing();
    fx.server.make_not_a_show("1");

    let report = fx.reconciler(false).run(now()).await.unwrap();

    assert_eq!(fx.server.fetch_calls("1"), 1);
    assert_eq!(report.purged, 1);
    assert!(fx.server.unlocked().is_empty());
}

#[tokio::test]
async fn test_listing_failure_does_not_revert_tracked_shows() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 15)));
    fx.reconciler(false).run(now()).await.unwrap();

    fx.server.fail_listing();
    let report = fx.reconciler(false).run(now()).await.unwrap();

    assert_eq!(report.reverted, 0);
    assert_eq!(report.unchanged, 1);
    assert!(fx.server.unlocked().is_empty());
    assert!(fx.saved_ledger().contains(&RatingKey::new("1")));
}

#[tokio::test]
async fn test_preview_then_commit() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 15)));

    let report = fx.reconciler(true).run(now()).await.unwrap();
    assert_eq!(report.previewed, 1);
    assert_eq!(fx.server.upload_count(), 0);
    assert!(fx.preview_dir().join("Foo_show.png").exists());
    assert!(fx.preview_dir().join("Foo_season.png").exists());

    let entry = fx.saved_ledger().get(&RatingKey::new("1")).cloned().unwrap();
    assert_eq!(entry.mode, OverlayMode::Preview);
    assert!(entry.is_settled());

    // A second preview run leaves the entry alone
    let report = fx.reconciler(true).run(now()).await.unwrap();
    assert_eq!(report.previewed, 0);
    assert_eq!(report.unchanged, 1);

    let report = fx.reconciler(false).run(now()).await.unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(fx.server.upload_count(), 2);
    assert_eq!(
        fx.saved_ledger().get(&RatingKey::new("1")).unwrap().mode,
        OverlayMode::Committed
    );
}

#[tokio::test]
async fn test_preview_run_does_not_remove() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 5)));
    fx.seed("1", committed_foo());

    let report = fx.reconciler(true).run(now()).await.unwrap();

    assert_eq!(report.reverted, 0);
    assert!(fx.server.unlocked().is_empty());
    assert_eq!(fx.saved_ledger().get(&RatingKey::new("1")), Some(&committed_foo()));
}

#[tokio::test]
async fn test_stale_preview_entry_dropped_without_server_calls() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 5)));
    fx.seed(
        "1",
        LedgerEntry {
            mode: OverlayMode::Preview,
            show: RestoreData::Untouched,
            season: None,
            ..committed_foo()
        },
    );

    let report = fx.reconciler(false).run(now()).await.unwrap();

    assert_eq!(report.reverted, 1);
    assert!(fx.server.unlocked().is_empty());
    assert!(fx.saved_ledger().is_empty());
}

#[tokio::test]
async fn test_season_upload_failure_keeps_show_overlay() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 15)));
    fx.server.fail_uploads_for("11");

    let report = fx.reconciler(false).run(now()).await.unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(fx.server.upload_count(), 1);
    let entry = fx.saved_ledger().get(&RatingKey::new("1")).cloned().unwrap();
    assert_eq!(entry.mode, OverlayMode::Committed);
    assert!(entry.season.is_none());
}

#[tokio::test]
async fn test_show_upload_failure_records_nothing() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 15)));
    fx.server.fail_uploads_for("1");

    let strategy = Box::new(BackupFileStrategy::new(fx.backup_dir()));
    let report = fx.reconciler_with(false, strategy).run(now()).await.unwrap();

    assert_eq!(report.applied, 0);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("Foo:"));
    assert!(fx.saved_ledger().is_empty());
    assert!(!fx.backup_dir().join("1.png").exists());
}

#[tokio::test]
async fn test_partial_revert_retries_only_failed_poster() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 5)));
    fx.seed("1", committed_foo());
    fx.server.fail_unlocks_for("11");

    let report = fx.reconciler(false).run(now()).await.unwrap();
    assert_eq!(report.reverted, 0);
    assert_eq!(report.errors.len(), 1);

    let entry = fx.saved_ledger().get(&RatingKey::new("1")).cloned().unwrap();
    assert_eq!(entry.show, RestoreData::Untouched);
    assert_eq!(entry.season.as_ref().unwrap().restore, RestoreData::Reset);

    fx.server.clear_failures();
    let report = fx.reconciler(false).run(now()).await.unwrap();
    assert_eq!(report.reverted, 1);
    assert_eq!(fx.server.unlocked(), vec![RatingKey::new("1"), RatingKey::new("11")]);
    assert!(fx.saved_ledger().is_empty());
}

#[tokio::test]
async fn test_backup_strategy_restores_original_bytes() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 15)));
    let original_show = fx.server.poster("1").unwrap();
    let original_season = fx.server.poster("11").unwrap();

    let strategy = Box::new(BackupFileStrategy::new(fx.backup_dir()));
    fx.reconciler_with(false, strategy).run(now()).await.unwrap();

    assert!(fx.backup_dir().join("1.png").exists());
    assert!(fx.backup_dir().join("11.png").exists());
    assert_ne!(fx.server.poster("1").unwrap(), original_show);

    // Same show, premiere now outside the window
    fx.server.add_show("1", foo(date(2024, 6, 1)));
    let strategy = Box::new(BackupFileStrategy::new(fx.backup_dir()));
    let report = fx.reconciler_with(false, strategy).run(now()).await.unwrap();

    assert_eq!(report.reverted, 1);
    assert_eq!(fx.server.poster("1").unwrap(), original_show);
    assert_eq!(fx.server.poster("11").unwrap(), original_season);
    assert!(!fx.backup_dir().join("1.png").exists());
    assert!(!fx.backup_dir().join("11.png").exists());
    assert!(fx.saved_ledger().is_empty());
}

#[tokio::test]
async fn test_revert_all() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 15)));
    fx.reconciler(false).run(now()).await.unwrap();
    fx.seed("999", committed_foo());

    // The preview flag does not matter for an explicit revert
    let report = fx.reconciler(true).revert_all().await;

    assert_eq!(report.reverted, 1);
    assert_eq!(report.purged, 1);
    assert_eq!(fx.server.unlocked(), vec![RatingKey::new("1"), RatingKey::new("11")]);
    assert!(fx.saved_ledger().is_empty());
}

fn write_legacy_ledger(fx: &Fixture) {
    std::fs::write(
        fx.ledger_path(),
        r#"{"1": {"title": "Foo", "timestamp": "2024-06-01T09:00:00", "preview_only": false}}"#,
    )
    .unwrap();
}

#[tokio::test]
async fn test_migrated_entry_also_resets_latest_season() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 5)));
    write_legacy_ledger(&fx);

    let report = fx.reconciler(false).run(now()).await.unwrap();

    assert_eq!(report.reverted, 1);
    assert_eq!(fx.server.unlocked(), vec![RatingKey::new("1"), RatingKey::new("11")]);
    assert_eq!(fx.server.refreshed(), vec![RatingKey::new("1"), RatingKey::new("11")]);
    assert!(fx.saved_ledger().is_empty());
}

#[tokio::test]
async fn test_migrated_entry_kept_until_season_is_found() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 5)));
    write_legacy_ledger(&fx);
    fx.server.fail_seasons_for("1");

    let report = fx.reconciler(false).revert_all().await;

    assert_eq!(report.reverted, 0);
    assert_eq!(fx.server.unlocked(), vec![RatingKey::new("1")]);
    let kept = fx.saved_ledger().get(&RatingKey::new("1")).cloned().unwrap();
    assert!(kept.legacy);
    assert!(kept.show.is_untouched());

    fx.server.clear_failures();
    let report = fx.reconciler(false).revert_all().await;

    assert_eq!(report.reverted, 1);
    assert_eq!(fx.server.unlocked(), vec![RatingKey::new("1"), RatingKey::new("11")]);
    assert!(fx.saved_ledger().is_empty());
}

#[tokio::test]
async fn test_run_requires_overlay_image() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 15)));
    let server: Arc<dyn MediaServer> = fx.server.clone();
    let mut reconciler = Reconciler::new(
        server,
        Box::new(ResetStrategy),
        OverlayLedger::load(fx.ledger_path()),
        fx.options(false),
    );

    assert!(reconciler.run(now()).await.is_err());
    assert_eq!(fx.server.upload_count(), 0);

    // Reverting does not need one
    let report = reconciler.revert_all().await;
    assert_eq!(report.reverted, 0);
}

#[tokio::test]
async fn test_section_failure_aborts_before_changes() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 15)));
    fx.server.fail_sections();

    let result = fx.reconciler(false).run(now()).await;

    assert!(result.is_err());
    assert_eq!(fx.server.upload_count(), 0);
    assert!(!fx.ledger_path().exists());
}

#[tokio::test]
async fn test_unknown_eligibility_keeps_overlay() {
    let fx = Fixture::new();
    fx.server.add_show("1", foo(date(2024, 6, 5)));
    fx.seed("1", committed_foo());
    fx.server.fail_seasons_for("1");

    let report = fx.reconciler(false).run(now()).await.unwrap();

    assert_eq!(report.reverted, 0);
    assert!(fx.server.unlocked().is_empty());
    assert!(fx.saved_ledger().contains(&RatingKey::new("1")));

    fx.server.clear_failures();
    let report = fx.reconciler(false).run(now()).await.unwrap();
    assert_eq!(report.reverted, 1);
}
