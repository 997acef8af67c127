use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use overlay_models::RatingKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayMode {
    /// Rendered to the preview folder only; nothing on the server changed.
    Preview,
    Committed,
}

impl OverlayMode {
    pub fn label(&self) -> &'static str {
        match self {
            OverlayMode::Preview => "preview",
            OverlayMode::Committed => "committed",
        }
    }
}

/// What is needed to put one poster back the way it was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RestoreData {
    /// Nothing on the server to undo.
    Untouched,
    Reset,
    BackupFile { path: PathBuf },
    PosterId { id: String },
}

impl RestoreData {
    pub fn is_untouched(&self) -> bool {
        matches!(self, RestoreData::Untouched)
    }

    pub fn label(&self) -> &'static str {
        match self {
            RestoreData::Untouched => "untouched",
            RestoreData::Reset => "reset",
            RestoreData::BackupFile { .. } => "backup_file",
            RestoreData::PosterId { .. } => "poster_id",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonRecord {
    pub rating_key: RatingKey,
    pub index: Option<u32>,
    pub restore: RestoreData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub mode: OverlayMode,
    pub show: RestoreData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<SeasonRecord>,
    /// Migrated from an older release that badged the latest season without
    /// recording it. Cleared once that season has been found.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub legacy: bool,
}

impl LedgerEntry {
    /// True once no poster in the entry is left to revert.
    pub fn is_settled(&self) -> bool {
        !self.legacy
            && self.show.is_untouched()
            && self
                .season
                .as_ref()
                .map_or(true, |season| season.restore.is_untouched())
    }
}

/// Shape written by older releases, before restore data was tracked.
#[derive(Debug, Deserialize)]
struct LegacyEntry {
    title: String,
    timestamp: String,
    #[serde(default)]
    preview_only: bool,
}

impl LegacyEntry {
    fn migrate(self) -> Option<LedgerEntry> {
        let timestamp = parse_legacy_timestamp(&self.timestamp)?;
        let (mode, show) = if self.preview_only {
            (OverlayMode::Preview, RestoreData::Untouched)
        } else {
            (OverlayMode::Committed, RestoreData::Reset)
        };
        Some(LedgerEntry {
            title: self.title,
            timestamp,
            mode,
            show,
            season: None,
            legacy: mode == OverlayMode::Committed,
        })
    }
}

fn parse_legacy_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_entry(value: Value) -> Option<LedgerEntry> {
    match serde_json::from_value::<LedgerEntry>(value.clone()) {
        Ok(entry) => Some(entry),
        Err(_) => serde_json::from_value::<LegacyEntry>(value)
            .ok()
            .and_then(LegacyEntry::migrate),
    }
}

/// Shows that currently carry an overlay, persisted as a JSON object keyed by
/// rating key.
#[derive(Debug)]
pub struct OverlayLedger {
    path: PathBuf,
    entries: HashMap<RatingKey, LedgerEntry>,
}

impl OverlayLedger {
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: HashMap::new(),
        }
    }

    /// Load the ledger, starting empty when the file is missing or unreadable.
    ///
    /// A file that does not parse is copied to `<name>.bak` first so it can be
    /// inspected later.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !path.exists() {
            debug!("Ledger {} does not exist, starting empty", path.display());
            return Self::empty(path);
        }

        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to read ledger {}: {}. Starting empty.", path.display(), e);
                return Self::empty(path);
            }
        };

        let object = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(object)) => object,
            Ok(_) => {
                Self::backup_corrupt(&path, "top level is not a JSON object");
                return Self::empty(path);
            }
            Err(e) => {
                Self::backup_corrupt(&path, &e.to_string());
                return Self::empty(path);
            }
        };

        let mut entries = HashMap::with_capacity(object.len());
        let mut migrated = 0;
        for (raw_key, value) in object {
            let Some(key) = RatingKey::parse(&raw_key) else {
                warn!("Dropping ledger entry with empty key");
                continue;
            };
            let legacy = value.get("preview_only").is_some() && value.get("mode").is_none();
            match parse_entry(value) {
                Some(entry) => {
                    if legacy {
                        migrated += 1;
                    }
                    entries.insert(key, entry);
                }
                None => warn!(rating_key = %key, "Dropping ledger entry with unrecognised shape"),
            }
        }

        info!(
            "Loaded ledger: {} entries ({} migrated) from {}",
            entries.len(),
            migrated,
            path.display()
        );
        Self { path, entries }
    }

    fn backup_corrupt(path: &Path, reason: &str) {
        let backup_path = path.with_extension("json.bak");
        match std::fs::copy(path, &backup_path) {
            Ok(_) => warn!(
                "Ledger {} is corrupt ({}). Backed up to {} and starting empty.",
                path.display(),
                reason,
                backup_path.display()
            ),
            Err(e) => warn!(
                "Ledger {} is corrupt ({}) and could not be backed up: {}. Starting empty.",
                path.display(),
                reason,
                e
            ),
        }
    }

    /// Rewrite the whole file atomically.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let sorted: BTreeMap<&RatingKey, &LedgerEntry> = self.entries.iter().collect();
        let json = serde_json::to_string_pretty(&sorted).context("Failed to serialize ledger")?;

        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, json)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        std::fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!("Saved ledger: {} entries to {}", self.entries.len(), self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &RatingKey) -> Option<&LedgerEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &RatingKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: RatingKey, entry: LedgerEntry) -> Option<LedgerEntry> {
        self.entries.insert(key, entry)
    }

    pub fn remove(&mut self, key: &RatingKey) -> Option<LedgerEntry> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in sorted order, so runs process entries deterministically.
    pub fn keys(&self) -> Vec<RatingKey> {
        let mut keys: Vec<RatingKey> = self.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RatingKey, &LedgerEntry)> {
        self.entries.iter()
    }
}
