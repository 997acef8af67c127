use crate::RatingKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Show,
    Season,
}

impl ItemKind {
    pub fn label(&self) -> &'static str {
        match self {
            ItemKind::Show => "show",
            ItemKind::Season => "season",
        }
    }
}

/// Everything needed to read or replace the poster of a single library item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PosterItem {
    pub rating_key: RatingKey,
    pub kind: ItemKind,
    pub title: String,
    /// Server-relative poster path (Plex `thumb`), absent when the item has no artwork.
    pub thumb: Option<String>,
    pub section_id: Option<String>,
}

/// One of the alternative images the server offers for an item's poster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosterCandidate {
    /// Identifier used to select the candidate again (Plex `ratingKey` of the poster).
    pub id: String,
    pub selected: bool,
    pub provider: Option<String>,
}
