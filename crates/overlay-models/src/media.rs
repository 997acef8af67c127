use crate::{ItemKind, PosterItem, RatingKey};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibrarySection {
    pub key: String,
    pub type_: String,
    pub title: String,
}

impl LibrarySection {
    pub fn is_show_library(&self) -> bool {
        self.type_ == "show"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Show {
    pub rating_key: RatingKey,
    pub title: String,
    pub thumb: Option<String>,
    pub section_id: Option<String>,
    /// Empty until loaded; listing a library does not include children.
    #[serde(default)]
    pub seasons: Vec<Season>,
}

impl Show {
    pub fn poster_item(&self) -> PosterItem {
        PosterItem {
            rating_key: self.rating_key.clone(),
            kind: ItemKind::Show,
            title: self.title.clone(),
            thumb: self.thumb.clone(),
            section_id: self.section_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub rating_key: RatingKey,
    pub title: String,
    /// Plex leaves this out for some seasons; such seasons never count as "latest".
    pub index: Option<u32>,
    pub thumb: Option<String>,
    pub section_id: Option<String>,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

impl Season {
    pub fn poster_item(&self, show_title: &str) -> PosterItem {
        let title = match self.index {
            Some(index) => format!("{} - Season {}", show_title, index),
            None => format!("{} - {}", show_title, self.title),
        };
        PosterItem {
            rating_key: self.rating_key.clone(),
            kind: ItemKind::Season,
            title,
            thumb: self.thumb.clone(),
            section_id: self.section_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub index: Option<u32>,
    pub originally_available_at: Option<NaiveDate>,
}
