use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier the media server assigns to a library item.
///
/// Plex calls this the `ratingKey`. Shows and seasons share the same key space,
/// so one type is used for both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RatingKey(String);

impl RatingKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Accepts both a bare key ("123") and a metadata path ("/library/metadata/123").
    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw.trim().trim_start_matches("/library/metadata/").trim_matches('/');
        if key.is_empty() {
            None
        } else {
            Some(Self(key.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RatingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RatingKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
