use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    /// The server answered but does not know the item (HTTP 404)
    #[error("not found on server: {0}")]
    NotFound(String),

    #[error("{method} {path} returned HTTP {status}")]
    Status {
        method: String,
        path: String,
        status: u16,
    },

    #[error("request to {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    /// The key now names a different kind of item
    #[error("{key} is a {found}, not a show")]
    NotAShow { key: String, found: String },

    #[error("unexpected response from {path}: {message}")]
    Decode { path: String, message: String },

    #[error("{0} has no poster")]
    MissingPoster(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SourceError {
    /// The server answered definitively that the show no longer exists.
    pub fn is_gone(&self) -> bool {
        matches!(self, SourceError::NotFound(_) | SourceError::NotAShow { .. })
    }

    pub fn decode(path: impl Into<String>, message: impl Into<String>) -> Self {
        SourceError::Decode {
            path: path.into(),
            message: message.into(),
        }
    }
}
