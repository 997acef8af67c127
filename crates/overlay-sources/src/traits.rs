use crate::SourceError;
use async_trait::async_trait;
use overlay_models::{Episode, LibrarySection, PosterCandidate, PosterItem, RatingKey, Season, Show};
use std::path::Path;

/// The media server as seen by the overlay lifecycle.
///
/// Reads enumerate the library down to episodes; writes replace, unlock or
/// re-select posters. Implementations must not cache write results: callers
/// rely on every call reaching the server.
#[async_trait]
pub trait MediaServer: Send + Sync {
    /// Cheap request used at startup to fail fast on a bad URL or token
    async fn check_connection(&self) -> Result<(), SourceError>;

    // Library reads
    async fn show_sections(&self) -> Result<Vec<LibrarySection>, SourceError>;
    async fn shows(&self, section: &LibrarySection) -> Result<Vec<Show>, SourceError>;
    async fn fetch_show(&self, key: &RatingKey) -> Result<Show, SourceError>;
    async fn seasons(&self, show: &RatingKey) -> Result<Vec<Season>, SourceError>;
    async fn episodes(&self, season: &RatingKey) -> Result<Vec<Episode>, SourceError>;

    // Posters
    async fn download_poster(&self, item: &PosterItem) -> Result<Vec<u8>, SourceError>;
    async fn upload_poster(&self, item: &PosterItem, path: &Path) -> Result<(), SourceError>;
    async fn unlock_poster(&self, item: &PosterItem) -> Result<(), SourceError>;
    async fn refresh_metadata(&self, item: &PosterItem) -> Result<(), SourceError>;
    async fn poster_candidates(&self, item: &PosterItem) -> Result<Vec<PosterCandidate>, SourceError>;
    async fn select_poster(&self, item: &PosterItem, candidate: &PosterCandidate) -> Result<(), SourceError>;
}
