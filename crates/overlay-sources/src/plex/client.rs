use crate::plex::api::{parse_show, PlexHttpClient, PLEX_TYPE_SEASON, PLEX_TYPE_SHOW};
use crate::{MediaServer, SourceError};
use anyhow::Result;
use async_trait::async_trait;
use overlay_models::{Episode, ItemKind, LibrarySection, PosterCandidate, PosterItem, RatingKey, Season, Show};
use std::path::Path;
use tracing::{debug, info};

/// `MediaServer` backed by a Plex Media Server reached over HTTP.
pub struct PlexServer {
    api: PlexHttpClient,
}

impl PlexServer {
    pub fn new(token: &str, server_url: &str) -> Result<Self> {
        Ok(Self {
            api: PlexHttpClient::new(token, server_url)?,
        })
    }

    fn plex_type(kind: ItemKind) -> u8 {
        match kind {
            ItemKind::Show => PLEX_TYPE_SHOW,
            ItemKind::Season => PLEX_TYPE_SEASON,
        }
    }
}

#[async_trait]
impl MediaServer for PlexServer {
    async fn check_connection(&self) -> Result<(), SourceError> {
        let identity = self.api.identity().await?;
        info!(
            machine_identifier = %identity.machine_identifier,
            version = identity.version.as_deref().unwrap_or("unknown"),
            "Connected to Plex server at {}",
            self.api.server_url()
        );
        Ok(())
    }

    async fn show_sections(&self) -> Result<Vec<LibrarySection>, SourceError> {
        let sections = self.api.get_libraries().await?;
        let shows: Vec<LibrarySection> = sections.into_iter().filter(|s| s.is_show_library()).collect();
        debug!("Plex: Found {} show libraries", shows.len());
        Ok(shows)
    }

    async fn shows(&self, section: &LibrarySection) -> Result<Vec<Show>, SourceError> {
        self.api.get_shows(&section.key).await
    }

    async fn fetch_show(&self, key: &RatingKey) -> Result<Show, SourceError> {
        let metadata = self.api.get_metadata(key).await?;
        let path = format!("/library/metadata/{}", key);
        match metadata.get("type").and_then(|t| t.as_str()) {
            Some("show") | None => {}
            Some(other) => {
                return Err(SourceError::NotAShow {
                    key: key.to_string(),
                    found: other.to_string(),
                });
            }
        }
        parse_show(&metadata, None).ok_or_else(|| SourceError::decode(path, "show is missing ratingKey or title"))
    }

    async fn seasons(&self, show: &RatingKey) -> Result<Vec<Season>, SourceError> {
        self.api.get_seasons(show).await
    }

    async fn episodes(&self, season: &RatingKey) -> Result<Vec<Episode>, SourceError> {
        self.api.get_episodes(season).await
    }

    async fn download_poster(&self, item: &PosterItem) -> Result<Vec<u8>, SourceError> {
        let thumb = item
            .thumb
            .as_deref()
            .ok_or_else(|| SourceError::MissingPoster(item.title.clone()))?;
        self.api.get_image(thumb).await
    }

    async fn upload_poster(&self, item: &PosterItem, path: &Path) -> Result<(), SourceError> {
        let image = tokio::fs::read(path).await.map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.api.upload_poster(&item.rating_key, image).await
    }

    async fn unlock_poster(&self, item: &PosterItem) -> Result<(), SourceError> {
        let section = match item.section_id.as_deref() {
            Some(section) => section.to_string(),
            // Seasons listed as children do not always carry their section
            None => {
                let metadata = self.api.get_metadata(&item.rating_key).await?;
                metadata
                    .get("librarySectionID")
                    .map(|v| v.to_string().trim_matches('"').to_string())
                    .ok_or_else(|| {
                        SourceError::decode(
                            format!("/library/metadata/{}", item.rating_key),
                            "missing librarySectionID",
                        )
                    })?
            }
        };
        self.api
            .unlock_poster(&section, Self::plex_type(item.kind), &item.rating_key)
            .await
    }

    async fn refresh_metadata(&self, item: &PosterItem) -> Result<(), SourceError> {
        self.api.refresh(&item.rating_key).await
    }

    async fn poster_candidates(&self, item: &PosterItem) -> Result<Vec<PosterCandidate>, SourceError> {
        self.api.get_posters(&item.rating_key).await
    }

    async fn select_poster(&self, item: &PosterItem, candidate: &PosterCandidate) -> Result<(), SourceError> {
        self.api.select_poster(&item.rating_key, &candidate.id).await
    }
}
