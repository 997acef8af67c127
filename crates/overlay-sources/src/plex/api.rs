use crate::SourceError;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use overlay_models::{Episode, LibrarySection, PosterCandidate, RatingKey, Season, Show};
use reqwest::{Client, Method};
use serde_json::Value;
use tracing::{debug, trace};

/// Plex metadata type numbers used by the section edit endpoint
pub const PLEX_TYPE_SHOW: u8 = 2;
pub const PLEX_TYPE_SEASON: u8 = 3;

#[derive(Debug, Clone)]
pub struct ServerIdentity {
    pub machine_identifier: String,
    pub version: Option<String>,
}

/// Thin HTTP layer over a single Plex Media Server.
///
/// Every request carries the token as the `X-Plex-Token` header so it never
/// appears in a logged URL.
pub struct PlexHttpClient {
    client: Client,
    server_url: String,
}

impl PlexHttpClient {
    pub fn new(token: &str, server_url: &str) -> Result<Self> {
        let client = Client::builder()
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::ACCEPT,
                    reqwest::header::HeaderValue::from_static("application/json"),
                );
                headers.insert(
                    reqwest::header::HeaderName::from_static("x-plex-token"),
                    reqwest::header::HeaderValue::from_str(token)
                        .context("Invalid token format")?,
                );
                headers.insert(
                    reqwest::header::HeaderName::from_static("x-plex-client-identifier"),
                    reqwest::header::HeaderValue::from_static("seasonmark-cli"),
                );
                headers
            })
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            server_url: server_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.server_url, path)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, SourceError> {
        trace!("Plex: {} {}", method, path);
        let mut request = self.client.request(method.clone(), self.url(path)).query(query);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|source| SourceError::Transport {
            path: path.to_string(),
            source,
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            return Err(SourceError::Status {
                method: method.to_string(),
                path: path.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, SourceError> {
        let response = self.send(Method::GET, path, query, None).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| SourceError::decode(path, e.to_string()))
    }

    /// `MediaContainer.<field>` as an array; a missing field is an empty listing.
    async fn get_container_list(
        &self,
        path: &str,
        query: &[(&str, &str)],
        field: &str,
    ) -> Result<Vec<Value>, SourceError> {
        let json = self.get_json(path, query).await?;
        let container = json
            .get("MediaContainer")
            .ok_or_else(|| SourceError::decode(path, "missing MediaContainer"))?;
        match container.get(field) {
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(_) => Err(SourceError::decode(path, format!("{} is not an array", field))),
            None => Ok(Vec::new()),
        }
    }

    pub async fn identity(&self) -> Result<ServerIdentity, SourceError> {
        let path = "/identity";
        let json = self.get_json(path, &[]).await?;
        let container = json
            .get("MediaContainer")
            .ok_or_else(|| SourceError::decode(path, "missing MediaContainer"))?;
        let machine_identifier = string_field(container, "machineIdentifier")
            .ok_or_else(|| SourceError::decode(path, "missing machineIdentifier"))?;
        Ok(ServerIdentity {
            machine_identifier,
            version: string_field(container, "version"),
        })
    }

    pub async fn get_libraries(&self) -> Result<Vec<LibrarySection>, SourceError> {
        let directories = self.get_container_list("/library/sections", &[], "Directory").await?;
        Ok(directories.iter().filter_map(parse_section).collect())
    }

    pub async fn get_shows(&self, section_key: &str) -> Result<Vec<Show>, SourceError> {
        let path = format!("/library/sections/{}/all", section_key);
        let type_ = PLEX_TYPE_SHOW.to_string();
        let items = self
            .get_container_list(&path, &[("type", type_.as_str())], "Metadata")
            .await?;

        let mut shows = Vec::with_capacity(items.len());
        let mut skipped = 0;
        for item in &items {
            match parse_show(item, Some(section_key)) {
                Some(show) => shows.push(show),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            debug!("Plex get_shows: Skipped {} items in section {} that couldn't be parsed", skipped, section_key);
        }
        Ok(shows)
    }

    /// First metadata entry for a rating key
    pub async fn get_metadata(&self, key: &RatingKey) -> Result<Value, SourceError> {
        let path = format!("/library/metadata/{}", key);
        self.get_container_list(&path, &[], "Metadata")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SourceError::NotFound(path))
    }

    pub async fn get_seasons(&self, show: &RatingKey) -> Result<Vec<Season>, SourceError> {
        let path = format!("/library/metadata/{}/children", show);
        let items = self.get_container_list(&path, &[], "Metadata").await?;
        Ok(items
            .iter()
            .filter(|item| item.get("type").and_then(|t| t.as_str()).map_or(true, |t| t == "season"))
            .filter_map(parse_season)
            .collect())
    }

    pub async fn get_episodes(&self, season: &RatingKey) -> Result<Vec<Episode>, SourceError> {
        let path = format!("/library/metadata/{}/children", season);
        let items = self.get_container_list(&path, &[], "Metadata").await?;
        Ok(items.iter().map(parse_episode).collect())
    }

    /// Raw bytes behind a server-relative image path such as a `thumb`
    pub async fn get_image(&self, thumb: &str) -> Result<Vec<u8>, SourceError> {
        let response = self.send(Method::GET, thumb, &[], None).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|source| SourceError::Transport {
                path: thumb.to_string(),
                source,
            })?;
        Ok(bytes.to_vec())
    }

    pub async fn upload_poster(&self, key: &RatingKey, image: Vec<u8>) -> Result<(), SourceError> {
        let path = format!("/library/metadata/{}/posters", key);
        self.send(Method::POST, &path, &[], Some(image)).await?;
        Ok(())
    }

    pub async fn unlock_poster(&self, section_key: &str, plex_type: u8, key: &RatingKey) -> Result<(), SourceError> {
        let path = format!("/library/sections/{}/all", section_key);
        let type_ = plex_type.to_string();
        self.send(
            Method::PUT,
            &path,
            &[("type", type_.as_str()), ("id", key.as_str()), ("thumb.locked", "0")],
            None,
        )
        .await?;
        Ok(())
    }

    pub async fn refresh(&self, key: &RatingKey) -> Result<(), SourceError> {
        let path = format!("/library/metadata/{}/refresh", key);
        self.send(Method::PUT, &path, &[], None).await?;
        Ok(())
    }

    pub async fn get_posters(&self, key: &RatingKey) -> Result<Vec<PosterCandidate>, SourceError> {
        let path = format!("/library/metadata/{}/posters", key);
        let items = self.get_container_list(&path, &[], "Metadata").await?;
        Ok(items.iter().filter_map(parse_poster_candidate).collect())
    }

    pub async fn select_poster(&self, key: &RatingKey, candidate_id: &str) -> Result<(), SourceError> {
        let path = format!("/library/metadata/{}/poster", key);
        self.send(Method::PUT, &path, &[("url", candidate_id)], None).await?;
        Ok(())
    }
}

/// Plex is inconsistent about numbers vs strings for ids, so accept both.
fn string_field(value: &Value, field: &str) -> Option<String> {
    match value.get(field)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn u32_field(value: &Value, field: &str) -> Option<u32> {
    match value.get(field)? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn parse_section(value: &Value) -> Option<LibrarySection> {
    Some(LibrarySection {
        key: string_field(value, "key")?,
        type_: string_field(value, "type").unwrap_or_default(),
        title: string_field(value, "title").unwrap_or_default(),
    })
}

pub(crate) fn parse_show(value: &Value, section_key: Option<&str>) -> Option<Show> {
    let rating_key = RatingKey::parse(&string_field(value, "ratingKey")?)?;
    let title = string_field(value, "title")?;
    Some(Show {
        rating_key,
        title,
        thumb: string_field(value, "thumb"),
        section_id: string_field(value, "librarySectionID").or_else(|| section_key.map(str::to_string)),
        seasons: Vec::new(),
    })
}

pub(crate) fn parse_season(value: &Value) -> Option<Season> {
    let rating_key = RatingKey::parse(&string_field(value, "ratingKey")?)?;
    Some(Season {
        rating_key,
        title: string_field(value, "title").unwrap_or_default(),
        index: u32_field(value, "index"),
        thumb: string_field(value, "thumb"),
        section_id: string_field(value, "librarySectionID"),
        episodes: Vec::new(),
    })
}

pub(crate) fn parse_episode(value: &Value) -> Episode {
    Episode {
        index: u32_field(value, "index"),
        originally_available_at: string_field(value, "originallyAvailableAt")
            .and_then(|s| NaiveDate::parse_from_str(s.get(..10).unwrap_or(s.as_str()), "%Y-%m-%d").ok()),
    }
}

pub(crate) fn parse_poster_candidate(value: &Value) -> Option<PosterCandidate> {
    Some(PosterCandidate {
        id: string_field(value, "ratingKey").or_else(|| string_field(value, "key"))?,
        selected: value.get("selected").and_then(|s| s.as_bool()).unwrap_or(false),
        provider: string_field(value, "provider"),
    })
}
