//! In-memory media server for exercising the core without HTTP.

use async_trait::async_trait;
use chrono::NaiveDate;
use image::{DynamicImage, Rgba, RgbaImage};
use overlay_models::{Episode, LibrarySection, PosterCandidate, PosterItem, RatingKey, Season, Show};
use overlay_sources::{MediaServer, SourceError};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

pub fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)));
    crate::compositor::encode_png(&image).unwrap()
}

pub fn show(key: &str, title: &str) -> Show {
    Show {
        rating_key: RatingKey::new(key),
        title: title.to_string(),
        thumb: Some(format!("/library/metadata/{}/thumb/1", key)),
        section_id: Some("1".to_string()),
        seasons: Vec::new(),
    }
}

pub fn season(key: &str, index: Option<u32>, episodes: Vec<Episode>) -> Season {
    Season {
        rating_key: RatingKey::new(key),
        title: index.map_or_else(|| "Specials".to_string(), |i| format!("Season {}", i)),
        index,
        thumb: Some(format!("/library/metadata/{}/thumb/1", key)),
        section_id: None,
        episodes,
    }
}

pub fn episode(index: Option<u32>, aired: Option<NaiveDate>) -> Episode {
    Episode {
        index,
        originally_available_at: aired,
    }
}

#[derive(Default)]
struct FakeState {
    /// Full trees, seasons and episodes included
    shows: HashMap<RatingKey, Show>,
    posters: HashMap<RatingKey, Vec<u8>>,
    candidates: HashMap<RatingKey, Vec<PosterCandidate>>,
    uploads: Vec<(RatingKey, Vec<u8>)>,
    unlocked: Vec<RatingKey>,
    refreshed: Vec<RatingKey>,
    selected: Vec<(RatingKey, String)>,
    unreachable: HashSet<RatingKey>,
    flaky: HashMap<RatingKey, u32>,
    garbled: HashMap<RatingKey, u32>,
    not_shows: HashSet<RatingKey>,
    failing_uploads: HashSet<RatingKey>,
    failing_unlocks: HashSet<RatingKey>,
    failing_seasons: HashSet<RatingKey>,
    fail_sections: bool,
    fail_listing: bool,
    fetch_calls: HashMap<RatingKey, u32>,
}

pub struct FakeServer {
    state: Mutex<FakeState>,
}

fn unavailable(path: String) -> SourceError {
    SourceError::Status {
        method: "GET".to_string(),
        path,
        status: 503,
    }
}

impl FakeServer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
        }
    }

    /// Add or replace a show; every poster starts as a plain grey image.
    pub fn add_show(&self, key: &str, tree: Show) {
        let mut state = self.state.lock().unwrap();
        let key = RatingKey::new(key);
        state.posters.entry(key.clone()).or_insert_with(|| png_bytes(20, 30, [128, 128, 128, 255]));
        for season in &tree.seasons {
            state
                .posters
                .entry(season.rating_key.clone())
                .or_insert_with(|| png_bytes(20, 30, [64, 64, 64, 255]));
        }
        state.shows.insert(key, tree);
    }

    pub fn remove_show(&self, key: &str) {
        self.state.lock().unwrap().shows.remove(&RatingKey::new(key));
    }

    pub fn make_unreachable(&self, key: &str) {
        self.state.lock().unwrap().unreachable.insert(RatingKey::new(key));
    }

    /// The next `failures` show fetches for `key` fail with a 503.
    pub fn make_flaky(&self, key: &str, failures: u32) {
        self.state.lock().unwrap().flaky.insert(RatingKey::new(key), failures);
    }

    /// The next `failures` show fetches for `key` answer with an unreadable body.
    pub fn make_garbled(&self, key: &str, failures: u32) {
        self.state.lock().unwrap().garbled.insert(RatingKey::new(key), failures);
    }

    /// `key` now names something other than a show, as after a library rescan.
    pub fn make_not_a_show(&self, key: &str) {
        self.state.lock().unwrap().not_shows.insert(RatingKey::new(key));
    }

    pub fn fail_uploads_for(&self, key: &str) {
        self.state.lock().unwrap().failing_uploads.insert(RatingKey::new(key));
    }

    pub fn fail_unlocks_for(&self, key: &str) {
        self.state.lock().unwrap().failing_unlocks.insert(RatingKey::new(key));
    }

    /// Season listing for `key` fails with a 503 while the show itself stays reachable.
    pub fn fail_seasons_for(&self, key: &str) {
        self.state.lock().unwrap().failing_seasons.insert(RatingKey::new(key));
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.failing_uploads.clear();
        state.failing_unlocks.clear();
        state.failing_seasons.clear();
    }

    pub fn fail_sections(&self) {
        self.state.lock().unwrap().fail_sections = true;
    }

    pub fn fail_listing(&self) {
        self.state.lock().unwrap().fail_listing = true;
    }

    pub fn set_candidates(&self, key: &str, candidates: Vec<PosterCandidate>) {
        self.state.lock().unwrap().candidates.insert(RatingKey::new(key), candidates);
    }

    pub fn poster(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().posters.get(&RatingKey::new(key)).cloned()
    }

    pub fn uploads(&self) -> Vec<(RatingKey, Vec<u8>)> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn upload_count(&self) -> usize {
        self.state.lock().unwrap().uploads.len()
    }

    pub fn unlocked(&self) -> Vec<RatingKey> {
        self.state.lock().unwrap().unlocked.clone()
    }

    pub fn refreshed(&self) -> Vec<RatingKey> {
        self.state.lock().unwrap().refreshed.clone()
    }

    pub fn selected(&self) -> Vec<(RatingKey, String)> {
        self.state.lock().unwrap().selected.clone()
    }

    pub fn fetch_calls(&self, key: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .fetch_calls
            .get(&RatingKey::new(key))
            .copied()
            .unwrap_or(0)
    }

    /// Show that owns `key`, whether `key` is the show or one of its seasons.
    fn owner(state: &FakeState, key: &RatingKey) -> Option<RatingKey> {
        if state.shows.contains_key(key) {
            return Some(key.clone());
        }
        state
            .shows
            .iter()
            .find(|(_, show)| show.seasons.iter().any(|s| &s.rating_key == key))
            .map(|(show_key, _)| show_key.clone())
    }

    fn check_reachable(state: &FakeState, key: &RatingKey) -> Result<(), SourceError> {
        match Self::owner(state, key) {
            Some(owner) if state.unreachable.contains(&owner) => {
                Err(unavailable(format!("/library/metadata/{}", key)))
            }
            Some(_) => Ok(()),
            None => Err(SourceError::NotFound(format!("/library/metadata/{}", key))),
        }
    }

    fn find_season(state: &FakeState, key: &RatingKey) -> Option<(Show, Season)> {
        state.shows.values().find_map(|show| {
            show.seasons
                .iter()
                .find(|s| &s.rating_key == key)
                .map(|s| (show.clone(), s.clone()))
        })
    }

    fn listed(show: &Show) -> Show {
        Show {
            seasons: Vec::new(),
            ..show.clone()
        }
    }
}

#[async_trait]
impl MediaServer for FakeServer {
    async fn check_connection(&self) -> Result<(), SourceError> {
        Ok(())
    }

    async fn show_sections(&self) -> Result<Vec<LibrarySection>, SourceError> {
        let state = self.state.lock().unwrap();
        if state.fail_sections {
            return Err(unavailable("/library/sections".to_string()));
        }
        Ok(vec![LibrarySection {
            key: "1".to_string(),
            type_: "show".to_string(),
            title: "TV Shows".to_string(),
        }])
    }

    async fn shows(&self, section: &LibrarySection) -> Result<Vec<Show>, SourceError> {
        let state = self.state.lock().unwrap();
        if state.fail_listing {
            return Err(unavailable(format!("/library/sections/{}/all", section.key)));
        }
        let mut shows: Vec<Show> = state
            .shows
            .iter()
            .filter(|(key, _)| !state.unreachable.contains(*key))
            .map(|(_, show)| Self::listed(show))
            .collect();
        shows.sort_by(|a, b| a.rating_key.cmp(&b.rating_key));
        Ok(shows)
    }

    async fn fetch_show(&self, key: &RatingKey) -> Result<Show, SourceError> {
        let mut state = self.state.lock().unwrap();
        *state.fetch_calls.entry(key.clone()).or_insert(0) += 1;
        if let Some(remaining) = state.flaky.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(unavailable(format!("/library/metadata/{}", key)));
            }
        }
        if let Some(remaining) = state.garbled.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SourceError::decode(
                    format!("/library/metadata/{}", key),
                    "expected value at line 1 column 1",
                ));
            }
        }
        if state.not_shows.contains(key) {
            return Err(SourceError::NotAShow {
                key: key.to_string(),
                found: "movie".to_string(),
            });
        }
        Self::check_reachable(&state, key)?;
        state
            .shows
            .get(key)
            .map(Self::listed)
            .ok_or_else(|| SourceError::NotFound(format!("/library/metadata/{}", key)))
    }

    async fn seasons(&self, show: &RatingKey) -> Result<Vec<Season>, SourceError> {
        let state = self.state.lock().unwrap();
        Self::check_reachable(&state, show)?;
        if state.failing_seasons.contains(show) {
            return Err(unavailable(format!("/library/metadata/{}/children", show)));
        }
        let tree = state
            .shows
            .get(show)
            .ok_or_else(|| SourceError::NotFound(format!("/library/metadata/{}/children", show)))?;
        Ok(tree
            .seasons
            .iter()
            .map(|s| Season {
                episodes: Vec::new(),
                ..s.clone()
            })
            .collect())
    }

    async fn episodes(&self, season: &RatingKey) -> Result<Vec<Episode>, SourceError> {
        let state = self.state.lock().unwrap();
        Self::check_reachable(&state, season)?;
        Self::find_season(&state, season)
            .map(|(_, s)| s.episodes)
            .ok_or_else(|| SourceError::NotFound(format!("/library/metadata/{}/children", season)))
    }

    async fn download_poster(&self, item: &PosterItem) -> Result<Vec<u8>, SourceError> {
        let state = self.state.lock().unwrap();
        Self::check_reachable(&state, &item.rating_key)?;
        state
            .posters
            .get(&item.rating_key)
            .cloned()
            .ok_or_else(|| SourceError::MissingPoster(item.title.clone()))
    }

    async fn upload_poster(&self, item: &PosterItem, path: &Path) -> Result<(), SourceError> {
        let bytes = std::fs::read(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut state = self.state.lock().unwrap();
        if state.failing_uploads.contains(&item.rating_key) {
            return Err(SourceError::Status {
                method: "POST".to_string(),
                path: format!("/library/metadata/{}/posters", item.rating_key),
                status: 500,
            });
        }
        state.posters.insert(item.rating_key.clone(), bytes.clone());
        state.uploads.push((item.rating_key.clone(), bytes));
        Ok(())
    }

    async fn unlock_poster(&self, item: &PosterItem) -> Result<(), SourceError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_unlocks.contains(&item.rating_key) {
            return Err(SourceError::Status {
                method: "PUT".to_string(),
                path: "/library/sections/1/all".to_string(),
                status: 500,
            });
        }
        state.unlocked.push(item.rating_key.clone());
        Ok(())
    }

    async fn refresh_metadata(&self, item: &PosterItem) -> Result<(), SourceError> {
        self.state.lock().unwrap().refreshed.push(item.rating_key.clone());
        Ok(())
    }

    async fn poster_candidates(&self, item: &PosterItem) -> Result<Vec<PosterCandidate>, SourceError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .candidates
            .get(&item.rating_key)
            .cloned()
            .unwrap_or_default())
    }

    async fn select_poster(&self, item: &PosterItem, candidate: &PosterCandidate) -> Result<(), SourceError> {
        self.state
            .lock()
            .unwrap()
            .selected
            .push((item.rating_key.clone(), candidate.id.clone()));
        Ok(())
    }
}
