use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use overlay_models::{Season, Show};
use overlay_sources::{MediaServer, SourceError};
use std::fmt;
use tracing::{debug, warn};

/// Outcome of checking one show against the recency window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible { season: Season, premiered: NaiveDate },
    Ineligible(Ineligible),
    /// The server could not be asked; the show keeps whatever state it had.
    Unknown(String),
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Eligibility::Eligible { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ineligible {
    TooFewSeasons(usize),
    NoFirstEpisode { season_index: u32 },
    NoAirDate { season_index: u32 },
    Aired { season_index: u32, days_ago: i64 },
    Metadata(String),
}

impl fmt::Display for Ineligible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ineligible::TooFewSeasons(count) => write!(f, "only {} indexed season(s)", count),
            Ineligible::NoFirstEpisode { season_index } => {
                write!(f, "season {} has no first episode", season_index)
            }
            Ineligible::NoAirDate { season_index } => {
                write!(f, "season {} premiere has no air date", season_index)
            }
            Ineligible::Aired { season_index, days_ago } => {
                write!(f, "season {} premiered {} days ago", season_index, days_ago)
            }
            Ineligible::Metadata(message) => write!(f, "metadata error: {}", message),
        }
    }
}

/// Highest-indexed season, ignoring seasons without an index.
pub fn latest_season(seasons: &[Season]) -> Option<&Season> {
    seasons
        .iter()
        .filter(|s| s.index.is_some())
        .max_by_key(|s| s.index)
}

/// Decide eligibility from an already loaded show tree.
///
/// `window` is inclusive: a premiere exactly `window` old still qualifies.
pub fn assess(show: &Show, now: DateTime<Utc>, window: Duration) -> Eligibility {
    let indexed = show.seasons.iter().filter(|s| s.index.is_some()).count();
    if indexed < 2 {
        return Eligibility::Ineligible(Ineligible::TooFewSeasons(indexed));
    }

    let Some(season) = latest_season(&show.seasons) else {
        return Eligibility::Ineligible(Ineligible::TooFewSeasons(0));
    };
    let season_index = season.index.unwrap_or_default();

    let Some(premiere) = season.episodes.iter().find(|e| e.index == Some(1)) else {
        return Eligibility::Ineligible(Ineligible::NoFirstEpisode { season_index });
    };
    let Some(aired) = premiere.originally_available_at else {
        return Eligibility::Ineligible(Ineligible::NoAirDate { season_index });
    };

    let aired_at = Utc.from_utc_datetime(&aired.and_time(NaiveTime::MIN));
    let age = now - aired_at;
    if age > window {
        return Eligibility::Ineligible(Ineligible::Aired {
            season_index,
            days_ago: age.num_days(),
        });
    }

    Eligibility::Eligible {
        season: season.clone(),
        premiered: aired,
    }
}

/// Fill in a show's seasons, plus the episodes of its latest season.
///
/// Only the latest season's episodes matter for the decision, so the other
/// seasons are left without episodes.
pub async fn load_show_tree(server: &dyn MediaServer, show: &Show) -> Result<Show, SourceError> {
    let mut tree = show.clone();
    tree.seasons = server.seasons(&show.rating_key).await?;
    if tree.seasons.iter().filter(|s| s.index.is_some()).count() < 2 {
        return Ok(tree);
    }

    let latest_key = latest_season(&tree.seasons).map(|s| s.rating_key.clone());
    if let Some(key) = latest_key {
        let episodes = server.episodes(&key).await?;
        if let Some(season) = tree.seasons.iter_mut().find(|s| s.rating_key == key) {
            season.episodes = episodes;
        }
    }
    Ok(tree)
}

/// Queries the server for a show's seasons and applies the window.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityEvaluator {
    window: Duration,
}

impl EligibilityEvaluator {
    pub fn new(window_days: u32) -> Self {
        Self {
            window: Duration::days(i64::from(window_days)),
        }
    }

    pub async fn evaluate(&self, server: &dyn MediaServer, show: &Show, now: DateTime<Utc>) -> Eligibility {
        match load_show_tree(server, show).await {
            Ok(tree) => {
                let decision = assess(&tree, now, self.window);
                match &decision {
                    Eligibility::Eligible { season, premiered } => debug!(
                        rating_key = %show.rating_key,
                        title = %show.title,
                        "Eligible: season {} premiered {}",
                        season.index.unwrap_or_default(),
                        premiered
                    ),
                    Eligibility::Ineligible(reason) => debug!(
                        rating_key = %show.rating_key,
                        title = %show.title,
                        "Not eligible: {}",
                        reason
                    ),
                    Eligibility::Unknown(_) => {}
                }
                decision
            }
            Err(e @ (SourceError::Transport { .. } | SourceError::Status { .. })) => {
                warn!(
                    rating_key = %show.rating_key,
                    title = %show.title,
                    "Could not load seasons: {}",
                    e
                );
                Eligibility::Unknown(e.to_string())
            }
            Err(e) => {
                warn!(
                    rating_key = %show.rating_key,
                    title = %show.title,
                    "Treating show as not eligible: {}",
                    e
                );
                Eligibility::Ineligible(Ineligible::Metadata(e.to_string()))
            }
        }
    }
}
