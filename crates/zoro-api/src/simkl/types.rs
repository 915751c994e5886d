//! Raw Simkl wire shapes and their conversions.

use serde::Deserialize;

use zoro_core::models::{
    ListStatus, MediaKind, MediaTitles, NormalizedListEntry, NormalizedMedia, Provider,
    ProviderIds,
};

pub fn map_status_to_simkl(status: ListStatus) -> &'static str {
    match status {
        // Simkl has no repeating state; a rewatch is just watching again.
        ListStatus::Current | ListStatus::Repeating => "watching",
        ListStatus::Planning => "plantowatch",
        ListStatus::Completed => "completed",
        ListStatus::Dropped => "dropped",
        ListStatus::Paused => "hold",
    }
}

pub fn map_status_from_simkl(status: &str) -> ListStatus {
    match status {
        "watching" => ListStatus::Current,
        "plantowatch" => ListStatus::Planning,
        "completed" => ListStatus::Completed,
        "dropped" => ListStatus::Dropped,
        "hold" => ListStatus::Paused,
        _ => ListStatus::Planning,
    }
}

/// URL segment for a media kind. Simkl files manga under its anime list.
pub fn kind_segment(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Anime | MediaKind::Manga => "anime",
        MediaKind::Tv => "shows",
        MediaKind::Movie => "movies",
    }
}

// ── Responses ───────────────────────────────────────────────────

/// `sync/all-items/<kind>/<status>` groups items by category.
#[derive(Debug, Default, Deserialize)]
pub struct SimklAllItems {
    #[serde(default)]
    pub anime: Vec<SimklItem>,
    #[serde(default)]
    pub shows: Vec<SimklItem>,
    #[serde(default)]
    pub movies: Vec<SimklItem>,
}

impl SimklAllItems {
    pub fn into_kind(self, kind: MediaKind) -> Vec<SimklItem> {
        match kind {
            MediaKind::Anime | MediaKind::Manga => self.anime,
            MediaKind::Tv => self.shows,
            MediaKind::Movie => self.movies,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SimklItem {
    pub status: Option<String>,
    /// 1–10; Simkl has no fractional ratings.
    pub user_rating: Option<f32>,
    pub watched_episodes_count: Option<u32>,
    pub total_episodes_count: Option<u32>,
    pub show: Option<SimklShow>,
    pub movie: Option<SimklShow>,
}

#[derive(Debug, Deserialize)]
pub struct SimklShow {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub poster: Option<String>,
    pub ids: Option<SimklIds>,
    pub total_episodes: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SimklIds {
    pub simkl: Option<u64>,
    pub mal: Option<serde_json::Value>,
    pub anilist: Option<serde_json::Value>,
    pub imdb: Option<String>,
    pub tmdb: Option<serde_json::Value>,
}

impl SimklIds {
    /// Simkl serves cross-reference ids as either numbers or strings.
    fn as_u64(value: &serde_json::Value) -> Option<u64> {
        value
            .as_u64()
            .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
    }

    pub fn into_provider_ids(self) -> ProviderIds {
        ProviderIds {
            simkl: self.simkl,
            mal: self.mal.as_ref().and_then(Self::as_u64),
            anilist: self.anilist.as_ref().and_then(Self::as_u64),
            imdb: self.imdb,
            tmdb: self.tmdb.as_ref().and_then(Self::as_u64),
        }
    }
}

/// `search/<kind>` and `search/id` results.
#[derive(Debug, Deserialize)]
pub struct SimklSearchResult {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub poster: Option<String>,
    pub ids: Option<SimklIds>,
    pub total_episodes: Option<u32>,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SimklUserSettings {
    pub user: Option<SimklUser>,
    pub account: Option<SimklAccount>,
}

#[derive(Debug, Deserialize)]
pub struct SimklUser {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SimklAccount {
    pub id: Option<u64>,
}

// ── Conversions ─────────────────────────────────────────────────

/// Posters are served relative to the Simkl image CDN.
fn poster_url(poster: Option<String>) -> Option<String> {
    poster.map(|p| format!("https://simkl.in/posters/{p}_m.webp"))
}

impl SimklShow {
    pub fn into_normalized(self, kind: MediaKind) -> NormalizedMedia {
        let ids = self.ids.unwrap_or_default().into_provider_ids();
        NormalizedMedia {
            id: ids.simkl.unwrap_or(0),
            ids,
            titles: MediaTitles {
                english: self.title,
                ..Default::default()
            },
            cover_url: poster_url(self.poster),
            format: None,
            kind,
            total_units: self.total_episodes,
            genres: Vec::new(),
            average_score: None,
            start_date: self.year.map(|year| zoro_core::models::FuzzyDate {
                year: Some(year),
                month: None,
                day: None,
            }),
            end_date: None,
        }
    }
}

impl SimklItem {
    pub fn into_normalized(self, kind: MediaKind) -> Option<NormalizedListEntry> {
        let show = self.show.or(self.movie)?;
        let mut media = show.into_normalized(kind);
        if media.total_units.is_none() {
            media.total_units = self.total_episodes_count;
        }
        Some(NormalizedListEntry {
            entry_id: None,
            status: self
                .status
                .as_deref()
                .map(map_status_from_simkl)
                .unwrap_or(ListStatus::Planning),
            progress: self.watched_episodes_count.unwrap_or(0),
            score: self.user_rating.filter(|r| *r > 0.0).map(|r| r * 10.0),
            repeat_count: 0,
            started_at: None,
            completed_at: None,
            media,
            provider: Provider::Simkl,
        })
    }
}

impl SimklSearchResult {
    pub fn into_normalized(self, kind: MediaKind) -> NormalizedMedia {
        let ids = self.ids.unwrap_or_default().into_provider_ids();
        NormalizedMedia {
            id: ids.simkl.unwrap_or(0),
            ids,
            titles: MediaTitles {
                english: self.title,
                ..Default::default()
            },
            cover_url: poster_url(self.poster),
            format: self.media_type,
            kind,
            total_units: self.total_episodes,
            genres: Vec::new(),
            average_score: None,
            start_date: self.year.map(|year| zoro_core::models::FuzzyDate {
                year: Some(year),
                month: None,
                day: None,
            }),
            end_date: None,
        }
    }
}
