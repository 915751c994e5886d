//! Shared domain model for the three tracking services.
//!
//! Adapters deserialize provider-specific wire shapes and convert them into
//! these normalized types; everything above the adapter layer (cache,
//! orchestrator, rendering collaborators) only ever sees these.

use serde::{Deserialize, Serialize};

use crate::error::ZoroError;

/// Which upstream service a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    AniList,
    Mal,
    Simkl,
}

impl Provider {
    pub const ALL: &[Provider] = &[Self::AniList, Self::Mal, Self::Simkl];

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "anilist" => Some(Self::AniList),
            "mal" | "myanimelist" => Some(Self::Mal),
            "simkl" => Some(Self::Simkl),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AniList => "anilist",
            Self::Mal => "mal",
            Self::Simkl => "simkl",
        }
    }

    /// The media kinds this provider can serve.
    pub fn supported_kinds(self) -> &'static [MediaKind] {
        match self {
            Self::AniList | Self::Mal => &[MediaKind::Anime, MediaKind::Manga],
            Self::Simkl => &[
                MediaKind::Anime,
                MediaKind::Manga,
                MediaKind::Movie,
                MediaKind::Tv,
            ],
        }
    }

    pub fn supports(self, kind: MediaKind) -> bool {
        self.supported_kinds().contains(&kind)
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of tracked work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaKind {
    Anime,
    Manga,
    Movie,
    Tv,
}

impl MediaKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ANIME" => Some(Self::Anime),
            "MANGA" => Some(Self::Manga),
            "MOVIE" | "MOVIES" => Some(Self::Movie),
            "TV" | "SHOW" | "SHOWS" => Some(Self::Tv),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Anime => "ANIME",
            Self::Manga => "MANGA",
            Self::Movie => "MOVIE",
            Self::Tv => "TV",
        }
    }

    /// Progress on manga counts chapters; everything else counts episodes.
    pub fn counts_chapters(self) -> bool {
        matches!(self, Self::Manga)
    }
}

impl Default for MediaKind {
    fn default() -> Self {
        Self::Anime
    }
}

/// Canonical list status. Providers spell these differently; each adapter
/// owns the translation table in its `types` module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ListStatus {
    Current,
    Planning,
    Completed,
    Dropped,
    Paused,
    Repeating,
}

impl ListStatus {
    pub const ALL: &[ListStatus] = &[
        Self::Current,
        Self::Planning,
        Self::Completed,
        Self::Dropped,
        Self::Paused,
        Self::Repeating,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CURRENT" => Some(Self::Current),
            "PLANNING" => Some(Self::Planning),
            "COMPLETED" => Some(Self::Completed),
            "DROPPED" => Some(Self::Dropped),
            "PAUSED" => Some(Self::Paused),
            "REPEATING" => Some(Self::Repeating),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Current => "CURRENT",
            Self::Planning => "PLANNING",
            Self::Completed => "COMPLETED",
            Self::Dropped => "DROPPED",
            Self::Paused => "PAUSED",
            Self::Repeating => "REPEATING",
        }
    }
}

/// Titles of a work across scripts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaTitles {
    pub romaji: Option<String>,
    pub english: Option<String>,
    pub native: Option<String>,
}

impl MediaTitles {
    /// English, then romanized, then native, then a placeholder.
    pub fn preferred(&self) -> &str {
        self.english
            .as_deref()
            .or(self.romaji.as_deref())
            .or(self.native.as_deref())
            .unwrap_or("(untitled)")
    }
}

/// Sparse cross-provider id set for one work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderIds {
    pub anilist: Option<u64>,
    pub mal: Option<u64>,
    pub simkl: Option<u64>,
    pub imdb: Option<String>,
    pub tmdb: Option<u64>,
}

/// A possibly-partial calendar date as the trackers report them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzyDate {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl FuzzyDate {
    pub fn is_empty(&self) -> bool {
        self.year.is_none() && self.month.is_none() && self.day.is_none()
    }
}

/// A normalized work, independent of which provider served it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMedia {
    /// The id at the provider that served this record.
    pub id: u64,
    pub ids: ProviderIds,
    pub titles: MediaTitles,
    pub cover_url: Option<String>,
    /// Provider format string ("TV", "Movie", "one_shot", ...), unaltered.
    pub format: Option<String>,
    pub kind: MediaKind,
    /// Episodes for anime/tv, chapters for manga. None while releasing.
    pub total_units: Option<u32>,
    pub genres: Vec<String>,
    /// 0–100 scale.
    pub average_score: Option<f32>,
    pub start_date: Option<FuzzyDate>,
    pub end_date: Option<FuzzyDate>,
}

/// A user's tracked record for one work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedListEntry {
    /// Provider-side entry id when the provider has one distinct from the
    /// media id (AniList does; MAL and Simkl key entries by media).
    pub entry_id: Option<u64>,
    pub status: ListStatus,
    pub progress: u32,
    /// 0–100 scale, normalized from whatever the provider uses.
    pub score: Option<f32>,
    pub repeat_count: u32,
    pub started_at: Option<FuzzyDate>,
    pub completed_at: Option<FuzzyDate>,
    pub media: NormalizedMedia,
    pub provider: Provider,
}

/// Aggregate statistics for one user at one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedUserStats {
    pub username: String,
    pub total_entries: u32,
    pub completed: u32,
    pub current: u32,
    pub planning: u32,
    /// Episodes watched / chapters read, as the provider counts them.
    pub units_consumed: u64,
    pub mean_score: Option<f32>,
    /// Minutes for watch time; None for manga-only stats.
    pub minutes_consumed: Option<u64>,
}

/// The fields a mutation may change. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryUpdate {
    pub status: Option<ListStatus>,
    pub progress: Option<u32>,
    /// 0–100 scale; adapters rescale to the provider's native scale.
    pub score: Option<f32>,
}

impl EntryUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.progress.is_none() && self.score.is_none()
    }
}

/// The union of everything a fetch can produce; this is what the cache
/// stores and what the orchestrator hands to the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FetchPayload {
    List(Vec<NormalizedListEntry>),
    Single(Box<NormalizedListEntry>),
    Stats(NormalizedUserStats),
    SearchResults(Vec<NormalizedMedia>),
}

impl FetchPayload {
    pub fn as_list(&self) -> Result<&[NormalizedListEntry], ZoroError> {
        match self {
            Self::List(entries) => Ok(entries),
            other => Err(ZoroError::Protocol(format!(
                "expected a list payload, got {}",
                other.kind_name()
            ))),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::List(_) => "list",
            Self::Single(_) => "single",
            Self::Stats(_) => "stats",
            Self::SearchResults(_) => "search",
        }
    }
}
