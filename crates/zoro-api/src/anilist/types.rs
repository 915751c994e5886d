//! Raw AniList wire shapes and their conversions into the shared model.

use serde::Deserialize;

use zoro_core::models::{
    FuzzyDate, ListStatus, MediaKind, MediaTitles, NormalizedListEntry, NormalizedMedia,
    NormalizedUserStats, Provider, ProviderIds,
};

/// AniList's status spellings match the canonical enum one-to-one.
pub fn map_status_to_anilist(status: ListStatus) -> &'static str {
    status.as_str()
}

pub fn map_status_from_anilist(s: &str) -> Option<ListStatus> {
    ListStatus::parse(s)
}

// ── Envelope ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GraphQLResponse<T> {
    pub data: Option<T>,
    pub errors: Option<Vec<GraphQLError>>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQLError {
    pub message: String,
    pub status: Option<u16>,
}

// ── Media and list entries ──────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AniListMedia {
    pub id: u64,
    pub id_mal: Option<u64>,
    pub title: Option<AniListTitle>,
    pub cover_image: Option<AniListCover>,
    pub episodes: Option<u32>,
    pub chapters: Option<u32>,
    pub format: Option<String>,
    pub average_score: Option<f32>,
    #[serde(default)]
    pub genres: Option<Vec<String>>,
    pub start_date: Option<AniListDate>,
    pub end_date: Option<AniListDate>,
}

#[derive(Debug, Deserialize)]
pub struct AniListTitle {
    pub romaji: Option<String>,
    pub english: Option<String>,
    pub native: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AniListCover {
    pub large: Option<String>,
    pub medium: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AniListDate {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl AniListDate {
    fn into_fuzzy(self) -> Option<FuzzyDate> {
        let date = FuzzyDate {
            year: self.year,
            month: self.month,
            day: self.day,
        };
        (!date.is_empty()).then_some(date)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AniListListEntry {
    pub id: Option<u64>,
    pub status: Option<String>,
    pub progress: Option<u32>,
    pub score: Option<f32>,
    pub repeat: Option<u32>,
    pub started_at: Option<AniListDate>,
    pub completed_at: Option<AniListDate>,
    pub media: AniListMedia,
}

#[derive(Debug, Deserialize)]
pub struct MediaListCollectionData {
    #[serde(rename = "MediaListCollection")]
    pub media_list_collection: MediaListCollection,
}

#[derive(Debug, Deserialize)]
pub struct MediaListCollection {
    pub lists: Vec<ListGroup>,
}

#[derive(Debug, Deserialize)]
pub struct ListGroup {
    pub entries: Vec<AniListListEntry>,
}

#[derive(Debug, Deserialize)]
pub struct MediaListData {
    #[serde(rename = "MediaList")]
    pub media_list: Option<AniListListEntry>,
}

#[derive(Debug, Deserialize)]
pub struct MediaData {
    #[serde(rename = "Media")]
    pub media: AniListMedia,
}

#[derive(Debug, Deserialize)]
pub struct PageData {
    #[serde(rename = "Page")]
    pub page: Page,
}

#[derive(Debug, Deserialize)]
pub struct Page {
    pub media: Vec<AniListMedia>,
}

#[derive(Debug, Deserialize)]
pub struct SaveEntryData {
    #[serde(rename = "SaveMediaListEntry")]
    pub save_media_list_entry: AniListListEntry,
}

#[derive(Debug, Deserialize)]
pub struct FindEntryData {
    #[serde(rename = "MediaList")]
    pub media_list: Option<EntryIdOnly>,
}

#[derive(Debug, Deserialize)]
pub struct EntryIdOnly {
    pub id: u64,
}

#[derive(Debug, Deserialize)]
pub struct ViewerData {
    #[serde(rename = "Viewer")]
    pub viewer: Viewer,
}

#[derive(Debug, Deserialize)]
pub struct Viewer {
    pub id: u64,
    pub name: String,
}

// ── User statistics ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UserData {
    #[serde(rename = "User")]
    pub user: AniListUser,
}

#[derive(Debug, Deserialize)]
pub struct AniListUser {
    pub name: String,
    pub statistics: AniListStatistics,
}

#[derive(Debug, Deserialize)]
pub struct AniListStatistics {
    pub anime: AniListStatGroup,
    pub manga: AniListStatGroup,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AniListStatGroup {
    pub count: u32,
    pub episodes_watched: Option<u64>,
    pub minutes_watched: Option<u64>,
    pub chapters_read: Option<u64>,
    pub mean_score: Option<f32>,
    #[serde(default)]
    pub statuses: Vec<AniListStatusCount>,
}

#[derive(Debug, Deserialize)]
pub struct AniListStatusCount {
    pub status: Option<String>,
    pub count: u32,
}

impl AniListStatGroup {
    fn status_count(&self, status: ListStatus) -> u32 {
        self.statuses
            .iter()
            .filter(|s| {
                s.status
                    .as_deref()
                    .and_then(map_status_from_anilist)
                    .is_some_and(|parsed| parsed == status)
            })
            .map(|s| s.count)
            .sum()
    }
}

// ── Conversions ─────────────────────────────────────────────────

impl AniListMedia {
    pub fn into_normalized(self, kind: MediaKind) -> NormalizedMedia {
        let total_units = if kind.counts_chapters() {
            self.chapters
        } else {
            self.episodes
        };
        NormalizedMedia {
            id: self.id,
            ids: ProviderIds {
                anilist: Some(self.id),
                mal: self.id_mal,
                ..Default::default()
            },
            titles: self
                .title
                .map(|t| MediaTitles {
                    romaji: t.romaji,
                    english: t.english,
                    native: t.native,
                })
                .unwrap_or_default(),
            cover_url: self
                .cover_image
                .and_then(|c| c.large.or(c.medium)),
            format: self.format,
            kind,
            total_units,
            genres: self.genres.unwrap_or_default(),
            average_score: self.average_score,
            start_date: self.start_date.and_then(AniListDate::into_fuzzy),
            end_date: self.end_date.and_then(AniListDate::into_fuzzy),
        }
    }
}

impl AniListListEntry {
    pub fn into_normalized(self, kind: MediaKind) -> NormalizedListEntry {
        NormalizedListEntry {
            entry_id: self.id,
            status: self
                .status
                .as_deref()
                .and_then(map_status_from_anilist)
                .unwrap_or(ListStatus::Planning),
            progress: self.progress.unwrap_or(0),
            score: self.score.filter(|s| *s > 0.0),
            repeat_count: self.repeat.unwrap_or(0),
            started_at: self.started_at.and_then(AniListDate::into_fuzzy),
            completed_at: self.completed_at.and_then(AniListDate::into_fuzzy),
            media: self.media.into_normalized(kind),
            provider: Provider::AniList,
        }
    }
}

impl AniListUser {
    pub fn into_normalized(self, kind: MediaKind) -> NormalizedUserStats {
        let group = if kind.counts_chapters() {
            &self.statistics.manga
        } else {
            &self.statistics.anime
        };
        NormalizedUserStats {
            username: self.name.clone(),
            total_entries: group.count,
            completed: group.status_count(ListStatus::Completed),
            current: group.status_count(ListStatus::Current),
            planning: group.status_count(ListStatus::Planning),
            units_consumed: group
                .episodes_watched
                .or(group.chapters_read)
                .unwrap_or(0),
            mean_score: group.mean_score.filter(|s| *s > 0.0),
            minutes_consumed: group.minutes_watched,
        }
    }
}
