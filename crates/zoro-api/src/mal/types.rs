//! Raw MyAnimeList v2 wire shapes and their conversions.

use serde::Deserialize;

use zoro_core::models::{
    FuzzyDate, ListStatus, MediaKind, MediaTitles, NormalizedListEntry, NormalizedMedia,
    NormalizedUserStats, Provider, ProviderIds,
};

/// MAL spells statuses per medium: `watching` vs `reading`, and so on.
/// Repeating has no status of its own; it rides on `is_rewatching`.
pub fn map_status_to_mal(status: ListStatus, kind: MediaKind) -> &'static str {
    let manga = kind.counts_chapters();
    match status {
        ListStatus::Current | ListStatus::Repeating => {
            if manga {
                "reading"
            } else {
                "watching"
            }
        }
        ListStatus::Planning => {
            if manga {
                "plan_to_read"
            } else {
                "plan_to_watch"
            }
        }
        ListStatus::Completed => "completed",
        ListStatus::Dropped => "dropped",
        ListStatus::Paused => "on_hold",
    }
}

pub fn map_status_from_mal(status: &str, rewatching: bool) -> ListStatus {
    if rewatching {
        return ListStatus::Repeating;
    }
    match status {
        "watching" | "reading" => ListStatus::Current,
        "plan_to_watch" | "plan_to_read" => ListStatus::Planning,
        "completed" => ListStatus::Completed,
        "dropped" => ListStatus::Dropped,
        "on_hold" => ListStatus::Paused,
        _ => ListStatus::Planning,
    }
}

/// Parse MAL's `YYYY[-MM[-DD]]` date strings.
pub fn parse_mal_date(s: &str) -> Option<FuzzyDate> {
    let mut parts = s.splitn(3, '-');
    let date = FuzzyDate {
        year: parts.next().and_then(|p| p.parse().ok()),
        month: parts.next().and_then(|p| p.parse().ok()),
        day: parts.next().and_then(|p| p.parse().ok()),
    };
    (!date.is_empty()).then_some(date)
}

// ── Responses ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MalListResponse {
    pub data: Vec<MalListItem>,
    #[serde(default)]
    pub paging: MalPaging,
}

#[derive(Debug, Default, Deserialize)]
pub struct MalPaging {
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MalListItem {
    pub node: MalNode,
    pub list_status: Option<MalListStatus>,
}

#[derive(Debug, Deserialize)]
pub struct MalNode {
    pub id: u64,
    pub title: String,
    pub main_picture: Option<MalPicture>,
    pub alternative_titles: Option<MalAlternativeTitles>,
    pub num_episodes: Option<u32>,
    pub num_chapters: Option<u32>,
    pub media_type: Option<String>,
    pub mean: Option<f32>,
    pub genres: Option<Vec<MalGenre>>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    /// Present when `my_list_status` is requested on an authenticated call.
    pub my_list_status: Option<MalListStatus>,
}

#[derive(Debug, Deserialize)]
pub struct MalPicture {
    pub medium: Option<String>,
    pub large: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MalAlternativeTitles {
    pub en: Option<String>,
    pub ja: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MalGenre {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct MalListStatus {
    pub status: Option<String>,
    pub num_episodes_watched: Option<u32>,
    pub num_chapters_read: Option<u32>,
    /// 0–10; zero means unrated.
    pub score: Option<u32>,
    #[serde(default)]
    pub is_rewatching: bool,
    #[serde(default)]
    pub is_rereading: bool,
    pub num_times_rewatched: Option<u32>,
    pub start_date: Option<String>,
    pub finish_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MalUser {
    pub id: u64,
    pub name: String,
    pub anime_statistics: Option<MalAnimeStatistics>,
}

#[derive(Debug, Deserialize)]
pub struct MalAnimeStatistics {
    pub num_items: Option<u32>,
    pub num_items_watching: Option<u32>,
    pub num_items_completed: Option<u32>,
    pub num_items_plan_to_watch: Option<u32>,
    pub num_episodes: Option<u64>,
    pub num_days_watched: Option<f64>,
    pub mean_score: Option<f32>,
}

// ── Conversions ─────────────────────────────────────────────────

impl MalNode {
    pub fn into_normalized(self, kind: MediaKind) -> NormalizedMedia {
        let total_units = if kind.counts_chapters() {
            self.num_chapters
        } else {
            self.num_episodes
        };
        NormalizedMedia {
            id: self.id,
            ids: ProviderIds {
                mal: Some(self.id),
                ..Default::default()
            },
            titles: MediaTitles {
                romaji: Some(self.title),
                english: self.alternative_titles.as_ref().and_then(|t| t.en.clone()),
                native: self.alternative_titles.and_then(|t| t.ja),
            },
            cover_url: self.main_picture.and_then(|p| p.large.or(p.medium)),
            format: self.media_type,
            kind,
            total_units,
            genres: self
                .genres
                .map(|g| g.into_iter().map(|x| x.name).collect())
                .unwrap_or_default(),
            // MAL means are 0–10; normalize to the 0–100 scale.
            average_score: self.mean.map(|m| m * 10.0),
            start_date: self.start_date.as_deref().and_then(parse_mal_date),
            end_date: self.end_date.as_deref().and_then(parse_mal_date),
        }
    }
}

impl MalListItem {
    pub fn into_normalized(self, kind: MediaKind) -> NormalizedListEntry {
        let status = self.list_status.unwrap_or_default();
        entry_from_parts(self.node, status, kind)
    }
}

/// Build a normalized entry from a node plus its (possibly absent) status.
pub fn entry_from_parts(
    node: MalNode,
    status: MalListStatus,
    kind: MediaKind,
) -> NormalizedListEntry {
    let progress = if kind.counts_chapters() {
        status.num_chapters_read
    } else {
        status.num_episodes_watched
    }
    .unwrap_or(0);
    let rewatching = status.is_rewatching || status.is_rereading;

    NormalizedListEntry {
        entry_id: None,
        status: status
            .status
            .as_deref()
            .map(|s| map_status_from_mal(s, rewatching))
            .unwrap_or(ListStatus::Planning),
        progress,
        score: status
            .score
            .filter(|s| *s > 0)
            .map(|s| (s * 10) as f32),
        repeat_count: status.num_times_rewatched.unwrap_or(0),
        started_at: status.start_date.as_deref().and_then(parse_mal_date),
        completed_at: status.finish_date.as_deref().and_then(parse_mal_date),
        media: node.into_normalized(kind),
        provider: Provider::Mal,
    }
}

impl MalUser {
    pub fn into_normalized(self) -> NormalizedUserStats {
        let stats = self.anime_statistics.as_ref();
        NormalizedUserStats {
            username: self.name,
            total_entries: stats.and_then(|s| s.num_items).unwrap_or(0),
            completed: stats.and_then(|s| s.num_items_completed).unwrap_or(0),
            current: stats.and_then(|s| s.num_items_watching).unwrap_or(0),
            planning: stats.and_then(|s| s.num_items_plan_to_watch).unwrap_or(0),
            units_consumed: stats.and_then(|s| s.num_episodes).unwrap_or(0),
            mean_score: stats
                .and_then(|s| s.mean_score)
                .filter(|m| *m > 0.0)
                .map(|m| m * 10.0),
            minutes_consumed: stats
                .and_then(|s| s.num_days_watched)
                .map(|days| (days * 24.0 * 60.0) as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_map_is_kind_aware() {
        assert_eq!(
            map_status_to_mal(ListStatus::Current, MediaKind::Anime),
            "watching"
        );
        assert_eq!(
            map_status_to_mal(ListStatus::Current, MediaKind::Manga),
            "reading"
        );
        assert_eq!(
            map_status_to_mal(ListStatus::Planning, MediaKind::Manga),
            "plan_to_read"
        );
        assert_eq!(
            map_status_to_mal(ListStatus::Paused, MediaKind::Anime),
            "on_hold"
        );

        assert_eq!(map_status_from_mal("watching", false), ListStatus::Current);
        assert_eq!(map_status_from_mal("watching", true), ListStatus::Repeating);
        assert_eq!(map_status_from_mal("reading", false), ListStatus::Current);
        assert_eq!(map_status_from_mal("on_hold", false), ListStatus::Paused);
    }

    #[test]
    fn test_parse_partial_dates() {
        assert_eq!(
            parse_mal_date("2023-09-29"),
            Some(FuzzyDate {
                year: Some(2023),
                month: Some(9),
                day: Some(29)
            })
        );
        assert_eq!(
            parse_mal_date("2023"),
            Some(FuzzyDate {
                year: Some(2023),
                month: None,
                day: None
            })
        );
        assert_eq!(parse_mal_date(""), None);
    }

    #[test]
    fn test_deserialize_list_response() {
        let json = r#"{
            "data": [
                {
                    "node": {
                        "id": 52991,
                        "title": "Sousou no Frieren",
                        "main_picture": {
                            "medium": "https://cdn.myanimelist.net/images/anime/1/52991.jpg"
                        },
                        "alternative_titles": {
                            "en": "Frieren: Beyond Journey's End",
                            "ja": "葬送のフリーレン"
                        },
                        "num_episodes": 28,
                        "media_type": "tv",
                        "mean": 9.32
                    },
                    "list_status": {
                        "status": "watching",
                        "num_episodes_watched": 14,
                        "score": 9,
                        "is_rewatching": false
                    }
                }
            ],
            "paging": { "next": null }
        }"#;

        let resp: MalListResponse = serde_json::from_str(json).unwrap();
        assert!(resp.paging.next.is_none());

        let entry = resp
            .data
            .into_iter()
            .next()
            .unwrap()
            .into_normalized(MediaKind::Anime);
        assert_eq!(entry.media.ids.mal, Some(52991));
        assert_eq!(entry.status, ListStatus::Current);
        assert_eq!(entry.progress, 14);
        // 0–10 scores land on the shared 0–100 scale.
        assert_eq!(entry.score, Some(90.0));
        assert!((entry.media.average_score.unwrap() - 93.2).abs() < 0.01);
        assert_eq!(
            entry.media.titles.english.as_deref(),
            Some("Frieren: Beyond Journey's End")
        );
    }

    #[test]
    fn test_manga_progress_counts_chapters() {
        let json = r#"{
            "node": { "id": 2, "title": "Berserk", "num_chapters": 380 },
            "list_status": {
                "status": "reading",
                "num_chapters_read": 120,
                "is_rereading": false
            }
        }"#;
        let item: MalListItem = serde_json::from_str(json).unwrap();
        let entry = item.into_normalized(MediaKind::Manga);
        assert_eq!(entry.progress, 120);
        assert_eq!(entry.media.total_units, Some(380));
        assert_eq!(entry.status, ListStatus::Current);
    }

    #[test]
    fn test_user_stats() {
        let json = r#"{
            "id": 1,
            "name": "alice",
            "anime_statistics": {
                "num_items": 120,
                "num_items_watching": 10,
                "num_items_completed": 90,
                "num_items_plan_to_watch": 20,
                "num_episodes": 2400,
                "num_days_watched": 40.0,
                "mean_score": 7.45
            }
        }"#;
        let stats: MalUser = serde_json::from_str(json).unwrap();
        let normalized = stats.into_normalized();
        assert_eq!(normalized.total_entries, 120);
        assert!((normalized.mean_score.unwrap() - 74.5).abs() < 0.01);
        assert_eq!(normalized.minutes_consumed, Some(57_600));
    }
}
