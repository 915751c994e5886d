use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::types::{
    entry_from_parts, map_status_to_mal, MalListResponse, MalNode, MalUser,
};
use crate::credentials::CredentialStore;
use crate::traits::TrackerService;
use zoro_core::block::{BlockConfig, Layout};
use zoro_core::error::ZoroError;
use zoro_core::models::{
    EntryUpdate, ListStatus, MediaKind, NormalizedListEntry, NormalizedMedia, NormalizedUserStats,
    Provider,
};

const BASE_URL: &str = "https://api.myanimelist.net/v2";

/// `fields=` expansion per layout hint, mirroring the AniList selection-set
/// tiers. `{progress}` stands in for the kind-specific count field.
fn media_fields(layout: Option<Layout>, kind: MediaKind) -> String {
    let count_field = if kind.counts_chapters() {
        "num_chapters"
    } else {
        "num_episodes"
    };
    let tier = match layout {
        Some(Layout::Compact) => "id,title,main_picture,media_type",
        Some(Layout::Full) => {
            "id,title,main_picture,media_type,mean,genres,alternative_titles,start_date,end_date"
        }
        Some(Layout::Card) | Some(Layout::Table) | None => {
            "id,title,main_picture,media_type,mean,genres"
        }
    };
    format!("{tier},{count_field}")
}

/// Path segment for the media kind. MAL only serves anime and manga; the
/// orchestrator rejects other kinds before they reach this adapter.
fn kind_path(kind: MediaKind) -> &'static str {
    if kind.counts_chapters() {
        "manga"
    } else {
        "anime"
    }
}

/// MyAnimeList v2 REST adapter.
pub struct MalClient {
    http: Client,
    credentials: CredentialStore,
}

impl MalClient {
    pub fn new(http: Client, credentials: CredentialStore) -> Self {
        Self { http, credentials }
    }

    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut request = request;
        for (name, value) in self.credentials.auth_headers(Provider::Mal) {
            request = request.header(name, value);
        }
        request
    }

    async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, ZoroError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status().as_u16();
            let retry_after = zoro_core::error::retry_after_secs(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            warn!(status, "MAL API error");
            Err(ZoroError::from_status(status, &body, retry_after))
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ZoroError> {
        debug!(url, "MAL request");
        let resp = self.with_auth(self.http.get(url)).send().await?;
        let resp = Self::check_response(resp).await?;
        resp.json()
            .await
            .map_err(|e| ZoroError::Protocol(format!("bad MAL response: {e}")))
    }

    /// The user path segment: `@me` for the authenticated user.
    fn user_segment(config: &BlockConfig) -> String {
        match config.username.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => "@me".to_string(),
        }
    }
}

#[async_trait]
impl TrackerService for MalClient {
    fn provider(&self) -> Provider {
        Provider::Mal
    }

    async fn fetch_list(&self, config: &BlockConfig) -> Result<Vec<NormalizedListEntry>, ZoroError> {
        let kind = config.media_kind;
        let user = Self::user_segment(config);
        let fields = media_fields(config.layout, kind);
        let mut url = format!(
            "{BASE_URL}/users/{user}/{kind}list?fields=list_status,{fields}&limit=100&nsfw=true",
            kind = kind_path(kind),
        );
        if let Some(status) = config.list_status {
            url.push_str(&format!("&status={}", map_status_to_mal(status, kind)));
        }

        // Follow paging.next until exhausted.
        let mut entries = Vec::new();
        loop {
            let page: MalListResponse = self.get_json(&url).await?;
            entries.extend(
                page.data
                    .into_iter()
                    .map(|item| item.into_normalized(kind)),
            );
            match page.paging.next {
                Some(next) => url = next,
                None => break,
            }
        }
        Ok(entries)
    }

    async fn fetch_single(&self, config: &BlockConfig) -> Result<NormalizedListEntry, ZoroError> {
        let media_id = config
            .media_id
            .ok_or_else(|| ZoroError::config("single fetch requires a mediaId"))?;
        let kind = config.media_kind;
        let fields = media_fields(config.layout, kind);
        let url = format!(
            "{BASE_URL}/{}/{media_id}?fields={fields},my_list_status",
            kind_path(kind)
        );

        let node: MalNode = self.get_json(&url).await?;
        let mut node = node;
        let status = node.my_list_status.take().unwrap_or_default();
        Ok(entry_from_parts(node, status, kind))
    }

    async fn fetch_stats(&self, config: &BlockConfig) -> Result<NormalizedUserStats, ZoroError> {
        let user = Self::user_segment(config);
        let url = format!("{BASE_URL}/users/{user}?fields=anime_statistics");
        let user: MalUser = self.get_json(&url).await?;
        Ok(user.into_normalized())
    }

    async fn search(&self, config: &BlockConfig) -> Result<Vec<NormalizedMedia>, ZoroError> {
        let kind = config.media_kind;
        let term = config.search.as_deref().unwrap_or_default();
        let limit = config.per_page.unwrap_or(10);
        let offset = config.page.map(|p| p.saturating_sub(1) * limit).unwrap_or(0);
        let fields = media_fields(config.layout, kind);

        let resp = self
            .with_auth(self.http.get(format!("{BASE_URL}/{}", kind_path(kind))))
            .query(&[
                ("q", term),
                ("limit", &limit.to_string()),
                ("offset", &offset.to_string()),
                ("fields", &fields),
            ])
            .send()
            .await?;
        let resp = Self::check_response(resp).await?;
        let page: MalListResponse = resp
            .json()
            .await
            .map_err(|e| ZoroError::Protocol(format!("bad MAL response: {e}")))?;

        Ok(page
            .data
            .into_iter()
            .map(|item| item.node.into_normalized(kind))
            .collect())
    }

    async fn update_entry(
        &self,
        media_id: u64,
        update: &EntryUpdate,
        kind: MediaKind,
    ) -> Result<NormalizedListEntry, ZoroError> {
        let url = format!("{BASE_URL}/{}/{media_id}/my_list_status", kind_path(kind));

        // MAL takes PATCH with a form body; only send what changed.
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(status) = update.status {
            params.push(("status", map_status_to_mal(status, kind).to_string()));
            if status == ListStatus::Repeating {
                let flag = if kind.counts_chapters() {
                    "is_rereading"
                } else {
                    "is_rewatching"
                };
                params.push((flag, "true".to_string()));
            }
        }
        if let Some(progress) = update.progress {
            let field = if kind.counts_chapters() {
                "num_chapters_read"
            } else {
                "num_watched_episodes"
            };
            params.push((field, progress.to_string()));
        }
        if let Some(score) = update.score {
            // Normalized 0–100 down to MAL's 0–10 integers.
            params.push(("score", ((score / 10.0).round() as u32).min(10).to_string()));
        }

        let resp = self
            .with_auth(self.http.patch(&url))
            .form(&params)
            .send()
            .await?;
        let resp = Self::check_response(resp).await?;
        let status: super::types::MalListStatus = resp
            .json()
            .await
            .map_err(|e| ZoroError::Protocol(format!("bad MAL response: {e}")))?;

        // The PATCH response is the list status alone; refetch the node so
        // the caller gets a complete entry back.
        let fields = media_fields(None, kind);
        let url = format!("{BASE_URL}/{}/{media_id}?fields={fields}", kind_path(kind));
        let node: MalNode = self.get_json(&url).await?;
        Ok(entry_from_parts(node, status, kind))
    }

    async fn remove_entry(&self, media_id: u64, kind: MediaKind) -> Result<(), ZoroError> {
        let url = format!("{BASE_URL}/{}/{media_id}/my_list_status", kind_path(kind));
        let resp = self.with_auth(self.http.delete(&url)).send().await?;
        // 404 means it was never in the list; treat as done.
        if resp.status().as_u16() == 404 {
            return Ok(());
        }
        Self::check_response(resp).await?;
        Ok(())
    }

    async fn is_in_list(&self, media_id: u64, kind: MediaKind) -> Result<bool, ZoroError> {
        let url = format!(
            "{BASE_URL}/{}/{media_id}?fields=my_list_status",
            kind_path(kind)
        );
        let node: MalNode = self.get_json(&url).await?;
        Ok(node.my_list_status.is_some())
    }

    async fn viewer_name(&self) -> Result<String, ZoroError> {
        let user: MalUser = self.get_json(&format!("{BASE_URL}/users/@me")).await?;
        Ok(user.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_fields_tiers() {
        let compact = media_fields(Some(Layout::Compact), MediaKind::Anime);
        assert!(!compact.contains("genres"));
        assert!(compact.ends_with("num_episodes"));

        let full = media_fields(Some(Layout::Full), MediaKind::Manga);
        assert!(full.contains("alternative_titles"));
        assert!(full.ends_with("num_chapters"));
    }

    #[test]
    fn test_kind_path() {
        assert_eq!(kind_path(MediaKind::Anime), "anime");
        assert_eq!(kind_path(MediaKind::Manga), "manga");
    }
}
