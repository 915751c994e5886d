use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::types::{
    kind_segment, map_status_to_simkl, SimklAllItems, SimklSearchResult, SimklUserSettings,
};
use crate::credentials::CredentialStore;
use crate::traits::TrackerService;
use zoro_core::block::BlockConfig;
use zoro_core::error::ZoroError;
use zoro_core::models::{
    EntryUpdate, ListStatus, MediaKind, NormalizedListEntry, NormalizedMedia, NormalizedUserStats,
    Provider,
};

const BASE_URL: &str = "https://api.simkl.com";

/// Simkl REST adapter. All calls carry the `simkl-api-key` header; user
/// state additionally needs the bearer token.
pub struct SimklClient {
    http: Client,
    credentials: CredentialStore,
}

impl SimklClient {
    pub fn new(http: Client, credentials: CredentialStore) -> Self {
        Self { http, credentials }
    }

    fn with_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let mut request = request;
        for (name, value) in self.credentials.auth_headers(Provider::Simkl) {
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
            warn!(status, "Simkl API error");
            Err(ZoroError::from_status(status, &body, retry_after))
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ZoroError> {
        debug!(url, "Simkl request");
        let resp = self.with_auth(self.http.get(url)).send().await?;
        let resp = Self::check_response(resp).await?;
        resp.json()
            .await
            .map_err(|e| ZoroError::Protocol(format!("bad Simkl response: {e}")))
    }

    async fn post_json(&self, url: &str, body: serde_json::Value) -> Result<(), ZoroError> {
        debug!(url, "Simkl sync request");
        let resp = self.with_auth(self.http.post(url)).json(&body).send().await?;
        Self::check_response(resp).await?;
        Ok(())
    }

    /// Simkl tracks shows and movies under separate payload keys.
    fn payload_key(kind: MediaKind) -> &'static str {
        match kind {
            MediaKind::Movie => "movies",
            _ => "shows",
        }
    }

    async fn fetch_items(
        &self,
        kind: MediaKind,
        status: Option<ListStatus>,
    ) -> Result<Vec<NormalizedListEntry>, ZoroError> {
        let mut url = format!("{BASE_URL}/sync/all-items/{}", kind_segment(kind));
        if let Some(status) = status {
            url.push_str(&format!("/{}", map_status_to_simkl(status)));
        }
        url.push_str("?extended=full");

        // An empty list arrives as a null body on some endpoints.
        let items: Option<SimklAllItems> = self.get_json(&url).await?;
        Ok(items
            .unwrap_or_default()
            .into_kind(kind)
            .into_iter()
            .filter_map(|item| item.into_normalized(kind))
            .collect())
    }

    /// Resolve one media id to its Simkl record via the id cross-reference
    /// search.
    async fn lookup_by_id(
        &self,
        media_id: u64,
        kind: MediaKind,
    ) -> Result<NormalizedMedia, ZoroError> {
        let url = format!("{BASE_URL}/search/id?simkl={media_id}");
        let results: Vec<SimklSearchResult> = self.get_json(&url).await?;
        results
            .into_iter()
            .next()
            .map(|r| r.into_normalized(kind))
            .ok_or_else(|| ZoroError::Protocol(format!("Simkl id {media_id} resolved to nothing")))
    }
}

#[async_trait]
impl TrackerService for SimklClient {
    fn provider(&self) -> Provider {
        Provider::Simkl
    }

    async fn fetch_list(&self, config: &BlockConfig) -> Result<Vec<NormalizedListEntry>, ZoroError> {
        self.fetch_items(config.media_kind, config.list_status).await
    }

    async fn fetch_single(&self, config: &BlockConfig) -> Result<NormalizedListEntry, ZoroError> {
        let media_id = config
            .media_id
            .ok_or_else(|| ZoroError::config("single fetch requires a mediaId"))?;

        // There is no per-media entry endpoint; check the synced list first
        // and fall back to the bare media record.
        let tracked = self
            .fetch_items(config.media_kind, None)
            .await?
            .into_iter()
            .find(|entry| entry.media.ids.simkl == Some(media_id));
        if let Some(entry) = tracked {
            return Ok(entry);
        }

        let media = self.lookup_by_id(media_id, config.media_kind).await?;
        Ok(NormalizedListEntry {
            entry_id: None,
            status: ListStatus::Planning,
            progress: 0,
            score: None,
            repeat_count: 0,
            started_at: None,
            completed_at: None,
            media,
            provider: Provider::Simkl,
        })
    }

    async fn fetch_stats(&self, config: &BlockConfig) -> Result<NormalizedUserStats, ZoroError> {
        // Simkl exposes no public per-username stats endpoint; aggregate
        // from the authenticated user's synced items.
        let entries = self.fetch_items(config.media_kind, None).await?;
        let username = config
            .username
            .clone()
            .unwrap_or_else(|| "me".to_string());

        let mut stats = NormalizedUserStats {
            username,
            total_entries: entries.len() as u32,
            ..Default::default()
        };
        let mut score_sum = 0.0f64;
        let mut score_count = 0u32;
        for entry in &entries {
            match entry.status {
                ListStatus::Completed => stats.completed += 1,
                ListStatus::Current | ListStatus::Repeating => stats.current += 1,
                ListStatus::Planning => stats.planning += 1,
                _ => {}
            }
            stats.units_consumed += u64::from(entry.progress);
            if let Some(score) = entry.score {
                score_sum += f64::from(score);
                score_count += 1;
            }
        }
        if score_count > 0 {
            stats.mean_score = Some((score_sum / f64::from(score_count)) as f32);
        }
        Ok(stats)
    }

    async fn search(&self, config: &BlockConfig) -> Result<Vec<NormalizedMedia>, ZoroError> {
        let term = config.search.as_deref().unwrap_or_default();
        let url = format!(
            "{BASE_URL}/search/{}?q={}&page={}&limit={}&extended=full",
            kind_segment(config.media_kind),
            urlencode(term),
            config.page.unwrap_or(1),
            config.per_page.unwrap_or(10),
        );
        let results: Vec<SimklSearchResult> = self.get_json(&url).await?;
        Ok(results
            .into_iter()
            .map(|r| r.into_normalized(config.media_kind))
            .collect())
    }

    async fn update_entry(
        &self,
        media_id: u64,
        update: &EntryUpdate,
        kind: MediaKind,
    ) -> Result<NormalizedListEntry, ZoroError> {
        let key = Self::payload_key(kind);
        let ids = serde_json::json!({ "ids": { "simkl": media_id } });

        if let Some(status) = update.status {
            let mut item = ids.clone();
            item["to"] = serde_json::json!(map_status_to_simkl(status));
            self.post_json(
                &format!("{BASE_URL}/sync/add-to-list"),
                serde_json::json!({ key: [item] }),
            )
            .await?;
        }
        if let Some(score) = update.score {
            let mut item = ids.clone();
            // Simkl ratings are 1–10 integers.
            item["rating"] = serde_json::json!(((score / 10.0).round() as u32).clamp(1, 10));
            self.post_json(
                &format!("{BASE_URL}/sync/ratings"),
                serde_json::json!({ key: [item] }),
            )
            .await?;
        }
        if let Some(progress) = update.progress {
            let mut item = ids.clone();
            if kind != MediaKind::Movie {
                let episodes: Vec<_> = (1..=progress)
                    .map(|n| serde_json::json!({ "number": n }))
                    .collect();
                item["seasons"] = serde_json::json!([{ "number": 1, "episodes": episodes }]);
            }
            self.post_json(
                &format!("{BASE_URL}/sync/history"),
                serde_json::json!({ key: [item] }),
            )
            .await?;
        }

        // Sync endpoints return counters, not the entry; rebuild it.
        let media = self.lookup_by_id(media_id, kind).await?;
        Ok(NormalizedListEntry {
            entry_id: None,
            status: update.status.unwrap_or(ListStatus::Current),
            progress: update.progress.unwrap_or(0),
            score: update.score,
            repeat_count: 0,
            started_at: None,
            completed_at: None,
            media,
            provider: Provider::Simkl,
        })
    }

    async fn remove_entry(&self, media_id: u64, kind: MediaKind) -> Result<(), ZoroError> {
        let key = Self::payload_key(kind);
        self.post_json(
            &format!("{BASE_URL}/sync/history/remove"),
            serde_json::json!({ key: [{ "ids": { "simkl": media_id } }] }),
        )
        .await
    }

    async fn is_in_list(&self, media_id: u64, kind: MediaKind) -> Result<bool, ZoroError> {
        let entries = self.fetch_items(kind, None).await?;
        Ok(entries
            .iter()
            .any(|entry| entry.media.ids.simkl == Some(media_id)))
    }

    async fn viewer_name(&self) -> Result<String, ZoroError> {
        let settings: SimklUserSettings =
            self.get_json(&format!("{BASE_URL}/users/settings")).await?;
        settings
            .user
            .and_then(|u| u.name)
            .ok_or_else(|| ZoroError::Auth("Simkl did not report a user name".into()))
    }
}

/// Minimal percent-encoding for query values.
fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
