use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::query;
use super::types::{
    map_status_to_anilist, FindEntryData, GraphQLError, GraphQLResponse, MediaData, MediaListData,
    MediaListCollectionData, PageData, SaveEntryData, UserData, ViewerData,
};
use crate::credentials::CredentialStore;
use crate::traits::TrackerService;
use zoro_core::block::BlockConfig;
use zoro_core::error::ZoroError;
use zoro_core::models::{
    EntryUpdate, ListStatus, MediaKind, NormalizedListEntry, NormalizedMedia, NormalizedUserStats,
    Provider,
};

const API_URL: &str = "https://graphql.anilist.co";

/// AniList GraphQL adapter.
pub struct AniListClient {
    http: Client,
    credentials: CredentialStore,
}

impl AniListClient {
    pub fn new(http: Client, credentials: CredentialStore) -> Self {
        Self { http, credentials }
    }

    async fn graphql_raw<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<GraphQLResponse<T>, ZoroError> {
        debug!(operation, "AniList GraphQL request");

        let mut request = self
            .http
            .post(API_URL)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json");
        for (name, value) in self.credentials.auth_headers(Provider::AniList) {
            request = request.header(name, value);
        }

        let resp = request
            .json(&serde_json::json!({
                "query": query,
                "variables": variables,
            }))
            .send()
            .await?;

        let status = resp.status();
        let retry_after = zoro_core::error::retry_after_secs(resp.headers());
        let body = resp.text().await.unwrap_or_default();

        // 429 bodies are not reliable GraphQL; map them straight from the
        // status so the Retry-After header survives.
        if status.as_u16() == 429 {
            return Err(ZoroError::from_status(429, &body, retry_after));
        }

        // AniList reports application errors both through the HTTP status
        // and an `errors` array; the array has the better message.
        match serde_json::from_str::<GraphQLResponse<T>>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(_) if !status.is_success() => {
                Err(ZoroError::from_status(status.as_u16(), &body, retry_after))
            }
            Err(e) => Err(ZoroError::Protocol(format!("bad AniList response: {e}"))),
        }
    }

    /// Unwrap the envelope, translating the error array per the taxonomy:
    /// a 401/403-status error is an auth failure, anything else a protocol
    /// failure surfaced with the first error's message.
    fn take_data<T>(resp: GraphQLResponse<T>) -> Result<T, ZoroError> {
        if let Some(errors) = resp.errors.filter(|e| !e.is_empty()) {
            return Err(Self::translate_errors(&errors));
        }
        resp.data
            .ok_or_else(|| ZoroError::Protocol("AniList response carried no data".into()))
    }

    fn translate_errors(errors: &[GraphQLError]) -> ZoroError {
        let first = &errors[0];
        match first.status {
            Some(401) | Some(403) => ZoroError::Auth(first.message.clone()),
            Some(429) => ZoroError::RateLimit { retry_after: None },
            _ => ZoroError::Protocol(first.message.clone()),
        }
    }

    async fn graphql<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, ZoroError> {
        let resp = self.graphql_raw(operation, query, variables).await?;
        Self::take_data(resp)
    }

    /// Fetch the bare media record and wrap it as an untracked entry.
    async fn fetch_untracked(
        &self,
        config: &BlockConfig,
        media_id: u64,
    ) -> Result<NormalizedListEntry, ZoroError> {
        let data: MediaData = self
            .graphql(
                "Media",
                &query::media_query(config.layout),
                serde_json::json!({
                    "mediaId": media_id,
                    "type": config.media_kind.as_str(),
                }),
            )
            .await?;

        Ok(NormalizedListEntry {
            entry_id: None,
            status: ListStatus::Planning,
            progress: 0,
            score: None,
            repeat_count: 0,
            started_at: None,
            completed_at: None,
            media: data.media.into_normalized(config.media_kind),
            provider: Provider::AniList,
        })
    }
}

#[async_trait]
impl TrackerService for AniListClient {
    fn provider(&self) -> Provider {
        Provider::AniList
    }

    async fn fetch_list(&self, config: &BlockConfig) -> Result<Vec<NormalizedListEntry>, ZoroError> {
        let mut variables = serde_json::json!({
            "userName": config.username,
            "type": config.media_kind.as_str(),
        });
        if let Some(status) = config.list_status {
            variables["status"] = serde_json::json!(map_status_to_anilist(status));
        }

        let data: MediaListCollectionData = self
            .graphql("MediaListCollection", &query::list_query(config.layout), variables)
            .await?;

        Ok(data
            .media_list_collection
            .lists
            .into_iter()
            .flat_map(|group| group.entries)
            .map(|entry| entry.into_normalized(config.media_kind))
            .collect())
    }

    async fn fetch_single(&self, config: &BlockConfig) -> Result<NormalizedListEntry, ZoroError> {
        let media_id = config
            .media_id
            .ok_or_else(|| ZoroError::config("single fetch requires a mediaId"))?;

        let resp: GraphQLResponse<MediaListData> = self
            .graphql_raw(
                "MediaList",
                &query::single_query(config.layout),
                serde_json::json!({
                    "userName": config.username,
                    "mediaId": media_id,
                    "type": config.media_kind.as_str(),
                }),
            )
            .await?;

        // "Not Found" here means the user has no entry for this media;
        // fall back to the bare media record.
        let not_found = resp
            .errors
            .as_deref()
            .is_some_and(|errors| errors.iter().any(|e| e.status == Some(404)));
        if not_found {
            return self.fetch_untracked(config, media_id).await;
        }

        match Self::take_data(resp)?.media_list {
            Some(entry) => Ok(entry.into_normalized(config.media_kind)),
            None => self.fetch_untracked(config, media_id).await,
        }
    }

    async fn fetch_stats(&self, config: &BlockConfig) -> Result<NormalizedUserStats, ZoroError> {
        let data: UserData = self
            .graphql(
                "UserStatistics",
                query::STATS_QUERY,
                serde_json::json!({ "name": config.username }),
            )
            .await?;
        Ok(data.user.into_normalized(config.media_kind))
    }

    async fn search(&self, config: &BlockConfig) -> Result<Vec<NormalizedMedia>, ZoroError> {
        let data: PageData = self
            .graphql(
                "Search",
                &query::search_query(config.layout),
                serde_json::json!({
                    "search": config.search,
                    "type": config.media_kind.as_str(),
                    "page": config.page.unwrap_or(1),
                    "perPage": config.per_page.unwrap_or(10),
                }),
            )
            .await?;

        Ok(data
            .page
            .media
            .into_iter()
            .map(|media| media.into_normalized(config.media_kind))
            .collect())
    }

    async fn update_entry(
        &self,
        media_id: u64,
        update: &EntryUpdate,
        kind: MediaKind,
    ) -> Result<NormalizedListEntry, ZoroError> {
        let mut variables = serde_json::json!({ "mediaId": media_id });
        if let Some(status) = update.status {
            variables["status"] = serde_json::json!(map_status_to_anilist(status));
        }
        if let Some(progress) = update.progress {
            variables["progress"] = serde_json::json!(progress);
        }
        if let Some(score) = update.score {
            // scoreRaw is the POINT_100 scale, same as the normalized one.
            variables["scoreRaw"] = serde_json::json!(score.round() as u32);
        }

        let data: SaveEntryData = self
            .graphql("SaveMediaListEntry", query::SAVE_ENTRY_MUTATION, variables)
            .await?;
        Ok(data.save_media_list_entry.into_normalized(kind))
    }

    async fn remove_entry(&self, media_id: u64, kind: MediaKind) -> Result<(), ZoroError> {
        // Deletion is keyed by the list-entry id, so look it up first.
        let resp: GraphQLResponse<FindEntryData> = self
            .graphql_raw(
                "FindMediaListEntry",
                query::FIND_ENTRY_QUERY,
                serde_json::json!({
                    "mediaId": media_id,
                    "type": kind.as_str(),
                }),
            )
            .await?;

        let not_found = resp
            .errors
            .as_deref()
            .is_some_and(|errors| errors.iter().any(|e| e.status == Some(404)));
        if not_found {
            return Ok(()); // not in the list, nothing to do
        }
        let entry_id = match Self::take_data(resp)?.media_list {
            Some(entry) => entry.id,
            None => return Ok(()),
        };

        let _: serde_json::Value = self
            .graphql(
                "DeleteMediaListEntry",
                query::DELETE_ENTRY_MUTATION,
                serde_json::json!({ "id": entry_id }),
            )
            .await?;
        Ok(())
    }

    async fn is_in_list(&self, media_id: u64, kind: MediaKind) -> Result<bool, ZoroError> {
        let resp: GraphQLResponse<FindEntryData> = self
            .graphql_raw(
                "FindMediaListEntry",
                query::FIND_ENTRY_QUERY,
                serde_json::json!({
                    "mediaId": media_id,
                    "type": kind.as_str(),
                }),
            )
            .await?;

        // "Not Found" is a definitive no, not a failure.
        let not_found = resp
            .errors
            .as_deref()
            .is_some_and(|errors| errors.iter().any(|e| e.status == Some(404)));
        if not_found {
            return Ok(false);
        }
        Ok(Self::take_data(resp)?.media_list.is_some())
    }

    async fn viewer_name(&self) -> Result<String, ZoroError> {
        let data: ViewerData = self
            .graphql("Viewer", query::VIEWER_QUERY, serde_json::json!({}))
            .await?;
        Ok(data.viewer.name)
    }
}
