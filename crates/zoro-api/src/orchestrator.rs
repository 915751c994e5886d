//! The single entry point the rendering layer calls.
//!
//! Dispatches to the right adapter by provider, consults the cache, keeps
//! every outbound call on that provider's request queue, and passes typed
//! errors through untouched.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use crate::anilist::AniListClient;
use crate::credentials::CredentialStore;
use crate::mal::MalClient;
use crate::simkl::SimklClient;
use crate::traits::TrackerService;
use zoro_core::block::{BlockConfig, Operation};
use zoro_core::cache::{Cache, CacheScope};
use zoro_core::error::ZoroError;
use zoro_core::models::{
    EntryUpdate, FetchPayload, MediaKind, NormalizedListEntry, Provider,
};
use zoro_core::queue::RequestQueue;
use zoro_core::settings::PluginSettings;

/// Default timeout on every provider request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Orchestrator {
    adapters: HashMap<Provider, Arc<dyn TrackerService>>,
    queues: HashMap<Provider, RequestQueue>,
    cache: Arc<Cache>,
    credentials: CredentialStore,
    settings: Arc<Mutex<PluginSettings>>,
    pruner: tokio::task::JoinHandle<()>,
}

impl Orchestrator {
    /// Composition root: build the shared HTTP client, one adapter and one
    /// queue per provider, the cache, and its prune timer.
    pub fn new(settings: Arc<Mutex<PluginSettings>>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "tuned http client failed to build, requests will use reqwest defaults");
                reqwest::Client::new()
            });
        let credentials = CredentialStore::new(Arc::clone(&settings), http.clone());

        let mut adapters: HashMap<Provider, Arc<dyn TrackerService>> = HashMap::new();
        adapters.insert(
            Provider::AniList,
            Arc::new(AniListClient::new(http.clone(), credentials.clone())),
        );
        adapters.insert(
            Provider::Mal,
            Arc::new(MalClient::new(http.clone(), credentials.clone())),
        );
        adapters.insert(
            Provider::Simkl,
            Arc::new(SimklClient::new(http, credentials.clone())),
        );

        Self::assemble(settings, credentials, adapters, Arc::new(Cache::default()))
    }

    /// Wire an orchestrator from parts. Lets tests swap in stub adapters.
    pub fn assemble(
        settings: Arc<Mutex<PluginSettings>>,
        credentials: CredentialStore,
        adapters: HashMap<Provider, Arc<dyn TrackerService>>,
        cache: Arc<Cache>,
    ) -> Self {
        let queues = adapters
            .keys()
            .map(|provider| (*provider, RequestQueue::default()))
            .collect();
        let pruner = cache.spawn_pruner();
        Self {
            adapters,
            queues,
            cache,
            credentials,
            settings,
            pruner,
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    /// Jobs waiting or in flight on one provider's queue. The settings UI
    /// uses this to show sync activity.
    pub fn queue_pending(&self, provider: Provider) -> usize {
        self.queues.get(&provider).map_or(0, RequestQueue::pending)
    }

    /// Run one read operation end to end: defaulting, cache probe, auth,
    /// queued dispatch, cache fill.
    pub async fn fetch(&self, config: &BlockConfig) -> Result<Arc<FetchPayload>, ZoroError> {
        let mut config = config.clone();
        let provider = self.normalize(&mut config).await?;

        let scope = CacheScope::for_operation(config.operation);
        let key = config.cache_key();
        if !config.nocache {
            if let Some(hit) = self.cache.get(scope, &key) {
                debug!(%provider, key, "cache hit");
                return Ok(hit);
            }
        }

        self.credentials.ensure_valid(provider).await?;

        let adapter = self.adapter(provider)?;
        let operation = config.operation;
        let request_config = config.clone();
        let payload = self
            .queue(provider)?
            .submit(async move {
                match operation {
                    Operation::List => adapter
                        .fetch_list(&request_config)
                        .await
                        .map(FetchPayload::List),
                    Operation::Single => adapter
                        .fetch_single(&request_config)
                        .await
                        .map(|entry| FetchPayload::Single(Box::new(entry))),
                    Operation::Stats => adapter
                        .fetch_stats(&request_config)
                        .await
                        .map(FetchPayload::Stats),
                    Operation::Search => adapter
                        .search(&request_config)
                        .await
                        .map(FetchPayload::SearchResults),
                }
            })
            .await?;

        // A nocache fetch still refreshes the entry for everyone else.
        Ok(self.cache.put(scope, key, payload))
    }

    /// Apply a mutation, then invalidate everything the media could appear
    /// in so the next fetch recomputes it.
    pub async fn commit(
        &self,
        media_id: u64,
        update: EntryUpdate,
        provider: Provider,
        kind: MediaKind,
    ) -> Result<NormalizedListEntry, ZoroError> {
        self.require_authenticated(provider).await?;

        let adapter = self.adapter(provider)?;
        let entry = self
            .queue(provider)?
            .submit(async move { adapter.update_entry(media_id, &update, kind).await })
            .await?;

        self.cache.invalidate_media(media_id);
        Ok(entry)
    }

    /// Remove the authenticated user's entry and invalidate like a commit.
    pub async fn remove(
        &self,
        media_id: u64,
        provider: Provider,
        kind: MediaKind,
    ) -> Result<(), ZoroError> {
        self.require_authenticated(provider).await?;

        let adapter = self.adapter(provider)?;
        self.queue(provider)?
            .submit(async move { adapter.remove_entry(media_id, kind).await })
            .await?;

        self.cache.invalidate_media(media_id);
        Ok(())
    }

    /// Membership probe. Always asks the provider; the cache is best-effort
    /// and must not decide this.
    pub async fn is_in_list(
        &self,
        media_id: u64,
        provider: Provider,
        kind: MediaKind,
    ) -> Result<bool, ZoroError> {
        self.require_authenticated(provider).await?;
        let adapter = self.adapter(provider)?;
        self.queue(provider)?
            .submit(async move { adapter.is_in_list(media_id, kind).await })
            .await
    }

    /// Resolve the authenticated user's name, caching it on the credential
    /// record after the first viewer round trip.
    pub async fn whoami(&self, provider: Provider) -> Result<String, ZoroError> {
        if let Some(cached) = self.credentials.cached_username(provider) {
            return Ok(cached);
        }
        if !self.credentials.is_authenticated(provider) {
            return Err(ZoroError::Auth(format!("not authenticated with {provider}")));
        }
        self.credentials.ensure_valid(provider).await?;

        let adapter = self.adapter(provider)?;
        let name = self
            .queue(provider)?
            .submit(async move { adapter.viewer_name().await })
            .await?;
        self.credentials.cache_username(provider, &name)?;
        Ok(name)
    }

    /// Sweep the cache one last time, then stop the prune timer and the
    /// per-provider queues.
    pub fn shutdown(self) {
        self.cache.prune();
        self.pruner.abort();
        for (_, queue) in self.queues {
            queue.shutdown();
        }
    }

    // ── Internals ───────────────────────────────────────────────

    /// Fill provider/username defaults and reject unsupported combinations.
    /// Returns the resolved provider.
    async fn normalize(&self, config: &mut BlockConfig) -> Result<Provider, ZoroError> {
        let (default_provider, default_username) = {
            let settings = self.settings.lock().expect("settings lock poisoned");
            (settings.default_provider, settings.default_username.clone())
        };

        let provider = config
            .provider
            .or(default_provider)
            .unwrap_or(Provider::AniList);
        config.provider = Some(provider);

        if !provider.supports(config.media_kind) {
            return Err(ZoroError::config(format!(
                "{provider} does not track {}",
                config.media_kind.as_str()
            )));
        }

        // Username defaulting: explicit, then settings, then (only when
        // asked) the authenticated identity.
        if config.username.is_none() {
            config.username = default_username;
        }
        if config.username.is_none() && config.use_authenticated_user {
            if !self.credentials.is_authenticated(provider) {
                return Err(ZoroError::config(
                    "no username given and not authenticated",
                ));
            }
            config.username = Some(self.whoami(provider).await?);
        }

        // Search is the only operation that makes sense without a user;
        // lists, stats, and singles are all read against someone's list.
        let needs_username = !matches!(config.operation, Operation::Search);
        if needs_username && config.username.is_none() {
            if self.credentials.is_authenticated(provider) {
                config.username = Some(self.whoami(provider).await?);
            } else {
                return Err(ZoroError::config(
                    "no username: set one in the block or in settings",
                ));
            }
        }
        Ok(provider)
    }

    async fn require_authenticated(&self, provider: Provider) -> Result<(), ZoroError> {
        if !self.credentials.is_authenticated(provider) {
            return Err(ZoroError::Auth(format!(
                "mutations require authentication with {provider}"
            )));
        }
        self.credentials.ensure_valid(provider).await
    }

    fn adapter(&self, provider: Provider) -> Result<Arc<dyn TrackerService>, ZoroError> {
        self.adapters
            .get(&provider)
            .cloned()
            .ok_or_else(|| ZoroError::config(format!("no adapter wired for {provider}")))
    }

    fn queue(&self, provider: Provider) -> Result<&RequestQueue, ZoroError> {
        self.queues
            .get(&provider)
            .ok_or_else(|| ZoroError::config(format!("no queue wired for {provider}")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use zoro_core::models::{ListStatus, NormalizedMedia, NormalizedUserStats, ProviderIds};
    use zoro_core::settings::ProviderCredentials;

    /// Counts calls; serves canned data.
    struct StubService {
        fetches: AtomicU32,
        mutations: AtomicU32,
    }

    impl StubService {
        fn new() -> Self {
            Self {
                fetches: AtomicU32::new(0),
                mutations: AtomicU32::new(0),
            }
        }

        fn entry(media_id: u64) -> NormalizedListEntry {
            NormalizedListEntry {
                entry_id: Some(1),
                status: ListStatus::Current,
                progress: 3,
                score: None,
                repeat_count: 0,
                started_at: None,
                completed_at: None,
                media: NormalizedMedia {
                    id: media_id,
                    ids: ProviderIds {
                        anilist: Some(media_id),
                        ..Default::default()
                    },
                    ..Default::default()
                },
                provider: Provider::AniList,
            }
        }
    }

    #[async_trait]
    impl TrackerService for StubService {
        fn provider(&self) -> Provider {
            Provider::AniList
        }

        async fn fetch_list(
            &self,
            _config: &BlockConfig,
        ) -> Result<Vec<NormalizedListEntry>, ZoroError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Self::entry(12345)])
        }

        async fn fetch_single(
            &self,
            config: &BlockConfig,
        ) -> Result<NormalizedListEntry, ZoroError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(Self::entry(config.media_id.unwrap_or(0)))
        }

        async fn fetch_stats(
            &self,
            config: &BlockConfig,
        ) -> Result<NormalizedUserStats, ZoroError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(NormalizedUserStats {
                username: config.username.clone().unwrap_or_default(),
                ..Default::default()
            })
        }

        async fn search(&self, _config: &BlockConfig) -> Result<Vec<NormalizedMedia>, ZoroError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn update_entry(
            &self,
            media_id: u64,
            _update: &EntryUpdate,
            _kind: MediaKind,
        ) -> Result<NormalizedListEntry, ZoroError> {
            self.mutations.fetch_add(1, Ordering::SeqCst);
            Ok(Self::entry(media_id))
        }

        async fn remove_entry(&self, _media_id: u64, _kind: MediaKind) -> Result<(), ZoroError> {
            self.mutations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn is_in_list(&self, _media_id: u64, _kind: MediaKind) -> Result<bool, ZoroError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        async fn viewer_name(&self) -> Result<String, ZoroError> {
            Ok("stub-user".to_string())
        }
    }

    fn orchestrator_with_stub(
        settings: PluginSettings,
    ) -> (Orchestrator, Arc<StubService>) {
        let settings = Arc::new(Mutex::new(settings));
        let credentials =
            CredentialStore::new(Arc::clone(&settings), reqwest::Client::new());
        let stub = Arc::new(StubService::new());
        let mut adapters: HashMap<Provider, Arc<dyn TrackerService>> = HashMap::new();
        adapters.insert(Provider::AniList, stub.clone() as Arc<dyn TrackerService>);
        let orchestrator = Orchestrator::assemble(
            settings,
            credentials,
            adapters,
            Arc::new(Cache::default()),
        );
        (orchestrator, stub)
    }

    fn authed_settings() -> PluginSettings {
        let mut settings = PluginSettings::default();
        settings.default_username = Some("alice".into());
        settings.set_credentials(
            Provider::AniList,
            ProviderCredentials {
                access_token: Some("T1".into()),
                ..Default::default()
            },
        );
        settings
    }

    fn list_config() -> BlockConfig {
        BlockConfig::parse_fenced(
            "source: anilist\nmediaType: ANIME\nlistType: CURRENT\nusername: alice",
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_fetch_hits_cache() {
        let (orchestrator, stub) = orchestrator_with_stub(PluginSettings::default());
        let config = list_config();

        let first = orchestrator.fetch(&config).await.unwrap();
        let second = orchestrator.fetch(&config).await.unwrap();

        assert_eq!(stub.fetches.load(Ordering::SeqCst), 1);
        // Same in-memory snapshot.
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_commit_invalidates_cached_list() {
        let (orchestrator, stub) = orchestrator_with_stub(authed_settings());
        let config = list_config();

        orchestrator.fetch(&config).await.unwrap();
        assert_eq!(stub.fetches.load(Ordering::SeqCst), 1);

        orchestrator
            .commit(
                12345,
                EntryUpdate {
                    status: Some(ListStatus::Completed),
                    progress: Some(24),
                    score: None,
                },
                Provider::AniList,
                MediaKind::Anime,
            )
            .await
            .unwrap();
        assert_eq!(stub.mutations.load(Ordering::SeqCst), 1);

        // The list is recomputed after the mutation.
        orchestrator.fetch(&config).await.unwrap();
        assert_eq!(stub.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nocache_skips_probe_but_still_writes() {
        let (orchestrator, stub) = orchestrator_with_stub(PluginSettings::default());
        let mut config = list_config();
        config.nocache = true;

        orchestrator.fetch(&config).await.unwrap();
        orchestrator.fetch(&config).await.unwrap();
        assert_eq!(stub.fetches.load(Ordering::SeqCst), 2);

        // The nocache fetches still populated the cache for normal readers.
        config.nocache = false;
        orchestrator.fetch(&config).await.unwrap();
        assert_eq!(stub.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_username_everywhere_is_config_error() {
        let (orchestrator, _stub) = orchestrator_with_stub(PluginSettings::default());
        let config = BlockConfig::parse_inline("zoro:/stats").unwrap();

        let err = orchestrator.fetch(&config).await.unwrap_err();
        assert!(matches!(err, ZoroError::Config { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_without_any_username_is_config_error() {
        let (orchestrator, stub) = orchestrator_with_stub(PluginSettings::default());
        let config = BlockConfig::parse_inline("zoro:/anime/113415").unwrap();

        let err = orchestrator.fetch(&config).await.unwrap_err();
        assert!(matches!(err, ZoroError::Config { .. }));
        // Nothing reached the provider.
        assert_eq!(stub.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_kind_is_config_error() {
        let (orchestrator, _stub) = orchestrator_with_stub(PluginSettings::default());
        let config =
            BlockConfig::parse_fenced("source: anilist\nmediaType: MOVIE\nusername: alice")
                .unwrap();

        let err = orchestrator.fetch(&config).await.unwrap_err();
        assert!(matches!(err, ZoroError::Config { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutation_requires_auth() {
        let (orchestrator, _stub) = orchestrator_with_stub(PluginSettings::default());

        let err = orchestrator
            .commit(
                1,
                EntryUpdate::default(),
                Provider::AniList,
                MediaKind::Anime,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ZoroError::Auth(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_sweeps_expired_entries() {
        let (orchestrator, _stub) = orchestrator_with_stub(PluginSettings::default());
        let cache = Arc::clone(orchestrator.cache());
        cache.put(
            CacheScope::UserData,
            "stale".into(),
            FetchPayload::SearchResults(Vec::new()),
        );

        tokio::time::advance(zoro_core::cache::DEFAULT_TTL + Duration::from_secs(1)).await;
        orchestrator.shutdown();
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unwired_provider_is_config_error() {
        let (orchestrator, _stub) = orchestrator_with_stub(PluginSettings::default());
        let config =
            BlockConfig::parse_fenced("source: simkl\nmediaType: TV\nusername: alice").unwrap();

        let err = orchestrator.fetch(&config).await.unwrap_err();
        assert!(matches!(err, ZoroError::Config { .. }));
    }
}
