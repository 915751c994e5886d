//! Three-scope, time-bounded response cache.
//!
//! Expiry is lazy: a reader that observes an entry past the TTL deletes it
//! and reports a miss. A periodic sweep additionally prunes everything so
//! abandoned keys do not accumulate between reads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::block::Operation;
use crate::models::FetchPayload;

/// Which partition of the cache a key lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheScope {
    UserData,
    MediaData,
    SearchResults,
}

impl CacheScope {
    pub const ALL: &[CacheScope] = &[Self::UserData, Self::MediaData, Self::SearchResults];

    /// List and stats responses embed user state; singles are per-media;
    /// searches are their own world.
    pub fn for_operation(operation: Operation) -> Self {
        match operation {
            Operation::List | Operation::Stats => Self::UserData,
            Operation::Single => Self::MediaData,
            Operation::Search => Self::SearchResults,
        }
    }
}

struct CacheEntry {
    value: Arc<FetchPayload>,
    stamp: Instant,
}

/// Default time-to-live for every scope.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Interval between background prune sweeps.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// The shared response cache. Values are immutable snapshots behind `Arc`,
/// so a reader never observes a half-written value.
pub struct Cache {
    ttl: Duration,
    scopes: Mutex<HashMap<CacheScope, HashMap<String, CacheEntry>>>,
}

impl Cache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            scopes: Mutex::new(HashMap::new()),
        }
    }

    /// Look up a key. An expired entry is removed and reported as a miss.
    pub fn get(&self, scope: CacheScope, key: &str) -> Option<Arc<FetchPayload>> {
        let mut scopes = self.scopes.lock().expect("cache lock poisoned");
        let entries = scopes.get_mut(&scope)?;
        match entries.get(key) {
            Some(entry) if entry.stamp.elapsed() <= self.ttl => Some(entry.value.clone()),
            Some(_) => {
                debug!(?scope, key, "cache entry expired");
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a value, stamped now. Replaces any previous entry wholesale and
    /// returns the shared snapshot it stored.
    pub fn put(&self, scope: CacheScope, key: String, value: FetchPayload) -> Arc<FetchPayload> {
        let value = Arc::new(value);
        let mut scopes = self.scopes.lock().expect("cache lock poisoned");
        scopes.entry(scope).or_default().insert(
            key,
            CacheEntry {
                value: Arc::clone(&value),
                stamp: Instant::now(),
            },
        );
        value
    }

    /// Invalidate after a mutation touching `media_id`: every media-data key
    /// that mentions the id, plus the whole user-data scope (any cached list
    /// may embed the media). Search results are left alone.
    pub fn invalidate_media(&self, media_id: u64) {
        let needle_mid = format!("\"mediaId\":{media_id},");
        let needle_end = format!("\"mediaId\":{media_id}}}");

        let mut scopes = self.scopes.lock().expect("cache lock poisoned");
        if let Some(entries) = scopes.get_mut(&CacheScope::MediaData) {
            entries.retain(|key, _| !key.contains(&needle_mid) && !key.contains(&needle_end));
        }
        if let Some(entries) = scopes.get_mut(&CacheScope::UserData) {
            debug!(media_id, dropped = entries.len(), "clearing user-data scope");
            entries.clear();
        }
    }

    /// Drop every entry older than the TTL across all scopes.
    pub fn prune(&self) {
        let ttl = self.ttl;
        let mut scopes = self.scopes.lock().expect("cache lock poisoned");
        for entries in scopes.values_mut() {
            entries.retain(|_, entry| entry.stamp.elapsed() <= ttl);
        }
    }

    /// Empty one scope, or all of them.
    pub fn clear(&self, scope: Option<CacheScope>) {
        let mut scopes = self.scopes.lock().expect("cache lock poisoned");
        match scope {
            Some(scope) => {
                scopes.remove(&scope);
            }
            None => scopes.clear(),
        }
    }

    pub fn len(&self) -> usize {
        let scopes = self.scopes.lock().expect("cache lock poisoned");
        scopes.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn the periodic prune sweep. Abort the handle at plugin teardown.
    pub fn spawn_pruner(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(PRUNE_INTERVAL);
            tick.tick().await; // first tick fires immediately
            loop {
                tick.tick().await;
                cache.prune();
            }
        })
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NormalizedUserStats;

    fn stats_payload(name: &str) -> FetchPayload {
        FetchPayload::Stats(NormalizedUserStats {
            username: name.to_string(),
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_within_ttl_miss_after() {
        let cache = Cache::new(Duration::from_secs(300));
        cache.put(CacheScope::UserData, "k".into(), stats_payload("alice"));

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(cache.get(CacheScope::UserData, "k").is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get(CacheScope::UserData, "k").is_none());
        // The expired entry was deleted, not just hidden.
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prune_sweeps_all_scopes() {
        let cache = Cache::new(Duration::from_secs(60));
        cache.put(CacheScope::UserData, "a".into(), stats_payload("x"));
        cache.put(CacheScope::SearchResults, "b".into(), stats_payload("y"));

        tokio::time::advance(Duration::from_secs(61)).await;
        cache.put(CacheScope::MediaData, "c".into(), stats_payload("z"));
        cache.prune();

        assert!(cache.get(CacheScope::UserData, "a").is_none());
        assert!(cache.get(CacheScope::SearchResults, "b").is_none());
        assert!(cache.get(CacheScope::MediaData, "c").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_media_targets_and_user_scope() {
        let cache = Cache::default();
        cache.put(
            CacheScope::MediaData,
            r#"{"mediaId":12345,"operation":"single"}"#.into(),
            stats_payload("m1"),
        );
        cache.put(
            CacheScope::MediaData,
            r#"{"mediaId":123456,"operation":"single"}"#.into(),
            stats_payload("m2"),
        );
        cache.put(CacheScope::UserData, "anything".into(), stats_payload("u"));
        cache.put(CacheScope::SearchResults, "s".into(), stats_payload("s"));

        cache.invalidate_media(12345);

        assert!(cache
            .get(CacheScope::MediaData, r#"{"mediaId":12345,"operation":"single"}"#)
            .is_none());
        // A longer id sharing the prefix is untouched.
        assert!(cache
            .get(CacheScope::MediaData, r#"{"mediaId":123456,"operation":"single"}"#)
            .is_some());
        assert!(cache.get(CacheScope::UserData, "anything").is_none());
        assert!(cache.get(CacheScope::SearchResults, "s").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_single_scope() {
        let cache = Cache::default();
        cache.put(CacheScope::UserData, "a".into(), stats_payload("x"));
        cache.put(CacheScope::MediaData, "b".into(), stats_payload("y"));

        cache.clear(Some(CacheScope::UserData));
        assert!(cache.get(CacheScope::UserData, "a").is_none());
        assert!(cache.get(CacheScope::MediaData, "b").is_some());

        cache.clear(None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_scope_for_operation() {
        assert_eq!(
            CacheScope::for_operation(Operation::List),
            CacheScope::UserData
        );
        assert_eq!(
            CacheScope::for_operation(Operation::Stats),
            CacheScope::UserData
        );
        assert_eq!(
            CacheScope::for_operation(Operation::Single),
            CacheScope::MediaData
        );
        assert_eq!(
            CacheScope::for_operation(Operation::Search),
            CacheScope::SearchResults
        );
    }
}
