//! The uniform capability set every provider adapter exposes.
//!
//! The orchestrator holds adapters as `Arc<dyn TrackerService>` keyed by
//! [`Provider`], so everything above this trait is service-agnostic.

use async_trait::async_trait;

use zoro_core::block::BlockConfig;
use zoro_core::error::ZoroError;
use zoro_core::models::{
    EntryUpdate, MediaKind, NormalizedListEntry, NormalizedMedia, NormalizedUserStats, Provider,
};

/// A unified tracking-service interface.
///
/// Read operations take the normalized [`BlockConfig`]; by the time an
/// adapter sees one, the orchestrator has already resolved the username and
/// provider defaults, so adapters only translate it into their own wire
/// format and normalize the response back.
#[async_trait]
pub trait TrackerService: Send + Sync {
    fn provider(&self) -> Provider;

    fn supports(&self, kind: MediaKind) -> bool {
        self.provider().supports(kind)
    }

    /// One user's list, optionally filtered by status.
    async fn fetch_list(&self, config: &BlockConfig) -> Result<Vec<NormalizedListEntry>, ZoroError>;

    /// One tracked entry for a specific media id. If the user has no entry
    /// for it, adapters return a default-status entry wrapping the media.
    async fn fetch_single(&self, config: &BlockConfig) -> Result<NormalizedListEntry, ZoroError>;

    /// Aggregate profile statistics.
    async fn fetch_stats(&self, config: &BlockConfig) -> Result<NormalizedUserStats, ZoroError>;

    /// Title search.
    async fn search(&self, config: &BlockConfig) -> Result<Vec<NormalizedMedia>, ZoroError>;

    /// Apply a partial update to the authenticated user's entry.
    async fn update_entry(
        &self,
        media_id: u64,
        update: &EntryUpdate,
        kind: MediaKind,
    ) -> Result<NormalizedListEntry, ZoroError>;

    /// Remove the authenticated user's entry.
    async fn remove_entry(&self, media_id: u64, kind: MediaKind) -> Result<(), ZoroError>;

    /// Whether the authenticated user tracks this media. Always asks the
    /// provider; callers must not substitute a cached list for this answer.
    async fn is_in_list(&self, media_id: u64, kind: MediaKind) -> Result<bool, ZoroError>;

    /// The authenticated user's name, via the provider's viewer endpoint.
    async fn viewer_name(&self) -> Result<String, ZoroError>;
}
