//! Core domain types and infrastructure for the zoro knowledge-base plugin:
//! the block/link config grammars, the multi-scope response cache, the
//! rate-limited request queue, the error taxonomy, and persisted settings.

pub mod block;
pub mod cache;
pub mod error;
pub mod models;
pub mod queue;
pub mod settings;

pub use block::{BlockConfig, Layout, Operation};
pub use cache::{Cache, CacheScope};
pub use error::ZoroError;
pub use models::{
    EntryUpdate, FetchPayload, ListStatus, MediaKind, NormalizedListEntry, NormalizedMedia,
    NormalizedUserStats, Provider,
};
pub use queue::RequestQueue;
pub use settings::{PluginSettings, ProviderCredentials};
