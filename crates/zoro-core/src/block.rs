//! The two authored grammars: fenced code blocks and inline links.
//!
//! Both produce a [`BlockConfig`], the immutable per-render request record
//! that drives query selection downstream. The canonical serialization of a
//! config doubles as its cache key, so `from_canonical_key(canonical_key(c))`
//! must reproduce `c` exactly.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ZoroError;
use crate::models::{ListStatus, MediaKind, Provider};

/// What the block asks the orchestrator to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    List,
    Single,
    Stats,
    Search,
}

impl Default for Operation {
    fn default() -> Self {
        Self::List
    }
}

impl Operation {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "list" => Some(Self::List),
            "single" => Some(Self::Single),
            "stats" => Some(Self::Stats),
            "search" => Some(Self::Search),
            _ => None,
        }
    }
}

/// Rendering hint; also selects the size of the query's field set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    Compact,
    Card,
    Full,
    Table,
}

impl Layout {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            // "minimal" survives from an older link syntax.
            "compact" | "minimal" => Some(Self::Compact),
            "card" => Some(Self::Card),
            "full" => Some(Self::Full),
            "table" => Some(Self::Table),
            _ => None,
        }
    }
}

/// A parsed, normalized render request. Immutable after parsing.
///
/// Field order is not significant: the canonical key sorts keys, so two
/// equivalent configs always map to the same cache slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(default)]
    pub media_kind: MediaKind,
    #[serde(default)]
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_status: Option<ListStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Layout>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub use_authenticated_user: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub nocache: bool,
    /// Unknown fenced-block keys, kept verbatim. No semantics.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl BlockConfig {
    /// Parse the body of a fenced `zoro` code block: one `key: value` pair
    /// per line, blank lines skipped, unknown keys preserved.
    pub fn parse_fenced(source: &str) -> Result<Self, ZoroError> {
        let mut config = BlockConfig::default();

        for line in source.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once(':').ok_or_else(|| {
                ZoroError::config_at("expected `key: value`", line)
            })?;
            let key = key.trim();
            let value = value.trim();

            match key {
                "source" => {
                    config.provider = Some(Provider::parse(value).ok_or_else(|| {
                        ZoroError::config_at("unknown source (anilist, mal, simkl)", line)
                    })?);
                }
                "mediaType" => {
                    config.media_kind = MediaKind::parse(value).ok_or_else(|| {
                        ZoroError::config_at("unknown mediaType (ANIME, MANGA, MOVIE, TV)", line)
                    })?;
                }
                "listType" => {
                    config.list_status = Some(ListStatus::parse(value).ok_or_else(|| {
                        ZoroError::config_at("unknown listType", line)
                    })?);
                }
                "type" => {
                    config.operation = Operation::parse(value).ok_or_else(|| {
                        ZoroError::config_at("unknown type (list, single, stats, search)", line)
                    })?;
                }
                "username" => config.username = Some(value.to_string()),
                "mediaId" => {
                    config.media_id = Some(value.parse().map_err(|_| {
                        ZoroError::config_at("mediaId must be an integer", line)
                    })?);
                }
                "search" => config.search = Some(value.to_string()),
                "page" => {
                    config.page = Some(value.parse().map_err(|_| {
                        ZoroError::config_at("page must be an integer", line)
                    })?);
                }
                "perPage" => {
                    config.per_page = Some(value.parse().map_err(|_| {
                        ZoroError::config_at("perPage must be an integer", line)
                    })?);
                }
                "layout" => {
                    config.layout = Some(Layout::parse(value).ok_or_else(|| {
                        ZoroError::config_at("unknown layout (compact, card, full, table)", line)
                    })?);
                }
                _ => {
                    config.extra.insert(key.to_string(), value.to_string());
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse an inline link of the form `zoro:<username>/<path>[#mods]`.
    ///
    /// `<username>` may be empty (use the default). `<path>` is `stats`,
    /// `anime/<id>`, `manga/<id>`, or an upper-cased list status. Modifiers
    /// after `#` are comma-separated layout hints plus `nocache`.
    pub fn parse_inline(link: &str) -> Result<Self, ZoroError> {
        let rest = link.strip_prefix("zoro:").ok_or_else(|| {
            ZoroError::config_at("inline link must start with `zoro:`", link)
        })?;

        let (rest, modifiers) = match rest.split_once('#') {
            Some((r, m)) => (r, Some(m)),
            None => (rest, None),
        };

        let (username, path) = rest.split_once('/').ok_or_else(|| {
            ZoroError::config_at("expected `zoro:<username>/<path>`", link)
        })?;

        let mut config = BlockConfig {
            username: (!username.is_empty()).then(|| username.to_string()),
            ..Default::default()
        };

        match path.split_once('/') {
            Some((kind, id)) => {
                config.media_kind = MediaKind::parse(kind).ok_or_else(|| {
                    ZoroError::config_at("expected `anime/<id>` or `manga/<id>`", path)
                })?;
                config.media_id = Some(id.parse().map_err(|_| {
                    ZoroError::config_at("media id must be numeric", path)
                })?);
                config.operation = Operation::Single;
            }
            None if path.eq_ignore_ascii_case("stats") => {
                config.operation = Operation::Stats;
            }
            None => {
                config.operation = Operation::List;
                config.list_status = Some(ListStatus::parse(path).ok_or_else(|| {
                    ZoroError::config_at("unknown list status in link path", path)
                })?);
            }
        }

        if let Some(modifiers) = modifiers {
            for modifier in modifiers.split(',') {
                let modifier = modifier.trim();
                if modifier.is_empty() {
                    continue;
                }
                if modifier.eq_ignore_ascii_case("nocache") {
                    config.nocache = true;
                } else if let Some(layout) = Layout::parse(modifier) {
                    config.layout = Some(layout);
                } else {
                    return Err(ZoroError::config_at("unknown link modifier", modifier));
                }
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks shared by both grammars.
    fn validate(&self) -> Result<(), ZoroError> {
        match self.operation {
            Operation::Single if self.media_id.is_none() => Err(ZoroError::config(
                "type `single` requires a numeric mediaId",
            )),
            Operation::Search if self.search.as_deref().unwrap_or("").is_empty() => Err(
                ZoroError::config("type `search` requires a `search` term"),
            ),
            _ => Ok(()),
        }
    }

    /// The deterministic cache key: JSON with top-level keys sorted.
    ///
    /// `serde_json` preserves struct field order, so the value tree is
    /// rebuilt through a `BTreeMap` to force lexicographic key order.
    pub fn canonical_key(&self) -> String {
        let value = serde_json::to_value(self).unwrap_or_default();
        let sorted: BTreeMap<String, serde_json::Value> = match value {
            serde_json::Value::Object(map) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        };
        serde_json::to_string(&sorted).unwrap_or_default()
    }

    /// The key a fetch result is cached under: the canonical key with the
    /// per-render flags cleared. `nocache` changes how one render probes the
    /// cache, not what the result is, so a nocache fetch must write to the
    /// same slot every other fetch reads.
    pub fn cache_key(&self) -> String {
        let mut keyed = self.clone();
        keyed.nocache = false;
        keyed.use_authenticated_user = false;
        keyed.canonical_key()
    }

    /// Inverse of [`canonical_key`](Self::canonical_key).
    pub fn from_canonical_key(key: &str) -> Result<Self, ZoroError> {
        serde_json::from_str(key)
            .map_err(|e| ZoroError::Protocol(format!("bad canonical key: {e}")))
    }
}
