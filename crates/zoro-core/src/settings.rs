//! Persisted plugin state: global preferences plus one credential record
//! per provider, stored as a single JSON blob.
//!
//! Every field carries a serde default so old blobs keep loading as the
//! schema grows; unknown fields from newer versions are dropped silently.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::block::Layout;
use crate::error::ZoroError;
use crate::models::Provider;

/// One provider's OAuth state. An empty record means Unconfigured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Absolute expiry, milliseconds since the Unix epoch.
    pub expires_at_ms: Option<i64>,
    /// Username resolved by the viewer query, cached to avoid re-asking.
    pub cached_username: Option<String>,
    /// PKCE verifier held between begin-auth and exchange (MAL only).
    pub pkce_verifier: Option<String>,
}

impl ProviderCredentials {
    pub fn has_token(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Milliseconds until expiry; negative when already expired. `None`
    /// when the provider never reported an expiry (AniList PIN tokens).
    pub fn ms_until_expiry(&self) -> Option<i64> {
        self.expires_at_ms.map(|at| at - Utc::now().timestamp_millis())
    }

    /// Expired, or expiring within the refresh margin.
    pub fn needs_refresh(&self, margin_ms: i64) -> bool {
        self.has_token() && self.ms_until_expiry().is_some_and(|left| left < margin_ms)
    }

    /// Drop all auth material, keeping the client id/secret pair.
    pub fn clear_tokens(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.expires_at_ms = None;
        self.cached_username = None;
        self.pkce_verifier = None;
    }
}

/// Global preferences plus credentials, as one persisted blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    pub default_username: Option<String>,
    pub default_provider: Option<Provider>,
    pub default_layout: Option<Layout>,
    /// Render lists as a grid instead of rows. Consumed by the renderer.
    pub grid_view: bool,
    credentials: HashMap<Provider, ProviderCredentials>,
}

impl PluginSettings {
    pub fn credentials(&self, provider: Provider) -> ProviderCredentials {
        self.credentials.get(&provider).cloned().unwrap_or_default()
    }

    /// Replace one provider's record wholesale.
    pub fn set_credentials(&mut self, provider: Provider, creds: ProviderCredentials) {
        self.credentials.insert(provider, creds);
    }

    pub fn remove_credentials(&mut self, provider: Provider) {
        self.credentials.remove(&provider);
    }

    /// Load from the settings file, tolerating a missing file (defaults)
    /// and a corrupt one (also defaults, with a warning).
    pub fn load() -> Self {
        let path = Self::settings_path();
        match std::fs::read_to_string(&path) {
            Ok(blob) => match serde_json::from_str(&blob) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "settings blob corrupt, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> Result<(), ZoroError> {
        let path = Self::settings_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let blob = serde_json::to_string_pretty(self)
            .map_err(|e| ZoroError::Protocol(format!("settings serialize failed: {e}")))?;
        std::fs::write(&path, blob)?;
        Ok(())
    }

    /// Path to the settings file (XDG on Linux, AppData on Windows).
    pub fn settings_path() -> PathBuf {
        ProjectDirs::from("", "", "zoro")
            .map(|d| d.config_dir().join("settings.json"))
            .unwrap_or_else(|| PathBuf::from("settings.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_roundtrip() {
        let mut settings = PluginSettings {
            default_username: Some("alice".into()),
            default_provider: Some(Provider::AniList),
            ..Default::default()
        };
        settings.set_credentials(
            Provider::Mal,
            ProviderCredentials {
                client_id: Some("cid".into()),
                access_token: Some("T1".into()),
                expires_at_ms: Some(1_700_000_000_000),
                ..Default::default()
            },
        );

        let blob = serde_json::to_string(&settings).unwrap();
        let restored: PluginSettings = serde_json::from_str(&blob).unwrap();
        assert_eq!(restored, settings);
    }

    #[test]
    fn test_per_field_defaulting_on_old_blob() {
        // A blob from a version that only knew about a default username.
        let restored: PluginSettings =
            serde_json::from_str(r#"{"default_username":"bob"}"#).unwrap();
        assert_eq!(restored.default_username.as_deref(), Some("bob"));
        assert_eq!(restored.default_provider, None);
        assert!(!restored.grid_view);
        assert_eq!(restored.credentials(Provider::Simkl), ProviderCredentials::default());
    }

    #[test]
    fn test_needs_refresh_margin() {
        let soon = ProviderCredentials {
            access_token: Some("T".into()),
            expires_at_ms: Some(Utc::now().timestamp_millis() + 60_000),
            ..Default::default()
        };
        assert!(soon.needs_refresh(5 * 60 * 1000));

        let far = ProviderCredentials {
            access_token: Some("T".into()),
            expires_at_ms: Some(Utc::now().timestamp_millis() + 60 * 60 * 1000),
            ..Default::default()
        };
        assert!(!far.needs_refresh(5 * 60 * 1000));

        // No expiry reported: never proactively refreshed.
        let pinned = ProviderCredentials {
            access_token: Some("T".into()),
            ..Default::default()
        };
        assert!(!pinned.needs_refresh(5 * 60 * 1000));
    }

    #[test]
    fn test_clear_tokens_keeps_client_pair() {
        let mut creds = ProviderCredentials {
            client_id: Some("cid".into()),
            client_secret: Some("sec".into()),
            access_token: Some("T".into()),
            refresh_token: Some("R".into()),
            cached_username: Some("alice".into()),
            ..Default::default()
        };
        creds.clear_tokens();
        assert!(creds.client_id.is_some());
        assert!(creds.client_secret.is_some());
        assert!(!creds.has_token());
        assert!(creds.cached_username.is_none());
    }
}
