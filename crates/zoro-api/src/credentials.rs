//! Per-provider OAuth2 credential lifecycle.
//!
//! The store wraps the persisted settings blob: every token change replaces
//! the provider's whole record and is written back before the call returns.
//! AniList uses the hosted-PIN code grant (no refresh token, tokens live
//! about a year); MAL requires PKCE with S256; Simkl is a plain code grant
//! with a client secret.

use std::sync::{Arc, Mutex};

use oauth2::PkceCodeChallenge;
use serde::Deserialize;
use tracing::{info, warn};
use url::Url;

use zoro_core::error::ZoroError;
use zoro_core::models::Provider;
use zoro_core::settings::{PluginSettings, ProviderCredentials};

/// Refresh proactively when expiry is closer than this.
pub const REFRESH_MARGIN_MS: i64 = 5 * 60 * 1000;

/// The custom-protocol redirect the host registers for OAuth callbacks.
pub const REDIRECT_URI: &str = "zoro://auth/callback";

/// AniList's hosted page that displays the code for the user to paste.
const ANILIST_PIN_REDIRECT: &str = "https://anilist.co/api/v2/oauth/pin";

const ANILIST_AUTHORIZE_URL: &str = "https://anilist.co/api/v2/oauth/authorize";
const ANILIST_TOKEN_URL: &str = "https://anilist.co/api/v2/oauth/token";
const MAL_AUTHORIZE_URL: &str = "https://myanimelist.net/v1/oauth2/authorize";
const MAL_TOKEN_URL: &str = "https://myanimelist.net/v1/oauth2/token";
const SIMKL_AUTHORIZE_URL: &str = "https://simkl.com/oauth/authorize";
const SIMKL_TOKEN_URL: &str = "https://api.simkl.com/oauth/token";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    #[allow(dead_code)]
    token_type: Option<String>,
}

/// Shared credential store. Cheap to clone; all clones see the same state.
#[derive(Clone)]
pub struct CredentialStore {
    settings: Arc<Mutex<PluginSettings>>,
    http: reqwest::Client,
    token_url_override: Option<String>,
}

impl CredentialStore {
    pub fn new(settings: Arc<Mutex<PluginSettings>>, http: reqwest::Client) -> Self {
        Self {
            settings,
            http,
            token_url_override: None,
        }
    }

    /// Route every token grant to one alternate endpoint instead of the
    /// provider's own. Used to exercise the grant flows against a local
    /// server.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url_override = Some(url.into());
        self
    }

    /// Snapshot of one provider's record.
    pub fn credentials(&self, provider: Provider) -> ProviderCredentials {
        self.settings
            .lock()
            .expect("settings lock poisoned")
            .credentials(provider)
    }

    pub fn is_authenticated(&self, provider: Provider) -> bool {
        self.credentials(provider).has_token()
    }

    /// Build the consent URL, stash the PKCE verifier where needed, and
    /// hand the user off to the browser. Returns the URL so the settings UI
    /// can also show it as a copyable link.
    pub fn begin_auth(&self, provider: Provider) -> Result<String, ZoroError> {
        let mut creds = self.credentials(provider);
        let client_id = creds.client_id.clone().ok_or_else(|| {
            ZoroError::Auth(format!("set a client id for {provider} before authenticating"))
        })?;

        let url = match provider {
            Provider::AniList => format!(
                "{ANILIST_AUTHORIZE_URL}?client_id={client_id}\
                 &redirect_uri={ANILIST_PIN_REDIRECT}\
                 &response_type=code"
            ),
            Provider::Mal => {
                let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
                creds.pkce_verifier = Some(verifier.secret().clone());
                let url = format!(
                    "{MAL_AUTHORIZE_URL}?response_type=code\
                     &client_id={client_id}\
                     &code_challenge={}\
                     &code_challenge_method=S256\
                     &redirect_uri={REDIRECT_URI}",
                    challenge.as_str()
                );
                self.store(provider, creds)?;
                url
            }
            Provider::Simkl => format!(
                "{SIMKL_AUTHORIZE_URL}?response_type=code\
                 &client_id={client_id}\
                 &redirect_uri={REDIRECT_URI}"
            ),
        };

        info!(%provider, "opening authorization URL in browser");
        open::that(&url).map_err(|e| ZoroError::Auth(format!("failed to open browser: {e}")))?;
        Ok(url)
    }

    /// Pull the one-time `code` out of a protocol-callback URL
    /// (`zoro://auth/callback?code=...`).
    pub fn handle_callback(url: &str) -> Result<String, ZoroError> {
        let parsed = Url::parse(url)
            .map_err(|e| ZoroError::Auth(format!("malformed callback URL: {e}")))?;
        parsed
            .query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.to_string())
            .ok_or_else(|| ZoroError::Auth("no 'code' parameter in callback".into()))
    }

    /// Exchange the one-time code for tokens and persist them.
    pub async fn exchange(&self, provider: Provider, code: &str) -> Result<(), ZoroError> {
        let creds = self.credentials(provider);
        let client_id = creds
            .client_id
            .clone()
            .ok_or_else(|| ZoroError::Auth(format!("no client id configured for {provider}")))?;
        let client_secret = creds.client_secret.clone().unwrap_or_default();

        let mut params: Vec<(&str, String)> = vec![
            ("grant_type", "authorization_code".into()),
            ("client_id", client_id),
            ("code", code.to_string()),
        ];
        match provider {
            Provider::AniList => {
                params.push(("client_secret", client_secret));
                params.push(("redirect_uri", ANILIST_PIN_REDIRECT.into()));
            }
            Provider::Mal => {
                let verifier = creds.pkce_verifier.clone().ok_or_else(|| {
                    ZoroError::Auth("no pending authorization; run begin-auth first".into())
                })?;
                if !client_secret.is_empty() {
                    params.push(("client_secret", client_secret));
                }
                params.push(("code_verifier", verifier));
                params.push(("redirect_uri", REDIRECT_URI.into()));
            }
            Provider::Simkl => {
                params.push(("client_secret", client_secret));
                params.push(("redirect_uri", REDIRECT_URI.into()));
            }
        }

        let token = self.post_token(provider, &params).await?;

        let mut creds = self.credentials(provider);
        creds.pkce_verifier = None;
        Self::apply_token(&mut creds, token);
        self.store(provider, creds)?;
        info!(%provider, "authenticated");
        Ok(())
    }

    /// Refresh-grant round trip. Fails with an auth error when the provider
    /// has no refresh path or rejects the stored refresh token.
    pub async fn refresh(&self, provider: Provider) -> Result<(), ZoroError> {
        if provider == Provider::AniList {
            return Err(ZoroError::Auth(
                "AniList tokens cannot be refreshed; run the authorization flow again".into(),
            ));
        }

        let creds = self.credentials(provider);
        let client_id = creds
            .client_id
            .clone()
            .ok_or_else(|| ZoroError::Auth(format!("no client id configured for {provider}")))?;
        let refresh_token = creds
            .refresh_token
            .clone()
            .ok_or_else(|| ZoroError::Auth(format!("no refresh token stored for {provider}")))?;

        let mut params: Vec<(&str, String)> = vec![
            ("grant_type", "refresh_token".into()),
            ("client_id", client_id),
            ("refresh_token", refresh_token),
        ];
        if let Some(secret) = creds.client_secret.clone().filter(|s| !s.is_empty()) {
            params.push(("client_secret", secret));
        }

        let token = self.post_token(provider, &params).await?;

        let mut creds = self.credentials(provider);
        Self::apply_token(&mut creds, token);
        self.store(provider, creds)?;
        info!(%provider, "access token refreshed");
        Ok(())
    }

    /// Make sure whatever token we hold is safe to attach.
    ///
    /// No token at all passes through (public reads work unauthenticated);
    /// a token expiring within [`REFRESH_MARGIN_MS`] triggers a refresh; an
    /// already-expired token with no refresh path is an auth error so the
    /// stale token is never attached.
    pub async fn ensure_valid(&self, provider: Provider) -> Result<(), ZoroError> {
        let creds = self.credentials(provider);
        if !creds.has_token() || !creds.needs_refresh(REFRESH_MARGIN_MS) {
            return Ok(());
        }

        if creds.refresh_token.is_some() {
            self.refresh(provider).await
        } else if creds.ms_until_expiry().is_some_and(|left| left <= 0) {
            Err(ZoroError::Auth(format!(
                "{provider} access token expired; run the authorization flow again"
            )))
        } else {
            // Expiring soon but still valid, and nothing to refresh with.
            Ok(())
        }
    }

    /// Header bundle for an outbound request. Callers must have run
    /// [`ensure_valid`](Self::ensure_valid) within the same dispatch; an
    /// expired bearer is dropped here as a last line of defense.
    pub fn auth_headers(&self, provider: Provider) -> Vec<(&'static str, String)> {
        let creds = self.credentials(provider);
        let expired = creds.ms_until_expiry().is_some_and(|left| left <= 0);

        let mut headers = Vec::new();
        if creds.has_token() && !expired {
            let token = creds.access_token.as_deref().unwrap_or_default();
            headers.push(("Authorization", format!("Bearer {token}")));
        }
        match provider {
            Provider::Simkl => {
                if let Some(id) = creds.client_id {
                    headers.push(("simkl-api-key", id));
                }
            }
            Provider::Mal => {
                // Public MAL endpoints accept the client id without a user.
                if headers.is_empty() {
                    if let Some(id) = creds.client_id {
                        headers.push(("X-MAL-CLIENT-ID", id));
                    }
                }
            }
            Provider::AniList => {}
        }
        headers
    }

    /// Remember the viewer-resolved username on the credential record.
    pub fn cache_username(&self, provider: Provider, username: &str) -> Result<(), ZoroError> {
        let mut creds = self.credentials(provider);
        creds.cached_username = Some(username.to_string());
        self.store(provider, creds)
    }

    pub fn cached_username(&self, provider: Provider) -> Option<String> {
        self.credentials(provider).cached_username
    }

    /// Drop all auth material for the provider, keeping the client pair.
    pub fn logout(&self, provider: Provider) -> Result<(), ZoroError> {
        let mut creds = self.credentials(provider);
        creds.clear_tokens();
        self.store(provider, creds)?;
        info!(%provider, "logged out");
        Ok(())
    }

    pub fn update_client_pair(
        &self,
        provider: Provider,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Result<(), ZoroError> {
        let mut creds = self.credentials(provider);
        creds.client_id = client_id;
        creds.client_secret = client_secret;
        self.store(provider, creds)
    }

    // ── Internals ───────────────────────────────────────────────

    async fn post_token(
        &self,
        provider: Provider,
        params: &[(&str, String)],
    ) -> Result<TokenResponse, ZoroError> {
        let token_url = match (&self.token_url_override, provider) {
            (Some(url), _) => url.as_str(),
            (None, Provider::AniList) => ANILIST_TOKEN_URL,
            (None, Provider::Mal) => MAL_TOKEN_URL,
            (None, Provider::Simkl) => SIMKL_TOKEN_URL,
        };

        let resp = self.http.post(token_url).form(params).send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            warn!(%provider, status, "token endpoint rejected the request");
            return Err(ZoroError::Auth(format!(
                "{provider} token request failed (status {status}): {body}"
            )));
        }

        resp.json::<TokenResponse>()
            .await
            .map_err(|e| ZoroError::Protocol(format!("bad token response: {e}")))
    }

    fn apply_token(creds: &mut ProviderCredentials, token: TokenResponse) {
        creds.access_token = Some(token.access_token);
        if token.refresh_token.is_some() {
            creds.refresh_token = token.refresh_token;
        }
        creds.expires_at_ms = token.expires_in.map(|secs| {
            chrono::Utc::now().timestamp_millis() + (secs as i64) * 1000
        });
        // A fresh token invalidates whatever identity we had cached.
        creds.cached_username = None;
    }

    /// Atomic whole-record replacement, persisted before returning.
    fn store(&self, provider: Provider, creds: ProviderCredentials) -> Result<(), ZoroError> {
        let mut settings = self.settings.lock().expect("settings lock poisoned");
        settings.set_credentials(provider, creds);
        settings.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(provider: Provider, creds: ProviderCredentials) -> CredentialStore {
        let mut settings = PluginSettings::default();
        settings.set_credentials(provider, creds);
        CredentialStore::new(Arc::new(Mutex::new(settings)), reqwest::Client::new())
    }

    #[test]
    fn test_handle_callback_extracts_code() {
        let code =
            CredentialStore::handle_callback("zoro://auth/callback?code=abc123&state=x").unwrap();
        assert_eq!(code, "abc123");

        let err = CredentialStore::handle_callback("zoro://auth/callback?state=x").unwrap_err();
        assert!(matches!(err, ZoroError::Auth(_)));
    }

    #[tokio::test]
    async fn test_ensure_valid_without_token_passes() {
        let store = store_with(Provider::AniList, ProviderCredentials::default());
        store.ensure_valid(Provider::AniList).await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_valid_expired_anilist_demands_reauth() {
        let store = store_with(
            Provider::AniList,
            ProviderCredentials {
                access_token: Some("T1".into()),
                expires_at_ms: Some(chrono::Utc::now().timestamp_millis() - 1000),
                ..Default::default()
            },
        );
        let err = store.ensure_valid(Provider::AniList).await.unwrap_err();
        assert!(matches!(err, ZoroError::Auth(_)));
    }

    #[test]
    fn test_auth_headers_drop_expired_bearer() {
        let store = store_with(
            Provider::Mal,
            ProviderCredentials {
                client_id: Some("cid".into()),
                access_token: Some("stale".into()),
                expires_at_ms: Some(chrono::Utc::now().timestamp_millis() - 1000),
                ..Default::default()
            },
        );
        let headers = store.auth_headers(Provider::Mal);
        assert!(headers.iter().all(|(k, _)| *k != "Authorization"));
        assert!(headers
            .iter()
            .any(|(k, v)| *k == "X-MAL-CLIENT-ID" && v == "cid"));
    }

    #[test]
    fn test_auth_headers_simkl_carries_api_key_and_bearer() {
        let store = store_with(
            Provider::Simkl,
            ProviderCredentials {
                client_id: Some("key".into()),
                access_token: Some("T2".into()),
                ..Default::default()
            },
        );
        let headers = store.auth_headers(Provider::Simkl);
        assert!(headers
            .iter()
            .any(|(k, v)| *k == "Authorization" && v == "Bearer T2"));
        assert!(headers.iter().any(|(k, v)| *k == "simkl-api-key" && v == "key"));
    }

    #[test]
    fn test_begin_auth_requires_client_id() {
        let store = store_with(Provider::Simkl, ProviderCredentials::default());
        let err = store.begin_auth(Provider::Simkl).unwrap_err();
        assert!(matches!(err, ZoroError::Auth(_)));
    }

    /// Serve one canned HTTP response on a local port and return its URL.
    async fn spawn_token_endpoint(body: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 2048];
                let _ = stream.read(&mut buf).await;
                let resp = format!(
                    "HTTP/1.1 200 OK\r\n\
                     content-type: application/json\r\n\
                     content-length: {}\r\n\
                     connection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        format!("http://{addr}/token")
    }

    #[tokio::test]
    async fn test_refresh_replaces_token_and_expiry() {
        let token_url = spawn_token_endpoint(
            r#"{"access_token":"T2","refresh_token":"R2","expires_in":3600,"token_type":"Bearer"}"#,
        )
        .await;

        // A token expiring within the margin, with a refresh token on hand.
        let store = store_with(
            Provider::Mal,
            ProviderCredentials {
                client_id: Some("cid".into()),
                access_token: Some("T1".into()),
                refresh_token: Some("R1".into()),
                expires_at_ms: Some(chrono::Utc::now().timestamp_millis() + 60_000),
                ..Default::default()
            },
        )
        .with_token_url(token_url);

        store.ensure_valid(Provider::Mal).await.unwrap();

        let creds = store.credentials(Provider::Mal);
        assert_eq!(creds.access_token.as_deref(), Some("T2"));
        assert_eq!(creds.refresh_token.as_deref(), Some("R2"));
        // The new expiry landed roughly an hour out.
        assert!(creds.ms_until_expiry().unwrap() > 50 * 60 * 1000);

        let headers = store.auth_headers(Provider::Mal);
        assert!(headers
            .iter()
            .any(|(k, v)| *k == "Authorization" && v == "Bearer T2"));
    }
}
