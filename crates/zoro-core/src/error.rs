use thiserror::Error;

/// The closed error taxonomy shared by every layer of the plugin core.
///
/// Adapters translate HTTP and wire-level failures into one of these kinds;
/// the orchestrator passes them through unchanged so the presentation layer
/// can decide how each kind is surfaced.
#[derive(Debug, Error)]
pub enum ZoroError {
    /// Malformed block grammar, missing required field, or an inconsistent
    /// combination. The message is shown to the user verbatim.
    #[error("config error: {message}")]
    Config {
        message: String,
        /// The offending line or link segment, when known.
        context: Option<String>,
    },

    /// Unauthenticated, refresh failed, or token rejected by the upstream.
    #[error("auth error: {0}")]
    Auth(String),

    /// The resource exists but the current credential cannot see it.
    #[error("resource is private: {0}")]
    Privacy(String),

    /// Upstream returned 429. Not retried; the queue delay absorbs it.
    #[error("rate limited by upstream")]
    RateLimit {
        /// Provider-suggested wait, seconds, when the response carried one.
        retry_after: Option<u64>,
    },

    /// Network fault or upstream 5xx. The user may retry.
    #[error("transient error: {0}")]
    Transient(String),

    /// The response arrived but did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ZoroError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: None,
        }
    }

    pub fn config_at(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Map a non-success HTTP status (plus the body text and any
    /// provider-suggested wait) into the taxonomy.
    pub fn from_status(status: u16, body: &str, retry_after: Option<u64>) -> Self {
        match status {
            401 | 403 => Self::Auth(format!("upstream rejected the request (status {status})")),
            429 => Self::RateLimit { retry_after },
            400..=499 if body.to_ascii_lowercase().contains("private") => {
                Self::Privacy("the target list or profile is private".into())
            }
            400..=499 => Self::Protocol(format!("unexpected status {status}: {body}")),
            _ => Self::Transient(format!("upstream returned status {status}")),
        }
    }

    /// True for kinds whose results must never be cached.
    pub fn skip_cache(&self) -> bool {
        matches!(self, Self::RateLimit { .. } | Self::Transient(_))
    }
}

/// The `Retry-After` delta, in seconds, from a response header map. The
/// HTTP-date form some servers send is ignored; only delta-seconds parse.
pub fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

impl From<reqwest::Error> for ZoroError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            Self::Transient(e.to_string())
        } else if e.is_decode() {
            Self::Protocol(e.to_string())
        } else {
            Self::Transient(e.to_string())
        }
    }
}

impl From<std::io::Error> for ZoroError {
    fn from(e: std::io::Error) -> Self {
        Self::Transient(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            ZoroError::from_status(401, "", None),
            ZoroError::Auth(_)
        ));
        assert!(matches!(
            ZoroError::from_status(403, "", None),
            ZoroError::Auth(_)
        ));
        assert!(matches!(
            ZoroError::from_status(404, "this list is Private", None),
            ZoroError::Privacy(_)
        ));
        assert!(matches!(
            ZoroError::from_status(404, "not found", None),
            ZoroError::Protocol(_)
        ));
        assert!(matches!(
            ZoroError::from_status(502, "", None),
            ZoroError::Transient(_)
        ));
    }

    #[test]
    fn test_rate_limit_carries_retry_after() {
        match ZoroError::from_status(429, "", Some(30)) {
            ZoroError::RateLimit { retry_after } => assert_eq!(retry_after, Some(30)),
            other => panic!("expected rate limit, got {other}"),
        }
        assert!(matches!(
            ZoroError::from_status(429, "", None),
            ZoroError::RateLimit { retry_after: None }
        ));
    }

    #[test]
    fn test_retry_after_header_parsing() {
        use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("30"));
        assert_eq!(retry_after_secs(&headers), Some(30));

        let mut dated = HeaderMap::new();
        dated.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2026 07:28:00 GMT"),
        );
        assert_eq!(retry_after_secs(&dated), None);

        assert_eq!(retry_after_secs(&HeaderMap::new()), None);
    }

    #[test]
    fn test_skip_cache() {
        assert!(ZoroError::RateLimit { retry_after: None }.skip_cache());
        assert!(ZoroError::Transient("boom".into()).skip_cache());
        assert!(!ZoroError::Auth("no".into()).skip_cache());
    }
}
