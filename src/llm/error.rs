//! Provider error types with retry classification.
//!
//! Transient failures (rate limits, 5xx, dropped connections) are retried inside the
//! HTTP clients; everything else surfaces to the orchestrator as one failed dispatch.

use std::time::Duration;

use super::Provider;

/// Error from a hosted model call.
#[derive(Debug, Clone)]
pub struct ProviderError {
    /// Provider that produced the error, if known
    pub provider: Option<Provider>,
    pub kind: ProviderErrorKind,
    /// HTTP status code, if applicable
    pub status_code: Option<u16>,
    pub message: String,
    /// Delay requested by the provider (`Retry-After`)
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    fn with_kind(kind: ProviderErrorKind, status_code: Option<u16>, message: String) -> Self {
        Self {
            provider: None,
            kind,
            status_code,
            message,
            retry_after: None,
        }
    }

    pub fn rate_limited(message: String, retry_after: Option<Duration>) -> Self {
        Self {
            retry_after,
            ..Self::with_kind(ProviderErrorKind::RateLimited, Some(429), message)
        }
    }

    pub fn server_error(status_code: u16, message: String) -> Self {
        Self::with_kind(ProviderErrorKind::ServerError, Some(status_code), message)
    }

    /// Bad request, rejected credentials, unknown model.
    pub fn client_error(status_code: u16, message: String) -> Self {
        Self::with_kind(ProviderErrorKind::ClientError, Some(status_code), message)
    }

    pub fn network_error(message: String) -> Self {
        Self::with_kind(ProviderErrorKind::NetworkError, None, message)
    }

    /// The response arrived but could not be decoded or carried no text.
    pub fn malformed_response(message: String) -> Self {
        Self::with_kind(ProviderErrorKind::MalformedResponse, None, message)
    }

    /// Build an error from a non-success HTTP status.
    pub fn from_status(status: u16, message: String, retry_after: Option<Duration>) -> Self {
        match classify_http_status(status) {
            ProviderErrorKind::RateLimited => Self::rate_limited(message, retry_after),
            ProviderErrorKind::ClientError => Self::client_error(status, message),
            _ => Self::server_error(status, message),
        }
    }

    /// Tag the error with the provider that raised it.
    pub fn for_provider(mut self, provider: Provider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    /// Get the suggested delay before retry.
    ///
    /// Honours `retry_after` when the provider sent one; otherwise exponential backoff
    /// from a per-kind base with a small deterministic jitter, capped at 60 seconds.
    pub fn suggested_delay(&self, attempt: u32) -> Duration {
        if let Some(retry_after) = self.retry_after {
            return retry_after;
        }

        let base_secs: u64 = match self.kind {
            ProviderErrorKind::RateLimited => 5,
            ProviderErrorKind::ServerError => 2,
            _ => 1,
        };

        let delay_secs = base_secs.saturating_mul(2u64.saturating_pow(attempt));
        let jitter_range = delay_secs / 4;
        let jitter = if jitter_range > 0 {
            (attempt as u64 * 7) % jitter_range
        } else {
            0
        };

        Duration::from_secs((delay_secs + jitter).min(60))
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = self.provider {
            write!(f, "{}: ", provider)?;
        }
        match self.status_code {
            Some(code) => write!(f, "{} (HTTP {}): {}", self.kind, code, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::malformed_response(err.to_string())
        } else {
            Self::network_error(err.to_string())
        }
    }
}

/// Classification of provider errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// 429
    RateLimited,
    /// 5xx
    ServerError,
    /// Other 4xx; permanent
    ClientError,
    /// Connection failed or timed out
    NetworkError,
    /// Undecodable body or empty completion
    MalformedResponse,
}

impl ProviderErrorKind {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderErrorKind::RateLimited
                | ProviderErrorKind::ServerError
                | ProviderErrorKind::NetworkError
        )
    }
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ProviderErrorKind::RateLimited => "Rate limited",
            ProviderErrorKind::ServerError => "Server error",
            ProviderErrorKind::ClientError => "Client error",
            ProviderErrorKind::NetworkError => "Network error",
            ProviderErrorKind::MalformedResponse => "Malformed response",
        };
        f.write_str(label)
    }
}

/// Transport-level retry policy used by the HTTP clients.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first request
    pub max_retries: u32,
    /// Total time budget across retries
    pub max_retry_duration: Duration,
    pub retry_rate_limits: bool,
    pub retry_server_errors: bool,
    pub retry_network_errors: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            max_retry_duration: Duration::from_secs(120),
            retry_rate_limits: true,
            retry_server_errors: true,
            retry_network_errors: true,
        }
    }
}

impl RetryConfig {
    /// No transport retries; each failure surfaces immediately.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn should_retry(&self, error: &ProviderError) -> bool {
        match error.kind {
            ProviderErrorKind::RateLimited => self.retry_rate_limits,
            ProviderErrorKind::ServerError => self.retry_server_errors,
            ProviderErrorKind::NetworkError => self.retry_network_errors,
            ProviderErrorKind::ClientError | ProviderErrorKind::MalformedResponse => false,
        }
    }
}

/// Map an HTTP status code onto an error kind.
pub fn classify_http_status(status: u16) -> ProviderErrorKind {
    match status {
        429 => ProviderErrorKind::RateLimited,
        400..=499 => ProviderErrorKind::ClientError,
        _ => ProviderErrorKind::ServerError,
    }
}

/// Parse a `Retry-After` header value given in whole seconds.
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ProviderErrorKind::RateLimited.is_transient());
        assert!(ProviderErrorKind::ServerError.is_transient());
        assert!(ProviderErrorKind::NetworkError.is_transient());
        assert!(!ProviderErrorKind::ClientError.is_transient());
        assert!(!ProviderErrorKind::MalformedResponse.is_transient());
    }

    #[test]
    fn test_http_status_classification() {
        assert_eq!(classify_http_status(429), ProviderErrorKind::RateLimited);
        assert_eq!(classify_http_status(500), ProviderErrorKind::ServerError);
        assert_eq!(classify_http_status(529), ProviderErrorKind::ServerError);
        assert_eq!(classify_http_status(401), ProviderErrorKind::ClientError);
        assert_eq!(classify_http_status(404), ProviderErrorKind::ClientError);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let error = ProviderError::server_error(503, "unavailable".to_string());
        assert!(error.suggested_delay(1) > error.suggested_delay(0));
        assert!(error.suggested_delay(2) > error.suggested_delay(1));
        assert!(error.suggested_delay(12).as_secs() <= 60);
    }

    #[test]
    fn test_retry_after_wins() {
        let error =
            ProviderError::rate_limited("slow down".to_string(), Some(Duration::from_secs(9)));
        assert_eq!(error.suggested_delay(0), Duration::from_secs(9));
        assert_eq!(error.suggested_delay(4), Duration::from_secs(9));
        assert_eq!(parse_retry_after(Some(" 12 ")), Some(Duration::from_secs(12)));
        assert_eq!(parse_retry_after(Some("Wed, 21 Oct 2015")), None);
    }

    #[test]
    fn test_display_names_provider() {
        let error = ProviderError::client_error(401, "bad key".to_string())
            .for_provider(Provider::Anthropic);
        assert_eq!(error.to_string(), "anthropic: Client error (HTTP 401): bad key");
        assert!(!RetryConfig::default().should_retry(&error));
    }
}
