//! Shared HTTP plumbing for the provider clients.

use std::future::Future;
use std::time::{Duration, Instant};

use super::error::{parse_retry_after, ProviderError, RetryConfig};
use super::Provider;

/// Longest slice of an error body kept in messages and logs.
const ERROR_BODY_PREVIEW: usize = 500;

/// HTTP client whose requests give up after `timeout`.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Falling back to the default HTTP client: {}", e);
            reqwest::Client::new()
        })
}

/// Send a request, decode its body as JSON, and map failures onto [`ProviderError`].
pub(super) async fn send_json<T>(
    request: reqwest::RequestBuilder,
) -> Result<T, ProviderError>
where
    T: serde::de::DeserializeOwned,
{
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            ProviderError::network_error(format!("Request timeout: {}", e))
        } else if e.is_connect() {
            ProviderError::network_error(format!("Connection failed: {}", e))
        } else {
            ProviderError::network_error(format!("Request failed: {}", e))
        }
    })?;

    let status = response.status();
    let retry_after = parse_retry_after(
        response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok()),
    );
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ProviderError::from_status(
            status.as_u16(),
            preview(&body),
            retry_after,
        ));
    }

    serde_json::from_str(&body).map_err(|e| {
        ProviderError::malformed_response(format!(
            "Failed to parse response: {}, body: {}",
            e,
            preview(&body)
        ))
    })
}

/// Run `op` until it succeeds, the error is permanent, or the retry budget runs out.
pub(super) async fn with_retry<T, F, Fut>(
    provider: Provider,
    retry: &RetryConfig,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let start = Instant::now();
    let mut attempt = 0u32;

    loop {
        let error = match op().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(
                        %provider,
                        retries = attempt,
                        elapsed = ?start.elapsed(),
                        "Request succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(error) => error.for_provider(provider),
        };

        if !retry.should_retry(&error) || attempt >= retry.max_retries {
            if attempt > 0 {
                tracing::error!(
                    %provider,
                    retries = attempt,
                    "Request failed after retries: {}",
                    error
                );
            } else {
                tracing::error!(%provider, "Request failed: {}", error);
            }
            return Err(error);
        }

        let remaining = retry.max_retry_duration.saturating_sub(start.elapsed());
        let delay = error.suggested_delay(attempt).min(remaining);
        if delay.is_zero() {
            tracing::warn!(%provider, "Retry budget exhausted: {}", error);
            return Err(error);
        }

        tracing::warn!(
            %provider,
            attempt = attempt + 1,
            kind = %error.kind,
            ?delay,
            "Transient provider failure, retrying: {}",
            error.message
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

fn preview(body: &str) -> String {
    match body.char_indices().nth(ERROR_BODY_PREVIEW) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
