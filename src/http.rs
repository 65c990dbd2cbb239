// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON-over-HTTP plumbing shared by the remote embedding and generation
//! providers. Retries belong to the provider clients, never to the
//! retrieval core.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Builds a client with JSON content type and the given auth header.
pub(crate) fn json_client(
    provider: &str,
    auth_header: HeaderName,
    auth_value: &str,
    timeout: Duration,
) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(
        auth_header,
        HeaderValue::from_str(auth_value)
            .with_context(|| format!("invalid {} API key", provider))?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .with_context(|| format!("failed to build {} HTTP client", provider))
}

/// POSTs `body` and decodes the JSON response, retrying rate limits,
/// server errors and transport failures up to `max_retries` times.
pub(crate) async fn post_json<B, R>(
    client: &Client,
    url: &str,
    body: &B,
    max_retries: usize,
    provider: &str,
) -> Result<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let mut attempt = 0usize;
    loop {
        match client.post(url).json(body).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    return resp
                        .json::<R>()
                        .await
                        .with_context(|| format!("failed to parse {} response", provider));
                }

                let text = resp
                    .text()
                    .await
                    .unwrap_or_else(|_| "<body unavailable>".to_string());
                if should_retry(status) && attempt < max_retries {
                    attempt += 1;
                    tracing::warn!(
                        "{} returned {}; retry {}/{}",
                        provider,
                        status,
                        attempt,
                        max_retries
                    );
                    tokio::time::sleep(retry_backoff(attempt)).await;
                    continue;
                }
                bail!("{} request failed ({}): {}", provider, status, text);
            }
            Err(err) => {
                if is_retryable_error(&err) && attempt < max_retries {
                    attempt += 1;
                    tracing::warn!("{} transport error: {}; retry {}/{}", provider, err, attempt, max_retries);
                    tokio::time::sleep(retry_backoff(attempt)).await;
                    continue;
                }
                return Err(err).with_context(|| format!("failed to call {}", provider));
            }
        }
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body() || err.is_request()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}
