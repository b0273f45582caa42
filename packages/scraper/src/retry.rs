//! HTTP retry helper for transient errors.
//!
//! Every request made by [`crate::Fetcher`] goes through [`send`], which
//! retries connection failures, timeouts, HTTP 429, and HTTP 5xx with
//! exponential backoff. Client errors other than 429 are permanent and
//! returned immediately.
//!
//! ```ignore
//! let response = retry::send(|| client.get(&url), 3).await?;
//! ```

use std::time::Duration;

use crate::ScrapeError;

/// Sends the request built by `build_request`, retrying transient errors up
/// to `max_retries` times (backoff 2s, 4s, 8s, ...).
///
/// The closure is called once per attempt because a
/// [`reqwest::RequestBuilder`] is consumed by `.send()`.
///
/// # Errors
///
/// Returns [`ScrapeError::Http`] for non-transient transport errors or
/// when retries are exhausted, and [`ScrapeError::Status`] for error
/// statuses.
#[allow(clippy::future_not_send)]
pub async fn send<F>(build_request: F, max_retries: u32) -> Result<reqwest::Response, ScrapeError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt: u32 = 0;

    loop {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < max_retries {
                    log::warn!("  transient error: {e}");
                    attempt += 1;
                    continue;
                }
                return Err(ScrapeError::Http(e));
            }
            Ok(response) => {
                let status = response.status();

                if is_retryable_status(status) && attempt < max_retries {
                    log::warn!("  HTTP {status} from {}", response.url());
                    attempt += 1;
                    continue;
                }

                if status.is_client_error() || status.is_server_error() {
                    return Err(ScrapeError::Status {
                        url: response.url().to_string(),
                        status,
                    });
                }

                return Ok(response);
            }
        }
    }
}

/// Backoff before the given (1-based) retry attempt.
#[must_use]
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.min(6))
}

/// Returns `true` for statuses worth retrying: 429 and all 5xx.
#[must_use]
pub fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}
