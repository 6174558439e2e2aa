//! HTTP retry for transient errors.
//!
//! Every eBird and `OpenBirding` request goes through [`send_json`] so it
//! gets exponential backoff on connection failures, timeouts, HTTP 429,
//! and HTTP 5xx. Other 4xx responses are permanent.
//!
//! Retry notices from background requests go to their [`DeferredLogSender`]
//! so they stay hidden until the pipeline goes live.

use std::time::Duration;

use crate::EbirdError;
use crate::background::DeferredLogSender;

/// Retry attempts after the first request.
///
/// Backoff is 2s, 4s, 8s: 14 seconds of waiting before giving up.
const MAX_RETRIES: u32 = 3;

/// Maximum length of the response body preview included in errors.
const BODY_PREVIEW_LEN: usize = 300;

/// Sends a request and parses the response body as JSON.
///
/// `build_request` is called once per attempt because request builders
/// are consumed by `send()`. Retry notices go to `deferred` when given,
/// otherwise to the logger.
///
/// # Errors
///
/// Returns [`EbirdError`] if the request fails after all retries, the
/// server returns a non-retryable status, or the body is not JSON.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(
    build_request: F,
    deferred: Option<&DeferredLogSender>,
) -> Result<serde_json::Value, EbirdError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_inner(&build_request, deferred).await?;
    let url = redact(response.url());
    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|e| EbirdError::Decode {
        url,
        message: format!("{e} (body: {})", preview(&text)),
    })
}

#[allow(clippy::future_not_send)]
async fn send_inner<F>(
    build_request: &F,
    deferred: Option<&DeferredLogSender>,
) -> Result<reqwest::Response, EbirdError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let delay = Duration::from_secs(1u64 << attempt);
            notice(deferred, format!("  retry {attempt}/{MAX_RETRIES} in {delay:?}..."));
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < MAX_RETRIES {
                    notice(deferred, format!("  transient error: {e}"));
                    attempt += 1;
                    continue;
                }
                return Err(EbirdError::Http(e));
            }
            Ok(response) => {
                let status = response.status();
                let retryable =
                    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error();

                if retryable && attempt < MAX_RETRIES {
                    notice(
                        deferred,
                        format!("  HTTP {status} from {}", redact(response.url())),
                    );
                    attempt += 1;
                    continue;
                }

                if status.is_client_error() || status.is_server_error() {
                    return Err(EbirdError::Status {
                        url: redact(response.url()),
                        status: status.as_u16(),
                    });
                }

                return Ok(response);
            }
        }
    }
}

fn notice(deferred: Option<&DeferredLogSender>, line: String) {
    match deferred {
        Some(tx) => tx.send(line),
        None => log::warn!("{line}"),
    }
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

/// URL without its query string, which may carry credentials.
fn redact(url: &reqwest::Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

fn preview(text: &str) -> &str {
    match text.char_indices().nth(BODY_PREVIEW_LEN) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_drops_query() {
        let url = reqwest::Url::parse("https://api.ebird.org/v2/ref/hotspot/US?fmt=json&key=secret")
            .unwrap();
        assert_eq!(redact(&url), "https://api.ebird.org/v2/ref/hotspot/US");
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "é".repeat(BODY_PREVIEW_LEN + 10);
        assert_eq!(preview(&long).chars().count(), BODY_PREVIEW_LEN);
        assert_eq!(preview("short"), "short");
    }
}
