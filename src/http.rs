//! Blocking JSON-over-HTTP calls with retry and exponential backoff.
//!
//! Shared by the embedding and chat-completion clients:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use reqwest::blocking::{Client, RequestBuilder};
use std::time::Duration;
use tracing::{debug, warn};

/// Build a blocking client with the given request timeout.
pub fn client(timeout_secs: u64) -> Result<Client> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Delay before retry number `attempt` (1-based).
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt.saturating_sub(1)).min(5))
}

/// Send the request produced by `build` and parse a JSON body, retrying
/// transient failures up to `max_retries` times.
///
/// `service` names the upstream in error messages (e.g. `"OpenAI"`).
pub fn post_json_with_retry<F>(service: &str, max_retries: u32, build: F) -> Result<serde_json::Value>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = backoff_delay(attempt);
            debug!(service, attempt, ?delay, "retrying request");
            std::thread::sleep(delay);
        }

        match build().send() {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json()?);
                }

                let body_text = response.text().unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    warn!(service, %status, attempt, "transient API error");
                    last_err = Some(anyhow::anyhow!(
                        "{} API error {}: {}",
                        service,
                        status,
                        body_text
                    ));
                    continue;
                }

                bail!("{} API error {}: {}", service, status, body_text);
            }
            Err(e) => {
                warn!(service, attempt, error = %e, "request failed");
                last_err = Some(anyhow::anyhow!("{} connection error: {}", service, e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", service)))
}

/// Resolve an API key from the environment variable `var`.
pub fn api_key_from_env(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => bail!("{} environment variable not set", var),
    }
}

/// `{endpoint}/openai/deployments/{deployment}/{operation}?api-version={version}`
pub fn azure_url(endpoint: &str, deployment: &str, operation: &str, version: &str) -> String {
    format!(
        "{}/openai/deployments/{}/{}?api-version={}",
        endpoint.trim_end_matches('/'),
        deployment,
        operation,
        version
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(4), Duration::from_secs(8));
        assert_eq!(backoff_delay(6), Duration::from_secs(32));
        assert_eq!(backoff_delay(20), Duration::from_secs(32));
    }

    #[test]
    fn test_missing_api_key() {
        let err = api_key_from_env("RAGCHAT_TEST_KEY_THAT_IS_NEVER_SET").unwrap_err();
        assert!(err.to_string().contains("RAGCHAT_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn test_azure_url() {
        assert_eq!(
            azure_url("https://res.openai.azure.com/", "emb", "embeddings", "2024-06-01"),
            "https://res.openai.azure.com/openai/deployments/emb/embeddings?api-version=2024-06-01"
        );
    }
}
