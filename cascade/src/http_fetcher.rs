use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header;

use crate::fetcher::{FetchOptions, FetchOutcome, Fetcher};

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
];

/// Plain HTTP fetcher backed by `reqwest`. Never returns `Err`: connection
/// failures, timeouts, and non-2xx responses are all folded into
/// `FetchOutcome { success: false, .. }`, matching the cascade's
/// exception-free fetcher contract.
///
/// `reqwest::Client` is `Clone`/`Send`/`Sync` and pools connections
/// internally, so this fetcher is safe for concurrent `fetch` calls from
/// multiple workers against the same instance — the engine does not need
/// to serialise per fetcher.
pub struct ReqwestHttpFetcher {
    client: reqwest::Client,
}

impl ReqwestHttpFetcher {
    pub fn new() -> Self {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .expect("failed to construct reqwest client for http fetcher");

        ReqwestHttpFetcher { client }
    }

    fn user_agent(&self, attempt_seed: usize) -> &'static str {
        USER_AGENTS[attempt_seed % USER_AGENTS.len()]
    }
}

impl Default for ReqwestHttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for ReqwestHttpFetcher {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, url: &str, timeout: Duration, _options: &FetchOptions) -> FetchOutcome {
        let started = Instant::now();

        let parsed_url: reqwest::Url = match url.parse() {
            Ok(u) => u,
            Err(e) => {
                return FetchOutcome {
                    success: false,
                    html: String::new(),
                    status_code: 0,
                    error: Some(format!("invalid url: {e}")),
                    response_time_ms: elapsed_ms(started),
                    screenshot: None,
                }
            }
        };

        let response = self
            .client
            .get(parsed_url)
            .timeout(timeout)
            .header(header::USER_AGENT, self.user_agent(0))
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                return FetchOutcome {
                    success: false,
                    html: String::new(),
                    status_code: 0,
                    error: Some(describe_request_error(&e)),
                    response_time_ms: elapsed_ms(started),
                    screenshot: None,
                };
            }
        };

        let status_code = response.status().as_u16();
        if !response.status().is_success() {
            return FetchOutcome {
                success: false,
                html: String::new(),
                status_code,
                error: Some(format!("HTTP {status_code}")),
                response_time_ms: elapsed_ms(started),
                screenshot: None,
            };
        }

        match response.text().await {
            Ok(html) => FetchOutcome {
                success: true,
                html,
                status_code,
                error: None,
                response_time_ms: elapsed_ms(started),
                screenshot: None,
            },
            Err(e) => FetchOutcome {
                success: false,
                html: String::new(),
                status_code,
                error: Some(format!("failed to read response body: {e}")),
                response_time_ms: elapsed_ms(started),
                screenshot: None,
            },
        }
    }
}

fn describe_request_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timed out".to_string()
    } else if e.is_connect() {
        format!("connection failed: {e}")
    } else {
        e.to_string()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_rotation_is_deterministic_and_nonempty() {
        let fetcher = ReqwestHttpFetcher::new();
        assert!(!fetcher.user_agent(0).is_empty());
        assert_eq!(fetcher.user_agent(0), fetcher.user_agent(USER_AGENTS.len()));
    }

    #[tokio::test]
    async fn invalid_url_fails_without_panicking() {
        let fetcher = ReqwestHttpFetcher::new();
        let outcome = fetcher
            .fetch("not a url", Duration::from_secs(1), &FetchOptions::default())
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }
}
