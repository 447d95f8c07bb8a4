use std::time::Duration;

use async_trait::async_trait;

/// Options a caller may pass down to a fetcher. Most only matter to
/// browser-based fetchers; the lightweight HTTP fetcher ignores both.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub wait_for: Option<String>,
    pub take_screenshot: bool,
}

/// Outcome of a single fetcher attempt. Fetchers never raise — any
/// exception-equivalent is caught by the fetcher implementation itself and
/// converted into `success: false` with an `error` message (spec §4.3,
/// "Failure model").
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub success: bool,
    pub html: String,
    pub status_code: u16,
    pub error: Option<String>,
    pub response_time_ms: u64,
    pub screenshot: Option<Vec<u8>>,
}

/// A backend capable of producing HTML for a URL — lightweight HTTP,
/// headless browser, or an AI-driven agent. Fetchers are lazy-instantiated
/// and cached by name by the binary composing the registry; an
/// unavailable fetcher (missing dependency/credential) reports
/// `is_available() == false` and the registry treats it as absent rather
/// than silently skipping it mid-loop.
#[async_trait]
pub trait Fetcher: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_available(&self) -> bool {
        true
    }

    async fn fetch(&self, url: &str, timeout: Duration, options: &FetchOptions) -> FetchOutcome;
}
