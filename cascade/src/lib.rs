//! Cascading, fallback-aware page fetcher: tries an ordered list of
//! fetchers (plain HTTP, then progressively heavier browser/agent-driven
//! ones), promoting to the next method when the current one fails, returns
//! a blocked/paywalled/bot-challenge page, or renders a JS shell with no
//! real content.

pub mod config;
pub mod engine;
pub mod fetcher;
pub mod http_fetcher;
pub mod predicates;
pub mod registry;

pub use config::{CascadeConfig, FallbackOn};
pub use engine::{CascadeAttempt, CascadeEngine, CascadeOutcome};
pub use fetcher::{FetchOptions, FetchOutcome, Fetcher};
pub use http_fetcher::ReqwestHttpFetcher;
pub use registry::FetcherRegistry;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn default_registry_exposes_http() {
        let registry = FetcherRegistry::new(vec![Arc::new(ReqwestHttpFetcher::new())]);
        let engine = CascadeEngine::new(registry);
        assert_eq!(engine.get_available_methods(), vec!["http"]);
    }

    #[tokio::test]
    async fn cascade_fails_closed_when_all_methods_missing() {
        let registry = FetcherRegistry::new(vec![]);
        let engine = CascadeEngine::new(registry);
        let config = CascadeConfig::default();
        let outcome = engine.fetch_page("https://example.com", &config, Duration::from_secs(5)).await;
        assert!(!outcome.succeeded());
        assert!(outcome.attempts.is_empty());
    }
}
