use std::sync::Arc;
use std::time::Duration;

use poison_pill::Detector;

use crate::config::CascadeConfig;
use crate::fetcher::{FetchOptions, Fetcher};
use crate::predicates::{should_fallback, should_try_next};
use crate::registry::FetcherRegistry;

#[derive(Debug, Clone)]
pub struct CascadeAttempt {
    pub method: String,
    pub success: bool,
    pub status_code: u16,
    pub error: Option<String>,
    pub response_time_ms: u64,
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CascadeOutcome {
    pub html: String,
    pub method: String,
    pub status_code: u16,
    pub error: Option<String>,
    pub response_time_ms: u64,
    pub attempts: Vec<CascadeAttempt>,
}

impl CascadeOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && !self.html.is_empty()
    }
}

/// Sequences fetcher attempts per a [`CascadeConfig`], consulting the
/// poison-pill detector on successful fetches and honoring the ordering
/// and timeout-halving rules from spec §4.3.
pub struct CascadeEngine {
    registry: FetcherRegistry,
    detector: Detector,
}

impl CascadeEngine {
    pub fn new(registry: FetcherRegistry) -> Self {
        CascadeEngine {
            registry,
            detector: Detector::new(),
        }
    }

    pub fn get_available_methods(&self) -> Vec<&'static str> {
        self.registry.available_methods()
    }

    /// Exposes the underlying registry so callers (the scraper's vision
    /// fallback) can reach a specific fetcher directly, e.g. to request a
    /// screenshot from the first browser-capable one.
    pub fn fetcher_registry(&self) -> &FetcherRegistry {
        &self.registry
    }

    /// Skip the cascade and use one specific fetcher. Mirrors
    /// `force_method` in the original engine (kept for rule-testing tools
    /// that want a deterministic single-method fetch).
    pub async fn fetch_with_method(&self, method: &str, url: &str, timeout: Duration) -> CascadeOutcome {
        let Some(fetcher) = self.registry.get(method) else {
            return CascadeOutcome {
                html: String::new(),
                method: method.to_string(),
                status_code: 0,
                error: Some(format!("Fetcher '{method}' not available")),
                response_time_ms: 0,
                attempts: Vec::new(),
            };
        };

        let outcome = fetcher.fetch(url, timeout, &FetchOptions::default()).await;
        let attempt = to_attempt(method, &outcome);
        CascadeOutcome {
            html: outcome.html,
            method: method.to_string(),
            status_code: outcome.status_code,
            error: if outcome.success { None } else { outcome.error },
            response_time_ms: outcome.response_time_ms,
            attempts: vec![attempt],
        }
    }

    /// Run the full cascade algorithm (spec §4.3).
    pub async fn fetch_page(&self, url: &str, config: &CascadeConfig, timeout: Duration) -> CascadeOutcome {
        if !config.enabled {
            for method in &config.order {
                if let Some(fetcher) = self.registry.get(method) {
                    let outcome = fetcher.fetch(url, timeout, &FetchOptions::default()).await;
                    let attempt = to_attempt(method, &outcome);
                    return CascadeOutcome {
                        html: outcome.html,
                        method: method.clone(),
                        status_code: outcome.status_code,
                        error: if outcome.success { None } else { outcome.error },
                        response_time_ms: outcome.response_time_ms,
                        attempts: vec![attempt],
                    };
                }
            }
            return CascadeOutcome {
                html: String::new(),
                method: "none".to_string(),
                status_code: 0,
                error: Some("All cascade methods failed".to_string()),
                response_time_ms: 0,
                attempts: Vec::new(),
            };
        }

        let max_attempts = config.effective_max_attempts();
        let mut attempts: Vec<CascadeAttempt> = Vec::new();
        let mut total_time: u64 = 0;

        for (i, method) in config.order.iter().take(max_attempts).enumerate() {
            let Some(fetcher) = self.registry.get(method) else {
                continue;
            };

            let method_timeout = per_method_timeout(&fetcher, timeout);
            let outcome = fetcher.fetch(url, method_timeout, &FetchOptions::default()).await;
            total_time += outcome.response_time_ms;

            if outcome.success {
                let more_remain = i < max_attempts.saturating_sub(1);
                let reason = should_fallback(&outcome.html, &config.fallback_on, &self.detector);

                if reason.is_some() && more_remain {
                    let mut attempt = to_attempt(method, &outcome);
                    attempt.fallback_reason = reason;
                    attempts.push(attempt);
                    continue;
                }

                attempts.push(to_attempt(method, &outcome));
                return CascadeOutcome {
                    html: outcome.html,
                    method: method.clone(),
                    status_code: outcome.status_code,
                    error: None,
                    response_time_ms: total_time,
                    attempts,
                };
            }

            attempts.push(to_attempt(method, &outcome));
            let more_remain = i < max_attempts.saturating_sub(1);
            if should_try_next(&outcome, &config.fallback_on) && more_remain {
                continue;
            }
            break;
        }

        let last = attempts.last();
        CascadeOutcome {
            html: String::new(),
            method: last.map(|a| a.method.clone()).unwrap_or_else(|| "none".to_string()),
            status_code: last.map(|a| a.status_code).unwrap_or(0),
            error: Some(
                last.and_then(|a| a.error.clone())
                    .unwrap_or_else(|| "All cascade methods failed".to_string()),
            ),
            response_time_ms: total_time,
            attempts,
        }
    }
}

fn per_method_timeout(fetcher: &Arc<dyn Fetcher>, timeout: Duration) -> Duration {
    if fetcher.name() == "http" {
        timeout / 2
    } else {
        timeout
    }
}

fn to_attempt(method: &str, outcome: &crate::fetcher::FetchOutcome) -> CascadeAttempt {
    CascadeAttempt {
        method: method.to_string(),
        success: outcome.success,
        status_code: outcome.status_code,
        error: outcome.error.clone(),
        response_time_ms: outcome.response_time_ms,
        fallback_reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchOutcome;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedFetcher {
        name: &'static str,
        calls: AtomicUsize,
        outcomes: Vec<FetchOutcome>,
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(&self, _url: &str, _timeout: Duration, _options: &FetchOptions) -> FetchOutcome {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes.get(idx).cloned().unwrap_or_default()
        }
    }

    fn padded_html(body: &str) -> String {
        format!("<html><body>{body}{}</body></html>", "x".repeat(600))
    }

    #[tokio::test]
    async fn cascade_promotes_on_403() {
        let http = Arc::new(ScriptedFetcher {
            name: "http",
            calls: AtomicUsize::new(0),
            outcomes: vec![FetchOutcome {
                success: false,
                status_code: 403,
                error: Some("Access denied".to_string()),
                ..Default::default()
            }],
        });
        let playwright = Arc::new(ScriptedFetcher {
            name: "playwright",
            calls: AtomicUsize::new(0),
            outcomes: vec![FetchOutcome {
                success: true,
                html: padded_html("<h1>OK</h1>"),
                status_code: 200,
                ..Default::default()
            }],
        });

        let registry = FetcherRegistry::new(vec![http, playwright]);
        let engine = CascadeEngine::new(registry);

        let mut config = CascadeConfig::default();
        config.order = vec!["http".to_string(), "playwright".to_string()];
        config.fallback_on.javascript_required = false;

        let outcome = engine.fetch_page("https://example.com", &config, Duration::from_secs(5)).await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.method, "playwright");
        assert_eq!(outcome.attempts.len(), 2);
    }

    #[tokio::test]
    async fn unavailable_fetcher_is_skipped_without_counting_as_attempt() {
        struct Unavailable;
        #[async_trait]
        impl Fetcher for Unavailable {
            fn name(&self) -> &'static str {
                "agent_browser"
            }
            fn is_available(&self) -> bool {
                false
            }
            async fn fetch(&self, _url: &str, _timeout: Duration, _options: &FetchOptions) -> FetchOutcome {
                panic!("must not be called")
            }
        }

        let http = Arc::new(ScriptedFetcher {
            name: "http",
            calls: AtomicUsize::new(0),
            outcomes: vec![FetchOutcome {
                success: true,
                html: padded_html("<h1>OK</h1>"),
                status_code: 200,
                ..Default::default()
            }],
        });

        let registry = FetcherRegistry::new(vec![http, Arc::new(Unavailable)]);
        let engine = CascadeEngine::new(registry);

        let mut config = CascadeConfig::default();
        config.order = vec!["agent_browser".to_string(), "http".to_string()];
        config.fallback_on.javascript_required = false;

        let outcome = engine.fetch_page("https://example.com", &config, Duration::from_secs(5)).await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts.len(), 1);
        assert_eq!(outcome.method, "http");
    }
}
