//! Drives one job to completion: pulls pending URLs in order, processes
//! each under a hard timeout, delays between requests, then retries
//! previously-failed URLs once (spec §4.2).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use scrape_common::{
    ErrorKind, JobRepository, JobSettings, LogEntry, LogLevel, ResultRepository, RuleRepository,
    UrlRepository,
};
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::Settings;
use crate::scraper::Scraper;

const MAX_END_RETRIES: u32 = 1;

/// Cooperative stop flag shared between the orchestrator and a running
/// worker. Checked at every loop iteration and delay wake (spec §5).
#[derive(Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    pub fn new() -> Self {
        StopToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Worker {
    job_id: String,
    settings: JobSettings,
    defaults: Settings,
    jobs: Arc<dyn JobRepository>,
    urls: Arc<dyn UrlRepository>,
    rules: Arc<dyn RuleRepository>,
    results: Arc<dyn ResultRepository>,
    scraper: Arc<Scraper>,
    logs: mpsc::Sender<LogEntry>,
    stop_token: StopToken,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_id: String,
        settings: JobSettings,
        defaults: Settings,
        jobs: Arc<dyn JobRepository>,
        urls: Arc<dyn UrlRepository>,
        rules: Arc<dyn RuleRepository>,
        results: Arc<dyn ResultRepository>,
        scraper: Arc<Scraper>,
        logs: mpsc::Sender<LogEntry>,
        stop_token: StopToken,
    ) -> Self {
        Worker {
            job_id,
            settings,
            defaults,
            jobs,
            urls,
            rules,
            results,
            scraper,
            logs,
            stop_token,
        }
    }

    fn url_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.url_timeout_ms.unwrap_or(self.defaults.url_timeout_ms.0.as_millis() as u64))
    }

    fn delay_range(&self) -> (u64, u64) {
        (
            self.settings.delay_min_ms.unwrap_or(self.defaults.delay_min_ms),
            self.settings.delay_max_ms.unwrap_or(self.defaults.delay_max_ms),
        )
    }

    fn cascade_config(&self) -> cascade::CascadeConfig {
        let mut config = cascade::CascadeConfig::default();
        if let Some(order) = &self.settings.cascade_order {
            config.order = order.clone();
        }
        config
    }

    async fn emit(&self, level: LogLevel, message: impl Into<String>) {
        let _ = self.logs.send(LogEntry::new(level, message)).await;
    }

    /// Main loop (spec §4.2). Runs to completion; the returned final
    /// success/failure counts are read back from the URL repository by the
    /// orchestrator rather than threaded through here.
    pub async fn run(self) {
        let rules = match self.rules.list(&self.job_id).await {
            Ok(r) => r,
            Err(e) => {
                self.emit(LogLevel::Error, format!("failed to load rules: {e}")).await;
                return;
            }
        };

        let pending_count = self.urls.count_pending(&self.job_id).await.unwrap_or(0);
        self.emit(
            LogLevel::Info,
            format!("Starting job with {pending_count} URLs to process"),
        )
        .await;

        let cascade_config = self.cascade_config();
        let (delay_min, delay_max) = self.delay_range();
        let mut failed_ids: Vec<String> = Vec::new();
        let mut processed: u64 = 0;

        while !self.stop_token.is_stopped() {
            let Ok(Some(url_record)) = self.urls.next_pending(&self.job_id).await else {
                break;
            };

            processed += 1;
            self.emit(
                LogLevel::Info,
                format!("[{processed}/{pending_count}] Fetching: {}", url_record.url),
            )
            .await;

            let _ = self.urls.mark_processing(&url_record.id).await;
            let success = self
                .process_with_timeout(&url_record.id, &url_record.url, &rules, &cascade_config, false)
                .await;

            if !success {
                failed_ids.push(url_record.id.clone());
            }

            if self.stop_token.is_stopped() {
                break;
            }

            let delay_ms = if delay_max > delay_min {
                rand::thread_rng().gen_range(delay_min..=delay_max)
            } else {
                delay_min
            };
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        if !failed_ids.is_empty() && !self.stop_token.is_stopped() {
            self.retry_failed(&failed_ids, &rules, &cascade_config).await;
        }

        let failed_count = self.urls.count_failed(&self.job_id).await.unwrap_or(0);
        let success_count = processed.saturating_sub(failed_count);
        self.emit(
            LogLevel::Info,
            format!("Job complete. {success_count}/{processed} URLs succeeded."),
        )
        .await;
    }

    async fn retry_failed(
        &self,
        failed_ids: &[String],
        rules: &[scrape_common::ExtractionRule],
        cascade_config: &cascade::CascadeConfig,
    ) {
        self.emit(LogLevel::Info, format!("Retrying {} failed URLs...", failed_ids.len())).await;
        let mut recovered = 0;

        for _ in 0..MAX_END_RETRIES {
            for url_id in failed_ids {
                if self.stop_token.is_stopped() {
                    break;
                }
                let _ = self.urls.reset_to_pending(url_id).await;
                let Ok(Some(url_record)) = self.urls.get(url_id).await else {
                    continue;
                };

                let _ = self.urls.mark_processing(&url_record.id).await;
                let success = self
                    .process_with_timeout(&url_record.id, &url_record.url, rules, cascade_config, true)
                    .await;
                if success {
                    recovered += 1;
                }

                if !self.stop_token.is_stopped() {
                    tokio::time::sleep(Duration::from_millis(2000)).await;
                }
            }
        }

        self.emit(
            LogLevel::Info,
            format!("Retry complete. Recovered {recovered}/{} URLs.", failed_ids.len()),
        )
        .await;
    }

    /// Runs `process_url` on a spawned task with a hard deadline; on
    /// expiry the task is abandoned and the URL marked `timeout` (spec §5).
    ///
    /// `is_final` marks whether this is the URL's last chance (the retry
    /// pass, or any call with no retry pass to follow): progress is only
    /// incremented on success, or on a final failure — a failure on the
    /// main pass is not counted yet since the retry pass may still recover
    /// it (spec §4.2: "progress increments are idempotent per URL attempt").
    async fn process_with_timeout(
        &self,
        url_id: &str,
        url: &str,
        rules: &[scrape_common::ExtractionRule],
        cascade_config: &cascade::CascadeConfig,
        is_final: bool,
    ) -> bool {
        let timeout = self.url_timeout();
        let scraper = self.scraper.clone();
        let url_owned = url.to_string();
        let rules_owned = rules.to_vec();
        let cascade_owned = cascade_config.clone();

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let outcome = scraper.scrape(&url_owned, &rules_owned, &cascade_owned, timeout).await;
            (outcome, started.elapsed())
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok((outcome, elapsed))) => self.finish_url(url_id, url, outcome, elapsed, is_final).await,
            Ok(Err(join_err)) => {
                warn!("worker task panicked for {}: {}", url, join_err);
                let _ = self
                    .urls
                    .mark_failed(url_id, ErrorKind::Exception, &format!("task panicked: {join_err}"))
                    .await;
                if is_final {
                    let _ = self.jobs.increment_progress(&self.job_id, false).await;
                }
                self.emit(LogLevel::Error, format!("Unexpected error processing {url}")).await;
                false
            }
            Err(_) => {
                let secs = timeout.as_secs();
                self.emit(
                    LogLevel::Warning,
                    format!("URL timed out after {secs}s, moving on"),
                )
                .await;
                let _ = self
                    .urls
                    .mark_failed(
                        url_id,
                        ErrorKind::Timeout,
                        &format!("Processing timed out after {secs} seconds"),
                    )
                    .await;
                if is_final {
                    let _ = self.jobs.increment_progress(&self.job_id, false).await;
                }
                false
            }
        }
    }

    async fn finish_url(
        &self,
        url_id: &str,
        url: &str,
        outcome: crate::scraper::ScrapeOutcome,
        elapsed: Duration,
        is_final: bool,
    ) -> bool {
        let elapsed_ms = elapsed.as_millis() as u64;
        if outcome.success {
            let _ = self
                .results
                .create(&self.job_id, url_id, outcome.data.clone(), &outcome.method)
                .await;
            let _ = self.urls.mark_completed(url_id, elapsed_ms).await;
            let _ = self.jobs.increment_progress(&self.job_id, true).await;
            self.emit(
                LogLevel::Success,
                format!("Extracted data via {} in {elapsed_ms}ms", outcome.method),
            )
            .await;
            true
        } else {
            let kind = outcome.error_kind.unwrap_or(ErrorKind::Exception);
            let message = outcome.error_message.unwrap_or_else(|| kind.as_str());
            let _ = self.urls.mark_failed(url_id, kind, &message).await;
            if is_final {
                let _ = self.jobs.increment_progress(&self.job_id, false).await;
            }
            self.emit(LogLevel::Error, format!("Failed {url}: {message}")).await;
            false
        }
    }
}
