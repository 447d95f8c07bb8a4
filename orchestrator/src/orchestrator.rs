//! Job state machine: starts/stops workers, enforces the status guards
//! (spec §4.1), and keeps a capped per-job log buffer alive for a while
//! after a job finishes so a client can still page through it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use scrape_common::{
    Job, JobRepository, JobStatus, LogEntry, LogLevel, ResultRepository, RuleRepository,
    SettingsRepository, UrlRepository,
};

use crate::config::Settings;
use crate::error::OrchestratorError;
use crate::scraper::Scraper;
use crate::worker::{StopToken, Worker};

struct WorkerHandle {
    stop_token: StopToken,
}

/// Paged log read (spec §6): `logs` holds entries at or after `since_index`,
/// `current_index` is the buffer length at read time (the caller's next
/// `since_index`).
pub struct LogPage {
    pub logs: Vec<LogEntry>,
    pub total_count: usize,
    pub current_index: usize,
}

pub struct Orchestrator {
    jobs: Arc<dyn JobRepository>,
    urls: Arc<dyn UrlRepository>,
    rules: Arc<dyn RuleRepository>,
    results: Arc<dyn ResultRepository>,
    settings_repo: Arc<dyn SettingsRepository>,
    defaults: Settings,
    scraper: Arc<Scraper>,

    workers: Mutex<HashMap<String, WorkerHandle>>,
    logs: Mutex<HashMap<String, Vec<LogEntry>>>,
    cleanup_cancels: Mutex<HashMap<String, oneshot::Sender<()>>>,
    log_cap: usize,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        urls: Arc<dyn UrlRepository>,
        rules: Arc<dyn RuleRepository>,
        results: Arc<dyn ResultRepository>,
        settings_repo: Arc<dyn SettingsRepository>,
        defaults: Settings,
        scraper: Arc<Scraper>,
    ) -> Self {
        let log_cap = defaults.log_buffer_cap;
        Orchestrator {
            jobs,
            urls,
            rules,
            results,
            settings_repo,
            defaults,
            scraper,
            workers: Mutex::new(HashMap::new()),
            logs: Mutex::new(HashMap::new()),
            cleanup_cancels: Mutex::new(HashMap::new()),
            log_cap,
        }
    }

    /// Layers the runtime-mutable `scraping.*` keys from the settings
    /// repository on top of the process-wide defaults. This is the middle
    /// tier between `Settings` (fixed at process start) and a job's own
    /// `JobSettings` overrides, which are applied afterwards by the worker.
    /// Falls back to the process default for any key the repository has
    /// never had set, so a fresh deployment behaves identically to one
    /// without a settings repository at all.
    async fn effective_defaults(&self) -> Settings {
        let mut effective = self.defaults.clone();
        effective.url_timeout_ms = crate::config::EnvMsDuration(Duration::from_millis(
            self.settings_repo
                .get_int("scraping.timeout", self.defaults.url_timeout_ms.0.as_millis() as i64)
                .await
                .unwrap_or(self.defaults.url_timeout_ms.0.as_millis() as i64) as u64,
        ));
        effective.retry_count = self
            .settings_repo
            .get_int("scraping.retry_count", self.defaults.retry_count as i64)
            .await
            .unwrap_or(self.defaults.retry_count as i64) as u32;
        effective.delay_min_ms = self
            .settings_repo
            .get_int("scraping.delay_min", self.defaults.delay_min_ms as i64)
            .await
            .unwrap_or(self.defaults.delay_min_ms as i64) as u64;
        effective.delay_max_ms = self
            .settings_repo
            .get_int("scraping.delay_max", self.defaults.delay_max_ms as i64)
            .await
            .unwrap_or(self.defaults.delay_max_ms as i64) as u64;
        effective
    }

    /// Starts a job if it's `pending` or `paused` and no worker is already
    /// running for it. Spawns the worker task and returns once it has been
    /// registered; the worker itself keeps running in the background.
    pub async fn start(self: &Arc<Self>, job_id: &str) -> Result<bool, OrchestratorError> {
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;

        if !matches!(job.status, JobStatus::Pending | JobStatus::Paused) {
            return Err(OrchestratorError::InvalidTransition {
                job_id: job_id.to_string(),
                action: "start",
                status: job.status,
            });
        }

        {
            let workers = self.workers.lock().unwrap();
            if workers.contains_key(job_id) {
                return Ok(false);
            }
        }

        {
            let mut logs = self.logs.lock().unwrap();
            logs.entry(job_id.to_string()).or_default();
        }
        self.cleanup_cancels.lock().unwrap().remove(job_id);

        self.jobs.update_status(job_id, JobStatus::Running).await?;

        // progress_total is fixed at job start (spec §3, §9): set once from
        // the URL count on first start, left untouched on a resume from
        // `paused` so it keeps reflecting the original count, not whatever
        // is still pending.
        if job.progress.total == 0 {
            if let Ok(counts) = self.urls.count_by_status(job_id).await {
                let _ = self.jobs.set_progress_total(job_id, counts.total).await;
            }
        }

        let stop_token = StopToken::new();
        let (tx, rx) = mpsc::channel(256);

        let worker = Worker::new(
            job_id.to_string(),
            job.settings.clone(),
            self.effective_defaults().await,
            self.jobs.clone(),
            self.urls.clone(),
            self.rules.clone(),
            self.results.clone(),
            self.scraper.clone(),
            tx,
            stop_token.clone(),
        );

        self.workers.lock().unwrap().insert(
            job_id.to_string(),
            WorkerHandle {
                stop_token,
            },
        );

        info!("starting job {job_id}");
        let this = self.clone();
        let job_id_owned = job_id.to_string();
        tokio::spawn(this.clone().drain_logs(job_id_owned.clone(), rx));
        tokio::spawn(async move {
            worker.run().await;
            this.cleanup_worker(&job_id_owned).await;
        });

        Ok(true)
    }

    async fn drain_logs(self: Arc<Self>, job_id: String, mut rx: mpsc::Receiver<LogEntry>) {
        while let Some(entry) = rx.recv().await {
            let mut logs = self.logs.lock().unwrap();
            let buf = logs.entry(job_id.clone()).or_default();
            buf.push(entry);
            if buf.len() > self.log_cap {
                let drop = buf.len() - self.log_cap;
                buf.drain(0..drop);
            }
        }
    }

    async fn cleanup_worker(self: Arc<Self>, job_id: &str) {
        self.workers.lock().unwrap().remove(job_id);

        if let Ok(Some(job)) = self.jobs.get(job_id).await {
            if job.status == JobStatus::Running {
                if let Ok(counts) = self.urls.count_by_status(job_id).await {
                    if counts.pending == 0 && counts.processing == 0 {
                        let _ = self.jobs.update_status(job_id, JobStatus::Completed).await;
                    }
                }
            }
        }

        self.schedule_log_cleanup(job_id.to_string());
    }

    /// Evicts a job's log buffer `log_eviction_secs` after it stops running,
    /// unless the job is restarted first (in which case `start` cancels the
    /// pending eviction via `cleanup_cancels`).
    fn schedule_log_cleanup(self: &Arc<Self>, job_id: String) {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        self.cleanup_cancels.lock().unwrap().insert(job_id.clone(), cancel_tx);

        let this = self.clone();
        let delay = Duration::from_secs(self.defaults.log_eviction_secs);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    this.logs.lock().unwrap().remove(&job_id);
                    this.cleanup_cancels.lock().unwrap().remove(&job_id);
                }
                _ = cancel_rx => {}
            }
        });
    }

    pub async fn pause(&self, job_id: &str) -> Result<(), OrchestratorError> {
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;

        if job.status != JobStatus::Running {
            return Err(OrchestratorError::InvalidTransition {
                job_id: job_id.to_string(),
                action: "pause",
                status: job.status,
            });
        }

        if let Some(handle) = self.workers.lock().unwrap().get(job_id) {
            handle.stop_token.stop();
        }
        self.jobs.update_status(job_id, JobStatus::Paused).await?;
        Ok(())
    }

    pub async fn resume(self: &Arc<Self>, job_id: &str) -> Result<bool, OrchestratorError> {
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;

        if job.status != JobStatus::Paused {
            return Err(OrchestratorError::InvalidTransition {
                job_id: job_id.to_string(),
                action: "resume",
                status: job.status,
            });
        }

        self.start(job_id).await
    }

    pub async fn stop(self: &Arc<Self>, job_id: &str) -> Result<(), OrchestratorError> {
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;

        if job.status.is_terminal() {
            return Err(OrchestratorError::InvalidTransition {
                job_id: job_id.to_string(),
                action: "stop",
                status: job.status,
            });
        }

        if let Some(handle) = self.workers.lock().unwrap().get(job_id) {
            handle.stop_token.stop();
        }
        self.jobs.update_status(job_id, JobStatus::Cancelled).await?;
        self.clone().cleanup_worker(job_id).await;
        Ok(())
    }

    pub async fn status(&self, job_id: &str) -> Result<scrape_common::JobStatusView, OrchestratorError> {
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or_else(|| OrchestratorError::JobNotFound(job_id.to_string()))?;
        let url_counts = self.urls.count_by_status(job_id).await?;
        let is_running = self.workers.lock().unwrap().contains_key(job_id);

        Ok(scrape_common::JobStatusView {
            id: job.id,
            name: job.name,
            status: job.status,
            progress_current: job.progress.current,
            progress_total: url_counts.total,
            success_count: job.progress.success,
            failure_count: job.progress.failure,
            url_counts,
            is_running,
        })
    }

    pub fn logs(&self, job_id: &str, since_index: usize, level: Option<LogLevel>) -> LogPage {
        let logs = self.logs.lock().unwrap();
        let buf = logs.get(job_id).cloned().unwrap_or_default();
        let tail = buf.get(since_index..).unwrap_or(&[]);
        let filtered: Vec<LogEntry> = match level {
            Some(l) => tail.iter().filter(|e| e.level == l).cloned().collect(),
            None => tail.to_vec(),
        };

        LogPage {
            logs: filtered,
            total_count: buf.len(),
            current_index: buf.len(),
        }
    }

    pub fn running_jobs(&self) -> Vec<String> {
        self.workers.lock().unwrap().keys().cloned().collect()
    }

    pub async fn stop_all(self: &Arc<Self>) {
        let ids: Vec<String> = self.workers.lock().unwrap().keys().cloned().collect();
        for id in ids {
            if let Err(e) = self.stop(&id).await {
                error!("failed to stop job {id} during shutdown: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_repo::InMemoryStore;
    use async_trait::async_trait;
    use cascade::{CascadeEngine, FetchOptions, FetchOutcome, Fetcher, FetcherRegistry};
    use scrape_common::{JobMode, SelectorKind, UrlRecord};
    use std::time::Duration as StdDuration;

    fn test_settings() -> Settings {
        Settings {
            host: "127.0.0.1".to_string(),
            port: 0,
            url_timeout_ms: crate::config::EnvMsDuration(StdDuration::from_secs(5)),
            delay_min_ms: 1,
            delay_max_ms: 1,
            retry_count: 3,
            vision_enabled: false,
            log_eviction_secs: 1,
            log_buffer_cap: 1000,
        }
    }

    struct OkFetcher;
    #[async_trait]
    impl Fetcher for OkFetcher {
        fn name(&self) -> &'static str {
            "http"
        }
        async fn fetch(&self, _url: &str, _timeout: StdDuration, _options: &FetchOptions) -> FetchOutcome {
            FetchOutcome {
                success: true,
                html: format!("<html><body><h1>Hi</h1>{}</body></html>", "x".repeat(600)),
                status_code: 200,
                ..Default::default()
            }
        }
    }

    fn make_orchestrator(store: Arc<InMemoryStore>) -> Arc<Orchestrator> {
        let registry = FetcherRegistry::new(vec![Arc::new(OkFetcher)]);
        let cascade = Arc::new(CascadeEngine::new(registry));
        let scraper = Arc::new(Scraper::new(cascade, None, false));
        Arc::new(Orchestrator::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store,
            test_settings(),
            scraper,
        ))
    }

    #[tokio::test]
    async fn start_rejects_running_job() {
        let store = Arc::new(InMemoryStore::new());
        store.add_job(Job::new("job-1", "demo", JobMode::List));
        store.add_url(UrlRecord::new("u1", "job-1", "https://a"));
        store.add_rule(ExtractionRule {
            id: "r1".to_string(),
            job_id: "job-1".to_string(),
            field_name: "title".to_string(),
            selector_kind: SelectorKind::Css,
            selector: "h1".to_string(),
            attribute: None,
            is_list: false,
            is_required: true,
            display_order: 0,
        });

        let orch = make_orchestrator(store.clone());
        assert!(orch.start("job-1").await.unwrap());

        let err = orch.start("job-1").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn pause_requires_running_status() {
        let store = Arc::new(InMemoryStore::new());
        store.add_job(Job::new("job-1", "demo", JobMode::List));
        let orch = make_orchestrator(store);

        let err = orch.pause("job-1").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn job_completes_when_all_urls_processed() {
        let store = Arc::new(InMemoryStore::new());
        store.add_job(Job::new("job-1", "demo", JobMode::List));
        store.add_url(UrlRecord::new("u1", "job-1", "https://a"));
        store.add_rule(ExtractionRule {
            id: "r1".to_string(),
            job_id: "job-1".to_string(),
            field_name: "title".to_string(),
            selector_kind: SelectorKind::Css,
            selector: "h1".to_string(),
            attribute: None,
            is_list: false,
            is_required: true,
            display_order: 0,
        });

        let orch = make_orchestrator(store.clone());
        orch.start("job-1").await.unwrap();

        for _ in 0..50 {
            tokio::time::sleep(StdDuration::from_millis(20)).await;
            let job = JobRepository::get(store.as_ref(), "job-1").await.unwrap().unwrap();
            if job.status == JobStatus::Completed {
                break;
            }
        }

        let job = JobRepository::get(store.as_ref(), "job-1").await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn status_reports_progress_total_fixed_at_start() {
        let store = Arc::new(InMemoryStore::new());
        store.add_job(Job::new("job-1", "demo", JobMode::List));
        store.add_url(UrlRecord::new("u1", "job-1", "https://a"));
        store.add_url(UrlRecord::new("u2", "job-1", "https://b"));
        store.add_rule(ExtractionRule {
            id: "r1".to_string(),
            job_id: "job-1".to_string(),
            field_name: "title".to_string(),
            selector_kind: SelectorKind::Css,
            selector: "h1".to_string(),
            attribute: None,
            is_list: false,
            is_required: true,
            display_order: 0,
        });

        let orch = make_orchestrator(store.clone());

        let before = orch.status("job-1").await.unwrap();
        assert_eq!(before.progress_total, 2);

        orch.start("job-1").await.unwrap();

        let after_start = orch.status("job-1").await.unwrap();
        assert_eq!(after_start.progress_total, 2);

        let job = JobRepository::get(store.as_ref(), "job-1").await.unwrap().unwrap();
        assert_eq!(job.progress.total, 2);

        for _ in 0..50 {
            tokio::time::sleep(StdDuration::from_millis(20)).await;
            let job = JobRepository::get(store.as_ref(), "job-1").await.unwrap().unwrap();
            if job.status == JobStatus::Completed {
                break;
            }
        }

        // progress_total stays at the original count even once the job has
        // finished, whether read from the persisted job or the live view.
        let final_view = orch.status("job-1").await.unwrap();
        assert_eq!(final_view.progress_total, 2);
        let job = JobRepository::get(store.as_ref(), "job-1").await.unwrap().unwrap();
        assert_eq!(job.progress.total, 2);
    }
}
