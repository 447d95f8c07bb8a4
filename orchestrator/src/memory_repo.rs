//! In-memory adapters for the five repository ports (spec §6). Intended
//! for tests and the demo binary; a real deployment swaps these for
//! concrete SQL/ORM adapters without touching the orchestrator, worker, or
//! scraper modules.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use scrape_common::{
    ErrorKind, ExtractionRule, Job, JobRepository, JobStatus, RepoError, ResultData,
    ResultRecord, ResultRepository, RuleRepository, SettingsRepository, UrlCounts, UrlRecord,
    UrlRepository, UrlStatus,
};

#[derive(Default)]
pub struct InMemoryStore {
    jobs: Mutex<HashMap<String, Job>>,
    /// URLs keyed by id, plus per-job insertion order, so `next_pending`
    /// respects the ordering guarantee in spec §5.
    urls: Mutex<HashMap<String, UrlRecord>>,
    url_order: Mutex<HashMap<String, Vec<String>>>,
    rules: Mutex<HashMap<String, Vec<ExtractionRule>>>,
    results: Mutex<Vec<ResultRecord>>,
    settings: Mutex<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_job(&self, job: Job) {
        self.jobs.lock().unwrap().insert(job.id.clone(), job);
    }

    pub fn add_url(&self, url: UrlRecord) {
        let job_id = url.job_id.clone();
        let id = url.id.clone();
        self.urls.lock().unwrap().insert(id.clone(), url);
        self.url_order.lock().unwrap().entry(job_id).or_default().push(id);
    }

    pub fn add_rule(&self, rule: ExtractionRule) {
        self.rules.lock().unwrap().entry(rule.job_id.clone()).or_default().push(rule);
    }

    pub fn results(&self) -> Vec<ResultRecord> {
        self.results.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobRepository for InMemoryStore {
    async fn get(&self, job_id: &str) -> Result<Option<Job>, RepoError> {
        Ok(self.jobs.lock().unwrap().get(job_id).cloned())
    }

    async fn update_status(&self, job_id: &str, status: JobStatus) -> Result<(), RepoError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| RepoError::NotFound(job_id.to_string()))?;
        job.status = status;
        let now = chrono::Utc::now();
        match status {
            JobStatus::Running if job.started_at.is_none() => job.started_at = Some(now),
            JobStatus::Paused => job.paused_at = Some(now),
            JobStatus::Completed | JobStatus::Cancelled | JobStatus::Failed => {
                job.completed_at = Some(now)
            }
            _ => {}
        }
        Ok(())
    }

    async fn increment_progress(&self, job_id: &str, success: bool) -> Result<(), RepoError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| RepoError::NotFound(job_id.to_string()))?;
        job.progress.current += 1;
        if success {
            job.progress.success += 1;
        } else {
            job.progress.failure += 1;
        }
        Ok(())
    }

    async fn set_progress_total(&self, job_id: &str, total: u64) -> Result<(), RepoError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| RepoError::NotFound(job_id.to_string()))?;
        job.progress.total = total;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Job>, RepoError> {
        Ok(self.jobs.lock().unwrap().values().cloned().collect())
    }

    async fn archive(&self, job_id: &str) -> Result<(), RepoError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(job_id)
            .ok_or_else(|| RepoError::NotFound(job_id.to_string()))?;
        job.status = JobStatus::Archived;
        Ok(())
    }
}

#[async_trait]
impl UrlRepository for InMemoryStore {
    async fn next_pending(&self, job_id: &str) -> Result<Option<UrlRecord>, RepoError> {
        let order = self.url_order.lock().unwrap();
        let urls = self.urls.lock().unwrap();
        let Some(ids) = order.get(job_id) else {
            return Ok(None);
        };
        Ok(ids
            .iter()
            .filter_map(|id| urls.get(id))
            .find(|u| u.status == UrlStatus::Pending)
            .cloned())
    }

    async fn mark_processing(&self, url_id: &str) -> Result<(), RepoError> {
        let mut urls = self.urls.lock().unwrap();
        let url = urls
            .get_mut(url_id)
            .ok_or_else(|| RepoError::NotFound(url_id.to_string()))?;
        url.status = UrlStatus::Processing;
        url.attempt_count += 1;
        url.last_attempt_at = Some(chrono::Utc::now());
        Ok(())
    }

    async fn mark_completed(&self, url_id: &str, processing_time_ms: u64) -> Result<(), RepoError> {
        let mut urls = self.urls.lock().unwrap();
        let url = urls
            .get_mut(url_id)
            .ok_or_else(|| RepoError::NotFound(url_id.to_string()))?;
        url.status = UrlStatus::Completed;
        url.completed_at = Some(chrono::Utc::now());
        url.processing_time_ms = Some(processing_time_ms);
        url.error_kind = None;
        url.error_message = None;
        Ok(())
    }

    async fn mark_failed(&self, url_id: &str, kind: ErrorKind, message: &str) -> Result<(), RepoError> {
        let mut urls = self.urls.lock().unwrap();
        let url = urls
            .get_mut(url_id)
            .ok_or_else(|| RepoError::NotFound(url_id.to_string()))?;
        url.status = UrlStatus::Failed;
        url.error_kind = Some(kind);
        url.error_message = Some(message.to_string());
        Ok(())
    }

    async fn reset_to_pending(&self, url_id: &str) -> Result<(), RepoError> {
        let mut urls = self.urls.lock().unwrap();
        let url = urls
            .get_mut(url_id)
            .ok_or_else(|| RepoError::NotFound(url_id.to_string()))?;
        url.status = UrlStatus::Pending;
        Ok(())
    }

    async fn count_by_status(&self, job_id: &str) -> Result<UrlCounts, RepoError> {
        let order = self.url_order.lock().unwrap();
        let urls = self.urls.lock().unwrap();
        let mut counts = UrlCounts::default();
        if let Some(ids) = order.get(job_id) {
            for id in ids {
                if let Some(u) = urls.get(id) {
                    counts.total += 1;
                    match u.status {
                        UrlStatus::Pending => counts.pending += 1,
                        UrlStatus::Processing => counts.processing += 1,
                        UrlStatus::Completed => counts.completed += 1,
                        UrlStatus::Failed => counts.failed += 1,
                        UrlStatus::Skipped => counts.skipped += 1,
                    }
                }
            }
        }
        Ok(counts)
    }

    async fn count_pending(&self, job_id: &str) -> Result<u64, RepoError> {
        Ok(self.count_by_status(job_id).await?.pending)
    }

    async fn count_failed(&self, job_id: &str) -> Result<u64, RepoError> {
        Ok(self.count_by_status(job_id).await?.failed)
    }

    async fn get(&self, url_id: &str) -> Result<Option<UrlRecord>, RepoError> {
        Ok(self.urls.lock().unwrap().get(url_id).cloned())
    }
}

#[async_trait]
impl RuleRepository for InMemoryStore {
    async fn list(&self, job_id: &str) -> Result<Vec<ExtractionRule>, RepoError> {
        let mut rules = self.rules.lock().unwrap().get(job_id).cloned().unwrap_or_default();
        rules.sort_by_key(|r| r.display_order);
        Ok(rules)
    }
}

#[async_trait]
impl ResultRepository for InMemoryStore {
    async fn create(
        &self,
        job_id: &str,
        url_id: &str,
        data: ResultData,
        method: &str,
    ) -> Result<(), RepoError> {
        self.results.lock().unwrap().push(ResultRecord {
            id: uuid::Uuid::now_v7().to_string(),
            job_id: job_id.to_string(),
            url_id: url_id.to_string(),
            data,
            method: method.to_string(),
            scraped_at: chrono::Utc::now(),
            raw_html: None,
        });
        Ok(())
    }
}

#[async_trait]
impl SettingsRepository for InMemoryStore {
    async fn get_int(&self, key: &str, default: i64) -> Result<i64, RepoError> {
        Ok(self
            .settings
            .lock()
            .unwrap()
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default))
    }

    async fn get_bool(&self, key: &str, default: bool) -> Result<bool, RepoError> {
        Ok(self
            .settings
            .lock()
            .unwrap()
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, RepoError> {
        Ok(self.settings.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RepoError> {
        self.settings.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }
}
