use async_trait::async_trait;

use crate::error::RepoError;
use crate::model::{ExtractionRule, Job, JobStatus, ResultData, UrlCounts, UrlRecord};

/// Persistence port for jobs (spec §6). Concrete SQL/ORM plumbing is out of
/// scope for this core; adapters implement this trait.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn get(&self, job_id: &str) -> Result<Option<Job>, RepoError>;
    async fn update_status(&self, job_id: &str, status: JobStatus) -> Result<(), RepoError>;
    async fn increment_progress(&self, job_id: &str, success: bool) -> Result<(), RepoError>;
    /// Fixes `progress.total` to the URL count at job start (spec §3, §9).
    /// Called once per `start`; never recomputed mid-run.
    async fn set_progress_total(&self, job_id: &str, total: u64) -> Result<(), RepoError>;
    async fn list(&self) -> Result<Vec<Job>, RepoError>;
    async fn archive(&self, job_id: &str) -> Result<(), RepoError>;
}

#[async_trait]
pub trait UrlRepository: Send + Sync {
    async fn next_pending(&self, job_id: &str) -> Result<Option<UrlRecord>, RepoError>;
    async fn mark_processing(&self, url_id: &str) -> Result<(), RepoError>;
    async fn mark_completed(&self, url_id: &str, processing_time_ms: u64) -> Result<(), RepoError>;
    async fn mark_failed(
        &self,
        url_id: &str,
        kind: crate::model::ErrorKind,
        message: &str,
    ) -> Result<(), RepoError>;
    async fn reset_to_pending(&self, url_id: &str) -> Result<(), RepoError>;
    async fn count_by_status(&self, job_id: &str) -> Result<UrlCounts, RepoError>;
    async fn count_pending(&self, job_id: &str) -> Result<u64, RepoError>;
    async fn count_failed(&self, job_id: &str) -> Result<u64, RepoError>;
    async fn get(&self, url_id: &str) -> Result<Option<UrlRecord>, RepoError>;
}

#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn list(&self, job_id: &str) -> Result<Vec<ExtractionRule>, RepoError>;
}

#[async_trait]
pub trait ResultRepository: Send + Sync {
    async fn create(
        &self,
        job_id: &str,
        url_id: &str,
        data: ResultData,
        method: &str,
    ) -> Result<(), RepoError>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get_int(&self, key: &str, default: i64) -> Result<i64, RepoError>;
    async fn get_bool(&self, key: &str, default: bool) -> Result<bool, RepoError>;
    async fn get(&self, key: &str) -> Result<Option<String>, RepoError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), RepoError>;
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::model::JobMode;

    /// A single-job mock exercising the trait's object-safety and default
    /// error path, not a full repository — `orchestrator::memory_repo`
    /// covers the real adapter.
    struct SingleJobRepo(Mutex<Option<Job>>);

    #[async_trait]
    impl JobRepository for SingleJobRepo {
        async fn get(&self, job_id: &str) -> Result<Option<Job>, RepoError> {
            Ok(self.0.lock().unwrap().clone().filter(|j| j.id == job_id))
        }

        async fn update_status(&self, job_id: &str, status: JobStatus) -> Result<(), RepoError> {
            let mut slot = self.0.lock().unwrap();
            let job = slot
                .as_mut()
                .filter(|j| j.id == job_id)
                .ok_or_else(|| RepoError::NotFound(job_id.to_string()))?;
            job.status = status;
            Ok(())
        }

        async fn increment_progress(&self, job_id: &str, success: bool) -> Result<(), RepoError> {
            let mut slot = self.0.lock().unwrap();
            let job = slot
                .as_mut()
                .filter(|j| j.id == job_id)
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
            let mut slot = self.0.lock().unwrap();
            let job = slot
                .as_mut()
                .filter(|j| j.id == job_id)
                .ok_or_else(|| RepoError::NotFound(job_id.to_string()))?;
            job.progress.total = total;
            Ok(())
        }

        async fn list(&self) -> Result<Vec<Job>, RepoError> {
            Ok(self.0.lock().unwrap().iter().cloned().collect())
        }

        async fn archive(&self, job_id: &str) -> Result<(), RepoError> {
            self.update_status(job_id, JobStatus::Archived).await
        }
    }

    #[tokio::test]
    async fn set_progress_total_is_visible_through_get() {
        let repo = SingleJobRepo(Mutex::new(Some(Job::new("job-1", "demo", JobMode::Single))));

        repo.set_progress_total("job-1", 7).await.unwrap();
        let job = repo.get("job-1").await.unwrap().unwrap();

        assert_eq!(job.progress.total, 7);
    }

    #[tokio::test]
    async fn unknown_job_id_is_not_found() {
        let repo = SingleJobRepo(Mutex::new(None));

        let err = repo.update_status("missing", JobStatus::Running).await.unwrap_err();

        assert!(matches!(err, RepoError::NotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn archive_transitions_to_archived_status() {
        let repo = SingleJobRepo(Mutex::new(Some(Job::new("job-1", "demo", JobMode::Single))));

        repo.archive("job-1").await.unwrap();
        let job = repo.get("job-1").await.unwrap().unwrap();

        assert_eq!(job.status, JobStatus::Archived);
    }
}
