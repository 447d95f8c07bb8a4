use thiserror::Error;

use scrape_common::RepoError;

/// Errors that can abort an in-flight URL's processing outright, as
/// distinct from a normal `ErrorKind`-tagged failure recorded on the URL
/// (spec §7: only worker-thread crashes, not routine URL failures, reach
/// here).
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("repository error: {0}")]
    Repo(#[from] RepoError),
    #[error("job {0} has no rows to process")]
    JobNotFound(String),
}

/// Errors surfaced by the orchestrator's public API (start/pause/resume/
/// stop). These represent state-machine guard violations, never routine
/// scraping failures.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("job {0} not found")]
    JobNotFound(String),
    #[error("job {job_id} cannot {action} from status {status:?}")]
    InvalidTransition {
        job_id: String,
        action: &'static str,
        status: scrape_common::JobStatus,
    },
    #[error("repository error: {0}")]
    Repo(#[from] RepoError),
}
