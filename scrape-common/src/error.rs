use thiserror::Error;

/// Shared error type for repository ports. Individual crates define their
/// own richer error enums (`CascadeError`, `OrchestratorError`, ...); this
/// one is only for the persistence seam, which this repo treats as an
/// external collaborator (spec §6).
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("repository backend error: {0}")]
    Backend(String),
}
