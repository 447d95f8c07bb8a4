//! Shared domain model and repository port traits used across the
//! scraping orchestrator workspace.

pub mod error;
pub mod model;
pub mod ports;

pub use error::RepoError;
pub use model::*;
pub use ports::{JobRepository, ResultRepository, RuleRepository, SettingsRepository, UrlRepository};
