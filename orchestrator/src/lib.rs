//! Orchestrator core: job state machine, per-job worker loop, and the
//! cascade/poison-pill/extraction pipeline each worker drives.
//!
//! This crate is the "core" named in the top-level spec — it owns none of
//! the HTTP submission API, SQL schema, or export formatters that would
//! normally sit around it; those are out-of-scope collaborators that talk
//! to this crate through `scrape_common::ports` and the `Orchestrator`'s
//! public methods.

pub mod config;
pub mod error;
pub mod memory_repo;
pub mod metrics;
pub mod orchestrator;
pub mod scraper;
pub mod worker;

pub use config::Settings;
pub use error::{OrchestratorError, WorkerError};
pub use orchestrator::{LogPage, Orchestrator};
pub use scraper::{ScrapeOutcome, Scraper};
pub use worker::{StopToken, Worker};
