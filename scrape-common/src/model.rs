use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a job's URL set was produced. `Crawl` is accepted as a tag but the
/// core never follows links itself (see Non-goals) — something upstream
/// of this crate must have already expanded it into URL records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    Single,
    List,
    Crawl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Cancelled,
    Failed,
    Archived,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Cancelled | JobStatus::Failed | JobStatus::Archived
        )
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Progress {
    pub current: u64,
    pub total: u64,
    pub success: u64,
    pub failure: u64,
}

/// Per-job overrides for timeouts, delays and cascade order. Falls back to
/// process-wide defaults (`orchestrator::config::Settings`) for any field
/// left `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSettings {
    pub url_timeout_ms: Option<u64>,
    pub delay_min_ms: Option<u64>,
    pub delay_max_ms: Option<u64>,
    pub use_stealth: Option<bool>,
    pub cascade_order: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub mode: JobMode,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    /// Fixed at job start; never recomputed mid-run, even by `stop` (see
    /// DESIGN.md open question 2).
    pub progress: Progress,
    pub settings: JobSettings,
}

impl Job {
    pub fn new(id: impl Into<String>, name: impl Into<String>, mode: JobMode) -> Self {
        Job {
            id: id.into(),
            name: name.into(),
            mode,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            paused_at: None,
            progress: Progress::default(),
            settings: JobSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

/// The normalised failure taxonomy at the URL level (spec §7). `Http`
/// carries the status code when the fetcher surfaced one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    ExtractionFailed,
    Exception,
    PaywallDetected,
    AntiBot,
    RateLimited,
    DeadLink,
    LoginRequired,
    Captcha,
    ContentTooShort,
    Http(u16),
}

impl ErrorKind {
    pub fn as_str(&self) -> String {
        match self {
            ErrorKind::Timeout => "timeout".to_string(),
            ErrorKind::ExtractionFailed => "extraction_failed".to_string(),
            ErrorKind::Exception => "exception".to_string(),
            ErrorKind::PaywallDetected => "paywall_detected".to_string(),
            ErrorKind::AntiBot => "anti_bot".to_string(),
            ErrorKind::RateLimited => "rate_limited".to_string(),
            ErrorKind::DeadLink => "dead_link".to_string(),
            ErrorKind::LoginRequired => "login_required".to_string(),
            ErrorKind::Captcha => "captcha".to_string(),
            ErrorKind::ContentTooShort => "content_too_short".to_string(),
            ErrorKind::Http(code) => format!("http_{code}"),
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlRecord {
    pub id: String,
    pub job_id: String,
    pub url: String,
    pub status: UrlStatus,
    pub attempt_count: u32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub processing_time_ms: Option<u64>,
}

impl UrlRecord {
    pub fn new(id: impl Into<String>, job_id: impl Into<String>, url: impl Into<String>) -> Self {
        UrlRecord {
            id: id.into(),
            job_id: job_id.into(),
            url: url.into(),
            status: UrlStatus::Pending,
            attempt_count: 0,
            last_attempt_at: None,
            completed_at: None,
            error_kind: None,
            error_message: None,
            processing_time_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    Css,
    Xpath,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRule {
    pub id: String,
    pub job_id: String,
    pub field_name: String,
    pub selector_kind: SelectorKind,
    pub selector: String,
    pub attribute: Option<String>,
    pub is_list: bool,
    pub is_required: bool,
    pub display_order: i32,
}

/// A rule's extracted value: either one scalar or a list, mirroring the
/// original's loosely-typed `data` dict but kept strongly typed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn len(&self) -> usize {
        match self {
            FieldValue::Scalar(_) => 1,
            FieldValue::List(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Scalar(s) => s.is_empty(),
            FieldValue::List(v) => v.is_empty(),
        }
    }
}

pub type ResultData = HashMap<String, FieldValue>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRecord {
    pub id: String,
    pub job_id: String,
    pub url_id: String,
    pub data: ResultData,
    pub method: String,
    pub scraped_at: DateTime<Utc>,
    pub raw_html: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
    Debug,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    pub data: serde_json::Value,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            data: serde_json::Value::Null,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// Counts for each `UrlStatus`, as returned by `UrlRepository::count_by_status`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UrlCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub total: u64,
}

/// The external-facing status object (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusView {
    pub id: String,
    pub name: String,
    pub status: JobStatus,
    pub progress_current: u64,
    pub progress_total: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub url_counts: UrlCounts,
    pub is_running: bool,
}
