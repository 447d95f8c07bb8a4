use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;

/// Process-wide configuration, loaded once at startup (spec §6: "a single
/// configuration singleton (immutable once initialised)"). Per-job
/// overrides live in `scrape_common::JobSettings` and take precedence over
/// these defaults.
#[derive(Envconfig, Clone, Debug)]
pub struct Settings {
    #[envconfig(from = "BIND_HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3401")]
    pub port: u16,

    #[envconfig(default = "30000")]
    pub url_timeout_ms: EnvMsDuration,

    #[envconfig(default = "1000")]
    pub delay_min_ms: u64,

    #[envconfig(default = "3000")]
    pub delay_max_ms: u64,

    #[envconfig(default = "3")]
    pub retry_count: u32,

    #[envconfig(default = "false")]
    pub vision_enabled: bool,

    #[envconfig(default = "300")]
    pub log_eviction_secs: u64,

    #[envconfig(default = "1000")]
    pub log_buffer_cap: usize,
}

impl Settings {
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnvMsDuration(pub Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;
        Ok(EnvMsDuration(Duration::from_millis(ms)))
    }
}
