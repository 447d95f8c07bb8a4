use std::collections::HashSet;

/// Conditions under which the cascade engine advances to the next fetcher,
/// either after a post-success check or after an outright failure (spec
/// §4.3).
#[derive(Debug, Clone)]
pub struct FallbackOn {
    pub status_codes: HashSet<u16>,
    pub error_patterns: Vec<String>,
    pub poison_pills: HashSet<String>,
    pub empty_content: bool,
    pub min_content_length: usize,
    pub javascript_required: bool,
}

impl Default for FallbackOn {
    fn default() -> Self {
        FallbackOn {
            status_codes: [403, 429, 503].into_iter().collect(),
            error_patterns: vec![
                "blocked".to_string(),
                "captcha".to_string(),
                "cloudflare".to_string(),
                "challenge".to_string(),
                "denied".to_string(),
            ],
            poison_pills: ["anti_bot", "rate_limited"].into_iter().map(String::from).collect(),
            empty_content: true,
            min_content_length: 500,
            javascript_required: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CascadeConfig {
    pub enabled: bool,
    pub order: Vec<String>,
    pub max_attempts: usize,
    pub fallback_on: FallbackOn,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        CascadeConfig {
            enabled: true,
            order: vec![
                "http".to_string(),
                "playwright".to_string(),
                "puppeteer".to_string(),
                "agent_browser".to_string(),
            ],
            max_attempts: 4,
            fallback_on: FallbackOn::default(),
        }
    }
}

impl CascadeConfig {
    /// `max_attempts` clamped to the length of `order`, per spec §4.3.
    pub fn effective_max_attempts(&self) -> usize {
        self.max_attempts.min(self.order.len())
    }
}
