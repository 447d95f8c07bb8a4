//! Classifies fetched HTML into "clean" or one of a fixed set of content
//! failure modes ("poison pills"): paywalls, anti-bot challenges, rate
//! limiting, CAPTCHAs, login walls, dead links, and too-short content.
//!
//! Pure function, no I/O. All patterns are compiled once at first use and
//! shared read-only across threads.

use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};

const MIN_CONTENT_LENGTH: usize = 500;
const MIN_WORD_COUNT: usize = 50;

/// The full taxonomy of content issues the original classifier names.
/// `RedirectLoop`, `MalformedHtml` and `GeographicBlock` have no dedicated
/// check in `Detector::detect` (the original never implemented one either)
/// but are kept here, with their recommended actions, so downstream code
/// that wants to record one of these kinds manually has a home for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoisonPillKind {
    ContentTooShort,
    PaywallDetected,
    AntiBot,
    Captcha,
    RateLimited,
    DeadLink,
    RedirectLoop,
    MalformedHtml,
    LoginRequired,
    GeographicBlock,
}

impl PoisonPillKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PoisonPillKind::ContentTooShort => "content_too_short",
            PoisonPillKind::PaywallDetected => "paywall_detected",
            PoisonPillKind::AntiBot => "anti_bot",
            PoisonPillKind::Captcha => "captcha",
            PoisonPillKind::RateLimited => "rate_limited",
            PoisonPillKind::DeadLink => "dead_link",
            PoisonPillKind::RedirectLoop => "redirect_loop",
            PoisonPillKind::MalformedHtml => "malformed_html",
            PoisonPillKind::LoginRequired => "login_required",
            PoisonPillKind::GeographicBlock => "geographic_block",
        }
    }

    fn recommended_action(self) -> &'static str {
        match self {
            PoisonPillKind::ContentTooShort => "Try with a JS-rendering fetcher",
            PoisonPillKind::PaywallDetected => "Skip or use authenticated session",
            PoisonPillKind::AntiBot => "Use a stealth-mode browser fetcher",
            PoisonPillKind::Captcha => "Manual intervention required",
            PoisonPillKind::RateLimited => "Wait and retry with longer delays",
            PoisonPillKind::DeadLink => "Mark as failed - URL no longer exists",
            PoisonPillKind::RedirectLoop => "Check URL validity",
            PoisonPillKind::MalformedHtml => "Try alternative extraction",
            PoisonPillKind::LoginRequired => "Provide authentication credentials",
            PoisonPillKind::GeographicBlock => "Use a proxy in an allowed region",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoisonPillResult {
    pub is_poison: bool,
    pub kind: Option<PoisonPillKind>,
    pub severity: Severity,
    pub message: String,
    pub recommended_action: String,
    pub retry_possible: bool,
}

impl PoisonPillResult {
    pub fn clean() -> Self {
        PoisonPillResult {
            is_poison: false,
            kind: None,
            severity: Severity::Low,
            message: String::new(),
            recommended_action: String::new(),
            retry_possible: false,
        }
    }

    fn detected(
        kind: PoisonPillKind,
        severity: Severity,
        message: impl Into<String>,
        retry_possible: bool,
    ) -> Self {
        PoisonPillResult {
            is_poison: true,
            kind: Some(kind),
            severity,
            message: message.into(),
            recommended_action: kind.recommended_action().to_string(),
            retry_possible,
        }
    }
}

struct Patterns {
    tag_strip: Regex,
    whitespace: Regex,
    paywall_text: RegexSet,
    rate_limit_text: RegexSet,
    anti_bot_text: RegexSet,
    login_text: RegexSet,
    title: Regex,
}

static PATTERNS: Lazy<Patterns> = Lazy::new(|| Patterns {
    tag_strip: Regex::new(r"<[^>]+>").unwrap(),
    whitespace: Regex::new(r"\s+").unwrap(),
    paywall_text: RegexSet::new([
        r"(?i)subscribe\s+to\s+(read|continue|access)",
        r"(?i)premium\s+content",
        r"(?i)members?\s+only",
        r"(?i)sign\s+in\s+to\s+read",
        r"(?i)this\s+article\s+is\s+for\s+subscribers",
    ])
    .unwrap(),
    rate_limit_text: RegexSet::new([
        r"(?i)rate\s*limit",
        r"(?i)too\s+many\s+requests",
        r"(?i)request\s+limit\s+exceeded",
        r"(?i)slow\s+down",
        r"(?i)try\s+again\s+(later|in\s+\d+)",
        r"(?i)temporarily\s+blocked",
        r"(?i)quota\s+exceeded",
        r"(?i)api\s+limit",
        r"(?i)throttl(ed|ing)",
    ])
    .unwrap(),
    // Mirrors config.ANTI_BOT_PATTERNS with the "rate limit" entry removed,
    // since that overlaps the rate-limit check which runs first.
    anti_bot_text: RegexSet::new([
        r"(?i)cloudflare",
        r"(?i)captcha",
        r"(?i)verify\s+you\s+are\s+human",
        r"(?i)access\s+denied",
    ])
    .unwrap(),
    login_text: RegexSet::new([
        r"(?i)please\s+(log|sign)\s*in",
        r"(?i)(log|sign)\s*in\s+to\s+(view|read|continue)",
        r"(?i)create\s+an?\s+account\s+to",
        r"(?i)members?\s+only\s+content",
    ])
    .unwrap(),
    title: Regex::new(r"(?is)<title[^>]*>([^<]+)</title>").unwrap(),
});

const PAYWALL_SELECTORS: &[&str] = &[
    "class=\"paywall\"",
    "class=\"subscriber-only\"",
    "data-paywall",
    "id=\"paywall\"",
];

const ANTI_BOT_SELECTORS: &[&str] = &["cf-browser-verification", "cf_chl_opt"];

const CAPTCHA_SELECTORS: &[&str] = &[
    "g-recaptcha",
    "h-captcha",
    "recaptcha",
    "captcha-container",
    "cf-turnstile",
];

const DEAD_LINK_SELECTORS: &[&str] = &[
    "page not found",
    "404 error",
    "404 - not found",
    "this page doesn't exist",
    "this page does not exist",
    "the page you requested",
    "article not found",
    "content not found",
    "sorry, we couldn't find",
];

/// Stateless — all regex state lives in the process-wide [`PATTERNS`]
/// bundle, compiled once on first access.
#[derive(Debug, Default, Clone, Copy)]
pub struct Detector;

impl Detector {
    pub fn new() -> Self {
        Detector
    }

    /// Run the ordered checks against `html`, returning the first match.
    /// `url` is currently unused by any check but kept in the signature to
    /// match the contract other collaborators (e.g. a future redirect-loop
    /// check keyed by URL) will need.
    pub fn detect(&self, html: &str, _url: &str) -> PoisonPillResult {
        if html.is_empty() {
            return PoisonPillResult::detected(
                PoisonPillKind::ContentTooShort,
                Severity::High,
                "Empty response",
                true,
            );
        }

        let r = self.check_content_length(html);
        if r.is_poison {
            return r;
        }

        let r = self.check_paywall(html);
        if r.is_poison {
            return r;
        }

        let r = self.check_rate_limited(html);
        if r.is_poison {
            return r;
        }

        let r = self.check_anti_bot(html);
        if r.is_poison {
            return r;
        }

        let r = self.check_captcha(html);
        if r.is_poison {
            return r;
        }

        let r = self.check_login_required(html);
        if r.is_poison {
            return r;
        }

        let r = self.check_dead_link(html);
        if r.is_poison {
            return r;
        }

        PoisonPillResult::clean()
    }

    fn check_content_length(&self, html: &str) -> PoisonPillResult {
        if html.len() < MIN_CONTENT_LENGTH {
            return PoisonPillResult::detected(
                PoisonPillKind::ContentTooShort,
                Severity::Medium,
                format!(
                    "Content length {} below minimum {MIN_CONTENT_LENGTH}",
                    html.len()
                ),
                true,
            );
        }

        let stripped = PATTERNS.tag_strip.replace_all(html, " ");
        let collapsed = PATTERNS.whitespace.replace_all(&stripped, " ");
        let word_count = collapsed.trim().split_whitespace().count();

        if word_count < MIN_WORD_COUNT {
            return PoisonPillResult::detected(
                PoisonPillKind::ContentTooShort,
                Severity::Medium,
                format!("Word count {word_count} below minimum {MIN_WORD_COUNT}"),
                true,
            );
        }

        PoisonPillResult::clean()
    }

    fn check_paywall(&self, html: &str) -> PoisonPillResult {
        if PATTERNS.paywall_text.is_match(html) {
            return PoisonPillResult::detected(
                PoisonPillKind::PaywallDetected,
                Severity::High,
                "Paywall detected - subscription required",
                false,
            );
        }

        let lower = html.to_lowercase();
        if PAYWALL_SELECTORS.iter().any(|s| lower.contains(s)) {
            return PoisonPillResult::detected(
                PoisonPillKind::PaywallDetected,
                Severity::High,
                "Paywall element detected",
                false,
            );
        }

        PoisonPillResult::clean()
    }

    fn check_rate_limited(&self, html: &str) -> PoisonPillResult {
        if PATTERNS.rate_limit_text.is_match(html) {
            return PoisonPillResult::detected(
                PoisonPillKind::RateLimited,
                Severity::High,
                "Rate limiting detected - server is throttling requests",
                true,
            );
        }

        let lower = html.to_lowercase();
        if lower.contains("status=\"429\"") || lower.contains("429 too many") {
            return PoisonPillResult::detected(
                PoisonPillKind::RateLimited,
                Severity::High,
                "HTTP 429 Too Many Requests",
                true,
            );
        }

        PoisonPillResult::clean()
    }

    fn check_anti_bot(&self, html: &str) -> PoisonPillResult {
        if PATTERNS.anti_bot_text.is_match(html) {
            return PoisonPillResult::detected(
                PoisonPillKind::AntiBot,
                Severity::High,
                "Anti-bot protection detected",
                true,
            );
        }

        let lower = html.to_lowercase();
        if ANTI_BOT_SELECTORS.iter().any(|s| lower.contains(s)) {
            return PoisonPillResult::detected(
                PoisonPillKind::AntiBot,
                Severity::Critical,
                "Cloudflare challenge page",
                true,
            );
        }

        PoisonPillResult::clean()
    }

    fn check_captcha(&self, html: &str) -> PoisonPillResult {
        let lower = html.to_lowercase();
        if CAPTCHA_SELECTORS.iter().any(|s| lower.contains(s)) {
            return PoisonPillResult::detected(
                PoisonPillKind::Captcha,
                Severity::Critical,
                "CAPTCHA challenge detected",
                false,
            );
        }

        PoisonPillResult::clean()
    }

    fn check_login_required(&self, html: &str) -> PoisonPillResult {
        if PATTERNS.login_text.is_match(html) {
            return PoisonPillResult::detected(
                PoisonPillKind::LoginRequired,
                Severity::High,
                "Login required to access content",
                false,
            );
        }

        PoisonPillResult::clean()
    }

    fn check_dead_link(&self, html: &str) -> PoisonPillResult {
        let lower = html.to_lowercase();
        if DEAD_LINK_SELECTORS.iter().any(|s| lower.contains(s)) {
            return PoisonPillResult::detected(
                PoisonPillKind::DeadLink,
                Severity::High,
                "Content appears to be removed or not found",
                false,
            );
        }

        if let Some(caps) = PATTERNS.title.captures(html) {
            let title = caps[1].to_lowercase();
            if title.contains("404") || title.contains("not found") {
                return PoisonPillResult::detected(
                    PoisonPillKind::DeadLink,
                    Severity::High,
                    "Page returns 404 error",
                    false,
                );
            }
        }

        PoisonPillResult::clean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad(html: &str) -> String {
        format!("{html}{}", "x".repeat(600))
    }

    #[test]
    fn empty_html_is_content_too_short() {
        let result = Detector::new().detect("", "");
        assert_eq!(result.kind, Some(PoisonPillKind::ContentTooShort));
        assert!(result.retry_possible);
    }

    #[test]
    fn short_html_is_content_too_short() {
        let result = Detector::new().detect("<p>hi</p>", "");
        assert_eq!(result.kind, Some(PoisonPillKind::ContentTooShort));
    }

    #[test]
    fn exactly_500_chars_passes_length_floor() {
        let html = "a".repeat(500);
        let result = Detector::new().detect(&html, "");
        // Still short on word count (single 500-char token), but not via length.
        assert_eq!(result.kind, Some(PoisonPillKind::ContentTooShort));
        assert!(result.message.contains("Word count"));
    }

    #[test]
    fn paywall_regex_detected() {
        let html = pad("<p>Subscribe to continue reading this story.</p>");
        let result = Detector::new().detect(&html, "");
        assert_eq!(result.kind, Some(PoisonPillKind::PaywallDetected));
        assert!(!result.retry_possible);
    }

    #[test]
    fn paywall_selector_detected() {
        let html = pad("<div class=\"paywall\">Subscribe now</div>");
        let result = Detector::new().detect(&html, "");
        assert_eq!(result.kind, Some(PoisonPillKind::PaywallDetected));
    }

    #[test]
    fn rate_limit_runs_before_anti_bot() {
        let html = pad("<p>You have hit the rate limit, please slow down.</p>");
        let result = Detector::new().detect(&html, "");
        assert_eq!(result.kind, Some(PoisonPillKind::RateLimited));
    }

    #[test]
    fn anti_bot_cloudflare_challenge() {
        let html = pad("<div class=\"cf_chl_opt\">checking your browser</div>");
        let result = Detector::new().detect(&html, "");
        assert_eq!(result.kind, Some(PoisonPillKind::AntiBot));
        assert_eq!(result.severity, Severity::Critical);
    }

    #[test]
    fn captcha_token_detected() {
        let html = pad("<div class=\"g-recaptcha\" data-sitekey=\"x\"></div>");
        let result = Detector::new().detect(&html, "");
        assert_eq!(result.kind, Some(PoisonPillKind::Captcha));
    }

    #[test]
    fn login_wall_detected() {
        let html = pad("<p>Please sign in to continue reading.</p>");
        let result = Detector::new().detect(&html, "");
        assert_eq!(result.kind, Some(PoisonPillKind::LoginRequired));
    }

    #[test]
    fn dead_link_via_title() {
        let html = pad("<html><head><title>404 Not Found</title></head><body></body></html>");
        let result = Detector::new().detect(&html, "");
        assert_eq!(result.kind, Some(PoisonPillKind::DeadLink));
    }

    #[test]
    fn clean_content_passes() {
        let html = format!(
            "<html><body><article>{}</article></body></html>",
            "This is a perfectly ordinary paragraph of real article content. "
                .repeat(20)
        );
        let result = Detector::new().detect(&html, "");
        assert!(!result.is_poison);
    }

    #[test]
    fn deterministic_across_repeated_calls() {
        let html = pad("<p>Subscribe to read the full story.</p>");
        let detector = Detector::new();
        let first = detector.detect(&html, "");
        let second = detector.detect(&html, "");
        assert_eq!(first.kind, second.kind);
        assert_eq!(first.severity, second.severity);
    }
}
