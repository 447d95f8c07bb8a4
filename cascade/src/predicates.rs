use once_cell::sync::Lazy;
use regex::RegexSet;

use crate::config::FallbackOn;
use crate::fetcher::FetchOutcome;

static SPA_INDICATORS: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        r#"(?i)<div\s+id=["']root["']>\s*</div>"#,
        r#"(?i)<div\s+id=["']app["']>\s*</div>"#,
        r#"(?i)<div\s+id=["']__next["']"#,
        r"(?i)window\.__INITIAL_STATE__",
        r"(?i)window\.__NUXT__",
        r"(?i)ng-app=",
        r"(?i)data-reactroot",
    ])
    .unwrap()
});

static SCRIPT_TAG: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap());
static STYLE_TAG: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap());
static ANY_TAG: Lazy<regex::Regex> = Lazy::new(|| regex::Regex::new(r"<[^>]+>").unwrap());
static BODY_TAG: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"(?is)<body[^>]*>(.*?)</body>").unwrap());

/// Detect if a page needs JavaScript to render its real content: empty or
/// under 1000 chars, matches a known SPA shell sentinel, or whose `<body>`
/// with scripts/styles/tags stripped collapses under 500 chars.
pub fn needs_javascript(html: &str) -> bool {
    if html.is_empty() {
        return true;
    }
    if html.len() < 1000 {
        return true;
    }
    if SPA_INDICATORS.is_match(html) {
        return true;
    }

    if let Some(caps) = BODY_TAG.captures(html) {
        let body = &caps[1];
        let body = SCRIPT_TAG.replace_all(body, "");
        let body = STYLE_TAG.replace_all(&body, "");
        let body = ANY_TAG.replace_all(&body, "");
        if body.trim().len() < 500 {
            return true;
        }
    }

    false
}

/// Post-success trigger (spec §4.3 `should_fallback`): even though the
/// fetch succeeded, the engine may still want to try the next method.
pub fn should_fallback(
    html: &str,
    fallback_on: &FallbackOn,
    detector: &poison_pill::Detector,
) -> Option<String> {
    if fallback_on.javascript_required && needs_javascript(html) {
        return Some("javascript_required".to_string());
    }

    if fallback_on.empty_content && html.len() < fallback_on.min_content_length {
        return Some("content_too_short".to_string());
    }

    if !fallback_on.poison_pills.is_empty() && !html.is_empty() {
        let check = detector.detect(html, "");
        if let Some(kind) = check.kind {
            if fallback_on.poison_pills.contains(kind.as_str()) {
                return Some(format!("poison_pill:{}", kind.as_str()));
            }
        }
    }

    None
}

/// Post-failure trigger (spec §4.3 `should_try_next`): true if the status
/// code or error text match a configured trigger, or — matching the
/// original's fall-through — unconditionally on any failure. Kept as an
/// explicit function (rather than inlined `true`) so the status/pattern
/// match is visible to callers that want to log *why* the engine is
/// advancing.
pub fn should_try_next(result: &FetchOutcome, fallback_on: &FallbackOn) -> bool {
    if fallback_on.status_codes.contains(&result.status_code) {
        return true;
    }

    if let Some(error) = &result.error {
        let error_lower = error.to_lowercase();
        if fallback_on
            .error_patterns
            .iter()
            .any(|pattern| error_lower.contains(&pattern.to_lowercase()))
        {
            return true;
        }
    }

    true
}
