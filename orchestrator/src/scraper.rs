//! End-to-end per-URL pipeline: cascade fetch, poison-pill gate, rule
//! extraction, vision fallback (spec §4.4).

use std::sync::Arc;
use std::time::Duration;

use cascade::{CascadeEngine, FetchOptions};
use extractor::VisionEngine;
use poison_pill::Detector;
use scrape_common::{ErrorKind, ExtractionRule, FieldValue, ResultData};

pub struct ScrapeOutcome {
    pub success: bool,
    pub data: ResultData,
    pub method: String,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub vision_extracted: bool,
}

pub struct Scraper {
    cascade: Arc<CascadeEngine>,
    detector: Detector,
    vision: Option<Arc<dyn VisionEngine>>,
    vision_enabled: bool,
}

impl Scraper {
    pub fn new(cascade: Arc<CascadeEngine>, vision: Option<Arc<dyn VisionEngine>>, vision_enabled: bool) -> Self {
        Scraper {
            cascade,
            detector: Detector::new(),
            vision,
            vision_enabled,
        }
    }

    pub async fn scrape(
        &self,
        url: &str,
        rules: &[ExtractionRule],
        cascade_config: &cascade::CascadeConfig,
        timeout: Duration,
    ) -> ScrapeOutcome {
        let fetch = self.cascade.fetch_page(url, cascade_config, timeout).await;

        if fetch.html.is_empty() {
            return ScrapeOutcome {
                success: false,
                data: ResultData::new(),
                method: fetch.method,
                error_kind: Some(http_or_exception(fetch.status_code)),
                error_message: Some(
                    fetch.error.unwrap_or_else(|| "All cascade methods failed".to_string()),
                ),
                vision_extracted: false,
            };
        }

        let check = self.detector.detect(&fetch.html, url);
        if let Some(kind) = check.kind {
            let already_accepted = cascade_config.fallback_on.poison_pills.contains(kind.as_str());
            if !already_accepted {
                return ScrapeOutcome {
                    success: false,
                    data: ResultData::new(),
                    method: fetch.method,
                    error_kind: Some(poison_pill_to_error_kind(kind)),
                    error_message: Some(check.message.clone()),
                    vision_extracted: false,
                };
            }
        }

        let mut data = ResultData::new();
        let mut field_errors: Vec<String> = Vec::new();

        for rule in rules {
            let values = extractor::extract(
                rule.selector_kind,
                &fetch.html,
                &rule.selector,
                rule.attribute.as_deref(),
                rule.is_list,
            );

            if rule.is_list {
                data.insert(rule.field_name.clone(), FieldValue::List(values));
            } else if let Some(first) = values.into_iter().next() {
                data.insert(rule.field_name.clone(), FieldValue::Scalar(first));
            } else if rule.is_required {
                field_errors.push(format!(
                    "field '{}': no match for selector '{}'",
                    rule.field_name, rule.selector
                ));
            }
        }

        let mut vision_extracted = false;
        if self.vision_enabled && data.is_empty() && !rules.is_empty() {
            if let Some((merged, used)) = self.try_vision_extraction(url, rules, timeout).await {
                data.extend(merged);
                if used {
                    vision_extracted = true;
                    field_errors.clear();
                }
            }
        }

        let success = !data.is_empty() && field_errors.is_empty();
        let error_message = if success {
            None
        } else if field_errors.is_empty() {
            Some(format!("No data extracted (0/{} selectors matched)", rules.len()))
        } else {
            Some(field_errors.join("; "))
        };

        ScrapeOutcome {
            success,
            data,
            method: fetch.method,
            error_kind: if success { None } else { Some(ErrorKind::ExtractionFailed) },
            error_message,
            vision_extracted,
        }
    }

    /// Request a screenshot from the first browser-capable fetcher and run
    /// it through the vision engine, merging any field the DOM pass missed.
    /// Returns `None` if no vision engine is configured or no screenshot
    /// could be produced — absence is not an error (spec §4.6).
    async fn try_vision_extraction(
        &self,
        url: &str,
        rules: &[ExtractionRule],
        timeout: Duration,
    ) -> Option<(ResultData, bool)> {
        let engine = self.vision.as_ref()?;
        let fetcher = self
            .cascade
            .fetcher_registry()
            .available_methods()
            .into_iter()
            .find(|m| *m != "http")
            .and_then(|name| self.cascade.fetcher_registry().get(name))?;

        let outcome = fetcher
            .fetch(url, timeout, &FetchOptions { wait_for: None, take_screenshot: true })
            .await;
        let screenshot = outcome.screenshot?;

        let ocr = engine.extract(&screenshot).await.ok()?;
        let structured = extractor::extract_structured(&ocr);

        let mut merged = ResultData::new();
        for rule in rules {
            if let Some(value) = structured.fields.get(&rule.field_name) {
                merged.insert(rule.field_name.clone(), FieldValue::Scalar(value.clone()));
            }
        }

        Some((merged, !merged.is_empty()))
    }
}

fn http_or_exception(status_code: u16) -> ErrorKind {
    if status_code >= 400 {
        ErrorKind::Http(status_code)
    } else {
        ErrorKind::Exception
    }
}

fn poison_pill_to_error_kind(kind: poison_pill::PoisonPillKind) -> ErrorKind {
    use poison_pill::PoisonPillKind as P;
    match kind {
        P::ContentTooShort => ErrorKind::ContentTooShort,
        P::PaywallDetected => ErrorKind::PaywallDetected,
        P::AntiBot => ErrorKind::AntiBot,
        P::Captcha => ErrorKind::Captcha,
        P::RateLimited => ErrorKind::RateLimited,
        P::DeadLink => ErrorKind::DeadLink,
        P::LoginRequired => ErrorKind::LoginRequired,
        P::RedirectLoop | P::MalformedHtml | P::GeographicBlock => ErrorKind::Exception,
    }
}
