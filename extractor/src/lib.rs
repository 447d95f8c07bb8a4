//! DOM-based rule extraction (CSS/XPath) plus the vision (OCR) fallback
//! path described in `SPEC_FULL.md` §4.6.

pub mod common;
pub mod css;
pub mod vision;
pub mod xpath;

pub use common::ExtractionResult;
pub use css::{CssExtractor, MetaExtractor};
pub use vision::{extract_structured, OcrOutput, StructuredData, TextRegion, VisionEngine, VisionError};
pub use xpath::XPathExtractor;

use scrape_common::SelectorKind;

/// Evaluate a single rule (field name not required) against `html` and
/// return the matched text/attribute values. `is_list` controls whether
/// all matches or only the first is requested — callers that need the
/// "first match only" contract should call this with `is_list = false`
/// and take `values.first()`.
pub fn extract(
    kind: SelectorKind,
    html: &str,
    selector: &str,
    attribute: Option<&str>,
    is_list: bool,
) -> Vec<String> {
    match kind {
        SelectorKind::Css => {
            let extractor = CssExtractor::new();
            if is_list {
                extractor.extract_all(html, selector, attribute)
            } else {
                extractor.extract_one(html, selector, attribute).into_iter().collect()
            }
        }
        SelectorKind::Xpath => {
            let extractor = XPathExtractor::new();
            if is_list {
                extractor.extract_all(html, selector, attribute)
            } else {
                extractor.extract_one(html, selector, attribute).into_iter().collect()
            }
        }
    }
}

/// Dry-run a selector against HTML without going through a full rule —
/// used by rule-authoring tools to preview what a selector would match.
pub fn test_selector(
    kind: SelectorKind,
    html: &str,
    selector: &str,
    attribute: Option<&str>,
) -> ExtractionResult {
    match kind {
        SelectorKind::Css => CssExtractor::new().extract_all_safe(html, selector, attribute),
        SelectorKind::Xpath => XPathExtractor::new().extract_all_safe(html, selector, attribute),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_css_list_vs_scalar() {
        let html = r#"<ul><li>a</li><li>b</li></ul>"#;
        assert_eq!(
            extract(SelectorKind::Css, html, "li", None, true),
            vec!["a".to_string(), "b".to_string()]
        );
        assert_eq!(extract(SelectorKind::Css, html, "li", None, false), vec!["a".to_string()]);
    }

    #[test]
    fn test_selector_reports_match_count() {
        let html = r#"<ul><li>a</li><li>b</li><li>c</li></ul>"#;
        let result = test_selector(SelectorKind::Css, html, "li", None);
        assert_eq!(result.values.len(), 3);
        assert!(result.success);
    }
}
