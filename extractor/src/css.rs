use scraper::{Html, Selector};

use crate::common::{clean_values, ExtractionResult};

/// CSS3-subset selector extraction over a parsed HTML document. Invalid
/// selectors never panic — they simply match nothing, same contract as
/// the rest of the extraction pipeline (a bad rule degrades a single
/// field, it does not crash the worker).
#[derive(Debug, Default, Clone, Copy)]
pub struct CssExtractor;

impl CssExtractor {
    pub const METHOD_NAME: &'static str = "css";

    pub fn new() -> Self {
        CssExtractor
    }

    pub fn extract_one(&self, html: &str, selector: &str, attribute: Option<&str>) -> Option<String> {
        self.extract_all(html, selector, attribute).into_iter().next()
    }

    pub fn extract_all(&self, html: &str, selector: &str, attribute: Option<&str>) -> Vec<String> {
        let Ok(parsed) = Selector::parse(selector) else {
            return Vec::new();
        };
        let document = Html::parse_document(html);

        let values: Vec<String> = document
            .select(&parsed)
            .map(|element| match attribute {
                Some(attr) => element.value().attr(attr).unwrap_or("").to_string(),
                None => element.text().collect::<Vec<_>>().join(""),
            })
            .collect();

        clean_values(values)
    }

    pub fn exists(&self, html: &str, selector: &str) -> bool {
        self.extract_one(html, selector, None).is_some()
    }

    pub fn count(&self, html: &str, selector: &str) -> usize {
        self.extract_all(html, selector, None).len()
    }

    pub fn extract_one_safe(&self, html: &str, selector: &str, attribute: Option<&str>) -> ExtractionResult {
        let value = self.extract_one(html, selector, attribute);
        ExtractionResult {
            success: value.is_some(),
            value,
            values: Vec::new(),
            error: None,
            selector_used: selector.to_string(),
            method: Self::METHOD_NAME,
        }
    }

    pub fn extract_all_safe(&self, html: &str, selector: &str, attribute: Option<&str>) -> ExtractionResult {
        let values = self.extract_all(html, selector, attribute);
        ExtractionResult {
            success: !values.is_empty(),
            value: None,
            values,
            error: None,
            selector_used: selector.to_string(),
            method: Self::METHOD_NAME,
        }
    }
}

/// Extracts `<meta>` tag content by name, Open Graph property, or
/// `itemprop`, trying each in turn.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetaExtractor;

impl MetaExtractor {
    pub fn new() -> Self {
        MetaExtractor
    }

    pub fn extract(&self, html: &str, name: &str) -> Option<String> {
        let css = CssExtractor::new();

        if let Some(value) = css.extract_one(html, &format!("meta[name=\"{name}\"]"), Some("content")) {
            return Some(value);
        }
        if let Some(value) = css.extract_one(html, &format!("meta[property=\"{name}\"]"), Some("content")) {
            return Some(value);
        }
        css.extract_one(html, &format!("[itemprop=\"{name}\"]"), Some("content"))
    }

    pub fn extract_all_meta(&self, html: &str) -> std::collections::HashMap<String, String> {
        let Ok(selector) = Selector::parse("meta") else {
            return std::collections::HashMap::new();
        };
        let document = Html::parse_document(html);

        document
            .select(&selector)
            .filter_map(|el| {
                let name = el
                    .value()
                    .attr("name")
                    .or_else(|| el.value().attr("property"))?;
                let content = el.value().attr("content")?;
                Some((name.to_string(), content.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
          <head><title>Widget</title>
            <meta name="description" content="a fine widget">
            <meta property="og:title" content="OG Widget">
          </head>
          <body>
            <h1>Widget 3000</h1>
            <span class="price" data-currency="usd">$19.99</span>
            <ul class="tags"><li>a</li><li>b</li><li>c</li></ul>
          </body>
        </html>
    "#;

    #[test]
    fn extracts_single_text_value() {
        let css = CssExtractor::new();
        assert_eq!(css.extract_one(PAGE, "h1", None), Some("Widget 3000".to_string()));
    }

    #[test]
    fn extracts_attribute_value() {
        let css = CssExtractor::new();
        assert_eq!(
            css.extract_one(PAGE, ".price", Some("data-currency")),
            Some("usd".to_string())
        );
    }

    #[test]
    fn extracts_list_of_values() {
        let css = CssExtractor::new();
        assert_eq!(
            css.extract_all(PAGE, ".tags li", None),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn invalid_selector_returns_empty_not_panic() {
        let css = CssExtractor::new();
        assert_eq!(css.extract_all(PAGE, ":::not-a-selector", None), Vec::<String>::new());
    }

    #[test]
    fn meta_extractor_falls_back_through_name_property_itemprop() {
        let meta = MetaExtractor::new();
        assert_eq!(meta.extract(PAGE, "description"), Some("a fine widget".to_string()));
        assert_eq!(meta.extract(PAGE, "og:title"), Some("OG Widget".to_string()));
        assert_eq!(meta.extract(PAGE, "nonexistent"), None);
    }
}
