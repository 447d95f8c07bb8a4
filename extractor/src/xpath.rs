use sxd_document::parser;
use sxd_xpath::nodeset::Node;
use sxd_xpath::{Context, Factory, Value};

use crate::common::{clean_values, ExtractionResult};

/// XPath 1.0 extraction. `sxd-document`/`sxd-xpath` parse strict XML, not
/// tag-soup HTML5 — malformed markup (unclosed tags, bare `&`, ...) fails
/// to parse and, per contract, yields an empty result rather than an
/// error. Rules authored against well-formed (X)HTML fragments work as
/// expected; this is the same "selector should never raise" contract the
/// CSS extractor honours with [`scraper`].
#[derive(Debug, Default, Clone, Copy)]
pub struct XPathExtractor;

impl XPathExtractor {
    pub const METHOD_NAME: &'static str = "xpath";

    pub fn new() -> Self {
        XPathExtractor
    }

    pub fn extract_one(&self, html: &str, expr: &str, attribute: Option<&str>) -> Option<String> {
        self.extract_all(html, expr, attribute).into_iter().next()
    }

    pub fn extract_all(&self, html: &str, expr: &str, attribute: Option<&str>) -> Vec<String> {
        let Ok(package) = parser::parse(html) else {
            return Vec::new();
        };
        let document = package.as_document();

        let factory = Factory::new();
        let Ok(Some(xpath)) = factory.build(expr) else {
            return Vec::new();
        };

        let context = Context::new();
        let Ok(value) = xpath.evaluate(&context, document.root()) else {
            return Vec::new();
        };

        let values = match value {
            Value::Nodeset(nodes) => nodes
                .document_order()
                .into_iter()
                .map(|node| Self::node_value(node, attribute))
                .collect(),
            Value::String(s) => vec![s],
            Value::Number(n) => vec![n.to_string()],
            Value::Boolean(b) => vec![b.to_string()],
        };

        clean_values(values)
    }

    fn node_value(node: Node, attribute: Option<&str>) -> String {
        match attribute {
            Some(attr) => match node {
                Node::Element(element) => element
                    .attribute_value(attr)
                    .unwrap_or_default()
                    .to_string(),
                Node::Attribute(attribute_node) => attribute_node.value().to_string(),
                _ => String::new(),
            },
            None => node.string_value(),
        }
    }

    pub fn exists(&self, html: &str, expr: &str) -> bool {
        self.extract_one(html, expr, None).is_some()
    }

    pub fn count(&self, html: &str, expr: &str) -> usize {
        self.extract_all(html, expr, None).len()
    }

    pub fn extract_one_safe(&self, html: &str, expr: &str, attribute: Option<&str>) -> ExtractionResult {
        let value = self.extract_one(html, expr, attribute);
        ExtractionResult {
            success: value.is_some(),
            value,
            values: Vec::new(),
            error: None,
            selector_used: expr.to_string(),
            method: Self::METHOD_NAME,
        }
    }

    pub fn extract_all_safe(&self, html: &str, expr: &str, attribute: Option<&str>) -> ExtractionResult {
        let values = self.extract_all(html, expr, attribute);
        ExtractionResult {
            success: !values.is_empty(),
            value: None,
            values,
            error: None,
            selector_used: expr.to_string(),
            method: Self::METHOD_NAME,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <h1>Widget 3000</h1>
        <span class="price" data-currency="usd">19.99</span>
        <ul><li>a</li><li>b</li></ul>
    </body></html>"#;

    #[test]
    fn extracts_text_via_text_function() {
        let xp = XPathExtractor::new();
        assert_eq!(xp.extract_one(PAGE, "//h1/text()", None), Some("Widget 3000".to_string()));
    }

    #[test]
    fn extracts_attribute_via_at_syntax() {
        let xp = XPathExtractor::new();
        assert_eq!(
            xp.extract_one(PAGE, "//span/@data-currency", None),
            Some("usd".to_string())
        );
    }

    #[test]
    fn extracts_attribute_via_separate_parameter() {
        let xp = XPathExtractor::new();
        assert_eq!(
            xp.extract_one(PAGE, "//span", Some("data-currency")),
            Some("usd".to_string())
        );
    }

    #[test]
    fn extracts_all_list_items() {
        let xp = XPathExtractor::new();
        assert_eq!(xp.extract_all(PAGE, "//li/text()", None), vec!["a", "b"]);
    }

    #[test]
    fn malformed_markup_yields_empty_not_panic() {
        let xp = XPathExtractor::new();
        assert_eq!(xp.extract_all("<div><span>oops", "//span", None), Vec::<String>::new());
    }

    #[test]
    fn invalid_expression_yields_empty() {
        let xp = XPathExtractor::new();
        assert_eq!(xp.extract_all(PAGE, "///???", None), Vec::<String>::new());
    }
}
