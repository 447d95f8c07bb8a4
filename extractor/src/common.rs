use serde::Serialize;

/// Mirrors the original's `ExtractionResult`: a uniform envelope around a
/// single- or multi-value extraction attempt, used by the `_safe` wrappers
/// and by [`crate::test_selector`].
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub success: bool,
    pub value: Option<String>,
    pub values: Vec<String>,
    pub error: Option<String>,
    pub selector_used: String,
    pub method: &'static str,
}

impl ExtractionResult {
    pub fn is_single(&self) -> bool {
        self.value.is_some()
    }

    pub fn is_multiple(&self) -> bool {
        !self.values.is_empty()
    }
}

fn trimmed_or_none(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub(crate) fn clean_values(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .filter_map(|v| trimmed_or_none(&v))
        .collect()
}
