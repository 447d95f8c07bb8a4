//! OCR fallback extraction. The actual image-to-text engine (Tesseract or
//! similar) is an external collaborator — modeled here as the
//! [`VisionEngine`] port, the same footing as the `Fetcher` port in the
//! `cascade` crate. What belongs to this core, and is fully implemented
//! and tested here, is the structure-detection heuristics that turn raw
//! OCR output into key/value pairs, lists and tables.

use std::collections::HashMap;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("vision engine unavailable")]
    Unavailable,
    #[error("ocr failed: {0}")]
    EngineFailed(String),
}

/// A single word/line/block detected by OCR, with its bounding box.
/// `level` follows the Tesseract convention: 1=page, 2=block, 3=para,
/// 4=line, 5=word.
#[derive(Debug, Clone)]
pub struct TextRegion {
    pub text: String,
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
    pub confidence: f32,
    pub level: u8,
    pub block_num: u32,
    pub line_num: u32,
}

/// Raw output from a vision engine call: full text plus positional
/// regions, used as the input to [`extract_structured`].
#[derive(Debug, Clone, Default)]
pub struct OcrOutput {
    pub text: String,
    pub regions: Vec<TextRegion>,
    pub confidence: f32,
}

/// Port for an external OCR engine. A concrete adapter (e.g. shelling out
/// to Tesseract, or calling a cloud OCR API) lives outside this crate;
/// this core only consumes the contract.
#[async_trait]
pub trait VisionEngine: Send + Sync {
    async fn extract(&self, image_bytes: &[u8]) -> Result<OcrOutput, VisionError>;
}

/// Best-effort structured data harvested from OCR output: key/value pairs
/// plus, under the reserved keys `_list` and `_table`, any detected list
/// or tabular structure.
#[derive(Debug, Clone, Default)]
pub struct StructuredData {
    pub fields: HashMap<String, String>,
    pub list: Vec<String>,
    pub table: Vec<Vec<String>>,
}

struct Patterns {
    kv_colon: Regex,
    kv_equals: Regex,
    kv_dash: Regex,
    list_item: Regex,
}

static PATTERNS: Lazy<Patterns> = Lazy::new(|| Patterns {
    kv_colon: Regex::new(r"^([A-Za-z][A-Za-z0-9\s]{0,30}):\s*(.+)$").unwrap(),
    kv_equals: Regex::new(r"^([A-Za-z][A-Za-z0-9\s]{0,30})=\s*(.+)$").unwrap(),
    kv_dash: Regex::new(r"^([A-Za-z][A-Za-z0-9\s]{0,30})\s+-\s+(.+)$").unwrap(),
    list_item: Regex::new(r"^[\-\*\x{2022}\d+\.]\s*(.+)$").unwrap(),
});

const TABLE_ROW_BUCKET_PX: i64 = 20;
const MIN_TABLE_ROWS: usize = 3;

/// Turn raw OCR output into [`StructuredData`] using the same three
/// heuristics the original vision extractor used: key/value line
/// matching, row-bucketed table detection (grouping word-level regions
/// by a 20px vertical bucket), and bullet/numbered list detection.
pub fn extract_structured(output: &OcrOutput) -> StructuredData {
    let mut fields = HashMap::new();

    for line in output.text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let captured = PATTERNS
            .kv_colon
            .captures(line)
            .or_else(|| PATTERNS.kv_equals.captures(line))
            .or_else(|| PATTERNS.kv_dash.captures(line));

        if let Some(caps) = captured {
            let key = caps[1].trim().to_lowercase().replace(' ', "_");
            let value = caps[2].trim().to_string();
            if !key.is_empty() && !value.is_empty() {
                fields.insert(key, value);
            }
        }
    }

    let mut rows: HashMap<i64, Vec<&TextRegion>> = HashMap::new();
    for region in &output.regions {
        if region.level >= 4 {
            let bucket = (region.y / TABLE_ROW_BUCKET_PX) * TABLE_ROW_BUCKET_PX;
            rows.entry(bucket).or_default().push(region);
        }
    }

    let mut table = Vec::new();
    if rows.len() >= MIN_TABLE_ROWS {
        let mut sorted_rows: Vec<_> = rows.into_iter().collect();
        sorted_rows.sort_by_key(|(y, _)| *y);

        for (_, mut items) in sorted_rows {
            items.sort_by_key(|r| r.x);
            let row: Vec<String> = items.into_iter().map(|r| r.text.clone()).collect();
            if !row.is_empty() {
                table.push(row);
            }
        }
    }

    let mut list = Vec::new();
    for line in output.text.lines() {
        let line = line.trim();
        if let Some(caps) = PATTERNS.list_item.captures(line) {
            list.push(caps[1].trim().to_string());
        }
    }

    StructuredData { fields, list, table }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(text: &str, x: i64, y: i64, level: u8) -> TextRegion {
        TextRegion {
            text: text.to_string(),
            x,
            y,
            width: 10,
            height: 10,
            confidence: 0.9,
            level,
            block_num: 0,
            line_num: 0,
        }
    }

    #[test]
    fn extracts_colon_key_value_pairs() {
        let output = OcrOutput {
            text: "Price: $9.99\nName: Widget".to_string(),
            ..Default::default()
        };
        let structured = extract_structured(&output);
        assert_eq!(structured.fields.get("price"), Some(&"$9.99".to_string()));
        assert_eq!(structured.fields.get("name"), Some(&"Widget".to_string()));
    }

    #[test]
    fn extracts_dash_and_equals_key_value_pairs() {
        let output = OcrOutput {
            text: "Weight - 2kg\nColor=Red".to_string(),
            ..Default::default()
        };
        let structured = extract_structured(&output);
        assert_eq!(structured.fields.get("weight"), Some(&"2kg".to_string()));
        assert_eq!(structured.fields.get("color"), Some(&"Red".to_string()));
    }

    #[test]
    fn detects_bulleted_and_numbered_lists() {
        let output = OcrOutput {
            text: "- first item\n* second item\n1. third item".to_string(),
            ..Default::default()
        };
        let structured = extract_structured(&output);
        assert_eq!(structured.list, vec!["first item", "second item", "third item"]);
    }

    #[test]
    fn detects_table_from_row_bucketed_regions() {
        let output = OcrOutput {
            regions: vec![
                region("A1", 0, 0, 5),
                region("B1", 50, 2, 5),
                region("A2", 0, 22, 5),
                region("B2", 50, 24, 5),
                region("A3", 0, 44, 5),
                region("B3", 50, 46, 5),
            ],
            ..Default::default()
        };
        let structured = extract_structured(&output);
        assert_eq!(
            structured.table,
            vec![
                vec!["A1".to_string(), "B1".to_string()],
                vec!["A2".to_string(), "B2".to_string()],
                vec!["A3".to_string(), "B3".to_string()],
            ]
        );
    }

    #[test]
    fn fewer_than_three_rows_produces_no_table() {
        let output = OcrOutput {
            regions: vec![region("A1", 0, 0, 5), region("A2", 0, 22, 5)],
            ..Default::default()
        };
        let structured = extract_structured(&output);
        assert!(structured.table.is_empty());
    }
}
