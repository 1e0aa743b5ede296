// Positioned text runs from a page content stream
use anyhow::Result;
use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use serde::{Deserialize, Serialize};

use super::document_analyzer::get_content_data;

/// One shown string with the text-space origin it was drawn at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub x: f32,
    pub y: f32,
    /// Index of the BT/ET text object the run belongs to
    pub block: usize,
}

impl TextRun {
    pub fn new(text: impl Into<String>, x: f32, y: f32, block: usize) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            block,
        }
    }
}

// TJ adjustments below this (thousandths of an em) read as a word gap
const TJ_SPACE_THRESHOLD: f32 = -200.0;

/// Decode a page's content streams into text runs, in drawing order.
pub fn page_runs(document: &Document, page_id: ObjectId) -> Result<Vec<TextRun>> {
    let page = document.get_object(page_id)?.as_dict()?;
    let contents = match page.get(b"Contents") {
        Ok(contents) => contents,
        Err(_) => return Ok(Vec::new()),
    };
    let data = get_content_data(document, contents)?;
    runs_from_bytes(&data)
}

/// Interpret raw content-stream bytes.
pub fn runs_from_bytes(data: &[u8]) -> Result<Vec<TextRun>> {
    let content = Content::decode(data)?;

    let mut runs = Vec::new();
    let mut block = 0usize;
    let mut in_text = false;
    // Line origin, current position and leading
    let (mut line_x, mut line_y) = (0.0f32, 0.0f32);
    let (mut x, mut y) = (0.0f32, 0.0f32);
    let mut leading = 0.0f32;

    for op in &content.operations {
        let nums: Vec<f32> = op.operands.iter().filter_map(as_number).collect();
        match op.operator.as_str() {
            "BT" => {
                in_text = true;
                line_x = 0.0;
                line_y = 0.0;
                x = 0.0;
                y = 0.0;
            }
            "ET" => {
                if in_text {
                    block += 1;
                }
                in_text = false;
            }
            "Tm" if nums.len() >= 6 => {
                line_x = nums[4];
                line_y = nums[5];
                x = line_x;
                y = line_y;
            }
            "Td" if nums.len() >= 2 => {
                line_x += nums[0];
                line_y += nums[1];
                x = line_x;
                y = line_y;
            }
            "TD" if nums.len() >= 2 => {
                leading = -nums[1];
                line_x += nums[0];
                line_y += nums[1];
                x = line_x;
                y = line_y;
            }
            "TL" if !nums.is_empty() => leading = nums[0],
            "T*" => {
                line_y -= leading;
                x = line_x;
                y = line_y;
            }
            "Tj" | "'" | "\"" => {
                if op.operator != "Tj" {
                    line_y -= leading;
                    x = line_x;
                    y = line_y;
                }
                if let Some(text) = op.operands.last().and_then(string_operand) {
                    push_run(&mut runs, text, x, y, block);
                    x += estimated_width(&runs);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = op.operands.first() {
                    let text = decode_tj_array(items);
                    push_run(&mut runs, text, x, y, block);
                    x += estimated_width(&runs);
                }
            }
            _ => {}
        }
    }

    Ok(runs)
}

fn push_run(runs: &mut Vec<TextRun>, text: String, x: f32, y: f32, block: usize) {
    if text.trim().is_empty() {
        return;
    }
    runs.push(TextRun::new(text, x, y, block));
}

// Advance approximation for consecutive Tj on one line
fn estimated_width(runs: &[TextRun]) -> f32 {
    runs.last()
        .map(|r| r.text.chars().count() as f32 * 6.0)
        .unwrap_or(0.0)
}

fn as_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(f) => Some(*f),
        _ => None,
    }
}

fn string_operand(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(decode_pdf_bytes(bytes)),
        _ => None,
    }
}

fn decode_tj_array(items: &[Object]) -> String {
    let mut result = String::new();
    for item in items {
        match item {
            Object::String(bytes, _) => result.push_str(&decode_pdf_bytes(bytes)),
            other => {
                if let Some(adjust) = as_number(other) {
                    if adjust < TJ_SPACE_THRESHOLD && !result.ends_with(' ') {
                        result.push(' ');
                    }
                }
            }
        }
    }
    result
}

/// UTF-16BE when the string carries a BOM, byte-per-char otherwise.
pub fn decode_pdf_bytes(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks(2)
            .map(|c| u16::from_be_bytes([c[0], *c.get(1).unwrap_or(&0)]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}
