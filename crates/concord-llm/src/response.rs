//! Recover JSON from raw model output

use crate::LlmError;
use serde_json::Value;

/// Extract a JSON value from model output
///
/// Models wrap JSON in prose or markdown fences often enough that a plain
/// parse is only the first attempt. The order is: direct parse, fenced code
/// block, first `{` to last `}`, first `[` to last `]`.
///
/// # Examples
///
/// ```
/// use concord_llm::extract_json;
///
/// let value = extract_json("Sure! ```json\n{\"taxRate\": \"0.06\"}\n``` Done.").unwrap();
/// assert_eq!(value["taxRate"], "0.06");
/// ```
pub fn extract_json(raw: &str) -> Result<Value, LlmError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(LlmError::UnparsableResponse("empty response".to_string()));
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(value);
    }

    if let Some(block) = fenced_block(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(block.trim()) {
            return Ok(value);
        }
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let Some(slice) = delimited(trimmed, open, close) {
            if let Ok(value) = serde_json::from_str::<Value>(slice) {
                return Ok(value);
            }
        }
    }

    Err(LlmError::UnparsableResponse(preview(trimmed)))
}

/// Body of the first ``` fenced block, skipping a language tag line
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after[body_start..];
    let end = body.find("```").unwrap_or(body.len());
    Some(&body[..end])
}

fn delimited(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

fn preview(text: &str) -> String {
    let cut: String = text.chars().take(80).collect();
    if cut.len() < text.len() {
        format!("{}...", cut)
    } else {
        cut
    }
}
