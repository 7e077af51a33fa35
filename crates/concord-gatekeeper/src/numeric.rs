//! Lenient number and strict date parsing shared by the rules

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

const CURRENCY_NOISE: &[&str] = &["人民币", "RMB", "CNY", "USD", "¥", "￥", "$", "元", ",", "，"];

/// Parse an amount-like value
///
/// Accepts JSON numbers and strings carrying currency symbols, thousands
/// separators or a trailing `万` (ten thousand). Returns `None` for anything
/// else, including percentages.
///
/// # Examples
///
/// ```
/// use concord_gatekeeper::numeric::parse_amount;
/// use serde_json::json;
///
/// assert_eq!(parse_amount(&json!("人民币500,000元")), Some(500000.0));
/// assert_eq!(parse_amount(&json!("50万")), Some(500000.0));
/// assert_eq!(parse_amount(&json!(12.5)), Some(12.5));
/// assert_eq!(parse_amount(&json!("6%")), None);
/// ```
pub fn parse_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_amount_str(s),
        _ => None,
    }
}

/// String form of [`parse_amount`]
pub fn parse_amount_str(s: &str) -> Option<f64> {
    let mut cleaned = s.trim().to_string();
    for noise in CURRENCY_NOISE {
        cleaned = cleaned.replace(noise, "");
    }
    let cleaned = cleaned.trim();

    let (digits, multiplier) = match cleaned.strip_suffix('万') {
        Some(rest) => (rest.trim(), 10_000.0),
        None => (cleaned, 1.0),
    };
    if digits.is_empty() {
        return None;
    }
    digits
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v * multiplier)
}

/// Parse a percentage-like value into points (`"30%"` and `30` both give 30)
pub fn parse_percent(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            let digits = trimmed
                .strip_suffix('%')
                .or_else(|| trimmed.strip_suffix('％'))
                .unwrap_or(trimmed);
            digits.trim().parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    }
}

/// Parse a strict `YYYY-MM-DD` date that exists on the calendar
///
/// # Examples
///
/// ```
/// use concord_gatekeeper::numeric::parse_strict_date;
///
/// assert!(parse_strict_date("2024-02-29").is_some());
/// assert!(parse_strict_date("2023-02-29").is_none());
/// assert!(parse_strict_date("2024-2-1").is_none());
/// ```
pub fn parse_strict_date(s: &str) -> Option<NaiveDate> {
    let trimmed = s.trim();
    if !ISO_DATE.is_match(trimmed) {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok()
}
