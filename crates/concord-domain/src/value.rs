//! Field values and the placeholder blacklist
//!
//! Every strategy produces field values as JSON. Whether a value "counts"
//! (for completeness, voting and validation alike) is decided here, once.

use serde_json::Value;
use std::collections::BTreeMap;

/// Field name to extracted value. Ordered so output is deterministic.
pub type FieldMap = BTreeMap<String, Value>;

/// Tokens that models and humans write when a value is unknown
const PLACEHOLDERS: &[&str] = &[
    "n/a", "na", "tbd", "-", "--", "—", "/", "null", "none", "unknown", "未知", "无", "暂无",
    "待定", "不详",
];

/// Returns true if the string is a recognized placeholder token
///
/// Comparison is case-insensitive and ignores surrounding whitespace.
///
/// # Examples
///
/// ```
/// use concord_domain::is_placeholder;
///
/// assert!(is_placeholder(" TBD "));
/// assert!(is_placeholder("未知"));
/// assert!(!is_placeholder("CT-001"));
/// ```
pub fn is_placeholder(s: &str) -> bool {
    let normalized = s.trim().to_lowercase();
    PLACEHOLDERS.iter().any(|p| *p == normalized)
}

/// Returns true if the value holds real content
///
/// A value is filled when it is non-null, non-empty (strings, arrays,
/// objects) and not a placeholder. Arrays and objects are filled when at
/// least one element is.
///
/// # Examples
///
/// ```
/// use concord_domain::is_filled;
/// use serde_json::json;
///
/// assert!(is_filled(&json!("500000")));
/// assert!(is_filled(&json!(0)));
/// assert!(!is_filled(&json!(null)));
/// assert!(!is_filled(&json!("N/A")));
/// assert!(!is_filled(&json!([])));
/// ```
pub fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(_) | Value::Number(_) => true,
        Value::String(s) => !s.trim().is_empty() && !is_placeholder(s),
        Value::Array(items) => items.iter().any(is_filled),
        Value::Object(map) => map.values().any(is_filled),
    }
}

/// Count the filled values in a field map
pub fn filled_count(fields: &FieldMap) -> usize {
    fields.values().filter(|v| is_filled(v)).count()
}

/// Drop every unfilled entry, keeping only real content
pub fn retain_filled(fields: &mut FieldMap) {
    fields.retain(|_, v| is_filled(v));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_placeholders_are_case_insensitive() {
        for token in ["N/A", "n/a", "Tbd", "NONE", "  -  ", "暂无"] {
            assert!(is_placeholder(token), "{token} should be a placeholder");
        }
    }

    #[test]
    fn test_nested_values() {
        assert!(is_filled(&json!([{"name": "首付款"}])));
        assert!(!is_filled(&json!([{"name": null}, "TBD"])));
        assert!(!is_filled(&json!({})));
        assert!(is_filled(&json!({"role": "架构师"})));
    }

    #[test]
    fn test_blank_strings() {
        assert!(!is_filled(&json!("")));
        assert!(!is_filled(&json!("   ")));
    }

    #[test]
    fn test_retain_filled() {
        let mut fields = FieldMap::new();
        fields.insert("contractNo".into(), json!("CT-001"));
        fields.insert("name".into(), json!("未知"));
        fields.insert("taxRate".into(), json!(null));
        retain_filled(&mut fields);
        assert_eq!(fields.len(), 1);
        assert_eq!(filled_count(&fields), 1);
    }
}
