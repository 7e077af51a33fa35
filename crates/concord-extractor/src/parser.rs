//! Parse model JSON answers into field values

use crate::types::ContractType;
use concord_domain::value::retain_filled;
use concord_domain::{FieldMap, TopicDefinition};
use serde_json::Value;
use tracing::debug;

/// Read the fields of `topics` out of one model answer
///
/// Placeholders and empty values are dropped.
pub fn parse_topic_fields(value: &Value, topics: &[&TopicDefinition]) -> FieldMap {
    let mut fields = FieldMap::new();
    for topic in topics {
        for (name, v) in topic.fields_from_json(value) {
            fields.entry(name).or_insert(v);
        }
    }
    retain_filled(&mut fields);
    debug!(topics = topics.len(), fields = fields.len(), "Parsed topic answer");
    fields
}

/// Read a contract type from a classification answer
///
/// Accepts `{"contractType": ...}`, `{"type": ...}` or a bare string.
pub fn parse_contract_type(value: &Value) -> Option<ContractType> {
    let raw = match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => ["contractType", "contract_type", "type"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str)),
        _ => None,
    }?;
    ContractType::parse(raw)
}

/// A model's choice for a conflicted field
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionAnswer {
    /// Chosen value
    pub value: Value,
    /// Reported confidence normalized to [0, 1], if any
    pub confidence: Option<f64>,
}

/// Read a conflict resolution answer
///
/// The value comes from `value` (or `choice`/`agreedValue`); a numeric
/// `index` (1-based) selects a candidate instead. Confidences above 1 are
/// read as percentages.
pub fn parse_resolution(value: &Value, candidates: &[&Value]) -> Option<ResolutionAnswer> {
    let map = value.as_object()?;

    let chosen = ["value", "choice", "agreedValue"]
        .iter()
        .find_map(|key| map.get(*key))
        .filter(|v| !v.is_null())
        .cloned()
        .or_else(|| {
            let index = map.get("index")?.as_u64()? as usize;
            candidates.get(index.checked_sub(1)?).map(|v| (*v).clone())
        })?;

    let confidence = map.get("confidence").and_then(Value::as_f64).map(|c| {
        let c = if c > 1.0 { c / 100.0 } else { c };
        c.clamp(0.0, 1.0)
    });

    Some(ResolutionAnswer {
        value: chosen,
        confidence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_domain::TopicRegistry;
    use serde_json::json;

    #[test]
    fn test_parse_flat_answer() {
        let registry = TopicRegistry::contract_defaults();
        let financial = registry.get("financial").unwrap();
        let answer = json!({"amountWithTax": "500000", "taxRate": "N/A", "extra": 1});

        let fields = parse_topic_fields(&answer, &[financial]);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["amountWithTax"], json!("500000"));
    }

    #[test]
    fn test_parse_nested_multi_topic_answer() {
        let registry = TopicRegistry::contract_defaults();
        let topics = [
            registry.get("basic_info").unwrap(),
            registry.get("time_info").unwrap(),
        ];
        let answer = json!({
            "basic_info": {"contractNo": "CT-001", "customerName": null},
            "time_info": {"sign_date": "2024-01-01"}
        });

        let fields = parse_topic_fields(&answer, &topics);
        assert_eq!(fields["contractNo"], json!("CT-001"));
        assert_eq!(fields["signDate"], json!("2024-01-01"));
        assert!(!fields.contains_key("customerName"));
    }

    #[test]
    fn test_parse_bare_array_for_array_topic() {
        let registry = TopicRegistry::contract_defaults();
        let milestones = registry.get("milestones").unwrap();
        let answer = json!([{"name": "首付款", "paymentPercentage": 30}]);
        let fields = parse_topic_fields(&answer, &[milestones]);
        assert_eq!(fields["milestones"][0]["name"], json!("首付款"));
    }

    #[test]
    fn test_parse_contract_type() {
        assert_eq!(
            parse_contract_type(&json!({"contractType": "PRODUCT_SALES", "confidence": 0.9})),
            Some(ContractType::ProductSales)
        );
        assert_eq!(parse_contract_type(&json!("mixed")), Some(ContractType::Mixed));
        assert_eq!(parse_contract_type(&json!({"contractType": "LEASE"})), None);
        assert_eq!(parse_contract_type(&json!(42)), None);
    }

    #[test]
    fn test_parse_resolution_value_and_percent_confidence() {
        let a = json!("500000");
        let answer = parse_resolution(&json!({"value": "500000", "confidence": 92}), &[&a]).unwrap();
        assert_eq!(answer.value, json!("500000"));
        assert_eq!(answer.confidence, Some(0.92));
    }

    #[test]
    fn test_parse_resolution_by_index() {
        let a = json!("X");
        let b = json!("Y");
        let answer = parse_resolution(&json!({"index": 2}), &[&a, &b]).unwrap();
        assert_eq!(answer.value, json!("Y"));
        assert_eq!(answer.confidence, None);
        assert!(parse_resolution(&json!({"index": 0}), &[&a, &b]).is_none());
        assert!(parse_resolution(&json!({"value": null}), &[&a]).is_none());
    }
}
