//! Topic validation logic

use crate::numeric::{parse_amount, parse_percent, parse_strict_date};
use crate::ValidationConfig;
use concord_domain::topic::names;
use concord_domain::{is_filled, FieldMap, TopicRegistry, ValidationIssue, ValidationResult};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Words that indicate contact details leaked into a party name
const CONTACT_KEYWORDS: &[&str] = &[
    "地址", "电话", "联系人", "传真", "邮编", "邮箱", "address", "tel", "email",
];

const PARTY_FIELDS: &[&str] = &["customerName", "ourEntity"];

const SOURCE_CHECKED_FIELDS: &[&str] = &["contractNo", "name", "customerName", "ourEntity"];

/// Collects issues while one topic is checked
#[derive(Default)]
struct Issues {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Issues {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationIssue::new(field, message));
    }

    fn warn(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationIssue::new(field, message));
    }

    fn finish(self) -> ValidationResult {
        ValidationResult::from_issues(self.errors, self.warnings)
    }
}

/// The Gatekeeper checks extracted fields topic by topic
pub struct Gatekeeper {
    config: ValidationConfig,
    registry: Arc<TopicRegistry>,
}

impl Gatekeeper {
    /// Create a new Gatekeeper over the built-in contract topics
    pub fn new(config: ValidationConfig) -> Self {
        Self::with_registry(config, Arc::new(TopicRegistry::contract_defaults()))
    }

    /// Create a Gatekeeper with default configuration
    pub fn default_config() -> Self {
        Self::new(ValidationConfig::default())
    }

    /// Create a Gatekeeper over a custom topic registry
    pub fn with_registry(config: ValidationConfig, registry: Arc<TopicRegistry>) -> Self {
        Self { config, registry }
    }

    /// The active configuration
    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// The topic registry rules are resolved against
    pub fn registry(&self) -> &TopicRegistry {
        &self.registry
    }

    /// Validate one topic's fields
    ///
    /// # Arguments
    ///
    /// * `fields` - Extracted fields; entries of other topics are ignored
    /// * `topic` - Topic name selecting the rule set
    /// * `source_text` - Document text for presence checks (optional)
    pub fn validate(
        &self,
        fields: &FieldMap,
        topic: &str,
        source_text: Option<&str>,
    ) -> ValidationResult {
        let mut issues = Issues::default();

        let Some(definition) = self.registry.get_safe(topic) else {
            issues.warn(topic, "no validation rules for this topic");
            return issues.finish();
        };

        // Missing required fields never fail a topic on their own
        for field in definition.fields.iter().filter(|f| f.required) {
            if !fields.get(&field.name).map(is_filled).unwrap_or(false) {
                issues.warn(&field.name, "required field is missing");
            }
        }

        match topic {
            names::BASIC_INFO => self.check_basic_info(fields, source_text, &mut issues),
            names::FINANCIAL => self.check_financial(fields, &mut issues),
            names::TIME_INFO => self.check_time_info(fields, &mut issues),
            names::MILESTONES => self.check_milestones(fields, &mut issues),
            names::RATE_ITEMS => self.check_rate_items(fields, &mut issues),
            names::LINE_ITEMS => self.check_line_items(fields, &mut issues),
            names::RISK_CLAUSES => self.check_risk_clauses(fields, &mut issues),
            _ => {}
        }

        let result = issues.finish();
        debug!(
            topic,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            score = result.score,
            "Validated topic"
        );
        result
    }

    /// Validate every registered topic that has at least one field present
    pub fn validate_all(
        &self,
        fields: &FieldMap,
        source_text: Option<&str>,
    ) -> Vec<(String, ValidationResult)> {
        self.registry
            .topics()
            .iter()
            .filter(|t| t.completed_fields(fields) > 0)
            .map(|t| (t.name.clone(), self.validate(fields, &t.name, source_text)))
            .collect()
    }

    fn check_basic_info(&self, fields: &FieldMap, source: Option<&str>, issues: &mut Issues) {
        for &name in PARTY_FIELDS {
            let Some(value) = filled_str(fields, name) else {
                continue;
            };
            if value.chars().count() > self.config.max_party_name_chars {
                issues.error(
                    name,
                    format!("longer than {} characters", self.config.max_party_name_chars),
                );
            }
            let lowered = value.to_lowercase();
            if let Some(keyword) = CONTACT_KEYWORDS.iter().find(|k| lowered.contains(*k)) {
                issues.error(name, format!("contains contact details ({})", keyword));
            }
        }

        if let Some(contract_no) = filled_str(fields, "contractNo") {
            if contract_no.chars().any(char::is_whitespace) {
                issues.warn("contractNo", "contains whitespace");
            }
            if contract_no.chars().count() > self.config.max_contract_no_chars {
                issues.warn(
                    "contractNo",
                    format!("longer than {} characters", self.config.max_contract_no_chars),
                );
            }
        }

        if let (true, Some(source)) = (self.config.check_source_presence, source) {
            let compact_source = strip_whitespace(source);
            for &name in SOURCE_CHECKED_FIELDS {
                let Some(value) = filled_str(fields, name) else {
                    continue;
                };
                if value.chars().count() > self.config.source_check_max_chars {
                    continue;
                }
                if !source.contains(value) && !compact_source.contains(&strip_whitespace(value)) {
                    issues.warn(name, "value does not appear in the document");
                }
            }
        }
    }

    fn check_financial(&self, fields: &FieldMap, issues: &mut Issues) {
        let with_tax = self.check_amount(fields, "amountWithTax", issues);
        let without_tax = self.check_amount(fields, "amountWithoutTax", issues);

        if let (Some(with_tax), Some(without_tax)) = (with_tax, without_tax) {
            if without_tax > with_tax {
                issues.warn("amountWithoutTax", "exceeds the amount including tax");
            }
        }

        if let Some(rate) = filled(fields, "taxRate") {
            let carries_percent = rate.as_str().map(|s| s.contains('%')).unwrap_or(false);
            match parse_amount(rate) {
                _ if carries_percent => {
                    issues.error("taxRate", "must be a fraction (0.06), not a percentage")
                }
                Some(r) if (0.0..1.0).contains(&r) => {}
                Some(_) => issues.error("taxRate", "must be a fraction in [0, 1)"),
                None => issues.error("taxRate", "is not a number"),
            }
        }
    }

    fn check_amount(&self, fields: &FieldMap, name: &str, issues: &mut Issues) -> Option<f64> {
        let value = filled(fields, name)?;
        match parse_amount(value) {
            None => {
                issues.error(name, "is not a number");
                None
            }
            Some(amount) if amount < 0.0 => {
                issues.error(name, "is negative");
                None
            }
            Some(amount) => {
                if amount < self.config.min_plausible_amount
                    || amount > self.config.max_plausible_amount
                {
                    issues.warn(name, format!("{} is outside the plausible range", amount));
                }
                Some(amount)
            }
        }
    }

    fn check_time_info(&self, fields: &FieldMap, issues: &mut Issues) {
        let mut date = |name: &str| {
            let value = filled(fields, name)?;
            let parsed = value.as_str().and_then(parse_strict_date);
            if parsed.is_none() {
                issues.error(name, "is not a valid YYYY-MM-DD date");
            }
            parsed
        };
        let sign = date("signDate");
        let start = date("startDate");
        let end = date("endDate");

        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                issues.error("endDate", "is before startDate");
            }
        }
        if let (Some(sign), Some(start)) = (sign, start) {
            if sign > start {
                issues.warn("signDate", "is after startDate");
            }
        }
    }

    fn check_milestones(&self, fields: &FieldMap, issues: &mut Issues) {
        let Some(items) = array_items("milestones", fields, issues) else {
            return;
        };

        let mut total = 0.0;
        for (i, item) in items.iter().enumerate() {
            let Some(obj) = object_item("milestones", i, item, issues) else {
                continue;
            };
            require_text(obj, "milestones", i, "name", issues);

            let percentage = item_field("milestones", i, "paymentPercentage");
            match obj.get("paymentPercentage").filter(|v| is_filled(v)) {
                None => issues.error(percentage, "is missing"),
                Some(v) => match parse_percent(v) {
                    Some(p) if (0.0..=100.0).contains(&p) => total += p,
                    Some(_) => issues.error(percentage, "outside [0, 100]"),
                    None => issues.error(percentage, "is not a number"),
                },
            }

            if let Some(amount) = obj.get("amount").filter(|v| is_filled(v)) {
                if parse_amount(amount).map(|a| a < 0.0).unwrap_or(true) {
                    issues.warn(item_field("milestones", i, "amount"), "is not a non-negative number");
                }
            }
            if let Some(date) = obj.get("plannedDate").filter(|v| is_filled(v)) {
                if date.as_str().and_then(parse_strict_date).is_none() {
                    issues.warn(item_field("milestones", i, "plannedDate"), "is not a valid YYYY-MM-DD date");
                }
            }
        }

        if !items.is_empty() {
            let deviation = (total - 100.0).abs();
            if deviation > self.config.milestone_sum_error_points {
                issues.error("milestones", format!("payment percentages sum to {}", total));
            } else if deviation > self.config.milestone_sum_warning_points {
                issues.warn("milestones", format!("payment percentages sum to {}", total));
            }
        }
    }

    fn check_rate_items(&self, fields: &FieldMap, issues: &mut Issues) {
        let Some(items) = array_items("rateItems", fields, issues) else {
            return;
        };
        for (i, item) in items.iter().enumerate() {
            let Some(obj) = object_item("rateItems", i, item, issues) else {
                continue;
            };
            require_text(obj, "rateItems", i, "role", issues);
            match obj.get("rate").filter(|v| is_filled(v)).map(parse_amount) {
                Some(Some(rate)) if rate >= 0.0 => {}
                Some(Some(_)) => issues.error(item_field("rateItems", i, "rate"), "is negative"),
                Some(None) => issues.error(item_field("rateItems", i, "rate"), "is not a number"),
                None => issues.error(item_field("rateItems", i, "rate"), "is missing"),
            }
        }
    }

    fn check_line_items(&self, fields: &FieldMap, issues: &mut Issues) {
        let Some(items) = array_items("lineItems", fields, issues) else {
            return;
        };
        for (i, item) in items.iter().enumerate() {
            let Some(obj) = object_item("lineItems", i, item, issues) else {
                continue;
            };
            require_text(obj, "lineItems", i, "productName", issues);

            let mut number = |key: &str| match obj.get(key).filter(|v| is_filled(v)) {
                None => {
                    issues.warn(item_field("lineItems", i, key), "is missing");
                    None
                }
                Some(v) => {
                    let parsed = parse_amount(v);
                    if parsed.is_none() {
                        issues.error(item_field("lineItems", i, key), "is not a number");
                    }
                    parsed
                }
            };
            let quantity = number("quantity");
            let unit_price = number("unitPrice");
            let subtotal = number("subtotal");

            if let (Some(q), Some(p), Some(s)) = (quantity, unit_price, subtotal) {
                let expected = q * p;
                let base = expected.abs().max(s.abs());
                if base > 0.0 && (expected - s).abs() / base > self.config.line_item_tolerance {
                    issues.warn(
                        item_field("lineItems", i, "subtotal"),
                        format!("{} differs from quantity x unit price ({})", s, expected),
                    );
                }
            }
        }
    }

    fn check_risk_clauses(&self, fields: &FieldMap, issues: &mut Issues) {
        let Some(definition) = self.registry.get_safe(names::RISK_CLAUSES) else {
            return;
        };
        for field in &definition.fields {
            let Some(value) = filled(fields, &field.name) else {
                continue;
            };
            match value.as_str() {
                None => issues.error(&field.name, "must be text"),
                Some(text) if text.chars().count() > self.config.max_clause_chars => issues.warn(
                    &field.name,
                    format!("longer than {} characters", self.config.max_clause_chars),
                ),
                Some(_) => {}
            }
        }
    }
}

fn filled<'a>(fields: &'a FieldMap, name: &str) -> Option<&'a Value> {
    fields.get(name).filter(|v| is_filled(v))
}

fn filled_str<'a>(fields: &'a FieldMap, name: &str) -> Option<&'a str> {
    filled(fields, name).and_then(Value::as_str).map(str::trim)
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn item_field(list: &str, index: usize, key: &str) -> String {
    format!("{}[{}].{}", list, index, key)
}

fn array_items<'a>(name: &str, fields: &'a FieldMap, issues: &mut Issues) -> Option<&'a Vec<Value>> {
    let value = filled(fields, name)?;
    let items = value.as_array();
    if items.is_none() {
        issues.error(name, "must be a list");
    }
    items
}

fn object_item<'a>(
    list: &str,
    index: usize,
    item: &'a Value,
    issues: &mut Issues,
) -> Option<&'a Map<String, Value>> {
    let obj = item.as_object();
    if obj.is_none() {
        issues.error(format!("{}[{}]", list, index), "must be an object");
    }
    obj
}

fn require_text(obj: &Map<String, Value>, list: &str, index: usize, key: &str, issues: &mut Issues) {
    let present = obj
        .get(key)
        .and_then(Value::as_str)
        .map(|s| !s.trim().is_empty())
        .unwrap_or(false);
    if !present {
        issues.error(item_field(list, index, key), "must be non-empty text");
    }
}
