//! Topic registry and weighted completeness scoring
//!
//! A topic groups related extraction fields (e.g. all financial fields) and
//! carries a weight. Completeness is the weighted share of expected fields
//! that hold a real value. Topics that a caller did not extract still count
//! toward the denominator, so missing topics always depress the score.

use crate::strategy::StrategyResult;
use crate::value::{is_filled, FieldMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Built-in contract topic names
pub mod names {
    /// Contract number, name, parties, contract type
    pub const BASIC_INFO: &str = "basic_info";
    /// Amounts, tax rate, currency, payment method
    pub const FINANCIAL: &str = "financial";
    /// Sign/start/end dates and duration
    pub const TIME_INFO: &str = "time_info";
    /// Payment milestones
    pub const MILESTONES: &str = "milestones";
    /// Staff rate schedule
    pub const RATE_ITEMS: &str = "rate_items";
    /// Product line items
    pub const LINE_ITEMS: &str = "line_items";
    /// Penalty, liability, termination and dispute clauses
    pub const RISK_CLAUSES: &str = "risk_clauses";
}

/// Errors raised by the topic registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A topic with this name is already registered
    #[error("Topic already registered: {0}")]
    DuplicateTopic(String),

    /// No topic with this name is registered
    #[error("Topic not found: {0}")]
    NotFound(String),

    /// The topic definition is malformed
    #[error("Invalid topic '{name}': {reason}")]
    InvalidTopic {
        /// Topic name
        name: String,
        /// What is wrong with it
        reason: String,
    },
}

/// Value type of an extraction field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Free text
    String,
    /// Numeric value, usually carried as a normalized string
    Number,
    /// Calendar date in `YYYY-MM-DD`
    Date,
    /// List of objects (milestones, line items, ...)
    Array,
    /// Nested object
    Object,
}

/// One field of a topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Canonical field name (camelCase)
    pub name: String,
    /// Value type
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether the field is expected in every contract of this kind
    pub required: bool,
    /// Human-readable description, used in model prompts
    pub description: String,
}

impl FieldDefinition {
    /// Create a field definition
    pub fn new(
        name: impl Into<String>,
        field_type: FieldType,
        required: bool,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            field_type,
            required,
            description: description.into(),
        }
    }
}

/// A named group of related extraction fields with a completeness weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicDefinition {
    /// Unique topic name
    pub name: String,
    /// Display name for reports
    pub display_name: String,
    /// Completeness weight, must be positive
    pub weight: f64,
    /// Display and processing order
    pub order: u32,
    /// Fields belonging to this topic
    pub fields: Vec<FieldDefinition>,
}

impl TopicDefinition {
    /// Names of the fields in this topic
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Look up one field definition
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// True if the topic's only field is an array (milestones, line items, ...)
    pub fn is_array_topic(&self) -> bool {
        self.fields.len() == 1 && self.fields[0].field_type == FieldType::Array
    }

    /// Number of fields of this topic that hold a real value in `fields`
    pub fn completed_fields(&self, fields: &FieldMap) -> usize {
        self.fields
            .iter()
            .filter(|f| fields.get(&f.name).map(is_filled).unwrap_or(false))
            .count()
    }

    /// Keep only the entries of `fields` that belong to this topic
    pub fn select(&self, fields: &FieldMap) -> FieldMap {
        fields
            .iter()
            .filter(|(k, _)| self.field(k).is_some())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Read this topic's fields out of a model's JSON answer
    ///
    /// Accepts a flat object, an object nested under the topic name, or (for
    /// array topics) a bare array. Keys are matched exactly first, then
    /// ignoring case and `_`. Unknown keys are dropped.
    pub fn fields_from_json(&self, value: &Value) -> FieldMap {
        let mut out = FieldMap::new();
        match value {
            Value::Object(map) => {
                if let Some(inner) = map.get(&self.name).filter(|v| v.is_object()) {
                    return self.fields_from_json(inner);
                }
                for field in &self.fields {
                    let found = map.get(&field.name).or_else(|| {
                        let wanted = loose_key(&field.name);
                        map.iter()
                            .find(|(k, _)| loose_key(k) == wanted)
                            .map(|(_, v)| v)
                    });
                    if let Some(v) = found {
                        out.insert(field.name.clone(), v.clone());
                    }
                }
            }
            Value::Array(_) if self.is_array_topic() => {
                out.insert(self.fields[0].name.clone(), value.clone());
            }
            _ => {}
        }
        out
    }
}

fn loose_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Completeness contribution of one topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicScore {
    /// Topic name
    pub topic: String,
    /// Display name
    pub display_name: String,
    /// Topic weight
    pub weight: f64,
    /// Fields holding a real value
    pub completed_fields: usize,
    /// Fields defined by the topic
    pub total_fields: usize,
    /// `completed_fields / total_fields * weight`
    pub score: f64,
}

/// Weighted completeness of a field set against the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletenessScoreBreakdown {
    /// Rounded percentage in [0, 100]
    pub score: u8,
    /// Sum of per-topic scores
    pub total: f64,
    /// Sum of weights of all scored topics
    pub max_score: f64,
    /// Per-topic contributions, in topic order
    pub per_topic: Vec<TopicScore>,
}

impl CompletenessScoreBreakdown {
    /// An empty breakdown (no topics scored)
    pub fn empty() -> Self {
        Self {
            score: 0,
            total: 0.0,
            max_score: 0.0,
            per_topic: Vec::new(),
        }
    }
}

/// Registry of extraction topics
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct TopicRegistry {
    topics: Vec<TopicDefinition>,
}

impl TopicRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a topic
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTopic`] if the name is taken and
    /// [`RegistryError::InvalidTopic`] if the weight is not positive or the
    /// topic has no fields.
    pub fn register(&mut self, topic: TopicDefinition) -> Result<(), RegistryError> {
        if self.topics.iter().any(|t| t.name == topic.name) {
            return Err(RegistryError::DuplicateTopic(topic.name));
        }
        if !(topic.weight > 0.0) {
            return Err(RegistryError::InvalidTopic {
                name: topic.name,
                reason: format!("weight must be positive, got {}", topic.weight),
            });
        }
        if topic.fields.is_empty() {
            return Err(RegistryError::InvalidTopic {
                name: topic.name,
                reason: "topic has no fields".to_string(),
            });
        }
        self.topics.push(topic);
        self.topics.sort_by_key(|t| t.order);
        Ok(())
    }

    /// Get a topic by name
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if absent.
    pub fn get(&self, name: &str) -> Result<&TopicDefinition, RegistryError> {
        self.get_safe(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Get a topic by name, or `None` if absent
    pub fn get_safe(&self, name: &str) -> Option<&TopicDefinition> {
        self.topics.iter().find(|t| t.name == name)
    }

    /// All topics, in `order`
    pub fn topics(&self) -> &[TopicDefinition] {
        &self.topics
    }

    /// All topic names, in `order`
    pub fn names(&self) -> Vec<String> {
        self.topics.iter().map(|t| t.name.clone()).collect()
    }

    /// Number of registered topics
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Sum of all topic weights
    pub fn total_weight(&self) -> f64 {
        self.topics.iter().map(|t| t.weight).sum()
    }

    /// The topic a field belongs to
    pub fn topic_of_field(&self, field: &str) -> Option<&TopicDefinition> {
        self.topics.iter().find(|t| t.field(field).is_some())
    }

    /// Completeness over the merged fields of several strategy results
    ///
    /// Fields are merged first-filled-wins in result order. Every registered
    /// topic is scored, whether or not any result attempted it.
    pub fn completeness(&self, results: &[StrategyResult]) -> CompletenessScoreBreakdown {
        let mut merged = FieldMap::new();
        for result in results {
            for (name, value) in &result.fields {
                let taken = merged.get(name).map(is_filled).unwrap_or(false);
                if !taken && is_filled(value) {
                    merged.insert(name.clone(), value.clone());
                }
            }
        }
        self.completeness_of(&merged)
    }

    /// Completeness of one field map over all registered topics
    pub fn completeness_of(&self, fields: &FieldMap) -> CompletenessScoreBreakdown {
        self.score_topics(fields, self.topics.iter())
    }

    /// Completeness restricted to the named topics
    ///
    /// Unknown names are ignored. Used by strategies to score only what they
    /// attempted.
    pub fn completeness_for<S: AsRef<str>>(
        &self,
        fields: &FieldMap,
        topic_names: &[S],
    ) -> CompletenessScoreBreakdown {
        self.score_topics(
            fields,
            self.topics
                .iter()
                .filter(|t| topic_names.iter().any(|n| n.as_ref() == t.name)),
        )
    }

    fn score_topics<'a>(
        &self,
        fields: &FieldMap,
        topics: impl Iterator<Item = &'a TopicDefinition>,
    ) -> CompletenessScoreBreakdown {
        let per_topic: Vec<TopicScore> = topics
            .map(|topic| {
                let completed = topic.completed_fields(fields);
                let total = topic.fields.len();
                TopicScore {
                    topic: topic.name.clone(),
                    display_name: topic.display_name.clone(),
                    weight: topic.weight,
                    completed_fields: completed,
                    total_fields: total,
                    score: completed as f64 / total as f64 * topic.weight,
                }
            })
            .collect();

        let total: f64 = per_topic.iter().map(|t| t.score).sum();
        let max_score: f64 = per_topic.iter().map(|t| t.weight).sum();
        let score = if max_score > 0.0 {
            (total / max_score * 100.0).round().clamp(0.0, 100.0) as u8
        } else {
            0
        };

        CompletenessScoreBreakdown {
            score,
            total,
            max_score,
            per_topic,
        }
    }

    /// The built-in contract topics (weights sum to 100)
    pub fn contract_defaults() -> Self {
        use FieldType::*;

        let topics = vec![
            TopicDefinition {
                name: names::BASIC_INFO.to_string(),
                display_name: "基本信息".to_string(),
                weight: 20.0,
                order: 1,
                fields: vec![
                    FieldDefinition::new("contractNo", String, true, "合同编号 (contract number)"),
                    FieldDefinition::new("name", String, false, "合同名称 (contract title)"),
                    FieldDefinition::new("customerName", String, true, "甲方/客户名称 (customer, Party A)"),
                    FieldDefinition::new("ourEntity", String, false, "乙方/我方主体 (supplier, Party B)"),
                    FieldDefinition::new(
                        "contractType",
                        String,
                        false,
                        "合同类型: PROJECT_OUTSOURCING, STAFF_AUGMENTATION, PRODUCT_SALES or MIXED",
                    ),
                ],
            },
            TopicDefinition {
                name: names::FINANCIAL.to_string(),
                display_name: "财务信息".to_string(),
                weight: 20.0,
                order: 2,
                fields: vec![
                    FieldDefinition::new("amountWithTax", Number, true, "含税总金额, digits only"),
                    FieldDefinition::new("amountWithoutTax", Number, false, "不含税金额, digits only"),
                    FieldDefinition::new("taxRate", Number, false, "税率 as a fraction, e.g. 0.06"),
                    FieldDefinition::new("currency", String, false, "币种 ISO code, e.g. CNY"),
                    FieldDefinition::new("paymentMethod", String, false, "付款方式"),
                ],
            },
            TopicDefinition {
                name: names::TIME_INFO.to_string(),
                display_name: "时间信息".to_string(),
                weight: 15.0,
                order: 3,
                fields: vec![
                    FieldDefinition::new("signDate", Date, true, "签订日期 YYYY-MM-DD"),
                    FieldDefinition::new("startDate", Date, false, "开始日期 YYYY-MM-DD"),
                    FieldDefinition::new("endDate", Date, false, "结束日期 YYYY-MM-DD"),
                    FieldDefinition::new("duration", String, false, "合同期限, e.g. 12个月"),
                ],
            },
            TopicDefinition {
                name: names::MILESTONES.to_string(),
                display_name: "里程碑".to_string(),
                weight: 15.0,
                order: 4,
                fields: vec![FieldDefinition::new(
                    "milestones",
                    Array,
                    true,
                    "付款里程碑 list of {name, paymentPercentage, amount, plannedDate}",
                )],
            },
            TopicDefinition {
                name: names::RATE_ITEMS.to_string(),
                display_name: "人力费率".to_string(),
                weight: 10.0,
                order: 5,
                fields: vec![FieldDefinition::new(
                    "rateItems",
                    Array,
                    true,
                    "人员费率 list of {role, rateType, rate}",
                )],
            },
            TopicDefinition {
                name: names::LINE_ITEMS.to_string(),
                display_name: "产品清单".to_string(),
                weight: 10.0,
                order: 6,
                fields: vec![FieldDefinition::new(
                    "lineItems",
                    Array,
                    true,
                    "产品明细 list of {productName, quantity, unitPrice, subtotal}",
                )],
            },
            TopicDefinition {
                name: names::RISK_CLAUSES.to_string(),
                display_name: "风险条款".to_string(),
                weight: 10.0,
                order: 7,
                fields: vec![
                    FieldDefinition::new("penaltyClause", String, false, "违约责任条款"),
                    FieldDefinition::new("liabilityLimit", String, false, "赔偿责任上限"),
                    FieldDefinition::new("terminationClause", String, false, "合同解除/终止条款"),
                    FieldDefinition::new("disputeResolution", String, false, "争议解决方式"),
                ],
            },
        ];

        let mut registry = Self::new();
        for topic in topics {
            // Built-in names are unique and weights positive
            if let Err(e) = registry.register(topic) {
                unreachable!("built-in topic table is inconsistent: {e}");
            }
        }
        registry
    }
}
