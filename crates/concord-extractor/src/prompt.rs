//! LLM prompt engineering for contract field extraction

use concord_domain::traits::CompletionRequest;
use concord_domain::TopicDefinition;
use serde_json::Value;

/// Builds the per-topic extraction prompt
pub struct PromptBuilder<'a> {
    topics: Vec<&'a TopicDefinition>,
    context: &'a str,
}

impl<'a> PromptBuilder<'a> {
    /// Create a builder for one or more topics over a document context
    pub fn new(topics: Vec<&'a TopicDefinition>, context: &'a str) -> Self {
        Self { topics, context }
    }

    /// Build the system prompt: instructions plus the field schema
    pub fn system_prompt(&self) -> String {
        let mut prompt = String::from(EXTRACTION_INSTRUCTIONS);
        prompt.push_str("\n\n");

        let names: Vec<&str> = self.topics.iter().map(|t| t.name.as_str()).collect();
        prompt.push_str(&format!("Topic: {}\n", names.join(", ")));

        for topic in &self.topics {
            prompt.push_str(&format!("\n[{}] {}\n", topic.name, topic.display_name));
            for field in &topic.fields {
                let required = if field.required { ", required" } else { "" };
                prompt.push_str(&format!(
                    "- {} ({:?}{}): {}\n",
                    field.name, field.field_type, required, field.description
                ));
            }
        }
        prompt.push('\n');
        prompt.push_str(OUTPUT_FORMAT_REMINDER);
        prompt
    }

    /// Build the user prompt: the document context
    pub fn user_prompt(&self) -> String {
        format!("Contract text:\n---\n{}\n---", self.context)
    }

    /// Build the complete request
    pub fn build(&self) -> CompletionRequest {
        CompletionRequest::new(self.system_prompt(), self.user_prompt())
    }
}

/// Request a contract-type classification of the document
pub fn classification_request(excerpt: &str) -> CompletionRequest {
    CompletionRequest::new(
        CLASSIFICATION_INSTRUCTIONS,
        format!("Contract text:\n---\n{}\n---", excerpt),
    )
}

/// Ask the model to pick one of several conflicting values for a field
pub fn conflict_request(
    field_name: &str,
    description: Option<&str>,
    candidates: &[&Value],
    excerpt: &str,
) -> CompletionRequest {
    let mut system = String::from(RESOLUTION_INSTRUCTIONS);
    system.push_str(&format!("\n\nField: {}\n", field_name));
    if let Some(description) = description {
        system.push_str(&format!("Meaning: {}\n", description));
    }

    let mut user = String::from("Candidates:\n");
    for (i, candidate) in candidates.iter().enumerate() {
        user.push_str(&format!("{}. {}\n", i + 1, candidate));
    }
    user.push_str(&format!("\nContract excerpt:\n---\n{}\n---", excerpt));

    CompletionRequest::new(system, user)
}

const EXTRACTION_INSTRUCTIONS: &str = r#"You extract structured fields from a contract.
Read the contract text and fill in the fields listed below.

Rules:
- Only use information stated in the text; never guess.
- Use null for any field the text does not contain.
- Amounts are plain numbers: no currency symbols, no thousands separators (500000, not ¥500,000).
- Tax rates are fractions (6% becomes 0.06).
- Dates use YYYY-MM-DD.
- Party names are the full legal entity names, without addresses or contact details.
- Array fields are JSON arrays of objects with exactly the listed keys."#;

const OUTPUT_FORMAT_REMINDER: &str = r#"Output format: a single JSON object whose keys are the field names above.

Remember: Return ONLY valid JSON, no markdown code blocks, no explanations."#;

const CLASSIFICATION_INSTRUCTIONS: &str = r#"Classify the contract into exactly one type:

- PROJECT_OUTSOURCING: delivery of a project or system for a fixed price, usually paid by milestones
- STAFF_AUGMENTATION: provision of personnel billed by person-day or person-month rates
- PRODUCT_SALES: sale of products or licenses listed with quantities and unit prices
- MIXED: a combination of the above

Return ONLY a JSON object: {"contractType": "<TYPE>", "confidence": 0.0-1.0}"#;

const RESOLUTION_INSTRUCTIONS: &str = r#"Resolve conflicting values extracted from a contract.

Several extraction methods proposed different values for one field. Using the
contract excerpt, choose the correct value. You may return one of the candidates
or a corrected value that appears in the excerpt.

Return ONLY a JSON object: {"value": <chosen value>, "confidence": 0.0-1.0}"#;
