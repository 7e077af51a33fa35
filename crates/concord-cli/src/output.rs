//! Output formatting for the CLI.

use crate::config::OutputFormat;
use crate::error::Result;
use colored::*;
use concord_domain::topic::FieldType;
use concord_domain::{Chunk, TopicRegistry};
use concord_extractor::ExtractionOutcome;
use serde_json::Value;
use tabled::{
    builder::Builder,
    settings::{object::Rows, Alignment, Modify, Style},
};

const MAX_CELL_CHARS: usize = 60;

/// Output formatter.
pub struct Formatter {
    format: OutputFormat,
    color_enabled: bool,
}

impl Formatter {
    /// Create a new formatter.
    pub fn new(format: OutputFormat, color_enabled: bool) -> Self {
        Self {
            format,
            color_enabled,
        }
    }

    /// Active output format.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Format an extraction outcome.
    pub fn format_outcome(&self, outcome: &ExtractionOutcome, registry: &TopicRegistry) -> Result<String> {
        match self.format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(outcome)?),
            OutputFormat::Table => Ok(self.format_outcome_table(outcome, registry)),
        }
    }

    fn format_outcome_table(&self, outcome: &ExtractionOutcome, registry: &TopicRegistry) -> String {
        let mut sections = Vec::new();

        if outcome.fields.is_empty() {
            sections.push(self.colorize("No fields extracted.", "yellow"));
        } else {
            let mut builder = Builder::default();
            builder.push_record(["Topic", "Field", "Value", "Agreement", "Method"]);
            for vote in outcome.per_field_votes.iter() {
                let Some(value) = outcome.fields.get(&vote.field_name) else {
                    continue;
                };
                let topic = registry
                    .topic_of_field(&vote.field_name)
                    .map(|t| t.name.as_str())
                    .unwrap_or("-");
                builder.push_record([
                    topic.to_string(),
                    vote.field_name.clone(),
                    cell(value),
                    format!("{:.0}%", vote.confidence * 100.0),
                    vote.resolution_method.as_str().to_string(),
                ]);
            }
            sections.push(self.table(builder));
        }

        let mut builder = Builder::default();
        builder.push_record(["Topic", "Fields", "Score", "Weight"]);
        for topic in &outcome.completeness.per_topic {
            builder.push_record([
                topic.display_name.clone(),
                format!("{}/{}", topic.completed_fields, topic.total_fields),
                format!("{:.1}", topic.score),
                format!("{:.1}", topic.weight),
            ]);
        }
        sections.push(self.table(builder));

        let mut builder = Builder::default();
        builder.push_record(["Strategy", "Completeness", "Confidence", "Fields", "Duration"]);
        for result in &outcome.strategies {
            builder.push_record([
                result.strategy_name.clone(),
                format!("{:.0}%", result.completeness),
                format!("{:.1}", result.confidence),
                result.filled_fields().to_string(),
                format!("{} ms", result.duration_ms),
            ]);
        }
        sections.push(self.table(builder));

        let mut summary = vec![
            self.info(&format!("Completeness: {}%", outcome.completeness.score)),
            self.info(&format!("Confidence: {:.1}", outcome.confidence)),
        ];
        if let Some(contract_type) = outcome.contract_type {
            summary.push(self.info(&format!("Contract type: {}", contract_type.as_str())));
        }
        if outcome.aborted {
            summary.push(self.warning("Extraction was aborted"));
        }
        summary.push(self.info(&format!("Finished in {} ms ({})", outcome.duration_ms, outcome.id)));
        sections.push(summary.join("\n"));

        let conflicts = outcome.conflicts();
        if !conflicts.is_empty() {
            let mut lines = vec![self.warning(&format!("{} conflicting field(s):", conflicts.len()))];
            for vote in conflicts {
                let candidates: Vec<String> = vote
                    .votes
                    .iter()
                    .map(|v| format!("{}={}", v.strategy_name, cell(&v.value)))
                    .collect();
                lines.push(format!("  {}: {}", vote.field_name, candidates.join(", ")));
            }
            sections.push(lines.join("\n"));
        }

        if !outcome.warnings.is_empty() {
            let lines: Vec<String> = outcome.warnings.iter().map(|w| self.warning(w)).collect();
            sections.push(lines.join("\n"));
        }

        sections.join("\n\n")
    }

    /// Format document chunks.
    pub fn format_chunks(&self, chunks: &[Chunk], with_text: bool) -> Result<String> {
        if self.format == OutputFormat::Json {
            return Ok(serde_json::to_string_pretty(chunks)?);
        }
        if chunks.is_empty() {
            return Ok(self.colorize("No chunks.", "yellow"));
        }

        let mut builder = Builder::default();
        let mut header = vec!["ID", "Type", "Offsets", "Priority", "Relevant fields"];
        if with_text {
            header.push("Text");
        }
        builder.push_record(header);

        for chunk in chunks {
            let mut row = vec![
                chunk.id.clone(),
                chunk.chunk_type.as_str().to_string(),
                format!("{}..{}", chunk.start_offset, chunk.end_offset),
                chunk.priority.to_string(),
                chunk.field_relevance.join(", "),
            ];
            if with_text {
                row.push(truncate(&chunk.text.replace('\n', " ")));
            }
            builder.push_record(row);
        }
        Ok(self.table(builder))
    }

    /// Format the topic registry.
    pub fn format_topics(&self, registry: &TopicRegistry) -> Result<String> {
        if self.format == OutputFormat::Json {
            return Ok(serde_json::to_string_pretty(registry.topics())?);
        }

        let mut builder = Builder::default();
        builder.push_record(["Topic", "Weight", "Field", "Type", "Required", "Description"]);
        for topic in registry.topics() {
            for (i, field) in topic.fields.iter().enumerate() {
                let (name, weight) = if i == 0 {
                    (topic.name.clone(), format!("{:.1}", topic.weight))
                } else {
                    (String::new(), String::new())
                };
                builder.push_record([
                    name,
                    weight,
                    field.name.clone(),
                    field_type_name(field.field_type).to_string(),
                    if field.required { "yes" } else { "" }.to_string(),
                    field.description.clone(),
                ]);
            }
        }
        Ok(self.table(builder))
    }

    fn table(&self, builder: Builder) -> String {
        let mut table = builder.build();
        table
            .with(Style::rounded())
            .with(Modify::new(Rows::first()).with(Alignment::center()));
        table.to_string()
    }

    /// Format a success message.
    pub fn success(&self, message: &str) -> String {
        self.colorize(&format!("✓ {}", message), "green")
    }

    /// Format an error message.
    pub fn error(&self, message: &str) -> String {
        self.colorize(&format!("✗ {}", message), "red")
    }

    /// Format an info message.
    pub fn info(&self, message: &str) -> String {
        self.colorize(&format!("ℹ {}", message), "blue")
    }

    /// Format a warning message.
    pub fn warning(&self, message: &str) -> String {
        self.colorize(&format!("⚠ {}", message), "yellow")
    }

    /// Colorize text if color is enabled.
    fn colorize(&self, text: &str, color: &str) -> String {
        if !self.color_enabled {
            return text.to_string();
        }

        match color {
            "red" => text.red().to_string(),
            "green" => text.green().to_string(),
            "blue" => text.blue().to_string(),
            "yellow" => text.yellow().to_string(),
            _ => text.to_string(),
        }
    }
}

/// Render a field value for a table cell.
fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => truncate(s),
        Value::Array(items) => format!("[{} item(s)]", items.len()),
        other => truncate(&other.to_string()),
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_CELL_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(MAX_CELL_CHARS - 1).collect();
    cut.push('…');
    cut
}

fn field_type_name(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String => "string",
        FieldType::Number => "number",
        FieldType::Date => "date",
        FieldType::Array => "array",
        FieldType::Object => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_extractor::{ExtractionRequest, Extractor, ExtractorConfig};

    const CONTRACT: &str = "合同编号：CT-001\n总价：人民币500,000元，税率6%\n";

    async fn outcome() -> (ExtractionOutcome, Extractor) {
        let extractor = Extractor::new(ExtractorConfig::default(), None, None).unwrap();
        let request = ExtractionRequest::new(CONTRACT).with_strategies(["pattern"]);
        (extractor.extract(request).await.unwrap(), extractor)
    }

    #[tokio::test]
    async fn test_outcome_table() {
        let (outcome, extractor) = outcome().await;
        let formatter = Formatter::new(OutputFormat::Table, false);
        let output = formatter.format_outcome(&outcome, extractor.registry()).unwrap();
        assert!(output.contains("contractNo"));
        assert!(output.contains("CT-001"));
        assert!(output.contains("Completeness:"));
        assert!(output.contains("pattern"));
    }

    #[tokio::test]
    async fn test_outcome_json() {
        let (outcome, extractor) = outcome().await;
        let formatter = Formatter::new(OutputFormat::Json, false);
        let output = formatter.format_outcome(&outcome, extractor.registry()).unwrap();
        let parsed: Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["fields"]["contractNo"], "CT-001");
        assert!(parsed["perFieldVotes"].is_array());
    }

    #[test]
    fn test_topics_table() {
        let formatter = Formatter::new(OutputFormat::Table, false);
        let output = formatter.format_topics(&TopicRegistry::contract_defaults()).unwrap();
        assert!(output.contains("financial"));
        assert!(output.contains("amountWithTax"));
    }

    #[test]
    fn test_empty_chunks() {
        let formatter = Formatter::new(OutputFormat::Table, false);
        assert!(formatter.format_chunks(&[], false).unwrap().contains("No chunks"));
    }

    #[test]
    fn test_cell_rendering() {
        assert_eq!(cell(&Value::String("CT-1".into())), "CT-1");
        assert_eq!(cell(&serde_json::json!([1, 2])), "[2 item(s)]");
        assert_eq!(cell(&serde_json::json!(0.06)), "0.06");
        assert_eq!(truncate(&"x".repeat(100)).chars().count(), MAX_CELL_CHARS);
    }

    #[test]
    fn test_colorize_disabled() {
        let formatter = Formatter::new(OutputFormat::Table, false);
        assert_eq!(formatter.success("test"), "✓ test");
    }
}
