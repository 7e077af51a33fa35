//! Converted-document strategy: conversion, chunking, per-topic model calls

use super::{ask_model, chunks_for, finish, names, selected_topics, Strategy, StrategyOptions};
use crate::chunking::{chunks_for_fields, chunks_text, Chunker};
use crate::config::ExtractorConfig;
use crate::converter::ConverterClient;
use crate::parser::parse_topic_fields;
use crate::prompt::PromptBuilder;
use crate::tables::extract_tables;
use async_trait::async_trait;
use concord_domain::topic::names as topics;
use concord_domain::traits::ConversionOptions;
use concord_domain::{Chunk, ChunkType, FieldMap, StrategyResult, TopicDefinition, TopicRegistry};
use concord_llm::ModelService;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Topics answered together in the first call
const BASIC_TOPICS: &[&str] = &[topics::BASIC_INFO, topics::FINANCIAL, topics::TIME_INFO];

const BASIC_CHUNK_TYPES: &[ChunkType] = &[
    ChunkType::Header,
    ChunkType::Party,
    ChunkType::Financial,
    ChunkType::Schedule,
];

const MAX_CONFIDENCE: f64 = 70.0;

/// Converts the file (when given), then asks the model topic by topic over
/// the chunks relevant to each topic
pub struct ConvertedStrategy {
    model: Arc<dyn ModelService>,
    converter: Option<ConverterClient>,
    registry: Arc<TopicRegistry>,
    chunker: Chunker,
    config: ExtractorConfig,
}

impl ConvertedStrategy {
    /// Create the strategy
    pub fn new(
        model: Arc<dyn ModelService>,
        converter: Option<ConverterClient>,
        registry: Arc<TopicRegistry>,
        config: ExtractorConfig,
    ) -> Self {
        Self {
            model,
            converter,
            registry,
            chunker: Chunker::new(config.chunker.clone()),
            config,
        }
    }

    /// Text and table markdown to extract from
    async fn source(
        &self,
        options: &StrategyOptions,
        warnings: &mut Vec<String>,
    ) -> (Option<String>, Vec<String>) {
        let (Some(path), Some(converter)) = (&options.file_path, &self.converter) else {
            return (None, Vec::new());
        };

        match converter.convert(path, ConversionOptions::default()).await {
            Ok(doc) => {
                info!(
                    pages = doc.page_count,
                    tables = doc.tables.len(),
                    "Converted document"
                );
                let tables = doc.tables.into_iter().map(|t| t.markdown).collect();
                (Some(doc.text), tables)
            }
            Err(e) => {
                warn!(error = %e, "Conversion failed, using supplied text");
                warnings.push(format!("conversion failed: {}", e));
                (None, Vec::new())
            }
        }
    }

    async fn ask(
        &self,
        topics: Vec<&TopicDefinition>,
        context: String,
        options: &StrategyOptions,
    ) -> Result<FieldMap, String> {
        let label = topics
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join("+");
        let request = PromptBuilder::new(topics.clone(), &context)
            .build()
            .with_timeout_ms(self.config.model_timeout_ms());

        match ask_model(self.model.as_ref(), request, options.abort.as_ref()).await {
            Ok(value) => Ok(parse_topic_fields(&value, &topics)),
            Err(e) => {
                warn!(topics = %label, error = %e, "Topic call failed");
                Err(format!("{}: {}", label, e))
            }
        }
    }
}

fn context_for(chunks: &[Chunk], selected: Vec<Chunk>, text: &str, max_chars: usize) -> String {
    if selected.is_empty() || chunks.is_empty() {
        return text.chars().take(max_chars).collect();
    }
    chunks_text(&selected, max_chars)
}

#[async_trait]
impl Strategy for ConvertedStrategy {
    fn name(&self) -> &str {
        names::CONVERTED
    }

    fn is_available(&self) -> bool {
        self.model.is_available()
    }

    fn priority(&self) -> u32 {
        80
    }

    async fn parse(&self, text: &str, options: &StrategyOptions) -> StrategyResult {
        let started = Instant::now();
        let mut warnings = Vec::new();

        let (converted, table_markdown) = self.source(options, &mut warnings).await;
        let document = converted.as_deref().unwrap_or(text);
        if document.trim().is_empty() {
            return StrategyResult::failed(self.name(), "document is empty")
                .with_warnings(warnings);
        }

        let chunks = if converted.is_some() {
            Arc::new(self.chunker.chunk(document))
        } else {
            chunks_for(&self.chunker, document, options)
        };
        let selected = selected_topics(&self.registry, options);
        let max_chars = self.config.max_context_chars;

        let (basics, rest): (Vec<&TopicDefinition>, Vec<&TopicDefinition>) = selected
            .iter()
            .copied()
            .partition(|t| BASIC_TOPICS.contains(&t.name.as_str()));

        let mut calls = Vec::new();
        if !basics.is_empty() {
            let relevant: Vec<Chunk> = chunks
                .iter()
                .filter(|c| BASIC_CHUNK_TYPES.contains(&c.chunk_type))
                .cloned()
                .collect();
            calls.push((basics, context_for(&chunks, relevant, document, max_chars)));
        }
        for topic in rest {
            let fields: Vec<&str> = topic.field_names();
            let relevant = chunks_for_fields(&chunks, &fields);
            calls.push((vec![topic], context_for(&chunks, relevant, document, max_chars)));
        }

        let total_calls = calls.len();
        let pending: Vec<_> = calls
            .into_iter()
            .map(|(topics, context)| self.ask(topics, context, options))
            .collect();
        let answers: Vec<Result<FieldMap, String>> = stream::iter(pending)
            .buffered(self.config.topic_concurrency.max(1))
            .collect()
            .await;

        let mut fields = FieldMap::new();
        let mut succeeded = 0;
        for answer in answers {
            match answer {
                Ok(found) => {
                    succeeded += 1;
                    fields.extend(found);
                }
                Err(message) => warnings.push(message),
            }
        }

        // Table data beats model-extracted arrays
        let mut tabular = extract_tables(document);
        for markdown in &table_markdown {
            for (name, value) in extract_tables(markdown) {
                tabular.entry(name).or_insert(value);
            }
        }
        for (name, value) in tabular {
            if selected.iter().any(|t| t.field(&name).is_some()) {
                fields.insert(name, value);
            }
        }

        let confidence = if total_calls == 0 {
            0.0
        } else {
            MAX_CONFIDENCE * succeeded as f64 / total_calls as f64
        };
        debug!(total_calls, succeeded, fields = fields.len(), "Converted strategy finished");

        finish(
            self.name(),
            &self.registry,
            fields,
            &selected,
            confidence,
            warnings,
            started,
        )
    }
}
